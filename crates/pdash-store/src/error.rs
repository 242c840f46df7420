use std::path::PathBuf;

use pdash_core::MalformedValueError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid datafile {}: line {line}: {reason}", path.display())]
    InvalidDatafile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("malformed value: {0}")]
    Malformed(#[from] MalformedValueError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not frozen: {0}")]
    NotFrozen(String),
}

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_datafile_display() {
        let err = StoreError::InvalidDatafile {
            path: PathBuf::from("/tmp/proj.dat"),
            line: 3,
            reason: "missing '='".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid datafile /tmp/proj.dat: line 3: missing '='"
        );
    }

    #[test]
    fn malformed_from_conversion() {
        let err: StoreError = MalformedValueError::Number("x".into()).into();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn settings_json_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(err.to_string().contains("parse settings JSON"));
    }
}
