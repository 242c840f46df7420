/// A persisted value token that does not match the grammar for its sigil.
///
/// Every variant keeps the original text so callers can build a
/// [`MalformedValue`](crate::value::MalformedValue) placeholder without
/// losing data.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedValueError {
    #[error("not a number: {0:?}")]
    Number(String),

    #[error("missing string delimiter: {0:?}")]
    MissingDelimiter(String),

    #[error("malformed date: {0:?}")]
    Date(String),

    #[error("frozen value has no separator: {0:?}")]
    MissingSeparator(String),

    #[error("not a simple value: {0:?}")]
    NotSimple(String),
}

impl MalformedValueError {
    /// The text that failed to parse.
    pub fn text(&self) -> &str {
        match self {
            Self::Number(t)
            | Self::MissingDelimiter(t)
            | Self::Date(t)
            | Self::MissingSeparator(t)
            | Self::NotSimple(t) => t,
        }
    }
}
