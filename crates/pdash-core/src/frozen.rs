//! Baseline snapshots: a live value plus the text of the value it replaced.
//!
//! ```text
//! frozen := "#" current-save "\u0001" ["="] former-save
//! ```
//!
//! A leading `=` on the former side means the former value was not
//! editable. The former side is the literal `DEFAULT` when the snapshot
//! replaced an inherited default rather than a stored value.

use std::sync::{Arc, OnceLock};

use crate::error::MalformedValueError;
use crate::factory::{ValueFactory, NULL_TOKEN};
use crate::value::{split_undefined, MalformedValue, SaveableValue, SimpleValue};

pub const FROZEN_SIGIL: char = '#';
pub const SEPARATOR: char = '\u{1}';
pub const LOCKED_MARKER: char = '=';
pub const DEFAULT: &str = "DEFAULT";

/// What the snapshot restores on thaw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormerValue {
    /// The name had no stored value; thaw reverts to the inherited default.
    Default,
    /// Persisted text of the replaced value (possibly `null`).
    Text(String),
}

impl FormerValue {
    fn save_string(&self) -> &str {
        match self {
            Self::Default => DEFAULT,
            Self::Text(t) => t,
        }
    }
}

/// Result of thawing a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum Thawed {
    Value(SaveableValue),
    /// Former text was `null`.
    Absent,
    /// Former side was `DEFAULT`.
    Default,
}

impl Thawed {
    pub fn value(&self) -> Option<&SaveableValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Absent | Self::Default => None,
        }
    }
}

#[derive(Debug)]
pub struct FrozenValue {
    current: Option<SimpleValue>,
    former: FormerValue,
    former_editable: bool,
    thawed: OnceLock<Thawed>,
}

impl FrozenValue {
    pub fn new(current: Option<SimpleValue>, former: FormerValue, former_editable: bool) -> Self {
        Self {
            current: current.map(|v| v.with_editable(false)),
            former,
            former_editable,
            thawed: OnceLock::new(),
        }
    }

    /// The non-editable value readers see while frozen.
    pub fn current(&self) -> Option<&SimpleValue> {
        self.current.as_ref()
    }

    pub fn former(&self) -> &FormerValue {
        &self.former
    }

    pub fn former_editable(&self) -> bool {
        self.former_editable
    }

    pub fn save_string(&self) -> String {
        let current = self
            .current
            .as_ref()
            .map(SimpleValue::save_string)
            .unwrap_or_else(|| NULL_TOKEN.to_string());
        let locked = if self.former_editable { "" } else { "=" };
        format!(
            "{FROZEN_SIGIL}{current}{SEPARATOR}{locked}{}",
            self.former.save_string()
        )
    }

    /// Reconstruct the former value with the system clock.
    pub fn thaw(&self) -> &Thawed {
        self.thaw_with(&ValueFactory::new())
    }

    /// Reconstruct the former value. The first call parses; later calls
    /// return the same memoised result.
    pub fn thaw_with(&self, factory: &ValueFactory) -> &Thawed {
        self.thawed.get_or_init(|| match &self.former {
            FormerValue::Default => Thawed::Default,
            FormerValue::Text(text) => match factory.parse(text) {
                Ok(Some(value)) => Thawed::Value(value.with_editable(self.former_editable)),
                Ok(None) => Thawed::Absent,
                Err(err) => {
                    tracing::warn!(error = %err, "thawing malformed former value");
                    Thawed::Value(SaveableValue::Simple(SimpleValue::Malformed(
                        MalformedValue::from(err).with_editable(self.former_editable),
                    )))
                }
            },
        })
    }

    pub fn is_thawed(&self) -> bool {
        self.thawed.get().is_some()
    }
}

/// Capture `live` as a baseline.
///
/// The former side keeps `live`'s text and editability; the current side is
/// its non-editable simple value. An absent value freezes as former `null`,
/// editable. Freezing an already-frozen value returns it unchanged.
pub fn freeze(live: Option<&SaveableValue>) -> SaveableValue {
    match live {
        None => SaveableValue::from(FrozenValue::new(
            None,
            FormerValue::Text(NULL_TOKEN.to_string()),
            true,
        )),
        Some(SaveableValue::Frozen(existing)) => SaveableValue::Frozen(Arc::clone(existing)),
        Some(value) => SaveableValue::from(FrozenValue::new(
            value.simple_value(),
            FormerValue::Text(value.save_string()),
            value.is_editable(),
        )),
    }
}

/// Freeze a name that currently shows an inherited default.
pub fn freeze_default(current: Option<SimpleValue>) -> SaveableValue {
    SaveableValue::from(FrozenValue::new(current, FormerValue::Default, true))
}

/// Decode with the system clock.
pub fn decode(text: &str) -> Result<FrozenValue, MalformedValueError> {
    decode_with(text, &ValueFactory::new())
}

pub(crate) fn decode_with(
    text: &str,
    factory: &ValueFactory,
) -> Result<FrozenValue, MalformedValueError> {
    let (body, _) = split_undefined(text);
    let body = body
        .strip_prefix(FROZEN_SIGIL)
        .ok_or_else(|| MalformedValueError::MissingSeparator(text.to_string()))?;
    let (current_text, former_text) = body
        .split_once(SEPARATOR)
        .ok_or_else(|| MalformedValueError::MissingSeparator(text.to_string()))?;

    let current = factory.parse_simple_lenient(current_text);

    let (former_text, former_editable) = match former_text.strip_prefix(LOCKED_MARKER) {
        Some(rest) => (rest, false),
        None => (former_text, true),
    };
    let former = if former_text == DEFAULT {
        FormerValue::Default
    } else {
        FormerValue::Text(former_text.to_string())
    };

    Ok(FrozenValue::new(current, former, former_editable))
}
