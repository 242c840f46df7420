//! Sigil dispatch from persisted text to typed values.
//!
//! ```text
//! value   := ["?"] payload
//! payload := numeric | text | tag | frozen | formula | "null"
//! ```
//!
//! The first character after an optional `?` picks the branch: `@` date,
//! `"` text, `T` tag, `#` frozen, `{` formula, anything else numeric.

use chrono::{DateTime, Utc};

use crate::error::MalformedValueError;
use crate::frozen;
use crate::value::{
    split_undefined, CompiledFormula, DateValue, MalformedValue, NumberValue, SaveableValue,
    SimpleValue, TagValue, TextValue,
};

/// Text that stands for "no value".
pub const NULL_TOKEN: &str = "null";

/// Parses persisted value tokens.
///
/// Carries the clock used to resolve `@now`, so tests and replays can pin
/// it. Cheap to copy.
#[derive(Clone, Copy, Debug)]
pub struct ValueFactory {
    now: fn() -> DateTime<Utc>,
}

impl ValueFactory {
    pub fn new() -> Self {
        Self { now: Utc::now }
    }

    pub fn with_clock(now: fn() -> DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Parse a token. `null` and the empty string yield `Ok(None)`.
    pub fn parse(&self, text: &str) -> Result<Option<SaveableValue>, MalformedValueError> {
        if text.is_empty() || text == NULL_TOKEN {
            return Ok(None);
        }
        let (body, _) = split_undefined(text);
        let value = match body.chars().next() {
            Some('#') => SaveableValue::from(frozen::decode_with(text, self)?),
            Some('{') => SaveableValue::Formula(CompiledFormula::new(text)),
            _ => SaveableValue::Simple(self.parse_simple_kind(text)?),
        };
        Ok(Some(value))
    }

    /// Parse a token, substituting a [`MalformedValue`] for anything that
    /// does not fit its grammar.
    pub fn parse_lenient(&self, text: &str) -> Option<SaveableValue> {
        match self.parse(text) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "keeping malformed value text");
                Some(SaveableValue::Simple(SimpleValue::Malformed(err.into())))
            }
        }
    }

    /// Strict parse for callers that only accept simple values. Frozen and
    /// formula tokens are rejected.
    pub fn parse_simple(&self, text: &str) -> Result<Option<SimpleValue>, MalformedValueError> {
        if text.is_empty() || text == NULL_TOKEN {
            return Ok(None);
        }
        let (body, _) = split_undefined(text);
        if matches!(body.chars().next(), Some('#' | '{')) {
            return Err(MalformedValueError::NotSimple(text.to_string()));
        }
        self.parse_simple_kind(text).map(Some)
    }

    /// Like [`parse_simple`](Self::parse_simple) but malformed text becomes
    /// a placeholder instead of an error.
    pub fn parse_simple_lenient(&self, text: &str) -> Option<SimpleValue> {
        self.parse_simple(text)
            .unwrap_or_else(|err| Some(SimpleValue::Malformed(MalformedValue::from(err))))
    }

    fn parse_simple_kind(&self, text: &str) -> Result<SimpleValue, MalformedValueError> {
        let (body, _) = split_undefined(text);
        Ok(match body.chars().next() {
            Some('@') => SimpleValue::Date(DateValue::parse_with_clock(text, self.now)?),
            Some('"') => SimpleValue::Text(TextValue::parse(text)?),
            Some('T') => SimpleValue::Tag(TagValue::parse(text)),
            _ => SimpleValue::Number(NumberValue::parse(text)?),
        })
    }
}

impl Default for ValueFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse with the system clock.
pub fn parse(text: &str) -> Result<Option<SaveableValue>, MalformedValueError> {
    ValueFactory::new().parse(text)
}

/// Lenient parse with the system clock.
pub fn parse_lenient(text: &str) -> Option<SaveableValue> {
    ValueFactory::new().parse_lenient(text)
}

/// Strict simple-value parse with the system clock.
pub fn parse_simple(text: &str) -> Result<Option<SimpleValue>, MalformedValueError> {
    ValueFactory::new().parse_simple(text)
}
