//! Typed values stored in the data repository.
//!
//! [`SimpleValue`] is the closed set of atomic kinds. [`SaveableValue`] is
//! what the repository actually holds: a simple value, a frozen snapshot or
//! an opaque compiled formula. Values are never mutated in place; flag
//! changes go through `with_editable`, which returns a new value.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MalformedValueError;
use crate::escape::{escape, unescape};
use crate::frozen::FrozenValue;

/// Marker for a value the user has not supplied yet.
pub const UNDEFINED_MARKER: char = '?';

pub const NAN_TOKEN: &str = "NaN";
pub const POSITIVE_INFINITY_TOKEN: &str = "Infinity";
pub const NEGATIVE_INFINITY_TOKEN: &str = "-Infinity";

/// Canonical persisted text of the tag value.
pub const TAG_TOKEN: &str = "TAG";

/// The single tag instance. Parsing any tag token yields a reference to it.
pub static TAG: TagValue = TagValue { _private: () };

/// Split an optional leading `?` from a persisted token.
///
/// Returns the payload and whether the value is defined.
pub(crate) fn split_undefined(text: &str) -> (&str, bool) {
    match text.strip_prefix(UNDEFINED_MARKER) {
        Some(rest) => (rest, false),
        None => (text, true),
    }
}

fn undefined_prefix(defined: bool) -> &'static str {
    if defined {
        ""
    } else {
        "?"
    }
}

/// Discriminant of a value, for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Number,
    Text,
    Date,
    Tag,
    Malformed,
    Frozen,
    Formula,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Date => "date",
            Self::Tag => "tag",
            Self::Malformed => "malformed",
            Self::Frozen => "frozen",
            Self::Formula => "formula",
        };
        f.write_str(s)
    }
}

// ── Number ──────────────────────────────────────────────────────────────────

/// A double-precision number.
#[derive(Clone, Copy, Debug)]
pub struct NumberValue {
    value: f64,
    defined: bool,
    editable: bool,
}

impl NumberValue {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            defined: true,
            editable: true,
        }
    }

    pub fn undefined(value: f64) -> Self {
        Self {
            defined: false,
            ..Self::new(value)
        }
    }

    /// Parse `["?"] (decimal | "NaN" | "Infinity" | "-Infinity")`.
    pub fn parse(text: &str) -> Result<Self, MalformedValueError> {
        let (body, defined) = split_undefined(text);
        let body = body.trim();
        let value = match body {
            NAN_TOKEN => f64::NAN,
            POSITIVE_INFINITY_TOKEN => f64::INFINITY,
            NEGATIVE_INFINITY_TOKEN => f64::NEG_INFINITY,
            _ if is_decimal_literal(body) => body
                .parse::<f64>()
                .map_err(|_| MalformedValueError::Number(text.to_string()))?,
            _ => return Err(MalformedValueError::Number(text.to_string())),
        };
        Ok(Self {
            value,
            defined,
            editable: true,
        })
    }

    pub fn get_double(&self) -> f64 {
        self.value
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn with_editable(self, editable: bool) -> Self {
        Self { editable, ..self }
    }

    pub fn save_string(&self) -> String {
        format!("{}{}", undefined_prefix(self.defined), number_token(self.value))
    }

    pub fn format(&self) -> String {
        if self.value.is_nan() {
            "#VALUE!".to_string()
        } else if self.value.is_infinite() {
            "#DIV/0!".to_string()
        } else {
            let s = format!("{:.2}", self.value);
            let s = s.trim_end_matches('0').trim_end_matches('.');
            if s == "-0" {
                "0".to_string()
            } else {
                s.to_string()
            }
        }
    }

    pub fn test(&self) -> bool {
        self.value != 0.0 && self.value.is_finite()
    }

    fn same_number(&self, other: &Self) -> bool {
        self.value == other.value || (self.value.is_nan() && other.value.is_nan())
    }
}

/// Rust's float parser accepts `inf`/`infinity`/`nan` in any case; only the
/// three canonical tokens are valid here, so reject anything alphabetic
/// other than an exponent marker.
fn is_decimal_literal(s: &str) -> bool {
    !s.is_empty()
        && s.chars().any(|c| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

fn number_token(value: f64) -> String {
    if value.is_nan() {
        NAN_TOKEN.to_string()
    } else if value == f64::INFINITY {
        POSITIVE_INFINITY_TOKEN.to_string()
    } else if value == f64::NEG_INFINITY {
        NEGATIVE_INFINITY_TOKEN.to_string()
    } else {
        value.to_string()
    }
}

// ── Text ────────────────────────────────────────────────────────────────────

/// A string, persisted as `"` followed by the escaped characters.
#[derive(Clone, Debug)]
pub struct TextValue {
    value: String,
    defined: bool,
    editable: bool,
}

impl TextValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            defined: true,
            editable: true,
        }
    }

    pub fn undefined(value: impl Into<String>) -> Self {
        Self {
            defined: false,
            ..Self::new(value)
        }
    }

    pub fn parse(text: &str) -> Result<Self, MalformedValueError> {
        let (body, defined) = split_undefined(text);
        let escaped = body
            .strip_prefix('"')
            .ok_or_else(|| MalformedValueError::MissingDelimiter(text.to_string()))?;
        Ok(Self {
            value: unescape(escaped),
            defined,
            editable: true,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn with_editable(self, editable: bool) -> Self {
        Self { editable, ..self }
    }

    pub fn save_string(&self) -> String {
        format!("{}\"{}", undefined_prefix(self.defined), escape(&self.value))
    }

    pub fn format(&self) -> String {
        self.value.clone()
    }

    pub fn test(&self) -> bool {
        !self.value.is_empty()
    }
}

// ── Date ────────────────────────────────────────────────────────────────────

/// A point in time, persisted as `@` plus epoch milliseconds.
#[derive(Clone, Copy, Debug)]
pub struct DateValue {
    value: DateTime<Utc>,
    defined: bool,
    editable: bool,
}

impl DateValue {
    pub fn new(value: DateTime<Utc>) -> Self {
        Self {
            value,
            defined: true,
            editable: true,
        }
    }

    /// Parse `["?"] "@" (millis | "now")`, resolving `now` against `now`.
    pub fn parse_with_clock(
        text: &str,
        now: impl FnOnce() -> DateTime<Utc>,
    ) -> Result<Self, MalformedValueError> {
        let (body, defined) = split_undefined(text);
        let payload = body
            .strip_prefix('@')
            .ok_or_else(|| MalformedValueError::Date(text.to_string()))?
            .trim();
        let value = if payload.eq_ignore_ascii_case("now") {
            now()
        } else {
            payload
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .ok_or_else(|| MalformedValueError::Date(text.to_string()))?
        };
        Ok(Self {
            value,
            defined,
            editable: true,
        })
    }

    pub fn parse(text: &str) -> Result<Self, MalformedValueError> {
        Self::parse_with_clock(text, Utc::now)
    }

    pub fn get(&self) -> DateTime<Utc> {
        self.value
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn with_editable(self, editable: bool) -> Self {
        Self { editable, ..self }
    }

    pub fn save_string(&self) -> String {
        format!(
            "{}@{}",
            undefined_prefix(self.defined),
            self.value.timestamp_millis()
        )
    }

    pub fn format(&self) -> String {
        self.value.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// ── Tag ─────────────────────────────────────────────────────────────────────

/// Boolean-true marker. The only instance is [`TAG`].
#[derive(Debug)]
pub struct TagValue {
    _private: (),
}

impl TagValue {
    /// Any input yields the shared instance.
    pub fn parse(_text: &str) -> &'static TagValue {
        &TAG
    }

    pub fn save_string(&self) -> String {
        TAG_TOKEN.to_string()
    }
}

// ── Malformed ───────────────────────────────────────────────────────────────

/// Placeholder for text that failed to parse. Saves and displays the
/// original text unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedValue {
    text: String,
    editable: bool,
}

impl MalformedValue {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            editable: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn with_editable(self, editable: bool) -> Self {
        Self { editable, ..self }
    }
}

impl From<MalformedValueError> for MalformedValue {
    fn from(err: MalformedValueError) -> Self {
        Self::new(err.text())
    }
}

// ── SimpleValue ─────────────────────────────────────────────────────────────

/// An atomic value.
#[derive(Clone, Debug)]
pub enum SimpleValue {
    Number(NumberValue),
    Text(TextValue),
    Date(DateValue),
    Tag(&'static TagValue),
    Malformed(MalformedValue),
}

impl SimpleValue {
    pub fn number(value: f64) -> Self {
        Self::Number(NumberValue::new(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(TextValue::new(value))
    }

    pub fn tag() -> Self {
        Self::Tag(&TAG)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
            Self::Date(_) => ValueKind::Date,
            Self::Tag(_) => ValueKind::Tag,
            Self::Malformed(_) => ValueKind::Malformed,
        }
    }

    pub fn is_defined(&self) -> bool {
        match self {
            Self::Number(v) => v.is_defined(),
            Self::Text(v) => v.is_defined(),
            Self::Date(v) => v.is_defined(),
            Self::Tag(_) | Self::Malformed(_) => true,
        }
    }

    pub fn is_editable(&self) -> bool {
        match self {
            Self::Number(v) => v.is_editable(),
            Self::Text(v) => v.is_editable(),
            Self::Date(v) => v.is_editable(),
            Self::Tag(_) => false,
            Self::Malformed(v) => v.is_editable(),
        }
    }

    /// A copy with the editable flag replaced. The tag ignores this.
    pub fn with_editable(self, editable: bool) -> Self {
        match self {
            Self::Number(v) => Self::Number(v.with_editable(editable)),
            Self::Text(v) => Self::Text(v.with_editable(editable)),
            Self::Date(v) => Self::Date(v.with_editable(editable)),
            Self::Tag(t) => Self::Tag(t),
            Self::Malformed(v) => Self::Malformed(v.with_editable(editable)),
        }
    }

    /// Non-editable copy of this value.
    pub fn simple_value(&self) -> Self {
        self.clone().with_editable(false)
    }

    pub fn save_string(&self) -> String {
        match self {
            Self::Number(v) => v.save_string(),
            Self::Text(v) => v.save_string(),
            Self::Date(v) => v.save_string(),
            Self::Tag(t) => t.save_string(),
            Self::Malformed(v) => v.text().to_string(),
        }
    }

    pub fn format(&self) -> String {
        match self {
            Self::Number(v) => v.format(),
            Self::Text(v) => v.format(),
            Self::Date(v) => v.format(),
            Self::Tag(t) => t.save_string(),
            Self::Malformed(v) => v.text().to_string(),
        }
    }

    /// Boolean coercion.
    pub fn test(&self) -> bool {
        match self {
            Self::Number(v) => v.test(),
            Self::Text(v) => v.test(),
            Self::Date(_) | Self::Tag(_) => true,
            Self::Malformed(_) => false,
        }
    }

    /// Same-kind comparison of the payload. Different kinds are never equal.
    pub fn equals(&self, other: &SimpleValue) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.same_number(b),
            (Self::Text(a), Self::Text(b)) => a.value == b.value,
            (Self::Date(a), Self::Date(b)) => a.value == b.value,
            (Self::Tag(a), Self::Tag(b)) => std::ptr::eq(*a, *b),
            (Self::Malformed(a), Self::Malformed(b)) => a.text == b.text,
            _ => false,
        }
    }

    pub fn less_than(&self, other: &SimpleValue) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    pub fn greater_than(&self, other: &SimpleValue) -> bool {
        self.compare(other) == Some(Ordering::Greater)
    }

    fn compare(&self, other: &SimpleValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.value.partial_cmp(&b.value),
            (Self::Text(a), Self::Text(b)) => Some(a.value.cmp(&b.value)),
            (Self::Date(a), Self::Date(b)) => Some(a.value.cmp(&b.value)),
            _ => None,
        }
    }
}

/// Structural equality: same payload and same flags.
impl PartialEq for SimpleValue {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
            && self.is_defined() == other.is_defined()
            && self.is_editable() == other.is_editable()
    }
}

impl fmt::Display for SimpleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

// ── Formula ─────────────────────────────────────────────────────────────────

/// Opaque `{`-prefixed formula. Kept verbatim; never evaluated here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFormula {
    source: String,
    editable: bool,
}

impl CompiledFormula {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            editable: true,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn with_editable(self, editable: bool) -> Self {
        Self { editable, ..self }
    }
}

// ── SaveableValue ───────────────────────────────────────────────────────────

/// Anything the repository can hold under a name.
#[derive(Clone, Debug)]
pub enum SaveableValue {
    Simple(SimpleValue),
    Frozen(Arc<FrozenValue>),
    Formula(CompiledFormula),
}

impl SaveableValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Simple(v) => v.kind(),
            Self::Frozen(_) => ValueKind::Frozen,
            Self::Formula(_) => ValueKind::Formula,
        }
    }

    pub fn save_string(&self) -> String {
        match self {
            Self::Simple(v) => v.save_string(),
            Self::Frozen(f) => f.save_string(),
            Self::Formula(c) => c.source().to_string(),
        }
    }

    /// Frozen snapshots are never editable.
    pub fn is_editable(&self) -> bool {
        match self {
            Self::Simple(v) => v.is_editable(),
            Self::Frozen(_) => false,
            Self::Formula(c) => c.is_editable(),
        }
    }

    pub fn with_editable(self, editable: bool) -> Self {
        match self {
            Self::Simple(v) => Self::Simple(v.with_editable(editable)),
            Self::Frozen(f) => Self::Frozen(f),
            Self::Formula(c) => Self::Formula(c.with_editable(editable)),
        }
    }

    /// The non-editable value readers see. Formulas have none.
    pub fn simple_value(&self) -> Option<SimpleValue> {
        match self {
            Self::Simple(v) => Some(v.simple_value()),
            Self::Frozen(f) => f.current().cloned(),
            Self::Formula(_) => None,
        }
    }

    pub fn format(&self) -> String {
        match self {
            Self::Formula(c) => c.source().to_string(),
            other => other
                .simple_value()
                .map(|v| v.format())
                .unwrap_or_default(),
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleValue> {
        match self {
            Self::Simple(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_frozen(&self) -> Option<&Arc<FrozenValue>> {
        match self {
            Self::Frozen(f) => Some(f),
            _ => None,
        }
    }
}

impl PartialEq for SaveableValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Simple(a), Self::Simple(b)) => a == b,
            (Self::Frozen(a), Self::Frozen(b)) => {
                Arc::ptr_eq(a, b) || a.save_string() == b.save_string()
            }
            (Self::Formula(a), Self::Formula(b)) => a == b,
            _ => false,
        }
    }
}

impl From<SimpleValue> for SaveableValue {
    fn from(value: SimpleValue) -> Self {
        Self::Simple(value)
    }
}

impl From<FrozenValue> for SaveableValue {
    fn from(value: FrozenValue) -> Self {
        Self::Frozen(Arc::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn undefined_number_parses() {
        let v = NumberValue::parse("?3.5").unwrap();
        assert!(!v.is_defined());
        assert_eq!(v.get_double(), 3.5);
        assert_eq!(v.save_string(), "?3.5");
    }

    #[test]
    fn integral_number_saves_without_fraction() {
        assert_eq!(NumberValue::new(12.0).save_string(), "12");
        assert_eq!(NumberValue::new(-0.25).save_string(), "-0.25");
    }

    #[test]
    fn special_number_tokens() {
        assert_eq!(NumberValue::new(f64::NAN).save_string(), "NaN");
        assert_eq!(NumberValue::new(f64::INFINITY).save_string(), "Infinity");
        assert_eq!(NumberValue::new(f64::NEG_INFINITY).save_string(), "-Infinity");

        assert!(NumberValue::parse("NaN").unwrap().get_double().is_nan());
        assert_eq!(NumberValue::parse("Infinity").unwrap().get_double(), f64::INFINITY);
        assert_eq!(
            NumberValue::parse("?-Infinity").unwrap().get_double(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn non_canonical_specials_are_malformed() {
        assert!(NumberValue::parse("inf").is_err());
        assert!(NumberValue::parse("nan").is_err());
        assert!(NumberValue::parse("infinity").is_err());
    }

    #[test]
    fn garbage_number_is_malformed() {
        let err = NumberValue::parse("12 apples").unwrap_err();
        assert_eq!(err, MalformedValueError::Number("12 apples".into()));
        assert!(NumberValue::parse("").is_err());
        assert!(NumberValue::parse("?").is_err());
    }

    #[test]
    fn number_parse_trims_whitespace() {
        assert_eq!(NumberValue::parse(" 7 ").unwrap().get_double(), 7.0);
        assert_eq!(NumberValue::parse("1e3").unwrap().get_double(), 1000.0);
    }

    #[test]
    fn number_format() {
        assert_eq!(NumberValue::new(12.0).format(), "12");
        assert_eq!(NumberValue::new(3.14159).format(), "3.14");
        assert_eq!(NumberValue::new(2.5).format(), "2.5");
        assert_eq!(NumberValue::new(f64::NAN).format(), "#VALUE!");
        assert_eq!(NumberValue::new(f64::INFINITY).format(), "#DIV/0!");
        assert_eq!(NumberValue::new(-0.001).format(), "0");
    }

    #[test]
    fn number_test_coercion() {
        assert!(NumberValue::new(1.0).test());
        assert!(NumberValue::new(-0.5).test());
        assert!(!NumberValue::new(0.0).test());
        assert!(!NumberValue::new(f64::NAN).test());
        assert!(!NumberValue::new(f64::INFINITY).test());
    }

    #[test]
    fn text_parse_unescapes() {
        let v = TextValue::parse("\"a\\nb").unwrap();
        assert_eq!(v.as_str(), "a\nb");
        assert!(v.is_defined());
    }

    #[test]
    fn text_requires_delimiter() {
        assert_eq!(
            TextValue::parse("abc").unwrap_err(),
            MalformedValueError::MissingDelimiter("abc".into())
        );
        assert!(TextValue::parse("?abc").is_err());
    }

    #[test]
    fn undefined_text_round_trips() {
        let v = TextValue::parse("?\"blank").unwrap();
        assert!(!v.is_defined());
        assert_eq!(v.save_string(), "?\"blank");
    }

    #[test]
    fn text_test_coercion() {
        assert!(TextValue::new("x").test());
        assert!(!TextValue::new("").test());
    }

    #[test]
    fn date_parse_and_save() {
        let v = DateValue::parse("@1000").unwrap();
        assert_eq!(v.get().timestamp_millis(), 1000);
        assert_eq!(v.save_string(), "@1000");
        assert_eq!(DateValue::parse("?@5").unwrap().save_string(), "?@5");
    }

    #[test]
    fn date_now_uses_clock() {
        let fixed = DateTime::from_timestamp_millis(42_000).unwrap();
        let v = DateValue::parse_with_clock("@now", || fixed).unwrap();
        assert_eq!(v.get(), fixed);
        let v = DateValue::parse_with_clock("@NOW", || fixed).unwrap();
        assert_eq!(v.save_string(), "@42000");
    }

    #[test]
    fn malformed_date() {
        assert!(DateValue::parse("@yesterday").is_err());
        assert!(DateValue::parse("1000").is_err());
    }

    #[test]
    fn date_format() {
        let v = DateValue::parse("@0").unwrap();
        assert_eq!(v.format(), "1970-01-01 00:00:00");
    }

    #[test]
    fn tag_is_singleton() {
        let a = TagValue::parse("TAG");
        let b = TagValue::parse("T anything");
        assert!(std::ptr::eq(a, b));
        assert!(std::ptr::eq(a, &TAG));
        assert!(SimpleValue::tag().equals(&SimpleValue::Tag(b)));
        assert!(SimpleValue::tag().test());
        assert_eq!(SimpleValue::tag().save_string(), "TAG");
    }

    #[test]
    fn tag_ignores_editable() {
        let t = SimpleValue::tag().with_editable(true);
        assert!(!t.is_editable());
        assert!(t.is_defined());
    }

    #[test]
    fn cross_kind_comparisons_are_false() {
        let n = SimpleValue::number(1.0);
        let t = SimpleValue::text("1");
        assert!(!n.equals(&t));
        assert!(!n.less_than(&t));
        assert!(!n.greater_than(&t));
        assert!(!t.equals(&SimpleValue::tag()));
    }

    #[test]
    fn ordering_within_kind() {
        let a = SimpleValue::number(1.0);
        let b = SimpleValue::number(2.0);
        assert!(a.less_than(&b));
        assert!(b.greater_than(&a));
        assert!(!a.less_than(&a));

        let x = SimpleValue::text("apple");
        let y = SimpleValue::text("banana");
        assert!(x.less_than(&y));

        let nan = SimpleValue::number(f64::NAN);
        assert!(!nan.less_than(&a));
        assert!(!nan.greater_than(&a));
        assert!(nan.equals(&SimpleValue::number(f64::NAN)));
    }

    #[test]
    fn defined_and_editable_are_orthogonal() {
        let computed = SimpleValue::number(5.0).with_editable(false);
        assert!(computed.is_defined());
        assert!(!computed.is_editable());

        let blank = SimpleValue::Number(NumberValue::undefined(0.0));
        assert!(!blank.is_defined());
        assert!(blank.is_editable());
    }

    #[test]
    fn simple_value_is_non_editable_copy() {
        let v = SimpleValue::text("live");
        let copy = v.simple_value();
        assert!(v.is_editable());
        assert!(!copy.is_editable());
        assert!(copy.equals(&v));
    }

    #[test]
    fn malformed_keeps_original_text() {
        let m = SimpleValue::Malformed(MalformedValue::new("12 apples"));
        assert_eq!(m.save_string(), "12 apples");
        assert_eq!(m.format(), "12 apples");
        assert!(!m.test());
        assert_eq!(m.kind(), ValueKind::Malformed);
    }

    #[test]
    fn formula_has_no_simple_value() {
        let f = SaveableValue::Formula(CompiledFormula::new("{[a] + [b]"));
        assert!(f.simple_value().is_none());
        assert_eq!(f.save_string(), "{[a] + [b]");
        assert_eq!(f.kind(), ValueKind::Formula);
    }

    #[test]
    fn value_kind_serde() {
        let json = serde_json::to_string(&ValueKind::Malformed).unwrap();
        assert_eq!(json, "\"malformed\"");
        assert_eq!(ValueKind::Frozen.to_string(), "frozen");
    }

    proptest! {
        #[test]
        fn number_round_trip(v in any::<f64>(), defined in any::<bool>()) {
            let n = if defined { NumberValue::new(v) } else { NumberValue::undefined(v) };
            let parsed = NumberValue::parse(&n.save_string()).unwrap();
            prop_assert_eq!(SimpleValue::Number(parsed), SimpleValue::Number(n));
        }

        #[test]
        fn text_round_trip(s in any::<String>(), defined in any::<bool>()) {
            let t = if defined { TextValue::new(s) } else { TextValue::undefined(s) };
            let parsed = TextValue::parse(&t.save_string()).unwrap();
            prop_assert_eq!(SimpleValue::Text(parsed), SimpleValue::Text(t));
        }
    }
}
