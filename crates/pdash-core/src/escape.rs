//! Backslash escaping for persisted text values.
//!
//! `\` becomes `\\`, CR becomes `\r`, LF becomes `\n`, TAB becomes `\t` and
//! the frozen-value separator U+0001 becomes `\x01`. Reading also accepts a
//! line continuation: a backslash directly before a line terminator, plus
//! any indentation on the next line, collapses to nothing.

/// Escape sequence written for U+0001 so frozen tokens keep exactly one
/// raw separator.
const SEPARATOR_ESCAPE: &str = "x01";

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\u{1}' => {
                out.push('\\');
                out.push_str(SEPARATOR_ESCAPE);
            }
            c => out.push(c),
        }
    }
    out
}

pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            None => out.push('\\'),
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('r') => {
                chars.next();
                out.push('\r');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            Some('x') if chars.clone().skip(1).take(2).eq("01".chars()) => {
                for _ in 0..SEPARATOR_ESCAPE.len() {
                    chars.next();
                }
                out.push('\u{1}');
            }
            Some(term @ ('\r' | '\n')) => {
                chars.next();
                if term == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                while matches!(chars.peek(), Some(' ' | '\t')) {
                    chars.next();
                }
            }
            // Unknown escape: keep both characters.
            Some(_) => out.push('\\'),
        }
    }
    out
}
