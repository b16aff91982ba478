// Copyright 2025 Pavel Roskin
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Parsing terminfo source, as printed by `infocmp`

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

/// Escapes replaced right after the caret notation, in this order
const CONTROL_ESCAPES: [(&str, &str); 8] = [
    ("\\E", "\x1b"),
    ("\\e", "\x1b"),
    ("\\r", "\r"),
    ("\\n", "\n"),
    ("\\t", "\t"),
    ("\\b", "\x08"),
    ("\\f", "\x0c"),
    ("\\s", " "),
];

/// Escapes replaced after octal escapes; `\0` is 0200, not NUL
const LITERAL_ESCAPES: [(&str, &str); 4] = [
    ("\\^", "^"),
    ("\\,", ","),
    ("\\:", ":"),
    ("\\0", "\u{80}"),
];

/// Errors reported when parsing terminfo source, each with the offending field
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A caret is left after resolving the caret notation
    #[error("Unresolved caret in {0:?}")]
    UnresolvedCaret(String),
    /// A backslash is left after resolving all escapes
    #[error("Unresolved backslash in {0:?}")]
    UnresolvedBackslash(String),
    /// A character cannot be represented as a single byte
    #[error("Character outside of Latin-1 in {0:?}")]
    NotLatin1(String),
}

/// Parsed terminfo entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Terminfo {
    /// Terminal name, aliases and description
    pub names: Vec<String>,
    pub booleans: BTreeSet<String>,
    pub numbers: BTreeMap<String, i32>,
    pub strings: BTreeMap<String, Vec<u8>>,
}

impl Terminfo {
    /// Parse terminfo source without excluding any capabilities
    pub fn parse(source: &str) -> Result<Self, Error> {
        parse(source, &[])
    }

    /// Primary terminal name
    pub fn name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// String capability, `None` if the terminal does not have it
    pub fn get_string(&self, name: &str) -> Option<&[u8]> {
        self.strings.get(name).map(Vec::as_slice)
    }

    pub fn get_number(&self, name: &str) -> Option<i32> {
        self.numbers.get(name).copied()
    }

    pub fn get_flag(&self, name: &str) -> bool {
        self.booleans.contains(name)
    }
}

/// Parse one terminfo entry from its source
///
/// Lines starting with `#` are comments. Capabilities listed in `exclude`
/// are skipped. A capability given twice keeps the last value, `name@`
/// cancels it. Numeric fields that are not numbers are skipped. Empty source
/// gives an empty entry.
pub fn parse(source: &str, exclude: &[&str]) -> Result<Terminfo, Error> {
    let joined = source
        .lines()
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ");
    // The final separator leaves an empty field, which is skipped below.
    let joined = joined.trim();
    if joined.is_empty() {
        return Ok(Terminfo::default());
    }

    let mut fields = split_fields(joined).into_iter();
    let names = fields.next().unwrap_or_default().trim();
    let mut terminfo = Terminfo {
        names: names
            .split('|')
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect(),
        ..Terminfo::default()
    };

    for field in fields {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (name, value) = match field.find(['=', '#']) {
            Some(index) => (
                &field[..index],
                Some((field.as_bytes()[index], &field[index + 1..])),
            ),
            None => (field, None),
        };
        let (name, cancelled) = match name.strip_suffix('@') {
            Some(name) if value.is_none() => (name, true),
            _ => (name, false),
        };
        if exclude.contains(&name) {
            trace!(name, "excluded capability skipped");
            continue;
        }

        match value {
            Some((b'=', raw)) => {
                let resolved = resolve_escapes(field, raw)?;
                if terminfo.strings.insert(name.to_owned(), resolved).is_some() {
                    debug!(name, "duplicate capability overwritten");
                }
            }
            Some((_, raw)) => {
                let Some(number) = parse_number(raw) else {
                    debug!(field, "invalid number skipped");
                    continue;
                };
                terminfo.numbers.insert(name.to_owned(), number);
            }
            None if cancelled => {
                trace!(name, "capability cancelled");
                terminfo.booleans.remove(name);
                terminfo.numbers.remove(name);
                terminfo.strings.remove(name);
            }
            None => {
                terminfo.booleans.insert(name.to_owned());
            }
        }
    }

    debug!(
        terminal = terminfo.name(),
        booleans = terminfo.booleans.len(),
        numbers = terminfo.numbers.len(),
        strings = terminfo.strings.len(),
        "parsed terminfo source"
    );
    Ok(terminfo)
}

/// Split on commas followed by whitespace or the end of the source
///
/// A comma after an odd number of backslashes is escaped and stays in the field.
fn split_fields(source: &str) -> Vec<&str> {
    let bytes = source.as_bytes();
    let mut fields = vec![];
    let mut start = 0;
    let mut backslashes: usize = 0;
    for (index, &c) in bytes.iter().enumerate() {
        match c {
            b'\\' => backslashes += 1,
            b',' if backslashes.is_multiple_of(2)
                && bytes
                    .get(index + 1)
                    .is_none_or(u8::is_ascii_whitespace) =>
            {
                fields.push(&source[start..index]);
                start = index + 1;
                backslashes = 0;
            }
            _ => backslashes = 0,
        }
    }
    fields.push(&source[start..]);
    fields
}

/// Numbers are decimal, `0x` hexadecimal or octal with a leading zero
fn parse_number(raw: &str) -> Option<i32> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        i32::from_str_radix(hex, 16).ok()
    } else if raw.len() > 1
        && let Some(octal) = raw.strip_prefix('0')
    {
        i32::from_str_radix(octal, 8).ok()
    } else {
        raw.parse().ok()
    }
}

/// Resolve the escapes of a string capability into bytes
///
/// The order of the substitutions matters, `\\` is collapsed last.
fn resolve_escapes(field: &str, raw: &str) -> Result<Vec<u8>, Error> {
    let value = resolve_carets(&raw.replace("^?", "\x7f"));
    if value.replace("\\^", "").contains('^') {
        return Err(Error::UnresolvedCaret(field.to_owned()));
    }

    let value = CONTROL_ESCAPES
        .iter()
        .fold(value, |value, (escape, byte)| value.replace(escape, byte));
    let value = resolve_octal(&value);
    let value = LITERAL_ESCAPES
        .iter()
        .fold(value, |value, (escape, byte)| value.replace(escape, byte));

    if value.replace("\\\\", "").contains('\\') {
        return Err(Error::UnresolvedBackslash(field.to_owned()));
    }
    let value = value.replace("\\\\", "\\");

    value
        .chars()
        .map(|c| u8::try_from(c).map_err(|_| Error::NotLatin1(field.to_owned())))
        .collect()
}

/// `^X` is the control character for `X`, unless the caret is escaped
fn resolve_carets(value: &str) -> String {
    let mut resolved = String::with_capacity(value.len());
    let mut previous = None;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '^'
            && previous != Some('\\')
            && let Some(next) = chars.next()
        {
            resolved.push(char::from((u32::from(next) & 0x1f) as u8));
            previous = Some(next);
            continue;
        }
        resolved.push(c);
        previous = Some(c);
    }
    resolved
}

/// `\nnn` with three octal digits is the character with that code
fn resolve_octal(value: &str) -> String {
    let mut resolved = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(c) = rest.chars().next() {
        if c == '\\'
            && let Some(digits) = rest.get(1..4)
            && digits.bytes().all(|d| matches!(d, b'0'..=b'7'))
            && let Some(decoded) = char::from_u32(
                digits
                    .bytes()
                    .fold(0, |code, d| code * 8 + u32::from(d - b'0')),
            )
        {
            resolved.push(decoded);
            rest = &rest[4..];
            continue;
        }
        resolved.push(c);
        rest = &rest[c.len_utf8()..];
    }
    resolved
}
