//! Line classification for the hex-dump capture format.
//!
//! ```text
//! # comment                   -> Blank
//! 2023-01-01 10:00:00         -> Timestamp (packet boundary)
//! 0000 aa bb cc dd            -> Data { offset: 0, tokens: [aa, bb, cc, dd] }
//! 0004                        -> Data { offset: 4, tokens: [] }
//! ```
//!
//! Classification is attempted in that order. Anything else is
//! `Unrecognized`; whether that is tolerated is up to the reader.

/// Comment marker, allowed after optional leading whitespace.
pub const COMMENT_MARKER: char = '#';

/// Shape of one capture line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Empty, whitespace only, or a comment.
    Blank,
    /// `<digits>-<digits>-<digits> ` followed by anything.
    Timestamp,
    /// Hex offset followed by zero or more hex byte tokens.
    ///
    /// An offset too large for `u64` saturates, so it can never match an
    /// accumulated length.
    Data { offset: u64, tokens: Vec<&'a str> },
    /// None of the above.
    Unrecognized,
}

/// Classify a line with its line terminator already removed.
pub fn classify(line: &str) -> Line<'_> {
    if is_blank(line) {
        Line::Blank
    } else if is_timestamp(line) {
        Line::Timestamp
    } else if let Some(data) = parse_data(line) {
        data
    } else {
        Line::Unrecognized
    }
}

/// Decode one hex byte token.
pub fn parse_byte(token: &str) -> Option<u8> {
    u8::from_str_radix(token, 16).ok()
}

fn is_blank(line: &str) -> bool {
    let rest = line.trim_start();
    rest.is_empty() || rest.starts_with(COMMENT_MARKER)
}

fn is_timestamp(line: &str) -> bool {
    let mut rest = line;
    for separator in ['-', '-', ' '] {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        match rest[digits..].strip_prefix(separator) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }
    true
}

fn parse_data(line: &str) -> Option<Line<'_>> {
    let digits = line.bytes().take_while(u8::is_ascii_hexdigit).count();
    if digits == 0 {
        return None;
    }
    let (offset_str, rest) = line.split_at(digits);
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if !tokens
        .iter()
        .all(|token| token.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return None;
    }

    let offset = u64::from_str_radix(offset_str, 16).unwrap_or(u64::MAX);
    Some(Line::Data { offset, tokens })
}
