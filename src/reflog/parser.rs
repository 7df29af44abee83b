//! Reflog line parser.
//!
//! Git writes one line per reference update:
//!
//! ```text
//! <old> <new> <name> <<email>> <unix-seconds> <+hhmm>\t<action>[ (<modifier>)]: <message>
//! ```

use super::record::{Author, Record};
use chrono::{DateTime, FixedOffset, TimeZone};
use thiserror::Error;

/// Why a reflog line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of line: missing {0:?}")]
    MissingDelimiter(char),
    #[error("unexpected end of line after author email")]
    Truncated,
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("invalid timezone offset {0:?}")]
    InvalidOffset(String),
}

/// Forward-only reader over the fields of one line.
struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Self {
        Self { rest: line }
    }

    /// Text up to `delimiter`; the delimiter itself is consumed.
    fn until(&mut self, delimiter: char) -> Result<&'a str, ParseError> {
        let end = self
            .rest
            .find(delimiter)
            .ok_or(ParseError::MissingDelimiter(delimiter))?;
        let field = &self.rest[..end];
        self.rest = &self.rest[end + delimiter.len_utf8()..];
        Ok(field)
    }

    fn skip_char(&mut self) -> Result<(), ParseError> {
        let mut chars = self.rest.chars();
        chars.next().ok_or(ParseError::Truncated)?;
        self.rest = chars.as_str();
        Ok(())
    }

    /// Remainder of the line, stopping at a newline if one is present.
    fn remainder(self) -> &'a str {
        match self.rest.find('\n') {
            Some(end) => &self.rest[..end],
            None => self.rest,
        }
    }
}

/// Parse a `+hhmm` / `-hhmm` offset.
fn parse_offset(raw: &str) -> Result<FixedOffset, ParseError> {
    let invalid = || ParseError::InvalidOffset(raw.to_string());

    let (sign, digits) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(invalid()),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Split `checkout (branch)` into the action and its modifier.
fn split_action(raw: &str) -> (String, Option<String>) {
    let Some((action, qualifier)) = raw.split_once(' ') else {
        return (raw.to_string(), None);
    };

    let modifier = match (qualifier.find('('), qualifier.rfind(')')) {
        (Some(open), Some(close)) if open < close => &qualifier[open + 1..close],
        _ => qualifier.trim(),
    };

    (action.to_string(), Some(modifier.to_string()))
}

/// Parse one reflog line of `reference` into a [`Record`].
///
/// The timestamp keeps the instant written by git and only uses the offset to
/// pick the timezone it is displayed in.
pub fn parse_record(reference: &str, line: &str) -> Result<Record, ParseError> {
    let mut fields = Fields::new(line);

    let old_state = fields.until(' ')?;
    let new_state = fields.until(' ')?;

    let name = fields.until('<')?;
    let name = name.strip_suffix(' ').unwrap_or(name);
    let email = fields.until('>')?;
    fields.skip_char()?;

    let seconds = fields.until(' ')?;
    let seconds: i64 = seconds
        .parse()
        .map_err(|_| ParseError::InvalidTimestamp(seconds.to_string()))?;

    let offset = parse_offset(fields.until('\t')?)?;
    let timestamp: DateTime<FixedOffset> = offset
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| ParseError::InvalidTimestamp(seconds.to_string()))?;

    let (action, modifier) = split_action(fields.until(':')?);

    let message = fields.remainder();
    let mut chars = message.chars();
    chars.next();
    let message = chars.as_str();

    Ok(Record {
        reference: reference.to_string(),
        old_state: old_state.to_string(),
        new_state: new_state.to_string(),
        author: Author {
            name: name.to_string(),
            email: email.to_string(),
        },
        timestamp,
        action,
        modifier,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const COMMIT: &str =
        "abc123 def456 Jane Doe <jane@example.com> 1700000000 +0200\tcommit: my message";

    #[test]
    fn test_parse_commit() {
        let record = parse_record("refs/heads/main", COMMIT).unwrap();

        assert_eq!(record.reference, "refs/heads/main");
        assert_eq!(record.old_state, "abc123");
        assert_eq!(record.new_state, "def456");
        assert_eq!(record.author.name, "Jane Doe");
        assert_eq!(record.author.email, "jane@example.com");
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(record.timestamp.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(record.action, "commit");
        assert_eq!(record.modifier, None);
        assert_eq!(record.message, "my message");
    }

    #[test]
    fn test_timestamp_is_not_shifted_by_offset() {
        let record = parse_record("HEAD", COMMIT).unwrap();
        let utc = record.timestamp.with_timezone(&Utc);
        assert_eq!(utc.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(record.timestamp.to_rfc3339(), "2023-11-15T00:13:20+02:00");
    }

    #[test]
    fn test_parse_checkout_with_modifier() {
        let line = "abc123 def456 Jane Doe <jane@example.com> 1700000000 +0200\tcheckout (branch): switching";
        let record = parse_record("HEAD", line).unwrap();
        assert_eq!(record.action, "checkout");
        assert_eq!(record.modifier.as_deref(), Some("branch"));
        assert_eq!(record.message, "switching");
    }

    #[test]
    fn test_parse_initial_commit() {
        let line = "0000000000000000000000000000000000000000 3f786850e387550fdab836ed7e6dc881de23001b Jane Doe <jane@example.com> 1700000000 -0530\tcommit (initial): Initial commit";
        let record = parse_record("HEAD", line).unwrap();
        assert_eq!(record.old_state, "0".repeat(40));
        assert_eq!(record.modifier.as_deref(), Some("initial"));
        assert_eq!(record.message, "Initial commit");
        assert_eq!(
            record.timestamp.offset().local_minus_utc(),
            -(5 * 3600 + 30 * 60)
        );
    }

    #[test]
    fn test_message_keeps_later_colons() {
        let line = "a b Jane <j@x> 1700000000 +0000\tcheckout: moving from main to fix: the bug";
        let record = parse_record("HEAD", line).unwrap();
        assert_eq!(record.action, "checkout");
        assert_eq!(record.message, "moving from main to fix: the bug");
    }

    #[test]
    fn test_empty_message() {
        let line = "a b Jane <j@x> 1700000000 +0000\tbranch:";
        let record = parse_record("refs/heads/topic", line).unwrap();
        assert_eq!(record.action, "branch");
        assert_eq!(record.message, "");
    }

    #[test]
    fn test_trailing_newline_is_not_part_of_message() {
        let line = "a b Jane <j@x> 1700000000 +0000\treset: moving to HEAD~1\n";
        let record = parse_record("HEAD", line).unwrap();
        assert_eq!(record.message, "moving to HEAD~1");
    }

    #[test]
    fn test_author_name_with_spaces_and_unicode() {
        let line = "a b Zoë van der Berg <zoe@example.org> 1700000000 +0100\tcommit: x";
        let record = parse_record("HEAD", line).unwrap();
        assert_eq!(record.author.name, "Zoë van der Berg");
        assert_eq!(record.author.email, "zoe@example.org");
    }

    #[test]
    fn test_multi_word_action_takes_parenthesized_modifier() {
        let line = "a b Jane <j@x> 1700000000 +0000\tpull --rebase (finish): returning to refs/heads/main";
        let record = parse_record("HEAD", line).unwrap();
        assert_eq!(record.action, "pull");
        assert_eq!(record.modifier.as_deref(), Some("finish"));
    }

    #[test]
    fn test_missing_delimiters() {
        assert_eq!(
            parse_record("HEAD", "abc123"),
            Err(ParseError::MissingDelimiter(' '))
        );
        assert_eq!(
            parse_record("HEAD", "a b Jane jane@example.com"),
            Err(ParseError::MissingDelimiter('<'))
        );
        assert_eq!(
            parse_record("HEAD", "a b Jane <jane@example.com"),
            Err(ParseError::MissingDelimiter('>'))
        );
        assert_eq!(
            parse_record("HEAD", "a b Jane <j@x>"),
            Err(ParseError::Truncated)
        );
        assert_eq!(
            parse_record("HEAD", "a b Jane <j@x> 1700000000 +0000 commit: x"),
            Err(ParseError::MissingDelimiter('\t'))
        );
        assert_eq!(
            parse_record("HEAD", "a b Jane <j@x> 1700000000 +0000\tcommit"),
            Err(ParseError::MissingDelimiter(':'))
        );
    }

    #[test]
    fn test_invalid_timestamp() {
        assert_eq!(
            parse_record("HEAD", "a b Jane <j@x> soon +0000\tcommit: x"),
            Err(ParseError::InvalidTimestamp("soon".to_string()))
        );
    }

    #[test]
    fn test_invalid_offset() {
        for offset in ["0200", "+02", "+02:00", "+0275", "UTC"] {
            let line = format!("a b Jane <j@x> 1700000000 {}\tcommit: x", offset);
            assert_eq!(
                parse_record("HEAD", &line),
                Err(ParseError::InvalidOffset(offset.to_string())),
                "offset {offset}"
            );
        }
    }
}
