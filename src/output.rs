//! Console rendering of reflog events.

use crate::reflog::{Event, Record};
use anyhow::Result;
use serde::Deserialize;
use std::io::Write;

const SHORT_HASH_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

fn short(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

fn render_record(record: &Record) -> String {
    format!(
        "{} {}: {}  {}..{}  {} <{}>  {}",
        record.reference,
        record.qualified_action(),
        record.message,
        short(&record.old_state),
        short(&record.new_state),
        record.author.name,
        record.author.email,
        record.timestamp.format("%Y-%m-%d %H:%M:%S %z"),
    )
}

/// Render one event as a single line, without the trailing newline.
pub fn render(event: &Event, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(event)?),
        OutputFormat::Text => Ok(match event {
            Event::Appended(record) => render_record(record),
            Event::Removed { reference } => format!("{} removed", reference),
        }),
    }
}

/// Write every event to `out` until the stream ends.
pub fn print_events(
    events: impl IntoIterator<Item = Event>,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    for event in events {
        writeln!(out, "{}", render(&event, format)?)?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflog::parse_record;

    fn checkout() -> Event {
        let line = "1111111111111111111111111111111111111111 2222222222222222222222222222222222222222 Jane Doe <jane@example.com> 1700000000 +0200\tcheckout (branch): moving from main to topic";
        Event::Appended(parse_record("HEAD", line).unwrap())
    }

    #[test]
    fn test_render_text_record() {
        assert_eq!(
            render(&checkout(), OutputFormat::Text).unwrap(),
            "HEAD checkout (branch): moving from main to topic  1111111..2222222  Jane Doe <jane@example.com>  2023-11-15 00:13:20 +0200"
        );
    }

    #[test]
    fn test_render_text_removed() {
        let event = Event::Removed {
            reference: "refs/heads/topic".to_string(),
        };
        assert_eq!(
            render(&event, OutputFormat::Text).unwrap(),
            "refs/heads/topic removed"
        );
    }

    #[test]
    fn test_render_json_record() {
        let json: serde_json::Value =
            serde_json::from_str(&render(&checkout(), OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["type"], "appended");
        assert_eq!(json["reference"], "HEAD");
        assert_eq!(json["action"], "checkout");
        assert_eq!(json["modifier"], "branch");
    }

    #[test]
    fn test_short_hash_of_short_value() {
        assert_eq!(short("abc"), "abc");
    }

    #[test]
    fn test_print_events_writes_one_line_each() {
        let events = vec![
            checkout(),
            Event::Removed {
                reference: "refs/stash".to_string(),
            },
        ];
        let mut out = Vec::new();
        print_events(events, OutputFormat::Text, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "refs/stash removed");
    }
}
