use super::record::Record;
use serde::Serialize;

/// Change observed in the watched tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A line was appended to a reflog
    Appended(Record),
    /// A reflog (or a directory of them) disappeared
    Removed { reference: String },
}

impl Event {
    /// Reference the event belongs to.
    pub fn reference(&self) -> &str {
        match self {
            Event::Appended(record) => &record.reference,
            Event::Removed { reference } => reference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_reference() {
        let event = Event::Removed {
            reference: "refs/heads/topic".to_string(),
        };
        assert_eq!(event.reference(), "refs/heads/topic");
    }

    #[test]
    fn test_serialized_tag() {
        let event = Event::Removed {
            reference: "refs/stash".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"removed","reference":"refs/stash"}"#);
    }
}
