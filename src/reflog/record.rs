use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Identity recorded for the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// One parsed reflog line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Log path relative to the watched root, e.g. `refs/heads/main`
    pub reference: String,
    /// Object id the reference pointed to before the update
    pub old_state: String,
    /// Object id the reference points to after the update
    pub new_state: String,
    pub author: Author,
    /// Instant of the update, expressed in the author's timezone
    pub timestamp: DateTime<FixedOffset>,
    /// Command that performed the update (`commit`, `checkout`, `reset`, ...)
    pub action: String,
    /// Parenthesized qualifier of the action, e.g. `initial` or `amend`
    pub modifier: Option<String>,
    pub message: String,
}

impl Record {
    /// Action with its modifier, as git writes it (`commit (amend)`).
    pub fn qualified_action(&self) -> String {
        match &self.modifier {
            Some(modifier) => format!("{} ({})", self.action, modifier),
            None => self.action.clone(),
        }
    }
}
