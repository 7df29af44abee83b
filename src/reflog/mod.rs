//! Reflog records, line parsing and per-file tail tracking.
//!
//! Each reference has one append-only log at `.git/logs/<reference>`, one
//! line per update of the reference.

mod event;
mod parser;
mod record;
mod reference;
mod tail;

pub use event::Event;
pub use parser::{parse_record, ParseError};
pub use record::{Author, Record};
pub use reference::reference_for;
pub use tail::TailTracker;
