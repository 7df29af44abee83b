//! Live reflog monitoring for git repositories.
//!
//! A [`watcher::Watcher`] walks a repository's `logs/` tree, remembers where
//! every reflog currently ends, and then streams one [`reflog::Event`] per
//! line appended afterwards.

pub mod config;
pub mod locate;
pub mod output;
pub mod reflog;
pub mod watcher;
