//! Filesystem watching for reflog trees.

pub mod directory;
mod orchestrator;

pub use directory::{
    DirectoryWatcher, Notification, NotificationResult, NotifyDirectoryWatcher, Operation,
    WatchError,
};
pub use orchestrator::{
    Delivery, EventStream, ParseErrorPolicy, ShutdownHandle, Watcher, WatcherOptions,
    WatcherState,
};
