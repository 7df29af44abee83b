//! Per-directory filesystem notifications.
//!
//! Watches are never recursive: every directory has to be registered on its
//! own, including directories that appear after watching started.

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Kind of change reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Write,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "CREATE",
            Operation::Write => "WRITE",
            Operation::Remove => "REMOVE",
        };
        f.write_str(name)
    }
}

/// A change to one path inside a registered directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub path: PathBuf,
    pub operation: Operation,
}

impl Notification {
    pub fn new(path: impl Into<PathBuf>, operation: Operation) -> Self {
        Self {
            path: path.into(),
            operation,
        }
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("directory watcher is closed")]
    Closed,
    #[error("notifications are already subscribed")]
    AlreadySubscribed,
    #[error("filesystem watcher error: {0}")]
    Backend(#[from] notify::Error),
}

pub type NotificationResult = Result<Notification, WatchError>;

/// Source of filesystem notifications for explicitly registered directories.
///
/// Implementations are shared between the processing loop, which registers
/// directories as they appear, and the owner, which may close the watcher at
/// any time. Closing ends the notification stream returned by `subscribe`.
pub trait DirectoryWatcher: Send + Sync {
    /// Add `dir` to the watch set.
    fn register(&self, dir: &Path) -> Result<(), WatchError>;

    /// Take the notification stream. Only one subscriber is supported.
    fn subscribe(&self) -> Result<Receiver<NotificationResult>, WatchError>;

    /// Release the underlying OS resources. Fails with [`WatchError::Closed`]
    /// when called again.
    fn close(&self) -> Result<(), WatchError>;
}

/// Translate a `notify` event into notifications, dropping kinds that carry
/// no content change.
pub fn notifications_from(event: &notify::Event) -> Vec<Notification> {
    let all = |operation: Operation| -> Vec<Notification> {
        event
            .paths
            .iter()
            .map(|path| Notification::new(path.clone(), operation))
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => all(Operation::Create),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            all(Operation::Write)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(Operation::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(Operation::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                Notification::new(from.clone(), Operation::Remove),
                Notification::new(to.clone(), Operation::Create),
            ],
            _ => Vec::new(),
        },
        // Backends that cannot pair renames report each side separately
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                let operation = if path.exists() {
                    Operation::Create
                } else {
                    Operation::Remove
                };
                Notification::new(path.clone(), operation)
            })
            .collect(),
        EventKind::Remove(_) => all(Operation::Remove),
        _ => Vec::new(),
    }
}

/// [`DirectoryWatcher`] backed by the platform watcher of the `notify` crate.
pub struct NotifyDirectoryWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    notifications: Mutex<Option<Receiver<NotificationResult>>>,
}

impl NotifyDirectoryWatcher {
    /// Create the OS watch handle. Nothing is watched until `register`.
    pub fn new() -> Result<Self, WatchError> {
        let (tx, rx) = channel::<NotificationResult>();

        let watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for notification in notifications_from(&event) {
                        let _ = tx.send(Ok(notification));
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(WatchError::Backend(e)));
                }
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            notifications: Mutex::new(Some(rx)),
        })
    }
}

impl DirectoryWatcher for NotifyDirectoryWatcher {
    fn register(&self, dir: &Path) -> Result<(), WatchError> {
        let mut guard = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        let watcher = guard.as_mut().ok_or(WatchError::Closed)?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn subscribe(&self) -> Result<Receiver<NotificationResult>, WatchError> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(WatchError::AlreadySubscribed)
    }

    fn close(&self) -> Result<(), WatchError> {
        // Dropping the watcher stops the backend and its event handler, which
        // disconnects the notification stream.
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(WatchError::Closed)?;
        drop(watcher);
        Ok(())
    }
}
