//! Reflog watcher: turns directory notifications into reflog events.

use super::directory::{
    DirectoryWatcher, Notification, NotificationResult, NotifyDirectoryWatcher, Operation,
    WatchError,
};
use crate::reflog::{parse_record, reference_for, Event, TailTracker};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{
    sync_channel, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What to do with a reflog line that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseErrorPolicy {
    /// Stop emitting the rest of the lines read with the malformed one
    #[default]
    FailFast,
    /// Log the malformed line and keep going
    Skip,
}

/// How events are handed to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Every event waits until the consumer takes it, throttling detection
    /// to the consumer's pace
    #[default]
    Blocking,
    /// Queue up to `capacity` events and drop new ones while the queue is full
    DropWhenFull { capacity: usize },
}

/// Configuration for a [`Watcher`].
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub parse_errors: ParseErrorPolicy,
    pub delivery: Delivery,
    /// How often the loop wakes up to check for cancellation
    pub poll_interval: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            parse_errors: ParseErrorPolicy::default(),
            delivery: Delivery::default(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Lifecycle of a [`Watcher`].
///
/// Construction is synchronous, so `Initializing` only exists while
/// [`Watcher::new`] runs; [`Watcher::state`] reports `Running` or `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Initializing,
    Running,
    Closed,
}

/// Cooperative cancellation for the processing loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the loop to stop; it notices at its next iteration.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receiving side of the event output.
///
/// Iterating blocks until the next event and ends once the watcher has shut
/// down.
pub struct EventStream {
    rx: Receiver<Event>,
}

impl EventStream {
    /// Next event, or `None` once the watcher has shut down.
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.recv()
    }
}

/// Watches a tree of reflogs and reports every line appended to them.
///
/// Construction walks the tree, registers every directory and records where
/// each log currently ends; nothing that exists at that point is reported.
/// A background thread then owns all per-file state and processes
/// notifications strictly in the order they arrive.
pub struct Watcher {
    root: PathBuf,
    directories: Arc<dyn DirectoryWatcher>,
    shutdown: ShutdownHandle,
    events: Option<EventStream>,
    worker: Option<JoinHandle<()>>,
    state: WatcherState,
}

impl Watcher {
    /// Watch `root` using the platform's filesystem notifications.
    pub fn new(root: &Path, options: WatcherOptions) -> Result<Self> {
        let directories =
            NotifyDirectoryWatcher::new().context("Failed to create filesystem watcher")?;
        Self::with_directory_watcher(root, options, Arc::new(directories))
    }

    /// Watch `root` with a custom notification source.
    pub fn with_directory_watcher(
        root: &Path,
        options: WatcherOptions,
        directories: Arc<dyn DirectoryWatcher>,
    ) -> Result<Self> {
        let mut watcher = Self {
            root: fs::canonicalize(root)
                .with_context(|| format!("Failed to resolve {}", root.display()))?,
            directories,
            shutdown: ShutdownHandle::default(),
            events: None,
            worker: None,
            state: WatcherState::Initializing,
        };

        let notifications = watcher.directories.subscribe()?;
        let (tx, rx) = match options.delivery {
            Delivery::Blocking => sync_channel(0),
            Delivery::DropWhenFull { capacity } => sync_channel(capacity.max(1)),
        };

        let mut event_loop = EventLoop {
            root: watcher.root.clone(),
            tracker: TailTracker::new(),
            directories: Arc::clone(&watcher.directories),
            notifications,
            events: tx,
            shutdown: watcher.shutdown.clone(),
            options,
        };

        event_loop.baseline(&watcher.root)?;
        info!(
            "Watching {} ({} logs)",
            watcher.root.display(),
            event_loop.tracker.len()
        );

        let worker = thread::Builder::new()
            .name("reflog-watch".to_string())
            .spawn(move || event_loop.run())
            .context("Failed to start watch loop")?;

        watcher.events = Some(EventStream { rx });
        watcher.worker = Some(worker);
        watcher.state = WatcherState::Running;
        Ok(watcher)
    }

    /// Root the references are relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take the event output. Returns `None` after the first call.
    pub fn events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn state(&self) -> WatcherState {
        let finished = self.worker.as_ref().map_or(true, JoinHandle::is_finished);
        if self.state == WatcherState::Running && (finished || self.shutdown.is_cancelled()) {
            WatcherState::Closed
        } else {
            self.state
        }
    }

    /// Stop watching.
    ///
    /// The OS watch handle is released before returning. The loop thread then
    /// exits and drops the event output, which ends any iteration over the
    /// [`EventStream`].
    pub fn close(mut self) -> Result<()> {
        self.state = WatcherState::Closed;
        self.shutdown.cancel();
        match self.directories.close() {
            // The loop already shut down on its own
            Ok(()) | Err(WatchError::Closed) => Ok(()),
            Err(e) => Err(e).context("Failed to close filesystem watcher"),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
        match self.directories.close() {
            Ok(()) | Err(WatchError::Closed) => {}
            Err(e) => warn!("Failed to close filesystem watcher: {}", e),
        }
    }
}

/// State owned by the processing thread.
struct EventLoop {
    root: PathBuf,
    tracker: TailTracker,
    directories: Arc<dyn DirectoryWatcher>,
    notifications: Receiver<NotificationResult>,
    events: SyncSender<Event>,
    shutdown: ShutdownHandle,
    options: WatcherOptions,
}

/// Directory entries sorted by name, with whether each one is a directory.
fn sorted_entries(dir: &Path) -> Result<Vec<(PathBuf, bool)>> {
    let mut entries = Vec::new();
    let listing = fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in listing {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
        entries.push((entry.path(), file_type.is_dir()));
    }
    entries.sort();
    Ok(entries)
}

impl EventLoop {
    /// Register every directory under `dir` and record where each log ends.
    fn baseline(&mut self, dir: &Path) -> Result<()> {
        self.directories
            .register(dir)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        for (path, is_dir) in sorted_entries(dir)? {
            if is_dir {
                self.baseline(&path)?;
            } else {
                self.tracker.ensure_baseline(&path)?;
            }
        }
        Ok(())
    }

    fn run(mut self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.notifications.recv_timeout(self.options.poll_interval) {
                Ok(Ok(notification)) => {
                    if self.handle(notification).is_break() {
                        break;
                    }
                }
                Ok(Err(e)) => error!("{}", e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        match self.directories.close() {
            Ok(()) | Err(WatchError::Closed) => {}
            Err(e) => warn!("Failed to close filesystem watcher: {}", e),
        }
        debug!("Watch loop for {} stopped", self.root.display());
        // Dropping `self.events` here ends the consumer's stream.
    }

    fn handle(&mut self, notification: Notification) -> ControlFlow<()> {
        let Notification { path, operation } = notification;
        debug!("{} operation on {}", operation, path.display());

        match operation {
            Operation::Create => {
                let metadata = match fs::metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!("Failed to stat {}: {}", path.display(), e);
                        return ControlFlow::Continue(());
                    }
                };
                // New files are read on their first write
                if !metadata.is_dir() {
                    return ControlFlow::Continue(());
                }
                self.add_dir(&path)
            }
            Operation::Write => self.read_new_lines(&path),
            Operation::Remove => match reference_for(&self.root, &path) {
                Ok(reference) => self.emit(Event::Removed { reference }),
                Err(e) => {
                    warn!("{:#}", e);
                    ControlFlow::Continue(())
                }
            },
        }
    }

    /// Start watching a directory that appeared after startup.
    ///
    /// Its files may have been written before the registration took effect,
    /// so every one of them is read in full.
    fn add_dir(&mut self, dir: &Path) -> ControlFlow<()> {
        if let Err(e) = self.directories.register(dir) {
            warn!("Failed to watch {}: {}", dir.display(), e);
        }

        let entries = match sorted_entries(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{:#}", e);
                return ControlFlow::Continue(());
            }
        };

        for (path, is_dir) in entries {
            let flow = if is_dir {
                self.add_dir(&path)
            } else {
                self.read_new_lines(&path)
            };
            if flow.is_break() {
                return flow;
            }
        }
        ControlFlow::Continue(())
    }

    fn read_new_lines(&mut self, path: &Path) -> ControlFlow<()> {
        let lines = match self.tracker.tail(path) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("{:#}", e);
                return ControlFlow::Continue(());
            }
        };
        if lines.is_empty() {
            return ControlFlow::Continue(());
        }

        let reference = match reference_for(&self.root, path) {
            Ok(reference) => reference,
            Err(e) => {
                warn!("{:#}", e);
                return ControlFlow::Continue(());
            }
        };

        for line in lines {
            match parse_record(&reference, &line) {
                Ok(record) => {
                    if self.emit(Event::Appended(record)).is_break() {
                        return ControlFlow::Break(());
                    }
                }
                Err(e) => match self.options.parse_errors {
                    ParseErrorPolicy::FailFast => {
                        error!("Malformed line in {}: {} ({:?})", reference, e, line);
                        return ControlFlow::Continue(());
                    }
                    ParseErrorPolicy::Skip => {
                        warn!("Skipping malformed line in {}: {} ({:?})", reference, e, line);
                    }
                },
            }
        }
        ControlFlow::Continue(())
    }

    /// Hand one event to the consumer. Breaks when the loop should stop.
    fn emit(&self, event: Event) -> ControlFlow<()> {
        if self.shutdown.is_cancelled() {
            return ControlFlow::Break(());
        }

        match self.options.delivery {
            Delivery::Blocking => {
                if self.events.send(event).is_err() {
                    debug!("Event consumer went away");
                    return ControlFlow::Break(());
                }
            }
            Delivery::DropWhenFull { .. } => match self.events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!("Event queue full, dropping event for {}", event.reference());
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Event consumer went away");
                    return ControlFlow::Break(());
                }
            },
        }
        ControlFlow::Continue(())
    }
}
