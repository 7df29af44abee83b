//! Per-file cursors used to find the lines appended since the last read.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Read every line of a file.
///
/// Reflogs are raw bytes: a line that is not valid UTF-8 is decoded lossily
/// instead of failing the whole read.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(lines)
}

/// Remembers the last line seen in every file.
///
/// Files are re-read in full on each call, so a log that was rewritten rather
/// than appended to is still resynchronized: the new lines are the ones after
/// the last occurrence of the remembered line, or the whole file when that
/// line is gone. A cursor is never dropped, even when its file is removed.
#[derive(Debug, Default)]
pub struct TailTracker {
    last_lines: HashMap<PathBuf, String>,
}

impl TailTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where `path` currently ends without reporting any line.
    pub fn ensure_baseline(&mut self, path: &Path) -> Result<()> {
        let mut lines = read_lines(path)?;
        if let Some(last) = lines.pop() {
            self.last_lines.insert(path.to_path_buf(), last);
        }
        Ok(())
    }

    /// Lines appended to `path` since it was last read, in file order.
    pub fn tail(&mut self, path: &Path) -> Result<Vec<String>> {
        let mut lines = read_lines(path)?;
        let Some(last) = lines.last().cloned() else {
            return Ok(Vec::new());
        };

        let resume = self
            .last_lines
            .get(path)
            .and_then(|previous| lines.iter().rposition(|line| line == previous))
            .map_or(0, |index| index + 1);

        self.last_lines.insert(path.to_path_buf(), last);
        Ok(lines.split_off(resume))
    }

    /// The remembered last line of `path`, if it has been read.
    pub fn last_line(&self, path: &Path) -> Option<&str> {
        self.last_lines.get(path).map(String::as_str)
    }

    /// Number of files with a cursor.
    pub fn len(&self) -> usize {
        self.last_lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_lines.is_empty()
    }
}
