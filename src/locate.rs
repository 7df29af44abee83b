//! Repository discovery.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const GIT_DIR_NAME: &str = ".git";
const LOGS_DIR_NAME: &str = "logs";

/// Find the `.git` directory of the repository containing `start`.
///
/// Walks up from `start` until a directory holding a `.git` entry is found.
pub fn locate_git_dir(start: &Path) -> Result<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(GIT_DIR_NAME);
        match fs::metadata(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", candidate.display()))
            }
        }

        match dir.parent() {
            Some(parent) => dir = parent,
            None => bail!("not in a git directory: {}", start.display()),
        }
    }
}

/// Directory holding the reflogs of a repository.
pub fn logs_dir(git_dir: &Path) -> PathBuf {
    git_dir.join(LOGS_DIR_NAME)
}
