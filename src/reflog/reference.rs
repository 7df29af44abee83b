use anyhow::{Context, Result};
use std::path::Path;

/// Reference name of `path` relative to the watched `root`.
///
/// Components are always joined with `/`, matching git's reference names on
/// every platform.
pub fn reference_for(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

    let reference = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(reference)
}
