//! Whole-file writes that never leave a half-written target behind.

use anyhow::Context;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `content` via a sibling temp file and a rename.
///
/// An existing file keeps its permission bits, so rewriting an executable
/// script leaves it executable.
pub fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let permissions = fs::metadata(path).ok().map(|m| m.permissions());
    persist(path, content, permissions)
}

/// Like [`write_atomic`], but the result is readable by the owner only.
/// Used for config files, which may hold an API key.
pub fn write_private(path: &Path, content: &str) -> anyhow::Result<()> {
    #[cfg(unix)]
    let permissions = {
        use std::os::unix::fs::PermissionsExt;
        Some(fs::Permissions::from_mode(0o600))
    };
    #[cfg(not(unix))]
    let permissions = None;

    persist(path, content, permissions)
}

fn persist(
    path: &Path,
    content: &str,
    permissions: Option<fs::Permissions>,
) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;

    if let Some(perms) = permissions {
        if let Err(err) = fs::set_permissions(tmp.path(), perms) {
            tracing::debug!(path = %path.display(), "failed to set permissions: {}", err);
        }
    }

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
