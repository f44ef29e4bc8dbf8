//! Enumerating files on a local filesystem.

use std::path::Path;

use tracing::{instrument, warn};
use walkdir::WalkDir;

use super::FileEntry;

/// Lists all regular files below `root` as [FileEntry]s, covering each file
/// as a whole. Entries are ordered by file name, per directory.
///
/// Symlinks are not followed and skipped with a warning, only the contents
/// of regular files end up in the archive.
#[instrument(level = "debug", err)]
pub fn entries_from_path(root: &Path) -> Result<Vec<FileEntry>, walkdir::Error> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry?;
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            warn!(path = ?entry.path(), "skipping symlink");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let size = entry.metadata()?.len();
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.into_path(),
            size,
            range: None,
        });
    }

    Ok(entries)
}
