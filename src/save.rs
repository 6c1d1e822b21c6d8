//! Writing the buffer back to disk.
//!
//! Writes are atomic: the text goes to a tempfile next to the target, is
//! fsynced, then renamed over it. The mtime is bumped afterwards so build
//! tools watching the file notice the change.

use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// Where a save should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Overwrite the source file.
    InPlace,
    /// Leave the source alone; write `<stem>_PATCHED_<stamp>.<ext>` beside it.
    PatchedCopy,
}

/// Save `text` for `source` according to `mode`; returns the path written.
pub fn save(source: &Path, text: &str, mode: SaveMode) -> Result<PathBuf, SaveError> {
    let target = match mode {
        SaveMode::InPlace => source.to_path_buf(),
        SaveMode::PatchedCopy => {
            patched_path(source, &Local::now().format("%Y%m%d_%H%M%S").to_string())?
        }
    };
    atomic_write(&target, text.as_bytes())?;
    tracing::info!(path = %target.display(), bytes = text.len(), "buffer saved");
    Ok(target)
}

/// `dir/name.ext` becomes `dir/name_PATCHED_<stamp>.ext`.
pub fn patched_path(source: &Path, stamp: &str) -> Result<PathBuf, SaveError> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| SaveError::NoFileName(source.to_path_buf()))?;
    let name = match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_PATCHED_{stamp}.{ext}"),
        None => format!("{stem}_PATCHED_{stamp}"),
    };
    Ok(source.with_file_name(name))
}

pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), SaveError> {
    // Same directory keeps the rename on one filesystem.
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(SaveError::NoParent(path.to_path_buf())),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    filetime::set_file_mtime(path, filetime::FileTime::now())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn patched_name_keeps_extension() {
        let path = patched_path(Path::new("/work/app.py"), "20250131_140211").unwrap();
        assert_eq!(path, PathBuf::from("/work/app_PATCHED_20250131_140211.py"));

        let bare = patched_path(Path::new("Makefile"), "s").unwrap();
        assert_eq!(bare, PathBuf::from("Makefile_PATCHED_s"));
    }

    #[test]
    fn in_place_save_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.rs");
        fs::write(&file, "old\n").unwrap();

        let written = save(&file, "new\n", SaveMode::InPlace).unwrap();
        assert_eq!(written, file);
        assert_eq!(fs::read_to_string(&file).unwrap(), "new\n");
    }

    #[test]
    fn patched_copy_leaves_source_alone() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.rs");
        fs::write(&file, "old\n").unwrap();

        let written = save(&file, "new\n", SaveMode::PatchedCopy).unwrap();
        assert_ne!(written, file);
        assert!(written
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("main_PATCHED_"));
        assert_eq!(fs::read_to_string(&file).unwrap(), "old\n");
        assert_eq!(fs::read_to_string(&written).unwrap(), "new\n");
    }
}
