use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copies the contents of `src` into `dest`.
///
/// Directories are created as needed and regular files are overwritten;
/// entries already in `dest` that have no counterpart in `src` are left
/// alone. Anything that is neither a directory nor a regular file (symlinks,
/// sockets) is skipped.
pub fn copy_dir(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copies a single file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)?;
    Ok(())
}
