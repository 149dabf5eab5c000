//! Server-side filesystem operations backing the control service.
//!
//! Every path arriving over the control channel is resolved against the
//! server's root directory (the invoking user's home) before landing here;
//! these functions operate on the resolved absolute paths.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use filetime::FileTime;

use ferry_core::config::CHUNK_SIZE;

/// Create `path` and any missing parents; succeeds if it already exists.
pub fn create_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Resolve the destination a transfer should write to.
///
/// One rule: if `dest` names an existing directory, the source's basename is
/// appended; otherwise `dest` is taken as a file path, and a missing parent
/// is either created (`create_parents`) or rejected.
pub fn validate_path(dest: &Path, src: &str, create_parents: bool) -> Result<String, String> {
    let src_name = Path::new(src)
        .file_name()
        .ok_or_else(|| format!("{src}: source has no file name"))?;

    if dest.is_dir() {
        return Ok(dest.join(src_name).to_string_lossy().into_owned());
    }

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            if create_parents {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("{}: {e}", parent.display()))?;
            } else {
                return Err(format!("{}: No such file or directory", dest.display()));
            }
        }
    }

    Ok(dest.to_string_lossy().into_owned())
}

/// Size of `path` in bytes. A missing file is created empty (and reported as
/// 0) so that every later open on the path can proceed.
pub fn probe_file(path: &Path) -> io::Result<u64> {
    if !path.is_file() {
        OpenOptions::new().write(true).create(true).open(path)?;
        return Ok(0);
    }
    Ok(fs::metadata(path)?.len())
}

/// Truncate `path` to zero length, creating it if needed.
pub fn overwrite_file(path: &Path) -> io::Result<()> {
    File::create(path)?;
    Ok(())
}

/// Number of whole chunks on disk: `floor(size / CHUNK_SIZE)`.
pub fn block_count(path: &Path) -> io::Result<u64> {
    Ok(fs::metadata(path)?.len() / CHUNK_SIZE as u64)
}

/// Apply the source's permission bits and timestamps to a completed
/// transfer.
pub fn apply_status(
    path: &Path,
    mode: u32,
    mtime: FileTime,
    atime: FileTime,
) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    filetime::set_file_times(path, atime, mtime)
}
