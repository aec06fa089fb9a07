//! File permission hardening for database files.
//!
//! On Unix the database directory is created `0700` and files are set to `0600`.
//! Elsewhere these are no-ops and hosts should keep databases in app-private storage.

use std::fs::OpenOptions;
use std::io::ErrorKind;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::Error;

/// Whether `path` names an SQLite pseudo-file such as `:memory:`
pub(crate) fn is_special_path(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    path_str.is_empty() || path_str.starts_with(':')
}

/// Pre-create the database file with owner-only permissions before SQLite opens it.
///
/// Returns `true` if this call created the file.
pub fn precreate_secure_database_file<P>(path: P) -> Result<bool, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if is_special_path(path) {
        return Ok(false);
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        set_mode(parent, 0o700)?;
    }

    // `create_new` is O_CREAT | O_EXCL, so two openers cannot both create it
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_file) => {
            set_secure_file_permissions(path)?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Restrict an existing file to its owner. Missing files are ignored.
pub fn set_secure_file_permissions<P>(path: P) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    #[cfg(unix)]
    set_mode(path, 0o600)?;

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), Error> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        Error::FilePermission(format!(
            "Failed to set permissions {:o} on {:?}: {}",
            mode, path, e
        ))
    })
}
