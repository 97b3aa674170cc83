//! Secure SQLite open helpers.
//!
//! The queue holds a movement trail of the device owner, so the database file
//! and its directory are kept owner-only on Unix (0o600 / 0o700), including
//! the WAL sidecars SQLite creates next to the main file.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Open a SQLite database at `path`, creating the parent directory and the
/// file with owner-only permissions first.
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        tighten_dir_permissions(parent)?;
    }
    create_owner_only(path)?;
    tighten_sidecar_permissions(path);

    Connection::open(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

#[cfg(unix)]
fn tighten_dir_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read directory metadata: {}", path.display()))?;

    // Only tighten directories we own; a shared parent is not ours to chmod.
    let our_uid = unsafe { libc::getuid() };
    if metadata.uid() != our_uid {
        return Ok(());
    }

    if metadata.permissions().mode() & 0o077 != 0 {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set directory permissions: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn tighten_dir_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn create_owner_only(path: &Path) -> Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(false).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let _file = options
        .open(path)
        .with_context(|| format!("Failed to create database file: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set database permissions: {}", path.display()))?;
    }
    Ok(())
}

fn tighten_sidecar_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for suffix in ["-wal", "-shm"] {
            let sidecar = match path.file_name() {
                Some(name) => path.with_file_name(format!("{}{suffix}", name.to_string_lossy())),
                None => continue,
            };
            if sidecar.exists() {
                let _ = std::fs::set_permissions(&sidecar, std::fs::Permissions::from_mode(0o600));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
