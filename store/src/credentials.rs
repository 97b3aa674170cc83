//! Durable storage for the platform auth token.
//!
//! Successful sync responses may rotate the token, so it is rewritten in
//! place via a temp file + rename; a crash mid-write must never leave a
//! truncated token behind. On Unix the file is kept owner-only.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

use waymark_types::AuthToken;

/// The on-disk auth token, one token per file.
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored token. Returns `None` when no token has been saved
    /// yet or the file holds nothing usable.
    pub fn load(&self) -> Result<Option<AuthToken>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read token file {}", self.path.display())
                });
            }
        };
        Ok(AuthToken::new(contents.trim()).ok())
    }

    /// Atomically replace the stored token.
    pub fn save(&self, token: &AuthToken) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;

        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))
                .context("Failed to set token file permissions")?;
        }

        tmp.write_all(token.as_str().as_bytes())
            .context("Failed to write token")?;
        tmp.as_file().sync_all().context("Failed to sync token")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to persist token file {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Auth token persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("token"));
        assert!(file.load().expect("load").is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("token"));

        let token = AuthToken::new("eyJ0eXAiOiJKV1Qi").unwrap();
        file.save(&token).expect("save");
        assert_eq!(file.load().expect("load"), Some(token));
    }

    #[test]
    fn save_replaces_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("token"));

        file.save(&AuthToken::new("old").unwrap()).expect("save old");
        file.save(&AuthToken::new("new").unwrap()).expect("save new");
        assert_eq!(
            file.load().expect("load").unwrap().as_str(),
            "new"
        );
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("creds").join("token"));
        file.save(&AuthToken::new("t").unwrap()).expect("save");
        assert!(file.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("token"));
        file.save(&AuthToken::new("t").unwrap()).expect("save");

        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn whitespace_only_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();
        assert!(TokenFile::new(path).load().expect("load").is_none());
    }
}
