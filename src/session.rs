//! Persisted login session
//!
//! The session is two files in the config directory: `session.json` holds
//! what this CLI knows about the login (account, timestamps, scopes) and
//! `token.json` is the OAuth token cache maintained by `yup-oauth2`. Both are
//! owned by [`SessionStore`], created owner-only and removed together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::config::AppPaths;
use crate::error::{MailError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Primary address of the authorized account
    pub account: String,
    pub created_at: DateTime<Utc>,
    /// Last time the session was used to open the API client
    pub refreshed_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl Session {
    pub fn new(account: impl Into<String>, scopes: &[&str]) -> Self {
        let now = Utc::now();
        Self {
            account: account.into(),
            created_at: now,
            refreshed_at: now,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Reads and writes the session files. No locking: one process at a time.
#[derive(Debug, Clone)]
pub struct SessionStore {
    session_path: PathBuf,
    token_path: PathBuf,
}

impl SessionStore {
    pub fn new(session_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            session_path: session_path.into(),
            token_path: token_path.into(),
        }
    }

    pub fn from_paths(paths: &AppPaths) -> Self {
        Self::new(paths.session_file(), paths.token_file())
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Where the OAuth library keeps access/refresh tokens
    pub fn token_cache_path(&self) -> &Path {
        &self.token_path
    }

    pub fn exists(&self) -> bool {
        self.session_path.exists()
    }

    /// Load the session; `None` means "not logged in"
    pub async fn load(&self) -> Result<Option<Session>> {
        if !self.exists() {
            tracing::debug!("No session file at {:?}", self.session_path);
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&self.session_path).await?;
        let session: Session = serde_json::from_str(&json)?;

        tracing::debug!(
            "Loaded session: account={}, created_at={}",
            session.account,
            session.created_at
        );

        Ok(Some(session))
    }

    /// Load the session or fail with `NotLoggedIn`
    pub async fn require(&self) -> Result<Session> {
        self.load().await?.ok_or(MailError::NotLoggedIn)
    }

    /// Create the directories holding both files, owner-only (0700), before
    /// anything is written into them
    pub async fn prepare_dirs(&self) -> Result<()> {
        for path in [&self.session_path, &self.token_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                private_dir(parent).await?;
            }
        }
        Ok(())
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        self.prepare_dirs().await?;

        let json = serde_json::to_string_pretty(session)?;
        let mut file = create_private(&self.session_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        // Mode only applies on creation; tighten a file left by an older run
        secure_file(&self.session_path).await?;
        tracing::debug!("Saved session to {:?}", self.session_path);
        Ok(())
    }

    /// Bump `refreshed_at` and re-secure the token cache
    pub async fn touch(&self, session: &mut Session) -> Result<()> {
        session.refreshed_at = Utc::now();
        self.save(session).await?;
        if self.token_path.exists() {
            secure_file(&self.token_path).await?;
        }
        Ok(())
    }

    /// Remove session and token cache. Returns whether anything was removed.
    pub async fn delete(&self) -> Result<bool> {
        let mut removed = false;
        for path in [&self.session_path, &self.token_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    tracing::debug!("Removed {:?}", path);
                    removed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// Open for writing, creating the file as 0600 on Unix
async fn create_private(path: &Path) -> Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    Ok(options.open(path).await?)
}

async fn private_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

/// Restrict a credentials file to its owner (0600)
#[cfg(unix)]
pub async fn secure_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows relies on the per-user profile ACLs of the config directory
#[cfg(windows)]
pub async fn secure_file(_path: &Path) -> Result<()> {
    Ok(())
}
