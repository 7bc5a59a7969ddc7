//! Cached bearer credential
//!
//! The token lives in memory and, when a path is configured, in a plain
//! file so a later run can reuse it. It is cleared (file included) as soon as
//! the service answers 401.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    token: Option<String>,
    path: Option<PathBuf>,
}

impl CredentialStore {
    /// Memory-only store
    pub fn in_memory(token: Option<String>) -> Self {
        Self { token, path: None }
    }

    /// File-backed store; a missing or empty file means "not logged in"
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let token = match fs::read_to_string(&path) {
            Ok(content) => Some(content.trim().to_string()).filter(|t| !t.is_empty()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };
        debug!(path = %path.display(), cached = token.is_some(), "loaded credential cache");
        Ok(Self {
            token,
            path: Some(path),
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Replace the token without touching the file (env override)
    pub fn set_in_memory(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Store a fresh token and persist it
    pub fn store(&mut self, token: String) -> io::Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &token)?;
            info!(path = %path.display(), "credential cached");
        }
        self.token = Some(token);
        Ok(())
    }

    /// Forget the token; failures to delete the file are logged, not returned
    pub fn clear(&mut self) {
        self.token = None;
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => info!(path = %path.display(), "credential cache cleared"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove credential cache"),
            }
        }
    }

    /// `Authorization` header value, when logged in
    pub fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}
