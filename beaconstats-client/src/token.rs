//! Session token persistence
//!
//! The stats server hands out an opaque token on connect. It is kept in a
//! single file so a restarted client resumes the same listing instead of
//! registering a new node.

use beaconstats_core::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// File holding the raw token string
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored token verbatim, minus a trailing line ending left by
    /// an editor. A missing or empty file means no token.
    pub fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content
                    .strip_suffix('\n')
                    .map(|t| t.strip_suffix('\r').unwrap_or(t))
                    .unwrap_or(content.as_str());
                if token.is_empty() {
                    Ok(None)
                } else {
                    debug!(path = ?self.path, "Loaded session token");
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `token`, creating the data folder if needed
    pub fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        info!(path = ?self.path, "Session token saved");
        Ok(())
    }

    /// Delete the stored token. Returns whether there was one.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// The current session token, shared by the session loops
#[derive(Debug)]
pub struct SessionToken {
    store: TokenStore,
    current: RwLock<Option<String>>,
}

impl SessionToken {
    /// Read the persisted token once
    pub fn load(store: TokenStore) -> Result<Self> {
        let current = store.load()?;
        if current.is_none() {
            info!(path = ?store.path(), "No session token stored, registering as a new node");
        }
        Ok(Self {
            store,
            current: RwLock::new(current),
        })
    }

    pub async fn get(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    /// Adopt the token issued by the server.
    /// The file is rewritten only when the value changes; returns whether it did.
    pub async fn update(&self, token: String) -> Result<bool> {
        let mut current = self.current.write().await;
        if current.as_deref() == Some(token.as_str()) {
            return Ok(false);
        }

        self.store.save(&token)?;
        *current = Some(token);
        Ok(true)
    }
}
