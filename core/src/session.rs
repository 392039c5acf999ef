//! Durable key-value storage for session state.
//!
//! # Design
//! The session is two values, the bearer token and a JSON snapshot of the
//! logged-in user, plus the theme preference under its own key. Whether the
//! operator is authenticated is derived only from the token's presence; the
//! server is the one that rejects stale tokens.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::ApiError;
use crate::types::AuthUser;

pub const TOKEN_KEY: &str = "admin_token";
pub const USER_KEY: &str = "admin_user";
pub const THEME_KEY: &str = "cms-theme";

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ApiError>;
    fn remove(&self, key: &str) -> Result<(), ApiError>;
}

/// In-process store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// JSON file store. The whole map is rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| ApiError::DeserializationError(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(ApiError::Storage(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Write `values` to a sibling temp file and rename it over the store.
    fn flush(&self, values: &HashMap<String, String>) -> Result<(), ApiError> {
        let text = serde_json::to_string_pretty(values)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, text)
            .map_err(|e| ApiError::Storage(format!("{}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            ApiError::Storage(format!(
                "{} -> {}: {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.flush(&next)?;
        *values = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

pub fn token(store: &dyn SessionStore) -> Option<String> {
    store.get(TOKEN_KEY).filter(|t| !t.is_empty())
}

pub fn is_authenticated(store: &dyn SessionStore) -> bool {
    token(store).is_some()
}

/// The stored user snapshot; a corrupt value reads as absent.
pub fn user(store: &dyn SessionStore) -> Option<AuthUser> {
    store
        .get(USER_KEY)
        .and_then(|raw| serde_json::from_str(&raw).ok())
}

pub fn save_login(store: &dyn SessionStore, token: &str, user: &AuthUser) -> Result<(), ApiError> {
    let user =
        serde_json::to_string(user).map_err(|e| ApiError::SerializationError(e.to_string()))?;
    store.set(TOKEN_KEY, token)?;
    store.set(USER_KEY, &user)
}

pub fn clear(store: &dyn SessionStore) -> Result<(), ApiError> {
    store.remove(TOKEN_KEY)?;
    store.remove(USER_KEY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// The stored theme preference; unknown values read as no preference.
pub fn theme(store: &dyn SessionStore) -> Option<Theme> {
    match store.get(THEME_KEY).as_deref() {
        Some("light") => Some(Theme::Light),
        Some("dark") => Some(Theme::Dark),
        _ => None,
    }
}

pub fn save_theme(store: &dyn SessionStore, theme: Theme) -> Result<(), ApiError> {
    store.set(THEME_KEY, theme.as_str())
}
