//! Local key-value persistence: tokens, profile, saved photos, and the
//! onboarding flag. Small, unversioned, and best-effort: decode failures
//! are treated as missing data rather than hard errors.
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

pub const KEY_SAVED_PHOTOS: &str = "saved_photos";
pub const KEY_ONBOARDING_SEEN: &str = "onboarding_seen";

/// Trait for abstracting the platform key-value store.
/// Platform-specific implementations should provide this.
pub trait KeyValueStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), Self::Error>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Errors raised by the file-backed store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Flat JSON map persisted to a single file after every mutation.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl JsonFileStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, entries })
    }

    fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    type Error = StorageError;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.entries.insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        if self.entries.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}

/// Metadata for a photo the user captured and saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPhoto {
    pub id: String,
    pub mission_id: u64,
    pub spot_name: String,
    pub image_url: String,
    pub saved_at: DateTime<Utc>,
}

/// Load the saved photo list. Undecodable payloads count as empty.
///
/// # Errors
///
/// Returns an error if the underlying store cannot be read.
pub fn saved_photos<S: KeyValueStore>(store: &S) -> Result<Vec<SavedPhoto>, S::Error> {
    Ok(match store.get(KEY_SAVED_PHOTOS)? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("saved photo list is unreadable, starting fresh: {err}");
            Vec::new()
        }),
        None => Vec::new(),
    })
}

/// Append a photo, replacing any existing entry with the same id.
///
/// # Errors
///
/// Returns an error if the underlying store cannot be written.
pub fn append_saved_photo<S: KeyValueStore>(
    store: &mut S,
    photo: SavedPhoto,
) -> Result<(), S::Error> {
    let mut photos = saved_photos(store)?;
    photos.retain(|p| p.id != photo.id);
    photos.push(photo);
    let raw = serde_json::to_string(&photos).expect("photo list serializes");
    store.set(KEY_SAVED_PHOTOS, &raw)
}

/// Whether the onboarding carousel was already shown.
///
/// # Errors
///
/// Returns an error if the underlying store cannot be read.
pub fn onboarding_seen<S: KeyValueStore>(store: &S) -> Result<bool, S::Error> {
    Ok(store
        .get(KEY_ONBOARDING_SEEN)?
        .is_some_and(|v| v == "true"))
}

/// Record that onboarding was shown.
///
/// # Errors
///
/// Returns an error if the underlying store cannot be written.
pub fn mark_onboarding_seen<S: KeyValueStore>(store: &mut S) -> Result<(), S::Error> {
    store.set(KEY_ONBOARDING_SEEN, "true")
}
