//! TimeTravel Client
//!
//! Networking and scheduling around `timetravel-core`: the typed backend
//! API client, token/session handling, the spot catalog cache, local
//! key-value persistence, and the mission detection loop.

pub mod api;
pub mod auth;
pub mod cache;
pub mod controller;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, ProfileUpdate, UserProfile};
pub use auth::{AuthSession, TokenPair, with_refresh};
pub use cache::SpotCache;
pub use controller::{FixedLocation, LocationProvider, MissionService};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, SavedPhoto, StorageError};
