//! Session persistence and token refresh.
//!
//! Tokens and the signed-in profile live in the key-value store. Refresh is
//! best-effort: a failed refresh logs and yields `None`, and callers fall
//! back to the logged-out path instead of crashing mid-trip.
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError, ProfileUpdate, UserProfile};
use crate::storage::KeyValueStore;

pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_USER: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Auth state layered over a [`KeyValueStore`].
#[derive(Debug, Clone, Default)]
pub struct AuthSession<S> {
    store: S,
}

impl<S: KeyValueStore> AuthSession<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Persist both tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_tokens(&mut self, tokens: &TokenPair) -> Result<(), S::Error> {
        self.store.set(KEY_ACCESS_TOKEN, &tokens.access)?;
        self.store.set(KEY_REFRESH_TOKEN, &tokens.refresh)
    }

    /// The stored token pair, if an access token exists. A missing refresh
    /// token comes back empty rather than failing the load.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn tokens(&self) -> Result<Option<TokenPair>, S::Error> {
        let Some(access) = self.store.get(KEY_ACCESS_TOKEN)? else {
            return Ok(None);
        };
        let refresh = self.store.get(KEY_REFRESH_TOKEN)?.unwrap_or_default();
        Ok(Some(TokenPair { access, refresh }))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn access_token(&self) -> Result<Option<String>, S::Error> {
        self.store.get(KEY_ACCESS_TOKEN)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn save_user(&mut self, user: &UserProfile) -> Result<(), S::Error> {
        let raw = serde_json::to_string(user).expect("profile serializes");
        self.store.set(KEY_USER, &raw)
    }

    /// The stored profile; an undecodable payload counts as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn user(&self) -> Result<Option<UserProfile>, S::Error> {
        Ok(self.store.get(KEY_USER)?.and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|err| warn!("stored profile is unreadable: {err}"))
                .ok()
        }))
    }

    /// Logged in means both a token and a profile are present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn is_logged_in(&self) -> Result<bool, S::Error> {
        Ok(self.access_token()?.is_some() && self.user()?.is_some())
    }

    /// Drop all session state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn logout(&mut self) -> Result<(), S::Error> {
        self.store.remove(KEY_ACCESS_TOKEN)?;
        self.store.remove(KEY_REFRESH_TOKEN)?;
        self.store.remove(KEY_USER)
    }

    /// Exchange the stored refresh token for a new access token and persist
    /// the result. When the backend omits a rotated refresh token the old
    /// one is kept. Returns `None` on any failure.
    pub async fn refresh(&mut self, api: &ApiClient) -> Option<TokenPair> {
        let tokens = match self.tokens() {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!("could not load stored tokens: {err}");
                return None;
            }
        };
        let refresh = tokens.map(|t| t.refresh).filter(|r| !r.is_empty())?;
        match api.refresh_token(&refresh).await {
            Ok(response) => {
                let pair = TokenPair {
                    access: response.access,
                    refresh: response.refresh.unwrap_or(refresh),
                };
                if let Err(err) = self.save_tokens(&pair) {
                    warn!("could not persist refreshed tokens: {err}");
                }
                info!("access token refreshed");
                Some(pair)
            }
            Err(err) => {
                warn!("token refresh failed: {err}");
                None
            }
        }
    }

    /// Fetch the backend profile and persist it locally. Returns `None` on
    /// any failure, leaving whatever profile was already stored in place.
    pub async fn sync_profile(&mut self, api: &ApiClient, user_id: u64) -> Option<UserProfile> {
        match api.profile(user_id).await {
            Ok(profile) => {
                if let Err(err) = self.save_user(&profile) {
                    warn!("could not persist synced profile: {err}");
                }
                Some(profile)
            }
            Err(err) => {
                warn!("profile sync failed for user {user_id}: {err}");
                None
            }
        }
    }

    /// Push a partial profile update and persist the backend's result.
    /// Returns `None` on any failure.
    pub async fn push_profile(
        &mut self,
        api: &ApiClient,
        user_id: u64,
        update: &ProfileUpdate,
    ) -> Option<UserProfile> {
        match api.update_profile(user_id, update).await {
            Ok(profile) => {
                if let Err(err) = self.save_user(&profile) {
                    warn!("could not persist updated profile: {err}");
                }
                Some(profile)
            }
            Err(err) => {
                warn!("profile update failed for user {user_id}: {err}");
                None
            }
        }
    }
}

/// Run an authorized call, refreshing the token and retrying exactly once
/// when the backend answers 401.
///
/// # Errors
///
/// Returns the original error when it is not a 401, and the retry's error
/// when the refreshed call fails too.
pub async fn with_refresh<S, T, F, Fut>(
    session: &mut AuthSession<S>,
    api: &mut ApiClient,
    mut call: F,
) -> Result<T, ApiError>
where
    S: KeyValueStore,
    F: FnMut(ApiClient) -> Fut,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    match call(api.clone()).await {
        Err(err) if err.is_unauthorized() => {
            let Some(pair) = session.refresh(api).await else {
                return Err(err);
            };
            api.set_token(Some(pair.access));
            call(api.clone()).await
        }
        other => other,
    }
}
