//! Thin typed client for the TimeTravel backend REST API.
//!
//! One method per endpoint, bearer auth applied uniformly, and non-2xx
//! statuses surfaced as [`ApiError::Http`] so callers can react to 401s.
use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use timetravel_core::{RouteDetail, Spot, UnlockedSpot, UserRoute};

/// Errors raised while talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend returned HTTP {status} for {endpoint}")]
    Http { status: u16, endpoint: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode { .. } => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Body for the unlock PATCH. `id` is the user's own route-spot row, while
/// the catalog-level route-spot id travels in the URL path.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockRequest {
    pub id: u64,
    pub unlock_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StampRequest {
    pub id: u64,
    pub is_used: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateCourseRequest {
    pub user_region_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoUpload {
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub user_question: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatAnswer {
    pub ai_answer: String,
}

/// The signed-in user as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub useremail: String,
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub useremail: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// The backend may rotate the refresh token or omit it entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Typed wrapper over the backend API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response, ApiError> {
        debug!("-> {endpoint}");
        let response = self.apply_auth(request).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::Http {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            })
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T, ApiError> {
        let response = self.send(request, endpoint).await?;
        response.json::<T>().await.map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<(), ApiError> {
        self.send(request, endpoint).await.map(|_| ())
    }

    /// The user's courses with per-spot unlock progress.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn user_routes(&self) -> Result<Vec<UserRoute>, ApiError> {
        let endpoint = "/v1/courses/user_routes/";
        self.fetch(self.http.get(self.url(endpoint)), endpoint).await
    }

    /// The full spot catalog.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn spots(&self) -> Result<Vec<Spot>, ApiError> {
        let endpoint = "/v1/spots/";
        self.fetch(self.http.get(self.url(endpoint)), endpoint).await
    }

    /// One spot by id.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn spot_detail(&self, spot_id: u64) -> Result<Spot, ApiError> {
        let endpoint = format!("/v1/spots/{spot_id}/");
        self.fetch(self.http.get(self.url(&endpoint)), &endpoint).await
    }

    /// Every spot the user has unlocked so far, with the photo references
    /// the album renders.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn visited_spots(&self) -> Result<Vec<UnlockedSpot>, ApiError> {
        let endpoint = "/v1/routes/unlock_spots/";
        self.fetch(self.http.get(self.url(endpoint)), endpoint).await
    }

    /// Catalog-level detail for one route, including its spot mappings.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn route_detail(&self, route_id: u64) -> Result<RouteDetail, ApiError> {
        let endpoint = format!("/v1/courses/{route_id}/");
        self.fetch(self.http.get(self.url(&endpoint)), &endpoint).await
    }

    /// Record that a spot was unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn unlock_route_spot(
        &self,
        route_spot_id: u64,
        request: &UnlockRequest,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/v1/courses/unlock_route_spot/{route_spot_id}/");
        self.execute(self.http.patch(self.url(&endpoint)).json(request), &endpoint)
            .await
    }

    /// Mark a stamp as used.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn use_stamp(&self, request: &StampRequest) -> Result<(), ApiError> {
        let endpoint = "/v1/courses/use_stamp/";
        self.execute(self.http.patch(self.url(endpoint)).json(request), endpoint)
            .await
    }

    /// Ask the backend to build a course for a region.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn generate_course(
        &self,
        request: &GenerateCourseRequest,
    ) -> Result<RouteDetail, ApiError> {
        let endpoint = "/v1/courses/generate_course/";
        self.fetch(self.http.post(self.url(endpoint)).json(request), endpoint)
            .await
    }

    /// Upload a photo taken at a spot.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn save_photo(
        &self,
        route_id: u64,
        spot_id: u64,
        request: &PhotoUpload,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/v1/photos/{route_id}/{spot_id}/");
        self.execute(self.http.post(self.url(&endpoint)).json(request), &endpoint)
            .await
    }

    /// One chatbot turn.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatAnswer, ApiError> {
        let endpoint = "/v1/chatbot/";
        self.fetch(self.http.post(self.url(endpoint)).json(request), endpoint)
            .await
    }

    /// The user's backend profile.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn profile(&self, user_id: u64) -> Result<UserProfile, ApiError> {
        let endpoint = format!("/v1/users/profile/{user_id}/");
        self.fetch(self.http.get(self.url(&endpoint)), &endpoint).await
    }

    /// Update the user's backend profile; returns the stored result.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn update_profile(
        &self,
        user_id: u64,
        request: &ProfileUpdate,
    ) -> Result<UserProfile, ApiError> {
        let endpoint = format!("/v1/users/profile/{user_id}/");
        self.fetch(self.http.put(self.url(&endpoint)).json(request), &endpoint)
            .await
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn refresh_token(&self, refresh: &str) -> Result<RefreshResponse, ApiError> {
        let endpoint = "/v1/users/refresh/";
        self.fetch(
            self.http.post(self.url(endpoint)).json(&RefreshRequest { refresh }),
            endpoint,
        )
        .await
    }
}
