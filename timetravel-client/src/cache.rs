//! Short-lived cache for the spot catalog.
//!
//! The catalog changes rarely, so the map and the detection loop share one
//! fetch for a few minutes instead of hammering the backend every tick.
use log::{debug, warn};
use std::time::{Duration, Instant};
use timetravel_core::Spot;

use crate::api::{ApiClient, ApiError};

#[derive(Debug, Clone)]
pub struct SpotCache {
    spots: Vec<Spot>,
    fetched_at: Option<Instant>,
    ttl: Duration,
}

impl SpotCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            spots: Vec::new(),
            fetched_at: None,
            ttl,
        }
    }

    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.fetched_at
            .is_some_and(|at| now.duration_since(at) < self.ttl)
    }

    /// Whatever was last fetched, fresh or not.
    #[must_use]
    pub fn cached(&self) -> &[Spot] {
        &self.spots
    }

    pub fn invalidate(&mut self) {
        self.fetched_at = None;
    }

    /// Serve the cached catalog while fresh; refetch once the TTL lapses.
    /// A 401 with a non-empty cache degrades to stale data so the map keeps
    /// rendering while the token is being refreshed.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when the cache cannot absorb it (transport
    /// failures, non-401 statuses, or a 401 with nothing cached).
    pub async fn get_or_refresh(
        &mut self,
        api: &ApiClient,
        now: Instant,
    ) -> Result<&[Spot], ApiError> {
        if self.is_fresh(now) {
            debug!("serving {} spots from cache", self.spots.len());
            return Ok(&self.spots);
        }
        match api.spots().await {
            Ok(spots) => {
                debug!("spot catalog refreshed: {} spots", spots.len());
                self.spots = spots;
                self.fetched_at = Some(now);
                Ok(&self.spots)
            }
            Err(err) if err.is_unauthorized() && !self.spots.is_empty() => {
                warn!("spot fetch unauthorized, serving {} stale spots", self.spots.len());
                Ok(&self.spots)
            }
            Err(err) => Err(err),
        }
    }
}
