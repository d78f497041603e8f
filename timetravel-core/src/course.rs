//! Mirror of the backend course/route data shapes and the unlock-target
//! resolution used by the completion flow.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mission::{HistoricalPhoto, Mission, MissionLocation};

/// A backend point of interest. Not every spot is mission-enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub id: u64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub past_image_url: Option<String>,
    #[serde(default)]
    pub is_mission: bool,
}

impl Spot {
    /// Whether this spot carries a usable historical photo.
    #[must_use]
    pub fn has_past_image(&self) -> bool {
        self.past_image_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

/// Join record tracking one user's progress on one spot within a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRouteSpot {
    pub id: u64,
    pub order: u32,
    #[serde(default)]
    pub unlock_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_used: bool,
    pub route_id: u64,
    #[serde(default)]
    pub route_spot_id: Option<u64>,
    #[serde(default)]
    pub spot_id: Option<u64>,
}

impl UserRouteSpot {
    /// A spot is unresolved until the backend records an unlock time.
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        self.unlock_at.is_none()
    }
}

/// One of the user's assigned routes, as returned by `user_routes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoute {
    pub route_id: u64,
    #[serde(default)]
    pub spots: Vec<UserRouteSpot>,
}

impl UserRoute {
    /// First unresolved spot in route order, if any. This is the single
    /// active frontier the mission projection is built from.
    #[must_use]
    pub fn next_unresolved(&self) -> Option<&UserRouteSpot> {
        self.spots
            .iter()
            .filter(|s| s.is_unresolved())
            .min_by_key(|s| s.order)
    }

    #[must_use]
    pub fn contains_spot(&self, spot_id: u64) -> bool {
        self.spots.iter().any(|s| s.spot_id == Some(spot_id))
    }
}

/// A spot the user has already unlocked, as returned by the visited-spots
/// endpoint. Carries the unlock time and the historical photo reference the
/// album screens render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockedSpot {
    pub id: u64,
    pub order: u32,
    pub unlock_at: DateTime<Utc>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub route_id: u64,
    pub route_spot_id: u64,
    #[serde(default)]
    pub past_photo_url: Option<String>,
}

/// Route-to-spot mapping row from the route detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpot {
    pub id: u64,
    pub spot_id: u64,
    pub order: u32,
}

/// Route detail payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDetail {
    pub id: u64,
    #[serde(default)]
    pub mission_available: bool,
    #[serde(default)]
    pub route_spots: Vec<RouteSpot>,
}

/// Target for the unlock PATCH resolved from client-side data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockTarget {
    /// `UserRouteSpot.id`, sent in the PATCH body.
    pub user_route_spot_id: u64,
    /// `RouteSpot.id`, the PATCH path parameter.
    pub route_spot_id: u64,
    /// True when the heuristic fallback picked this target.
    pub fallback: bool,
}

/// Resolve which `UserRouteSpot` to unlock for a given spot id.
///
/// Exact path: find the `RouteSpot` mapping for the spot, then the user's
/// record pointing at it. When the mapping is missing or stale, falls back
/// to the first unresolved `UserRouteSpot` in order, a best-effort guess
/// that may select the wrong spot when several are still locked. Callers
/// must surface `fallback = true` so the guess is observable.
#[must_use]
pub fn resolve_unlock_target(
    user_spots: &[UserRouteSpot],
    route_spots: &[RouteSpot],
    spot_id: u64,
) -> Option<UnlockTarget> {
    if let Some(mapping) = route_spots.iter().find(|rs| rs.spot_id == spot_id) {
        if let Some(user_spot) = user_spots
            .iter()
            .find(|us| us.route_spot_id == Some(mapping.id))
        {
            return Some(UnlockTarget {
                user_route_spot_id: user_spot.id,
                route_spot_id: mapping.id,
                fallback: false,
            });
        }
    }

    // Heuristic: first still-locked record in route order.
    let candidate = user_spots
        .iter()
        .filter(|us| us.is_unresolved())
        .min_by_key(|us| us.order)?;
    let route_spot_id = candidate.route_spot_id.or_else(|| {
        route_spots
            .iter()
            .find(|rs| rs.order == candidate.order)
            .map(|rs| rs.id)
    })?;
    Some(UnlockTarget {
        user_route_spot_id: candidate.id,
        route_spot_id,
        fallback: true,
    })
}

/// Convert the spots that carry a historical photo into the photo pool used
/// by the "guess the past" challenge.
#[must_use]
pub fn photos_from_spots(spots: &[Spot]) -> Vec<HistoricalPhoto> {
    spots
        .iter()
        .filter(|s| s.has_past_image())
        .map(|s| HistoricalPhoto {
            id: s.id,
            title: s.name.clone(),
            description: String::new(),
            image_url: s.past_image_url.clone().unwrap_or_default(),
            year: String::new(),
            location: s.address.clone().unwrap_or_else(|| s.name.clone()),
        })
        .collect()
}

/// Project a backend spot into a fresh mission with the given trigger radius.
#[must_use]
pub fn mission_from_spot(
    spot: &Spot,
    order: u32,
    route_id: u64,
    photos: Vec<HistoricalPhoto>,
    radius_m: f64,
) -> Mission {
    Mission::new(
        MissionLocation {
            id: spot.id,
            name: spot.name.clone(),
            lat: spot.lat,
            lng: spot.lng,
            order,
            radius_m,
            completed: false,
        },
        photos,
    )
    .with_route(route_id)
}
