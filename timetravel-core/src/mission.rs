//! Mission types and the explicit lifecycle state machine.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::geo::Coordinate;

/// A historical photograph attached to a mission's photo challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalPhoto {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: String,
    /// Year the photo was taken, as printed on the card. May be empty.
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub location: String,
}

/// A physical stop that can trigger a mission when the user gets close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionLocation {
    pub id: u64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub order: u32,
    /// Trigger distance in meters. Must be positive; enforced at config level.
    pub radius_m: f64,
    #[serde(default)]
    pub completed: bool,
}

impl MissionLocation {
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Lifecycle phase of a mission.
///
/// `Pending -> Notified -> AwaitingAck -> Completed`, with an explicit
/// rollback from `AwaitingAck` back to `Pending` when the backend
/// acknowledgment fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    #[default]
    Pending,
    Notified,
    AwaitingAck,
    Completed,
}

impl MissionPhase {
    /// Whether the proximity matcher may still select this mission.
    #[must_use]
    pub const fn is_matchable(self) -> bool {
        matches!(self, Self::Pending | Self::Notified)
    }

    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Notified => "notified",
            Self::AwaitingAck => "awaiting_ack",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a lifecycle method is called in the wrong phase.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("mission {mission_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub mission_id: u64,
    pub from: MissionPhase,
    pub to: MissionPhase,
}

/// One "visit this place and solve its photo challenge" unit of work.
///
/// Missions are a projection of backend course state, rebuilt on every
/// refresh; they are never persisted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: u64,
    pub location: MissionLocation,
    #[serde(default)]
    pub historical_photos: Vec<HistoricalPhoto>,
    #[serde(default)]
    pub phase: MissionPhase,
    #[serde(default)]
    pub selected_photo_id: Option<u64>,
    #[serde(default)]
    pub route_id: Option<u64>,
}

impl Mission {
    #[must_use]
    pub fn new(location: MissionLocation, historical_photos: Vec<HistoricalPhoto>) -> Self {
        let id = location.id;
        Self {
            id,
            location,
            historical_photos,
            phase: MissionPhase::Pending,
            selected_photo_id: None,
            route_id: None,
        }
    }

    #[must_use]
    pub fn with_route(mut self, route_id: u64) -> Self {
        self.route_id = Some(route_id);
        self
    }

    fn transition(&mut self, from: &[MissionPhase], to: MissionPhase) -> Result<(), TransitionError> {
        if from.contains(&self.phase) {
            self.phase = to;
            Ok(())
        } else {
            Err(TransitionError {
                mission_id: self.id,
                from: self.phase,
                to,
            })
        }
    }

    /// Mark the mission as surfaced to the user.
    ///
    /// # Errors
    ///
    /// Returns an error unless the mission is `Pending`.
    pub fn notify(&mut self) -> Result<(), TransitionError> {
        self.transition(&[MissionPhase::Pending], MissionPhase::Notified)
    }

    /// Begin the completion handshake while the backend call is in flight.
    ///
    /// A mission may be completed without having been notified first: user
    /// actions race the detection timer.
    ///
    /// # Errors
    ///
    /// Returns an error when the mission is already awaiting or completed.
    pub fn begin_ack(&mut self, selected_photo_id: Option<u64>) -> Result<(), TransitionError> {
        self.transition(
            &[MissionPhase::Pending, MissionPhase::Notified],
            MissionPhase::AwaitingAck,
        )?;
        self.selected_photo_id = selected_photo_id;
        Ok(())
    }

    /// Finish the handshake after the backend acknowledged the unlock.
    ///
    /// # Errors
    ///
    /// Returns an error unless the mission is `AwaitingAck`.
    pub fn acknowledge(&mut self) -> Result<(), TransitionError> {
        self.transition(&[MissionPhase::AwaitingAck], MissionPhase::Completed)?;
        self.location.completed = true;
        Ok(())
    }

    /// Return an unacknowledged mission to `Pending` so it can be retried.
    ///
    /// # Errors
    ///
    /// Returns an error unless the mission is `AwaitingAck`.
    pub fn rollback(&mut self) -> Result<(), TransitionError> {
        self.transition(&[MissionPhase::AwaitingAck], MissionPhase::Pending)?;
        self.selected_photo_id = None;
        Ok(())
    }
}

/// User-facing notification emitted by the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MissionNotice {
    Arrival { mission_id: u64, location_name: String },
    Completion { mission_id: u64, location_name: String },
}

impl MissionNotice {
    #[must_use]
    pub const fn mission_id(&self) -> u64 {
        match self {
            Self::Arrival { mission_id, .. } | Self::Completion { mission_id, .. } => *mission_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> MissionLocation {
        MissionLocation {
            id: 1,
            name: "Daebul Hotel".to_string(),
            lat: 37.4563,
            lng: 126.7052,
            order: 1,
            radius_m: 100.0,
            completed: false,
        }
    }

    #[test]
    fn happy_path_walks_all_phases() {
        let mut mission = Mission::new(location(), Vec::new());
        assert_eq!(mission.phase, MissionPhase::Pending);
        mission.notify().unwrap();
        mission.begin_ack(Some(7)).unwrap();
        assert_eq!(mission.selected_photo_id, Some(7));
        mission.acknowledge().unwrap();
        assert_eq!(mission.phase, MissionPhase::Completed);
        assert!(mission.location.completed);
    }

    #[test]
    fn completion_without_notification_is_allowed() {
        let mut mission = Mission::new(location(), Vec::new());
        mission.begin_ack(None).unwrap();
        assert_eq!(mission.phase, MissionPhase::AwaitingAck);
    }

    #[test]
    fn rollback_returns_to_pending_and_clears_selection() {
        let mut mission = Mission::new(location(), Vec::new());
        mission.begin_ack(Some(3)).unwrap();
        mission.rollback().unwrap();
        assert_eq!(mission.phase, MissionPhase::Pending);
        assert_eq!(mission.selected_photo_id, None);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut mission = Mission::new(location(), Vec::new());
        assert!(mission.acknowledge().is_err());
        mission.begin_ack(None).unwrap();
        let err = mission.notify().unwrap_err();
        assert_eq!(err.from, MissionPhase::AwaitingAck);
        assert_eq!(err.to, MissionPhase::Notified);
        mission.acknowledge().unwrap();
        assert!(mission.begin_ack(None).is_err(), "completed missions stay completed");
    }

    #[test]
    fn completed_phase_is_not_matchable() {
        assert!(MissionPhase::Pending.is_matchable());
        assert!(MissionPhase::Notified.is_matchable());
        assert!(!MissionPhase::AwaitingAck.is_matchable());
        assert!(!MissionPhase::Completed.is_matchable());
    }
}
