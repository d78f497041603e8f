//! Mission board: the explicit, injectable mission store and proximity matcher.
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{Coordinate, distance_m};
use crate::mission::{Mission, MissionPhase, TransitionError};

/// Errors raised by board mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("no mission with id {0} on the board")]
    UnknownMission(u64),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Holds the active mission frontier, completed missions, and the last
/// sampled device location.
///
/// This replaces the app's module-global mutable state: all mutation goes
/// through methods, and the board is owned by whoever drives the lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionBoard {
    active: Vec<Mission>,
    completed: Vec<Mission>,
    current_location: Option<Coordinate>,
}

impl MissionBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the last known device location. No bounds checks.
    pub fn set_current_location(&mut self, coord: Coordinate) {
        self.current_location = Some(coord);
    }

    #[must_use]
    pub const fn current_location(&self) -> Option<Coordinate> {
        self.current_location
    }

    #[must_use]
    pub fn active(&self) -> &[Mission] {
        &self.active
    }

    #[must_use]
    pub fn completed(&self) -> &[Mission] {
        &self.completed
    }

    /// Replace the active frontier wholesale. Missions are a projection of
    /// backend state, so a refresh always swaps the full list.
    pub fn replace_active(&mut self, missions: Vec<Mission>) {
        self.active = missions;
    }

    #[must_use]
    pub fn get(&self, mission_id: u64) -> Option<&Mission> {
        self.active.iter().find(|m| m.id == mission_id)
    }

    fn get_mut(&mut self, mission_id: u64) -> Result<&mut Mission, BoardError> {
        self.active
            .iter_mut()
            .find(|m| m.id == mission_id)
            .ok_or(BoardError::UnknownMission(mission_id))
    }

    /// Find the nearest active mission whose trigger radius contains the
    /// given point.
    ///
    /// Linear scan over the active list; missions past the matchable phases
    /// are skipped. A point at exactly the radius qualifies (`<=`). Ties are
    /// broken by list order: the first mission at the minimum distance wins.
    #[must_use]
    pub fn find_mission_by_location(&self, coord: Coordinate) -> Option<&Mission> {
        let mut best: Option<(&Mission, f64)> = None;
        for mission in &self.active {
            if !mission.phase.is_matchable() {
                continue;
            }
            let d = distance_m(coord, mission.location.coordinate());
            if d > mission.location.radius_m {
                continue;
            }
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((mission, d)),
            }
        }
        if let Some((mission, d)) = best {
            debug!(
                "matched mission {} ({}) at {:.1} m (radius {:.0} m)",
                mission.id, mission.location.name, d, mission.location.radius_m
            );
        }
        best.map(|(mission, _)| mission)
    }

    /// Match against the stored current location, if any.
    #[must_use]
    pub fn match_current_location(&self) -> Option<&Mission> {
        self.current_location
            .and_then(|coord| self.find_mission_by_location(coord))
    }

    /// Record that an arrival notification was shown for a mission.
    ///
    /// # Errors
    ///
    /// Returns an error when the mission is unknown or not `Pending`.
    pub fn mark_notified(&mut self, mission_id: u64) -> Result<(), BoardError> {
        self.get_mut(mission_id)?.notify()?;
        Ok(())
    }

    /// Park a mission in `AwaitingAck` while the backend unlock is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error when the mission is unknown or already completed.
    pub fn begin_completion(
        &mut self,
        mission_id: u64,
        selected_photo_id: Option<u64>,
    ) -> Result<(), BoardError> {
        self.get_mut(mission_id)?.begin_ack(selected_photo_id)?;
        Ok(())
    }

    /// Move a mission to the completed list after a successful backend ack.
    ///
    /// The board never moves a mission optimistically; this is the only path
    /// from active to completed.
    ///
    /// # Errors
    ///
    /// Returns an error when the mission is unknown or not `AwaitingAck`.
    pub fn acknowledge(&mut self, mission_id: u64) -> Result<(), BoardError> {
        self.get_mut(mission_id)?.acknowledge()?;
        let idx = self
            .active
            .iter()
            .position(|m| m.id == mission_id)
            .ok_or(BoardError::UnknownMission(mission_id))?;
        let mission = self.active.remove(idx);
        self.completed.push(mission);
        Ok(())
    }

    /// Return a mission to `Pending` after a failed backend ack.
    ///
    /// # Errors
    ///
    /// Returns an error when the mission is unknown or not `AwaitingAck`.
    pub fn rollback(&mut self, mission_id: u64) -> Result<(), BoardError> {
        self.get_mut(mission_id)?.rollback()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::MissionLocation;

    fn mission_at(id: u64, lat: f64, lng: f64, radius_m: f64) -> Mission {
        Mission::new(
            MissionLocation {
                id,
                name: format!("spot-{id}"),
                lat,
                lng,
                order: u32::try_from(id).unwrap_or(0),
                radius_m,
                completed: false,
            },
            Vec::new(),
        )
    }

    #[test]
    fn matches_mission_at_same_coordinates() {
        let mut board = MissionBoard::new();
        board.replace_active(vec![mission_at(1, 37.4563, 126.7052, 100.0)]);
        let hit = board.find_mission_by_location(Coordinate::new(37.4563, 126.7052));
        assert_eq!(hit.map(|m| m.id), Some(1));
    }

    #[test]
    fn does_not_match_mission_500m_away() {
        let mut board = MissionBoard::new();
        // ~500 m north of the probe point.
        board.replace_active(vec![mission_at(1, 37.4608, 126.7052, 100.0)]);
        assert!(board.find_mission_by_location(Coordinate::new(37.4563, 126.7052)).is_none());
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let mut board = MissionBoard::new();
        let mission = mission_at(1, 37.4563, 126.7052, 0.0);
        let exact = mission.location.coordinate();
        board.replace_active(vec![mission]);
        // Zero distance against a zero radius still qualifies via `<=`.
        assert!(board.find_mission_by_location(exact).is_some());

        let mut board = MissionBoard::new();
        let probe = Coordinate::new(37.4563, 126.7052);
        let target = Coordinate::new(37.4572, 126.7052);
        let d = distance_m(probe, target);
        board.replace_active(vec![mission_at(2, target.lat, target.lng, d)]);
        assert!(board.find_mission_by_location(probe).is_some(), "exactly at radius");
        let mut board2 = MissionBoard::new();
        board2.replace_active(vec![mission_at(3, target.lat, target.lng, d - 0.5)]);
        assert!(board2.find_mission_by_location(probe).is_none(), "just outside radius");
    }

    #[test]
    fn tie_break_prefers_earlier_list_order() {
        let mut board = MissionBoard::new();
        let probe = Coordinate::new(37.4563, 126.7052);
        // Two missions at the identical position: identical distance.
        board.replace_active(vec![
            mission_at(10, probe.lat, probe.lng, 100.0),
            mission_at(11, probe.lat, probe.lng, 100.0),
        ]);
        assert_eq!(board.find_mission_by_location(probe).map(|m| m.id), Some(10));
    }

    #[test]
    fn completed_and_in_flight_missions_are_skipped() {
        let mut board = MissionBoard::new();
        let probe = Coordinate::new(37.4563, 126.7052);
        board.replace_active(vec![
            mission_at(1, probe.lat, probe.lng, 100.0),
            mission_at(2, probe.lat, probe.lng, 100.0),
        ]);
        board.begin_completion(1, None).unwrap();
        assert_eq!(board.find_mission_by_location(probe).map(|m| m.id), Some(2));
    }

    #[test]
    fn nearest_qualifying_mission_wins() {
        let mut board = MissionBoard::new();
        let probe = Coordinate::new(37.4563, 126.7052);
        board.replace_active(vec![
            mission_at(1, 37.4571, 126.7052, 500.0), // ~90 m away
            mission_at(2, 37.4565, 126.7052, 500.0), // ~22 m away
        ]);
        assert_eq!(board.find_mission_by_location(probe).map(|m| m.id), Some(2));
    }

    #[test]
    fn acknowledge_moves_mission_to_completed_list() {
        let mut board = MissionBoard::new();
        board.replace_active(vec![mission_at(1, 37.45, 126.70, 100.0)]);
        board.begin_completion(1, Some(4)).unwrap();
        board.acknowledge(1).unwrap();
        assert!(board.active().is_empty());
        assert_eq!(board.completed().len(), 1);
        assert_eq!(board.completed()[0].phase, MissionPhase::Completed);
    }

    #[test]
    fn rollback_keeps_mission_active() {
        let mut board = MissionBoard::new();
        board.replace_active(vec![mission_at(1, 37.45, 126.70, 100.0)]);
        board.begin_completion(1, None).unwrap();
        board.rollback(1).unwrap();
        assert_eq!(board.active().len(), 1);
        assert_eq!(board.active()[0].phase, MissionPhase::Pending);
    }

    #[test]
    fn unknown_mission_is_reported() {
        let mut board = MissionBoard::new();
        assert_eq!(
            board.begin_completion(99, None),
            Err(BoardError::UnknownMission(99))
        );
    }

    #[test]
    fn match_uses_stored_location() {
        let mut board = MissionBoard::new();
        board.replace_active(vec![mission_at(1, 37.4563, 126.7052, 100.0)]);
        assert!(board.match_current_location().is_none(), "no location sampled yet");
        board.set_current_location(Coordinate::new(37.4563, 126.7052));
        assert!(board.match_current_location().is_some());
    }
}
