//! TimeTravel Domain Engine
//!
//! Platform-agnostic core logic for the TimeTravel travel companion:
//! mission lifecycle, proximity matching, course progress mirroring, the
//! photo challenge, and the scripted chatbot. No I/O and no async; the
//! client crate layers networking and scheduling on top.

pub mod board;
pub mod chat;
pub mod config;
pub mod course;
pub mod geo;
pub mod mission;
pub mod quiz;

// Re-export commonly used types
pub use board::{BoardError, MissionBoard};
pub use chat::{ChatMessage, ChatRule, ChatScript, ScriptedReply};
pub use config::{ConfigError, DetectionConfig};
pub use course::{
    RouteDetail, RouteSpot, Spot, UnlockTarget, UnlockedSpot, UserRoute, UserRouteSpot,
    mission_from_spot, photos_from_spots, resolve_unlock_target,
};
pub use geo::{Coordinate, EARTH_RADIUS_M, distance_m};
pub use mission::{
    HistoricalPhoto, Mission, MissionLocation, MissionNotice, MissionPhase, TransitionError,
};
pub use quiz::{PhotoQuiz, QuizError, build_photo_quiz};
