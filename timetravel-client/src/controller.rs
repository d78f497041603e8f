//! Mission lifecycle controller: course sync, proximity detection ticks,
//! and the unlock handshake against the backend.
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use timetravel_core::{
    ChatScript, ConfigError, Coordinate, DetectionConfig, Mission, MissionBoard, MissionNotice,
    MissionPhase, course,
};

use crate::api::{ApiClient, ChatRequest, StampRequest, UnlockRequest};
use crate::cache::SpotCache;

/// Source of device positions. GPS on device, fixed or scripted in tests.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Best-effort sample of the current position; `None` when unavailable.
    async fn current_location(&self) -> Option<Coordinate>;
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinate);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_location(&self) -> Option<Coordinate> {
        Some(self.0)
    }
}

/// Owns the board, the spot cache, and the API client, and drives the whole
/// mission lifecycle from course sync through the completion handshake.
pub struct MissionService {
    api: ApiClient,
    cfg: DetectionConfig,
    board: MissionBoard,
    cache: SpotCache,
    script: ChatScript,
    user_id: String,
    generation: u64,
}

impl MissionService {
    /// # Errors
    ///
    /// Returns an error when the configuration fails validation.
    pub fn new(api: ApiClient, cfg: DetectionConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let cache = SpotCache::new(cfg.cache_ttl());
        Ok(Self {
            api,
            cfg,
            board: MissionBoard::new(),
            cache,
            script: ChatScript::builtin(),
            user_id: anonymous_user_id(),
            generation: 0,
        })
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    #[must_use]
    pub fn board(&self) -> &MissionBoard {
        &self.board
    }

    #[must_use]
    pub fn config(&self) -> &DetectionConfig {
        &self.cfg
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.api.set_token(token);
    }

    fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Rebuild the active mission frontier from backend course state.
    ///
    /// Any failure along the way logs and yields an empty frontier; the next
    /// tick retries naturally. Lifecycle progress on an unchanged frontier
    /// mission is preserved across refreshes.
    pub async fn refresh_missions(&mut self) -> Vec<Mission> {
        let generation = self.bump_generation();
        let missions = self.project_frontier().await;
        self.apply_refresh(generation, missions)
    }

    async fn project_frontier(&mut self) -> Vec<Mission> {
        let routes = match self.api.user_routes().await {
            Ok(routes) => routes,
            Err(err) => {
                warn!("course fetch failed: {err}");
                return Vec::new();
            }
        };
        let Some(route) = routes.first() else {
            info!("no active course");
            return Vec::new();
        };
        let Some(next) = route.next_unresolved() else {
            info!("course {} is fully unlocked", route.route_id);
            return Vec::new();
        };
        let spots = match self.cache.get_or_refresh(&self.api, Instant::now()).await {
            Ok(spots) => spots.to_vec(),
            Err(err) => {
                warn!("spot catalog fetch failed: {err}");
                return Vec::new();
            }
        };
        let Some(spot) = next.spot_id.and_then(|id| spots.iter().find(|s| s.id == id)) else {
            warn!(
                "frontier spot {:?} of course {} is missing from the catalog",
                next.spot_id, route.route_id
            );
            return Vec::new();
        };
        let photos = course::photos_from_spots(&spots);
        vec![course::mission_from_spot(
            spot,
            next.order,
            route.route_id,
            photos,
            self.cfg.trigger_radius_m,
        )]
    }

    /// Apply a frontier computed under `generation`. A projection from a
    /// superseded generation is discarded so a stale tick can never clobber
    /// newer board state.
    fn apply_refresh(&mut self, generation: u64, missions: Vec<Mission>) -> Vec<Mission> {
        if generation != self.generation {
            debug!(
                "discarding mission refresh from superseded generation {generation} (current {})",
                self.generation
            );
            return Vec::new();
        }
        let missions: Vec<Mission> = missions
            .into_iter()
            .map(|mission| match self.board.get(mission.id) {
                Some(existing) if existing.phase != MissionPhase::Pending => existing.clone(),
                _ => mission,
            })
            .collect();
        self.board.replace_active(missions.clone());
        missions
    }

    /// One detection tick: sample the location, refresh the frontier, and
    /// match. Emits at most one arrival notice per mission while
    /// `notify_once` is set.
    pub async fn tick(&mut self, location: Option<Coordinate>) -> Option<MissionNotice> {
        if let Some(coord) = location {
            self.board.set_current_location(coord);
        }
        let _ = self.refresh_missions().await;
        let matched = self.board.match_current_location()?;
        let mission_id = matched.id;
        let location_name = matched.location.name.clone();
        let phase = matched.phase;

        if phase != MissionPhase::Pending {
            if self.cfg.notify_once {
                return None;
            }
        } else if let Err(err) = self.board.mark_notified(mission_id) {
            warn!("could not mark mission {mission_id} as notified: {err}");
        }
        info!("arrived at {location_name} (mission {mission_id})");
        Some(MissionNotice::Arrival {
            mission_id,
            location_name,
        })
    }

    /// Run the polling loop until `shutdown` flips to true or its sender is
    /// dropped. Each emitted notice is handed to `on_notice`.
    pub async fn run_detection<P: LocationProvider>(
        &mut self,
        provider: &P,
        shutdown: &mut watch::Receiver<bool>,
        mut on_notice: impl FnMut(&MissionNotice) + Send,
    ) {
        let mut interval = tokio::time::interval(self.cfg.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "mission detection running every {} s",
            self.cfg.poll_interval_secs
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let location = provider.current_location().await;
                    if let Some(notice) = self.tick(location).await {
                        on_notice(&notice);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("mission detection stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Drive the unlock handshake for a mission (spot) id.
    ///
    /// Finds the course containing the spot, resolves the unlock target,
    /// parks the board mission in `AwaitingAck`, and sends the PATCH. The
    /// mission completes only on a backend ack; a failed ack rolls it back
    /// to `Pending`. Returns whether the backend acknowledged. When no
    /// course contains the spot the board is left untouched.
    pub async fn complete_mission(
        &mut self,
        mission_id: u64,
        selected_photo_id: Option<u64>,
    ) -> bool {
        let routes = match self.api.user_routes().await {
            Ok(routes) => routes,
            Err(err) => {
                warn!("course fetch failed during completion: {err}");
                return false;
            }
        };
        let Some(route) = routes.iter().find(|r| r.contains_spot(mission_id)) else {
            warn!("no course contains spot {mission_id}");
            return false;
        };
        let detail = match self.api.route_detail(route.route_id).await {
            Ok(detail) => detail,
            Err(err) => {
                warn!("route detail fetch failed for course {}: {err}", route.route_id);
                return false;
            }
        };
        let Some(target) =
            course::resolve_unlock_target(&route.spots, &detail.route_spots, mission_id)
        else {
            warn!(
                "could not resolve an unlock target for spot {mission_id} in course {}",
                route.route_id
            );
            return false;
        };
        if target.fallback {
            warn!(
                "unlock target for spot {mission_id} chosen by fallback heuristic \
                 (user route spot {})",
                target.user_route_spot_id
            );
        }

        let on_board = self.board.get(mission_id).is_some();
        if on_board {
            if let Err(err) = self.board.begin_completion(mission_id, selected_photo_id) {
                warn!("mission {mission_id} cannot enter completion: {err}");
                return false;
            }
        }

        let request = UnlockRequest {
            id: target.user_route_spot_id,
            unlock_at: Utc::now(),
        };
        match self.api.unlock_route_spot(target.route_spot_id, &request).await {
            Ok(()) => {
                if on_board {
                    if let Err(err) = self.board.acknowledge(mission_id) {
                        warn!("mission {mission_id} ack bookkeeping failed: {err}");
                    }
                }
                info!("spot {mission_id} unlocked in course {}", route.route_id);
                true
            }
            Err(err) => {
                warn!("unlock failed for spot {mission_id}: {err}");
                if on_board {
                    if let Err(err) = self.board.rollback(mission_id) {
                        warn!("mission {mission_id} rollback failed: {err}");
                    }
                }
                false
            }
        }
    }

    /// Mark a collected stamp as used. Best-effort; returns whether the
    /// backend accepted it.
    pub async fn use_stamp(&self, user_route_spot_id: u64) -> bool {
        let request = StampRequest {
            id: user_route_spot_id,
            is_used: true,
        };
        match self.api.use_stamp(&request).await {
            Ok(()) => {
                info!("stamp {user_route_spot_id} used");
                true
            }
            Err(err) => {
                warn!("could not use stamp {user_route_spot_id}: {err}");
                false
            }
        }
    }

    /// One chatbot turn. Asks the backend first and degrades to the builtin
    /// script when it is unreachable, so the guide keeps answering offline.
    pub async fn chat(&self, question: &str, location: Option<Coordinate>) -> String {
        let request = ChatRequest {
            user_question: question.to_string(),
            user_id: self.user_id.clone(),
            lat: location.map(|c| c.lat),
            lng: location.map(|c| c.lng),
        };
        match self.api.chat(&request).await {
            Ok(answer) => answer.ai_answer,
            Err(err) => {
                info!("backend chatbot unavailable ({err}), using the scripted reply");
                self.script.reply_to(question).text.to_string()
            }
        }
    }

    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.script.greeting
    }
}

fn anonymous_user_id() -> String {
    let suffix: u32 = rand::random();
    format!("guest-{suffix:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::spawn_server;
    use hyper::{Body, Method, Request, Response, StatusCode};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DAEBUL: Coordinate = Coordinate::new(37.4563, 126.7052);

    const USER_ROUTES: &str = r#"[{"route_id":5,"spots":[
        {"id":10,"order":1,"unlock_at":null,"is_used":false,
         "route_id":5,"route_spot_id":20,"spot_id":101},
        {"id":11,"order":2,"unlock_at":null,"is_used":false,
         "route_id":5,"route_spot_id":21,"spot_id":102}]}]"#;

    const SPOTS: &str = r#"[
        {"id":101,"name":"Daebul Hotel","lat":37.4563,"lng":126.7052,
         "address":null,"past_image_url":"https://img.example/101.jpg","is_mission":true},
        {"id":102,"name":"Incheon Grand Park","lat":37.4583,"lng":126.7449,
         "address":null,"past_image_url":null,"is_mission":true}]"#;

    const ROUTE_DETAIL: &str = r#"{"id":5,"mission_available":true,"route_spots":[
        {"id":20,"spot_id":101,"order":1},
        {"id":21,"spot_id":102,"order":2}]}"#;

    fn backend(unlock_status: StatusCode) -> impl Fn(Request<Body>) -> Response<Body> + Clone + Send + Sync + 'static
    {
        move |req| {
            let get = req.method() == Method::GET;
            let patch = req.method() == Method::PATCH;
            let path = req.uri().path();
            if get && path == "/v1/courses/user_routes/" {
                Response::new(Body::from(USER_ROUTES))
            } else if get && path == "/v1/spots/" {
                Response::new(Body::from(SPOTS))
            } else if get && path == "/v1/courses/5/" {
                Response::new(Body::from(ROUTE_DETAIL))
            } else if patch && path == "/v1/courses/use_stamp/" {
                Response::new(Body::empty())
            } else if patch && path.starts_with("/v1/courses/unlock_route_spot/") {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = unlock_status;
                response
            } else {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NOT_FOUND;
                response
            }
        }
    }

    async fn service_against(base: String) -> MissionService {
        MissionService::new(ApiClient::new(base), DetectionConfig::default())
            .expect("default config is valid")
    }

    #[tokio::test]
    async fn refresh_projects_the_single_frontier_mission() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let mut service = service_against(base).await;

        let missions = service.refresh_missions().await;
        assert_eq!(missions.len(), 1, "one mission per course frontier");
        assert_eq!(missions[0].id, 101);
        assert_eq!(missions[0].route_id, Some(5));
        assert_eq!(missions[0].phase, MissionPhase::Pending);
        assert_eq!(
            missions[0].historical_photos.len(),
            1,
            "only spots with past images enter the photo pool"
        );
    }

    #[tokio::test]
    async fn refresh_failure_empties_the_frontier() {
        let mut service = service_against("http://127.0.0.1:9".to_string()).await;
        assert!(service.refresh_missions().await.is_empty());
        assert!(service.board().active().is_empty());
    }

    #[tokio::test]
    async fn superseded_generation_is_discarded() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let mut service = service_against(base).await;

        let stale_generation = service.bump_generation();
        let missions = service.refresh_missions().await;
        assert_eq!(missions.len(), 1);

        // A projection computed before the refresh must not clobber it.
        let discarded = service.apply_refresh(stale_generation, Vec::new());
        assert!(discarded.is_empty());
        assert_eq!(service.board().active().len(), 1, "newer frontier survives");
    }

    #[tokio::test]
    async fn tick_notifies_once_per_mission() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let mut service = service_against(base).await;

        let first = service.tick(Some(DAEBUL)).await;
        assert!(
            matches!(first, Some(MissionNotice::Arrival { mission_id: 101, .. })),
            "first tick at the spot raises an arrival"
        );
        let second = service.tick(Some(DAEBUL)).await;
        assert!(second.is_none(), "repeat arrival is suppressed");
        assert_eq!(service.board().active()[0].phase, MissionPhase::Notified);
    }

    #[tokio::test]
    async fn tick_away_from_everything_is_quiet() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let mut service = service_against(base).await;
        // Wolmido, ~10 km from the frontier spot.
        let notice = service.tick(Some(Coordinate::new(37.4667, 126.5833))).await;
        assert!(notice.is_none());
    }

    #[tokio::test]
    async fn complete_mission_acks_and_moves_to_completed() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let mut service = service_against(base).await;
        service.refresh_missions().await;

        assert!(service.complete_mission(101, Some(101)).await);
        assert!(service.board().active().is_empty());
        assert_eq!(service.board().completed().len(), 1);
        assert_eq!(service.board().completed()[0].selected_photo_id, Some(101));
    }

    #[tokio::test]
    async fn failed_unlock_rolls_the_mission_back() {
        let base = spawn_server(backend(StatusCode::INTERNAL_SERVER_ERROR)).await;
        let mut service = service_against(base).await;
        service.refresh_missions().await;

        assert!(!service.complete_mission(101, Some(101)).await);
        assert_eq!(service.board().active().len(), 1);
        assert_eq!(
            service.board().active()[0].phase,
            MissionPhase::Pending,
            "failed ack returns the mission to pending"
        );
    }

    #[tokio::test]
    async fn completing_an_unknown_spot_leaves_the_board_alone() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let mut service = service_against(base).await;
        service.refresh_missions().await;

        assert!(!service.complete_mission(999, None).await);
        assert_eq!(service.board().active().len(), 1);
        assert_eq!(service.board().active()[0].phase, MissionPhase::Pending);
    }

    #[tokio::test]
    async fn stamp_use_is_best_effort() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let service = service_against(base).await;
        assert!(service.use_stamp(10).await);

        let offline = service_against("http://127.0.0.1:9".to_string()).await;
        assert!(!offline.use_stamp(10).await, "failure reports false, never panics");
    }

    #[test]
    fn chat_falls_back_to_the_script_offline() {
        tokio_test::block_on(async {
            let mut service = service_against("http://127.0.0.1:9".to_string()).await;
            service = service.with_user_id("guest-test");
            let reply = service.chat("how do missions work?", None).await;
            assert!(!reply.is_empty(), "scripted fallback always answers");
        });
    }

    #[tokio::test]
    async fn detection_loop_stops_on_shutdown() {
        let mut service = service_against("http://127.0.0.1:9".to_string()).await;
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).expect("receiver is alive");

        let mut notices = 0usize;
        tokio::time::timeout(
            Duration::from_secs(5),
            service.run_detection(&FixedLocation(DAEBUL), &mut rx, |_| notices += 1),
        )
        .await
        .expect("loop honors the shutdown signal");
        assert_eq!(notices, 0);
    }

    #[tokio::test]
    async fn detection_loop_emits_arrivals() {
        let base = spawn_server(backend(StatusCode::OK)).await;
        let cfg = DetectionConfig {
            poll_interval_secs: 1,
            ..DetectionConfig::default()
        };
        let mut service = MissionService::new(ApiClient::new(base), cfg).expect("valid config");

        let (tx, mut rx) = watch::channel(false);
        let notices = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&notices);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = tx.send(true);
        });
        service
            .run_detection(&FixedLocation(DAEBUL), &mut rx, |notice| {
                assert!(matches!(notice, MissionNotice::Arrival { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        stopper.await.expect("stopper finishes");
        assert_eq!(
            notices.load(Ordering::SeqCst),
            1,
            "the immediate first tick notifies exactly once"
        );
    }
}
