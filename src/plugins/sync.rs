//! Server synchronisation: snapshot loading, resync and center-on-me.

use bevy::ecs::schedule::IntoScheduleConfigs;
use bevy::prelude::*;
use bevy::tasks::{block_on, futures_lite::future, IoTaskPool, Task};
use bevy::window::PrimaryWindow;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{ApiClient, ApiError, MapDataService, SessionStatus};
use crate::plugins::core::{
    keyboard_on_map, EventLog, GameState, InputBindings, MapConfig, MapInteraction,
};
use crate::plugins::intel::MarkerTasks;
use crate::plugins::planner::PathService;
use crate::plugins::render2d::ViewTransform;
use crate::world::{Galaxy, SystemId};

pub struct SyncPlugin;

impl Plugin for SyncPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Galaxy>()
            .init_resource::<SyncTasks>()
            .add_systems(PreStartup, setup_api_client)
            .add_systems(OnEnter(GameState::Loading), start_initial_sync)
            .add_systems(Update, poll_snapshot_task)
            .add_systems(
                Update,
                (
                    (handle_resync_key, handle_center_key).run_if(keyboard_on_map),
                    poll_status_task,
                )
                    .chain()
                    .run_if(in_state(GameState::InGame)),
            );
    }
}

#[derive(Resource, Default)]
pub struct SyncTasks {
    snapshot: Option<Task<SnapshotFetch>>,
    status: Option<Task<Result<SessionStatus, ApiError>>>,
}

impl SyncTasks {
    pub fn is_syncing(&self) -> bool {
        self.snapshot.is_some()
    }

    fn fetch_snapshot(&mut self, client: &ApiClient) {
        let client = client.clone();
        self.snapshot = Some(IoTaskPool::get().spawn(async move { load_snapshot(&client) }));
    }

    fn resync(&mut self, client: &ApiClient) {
        let client = client.clone();
        self.snapshot = Some(IoTaskPool::get().spawn(async move { refresh_snapshot(&client) }));
    }
}

/// Outcome of one snapshot load. `pulled` is set only when the server was
/// asked to refresh its own data first.
pub struct SnapshotFetch {
    pub pulled: Option<Result<String, ApiError>>,
    pub snapshot: Result<Galaxy, ApiError>,
}

pub fn load_snapshot(source: &dyn MapDataService) -> SnapshotFetch {
    SnapshotFetch {
        pulled: None,
        snapshot: source.fetch_snapshot(),
    }
}

/// Triggers a server-side pull, then re-reads the map either way.
///
/// A failed pull still leaves the server's last data worth showing.
pub fn refresh_snapshot(source: &dyn MapDataService) -> SnapshotFetch {
    let pulled = source.trigger_sync();
    SnapshotFetch {
        pulled: Some(pulled),
        snapshot: source.fetch_snapshot(),
    }
}

/// Event log line for a server-side pull, if one happened.
pub fn pull_log_line(pulled: &Option<Result<String, ApiError>>) -> Option<String> {
    match pulled {
        Some(Ok(message)) => Some(format!("Server: {}", message)),
        Some(Err(error)) => Some(format!("Server sync failed: {}", error)),
        None => None,
    }
}

// =============================================================================
// Snapshot Application
// =============================================================================

/// Systems present in `next` but not in `previous`. The first load marks nothing.
pub fn newly_synced_ids(previous: &Galaxy, next: &Galaxy) -> HashSet<SystemId> {
    if previous.is_empty() {
        return HashSet::new();
    }
    let known = previous.ids();
    next.ids().difference(&known).copied().collect()
}

/// Swaps in a fresh snapshot and prunes interaction state that refers to
/// systems that no longer exist.
pub fn apply_snapshot(
    galaxy: &mut Galaxy,
    next: Galaxy,
    interaction: &mut MapInteraction,
    now: Duration,
    newly_synced_for: Duration,
) -> usize {
    let fresh = newly_synced_ids(galaxy, &next);
    let count = fresh.len();
    interaction.retain_known(&next.ids());
    if count > 0 {
        interaction.mark_newly_synced(fresh, now + newly_synced_for);
    }
    *galaxy = next;
    count
}

/// Where center-on-me should go, if anywhere.
pub fn locate_player(status: &SessionStatus, galaxy: &Galaxy) -> Result<(SystemId, Vec2), String> {
    if !status.logged_in {
        return Err("not logged in".to_string());
    }
    let id = status
        .current_system_id
        .ok_or_else(|| "current location unknown".to_string())?;
    let point = galaxy
        .point_of(id)
        .ok_or_else(|| format!("system {} is not on the map", id))?;
    Ok((id, point))
}

// =============================================================================
// Systems
// =============================================================================

fn setup_api_client(mut commands: Commands, config: Res<MapConfig>, mut log: ResMut<EventLog>) {
    match ApiClient::new(&config.api_base_url) {
        Ok(client) => {
            commands.insert_resource(PathService(Arc::new(client.clone())));
            commands.insert_resource(client);
        }
        Err(error) => {
            error!("Could not create HTTP client: {}", error);
            log.push(format!("Offline: {}", error));
        }
    }
}

fn start_initial_sync(
    client: Option<Res<ApiClient>>,
    mut tasks: ResMut<SyncTasks>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    match client {
        Some(client) => {
            info!("Fetching star map from {}", client.base_url());
            tasks.fetch_snapshot(&client);
        }
        None => next_state.set(GameState::InGame),
    }
}

#[allow(clippy::too_many_arguments)]
fn poll_snapshot_task(
    time: Res<Time>,
    config: Res<MapConfig>,
    state: Res<State<GameState>>,
    mut tasks: ResMut<SyncTasks>,
    mut galaxy: ResMut<Galaxy>,
    mut interaction: ResMut<MapInteraction>,
    mut next_state: ResMut<NextState<GameState>>,
    mut log: ResMut<EventLog>,
) {
    let Some(task) = tasks.snapshot.as_mut() else {
        return;
    };
    let Some(fetch) = block_on(future::poll_once(task)) else {
        return;
    };
    tasks.snapshot = None;

    if let Some(line) = pull_log_line(&fetch.pulled) {
        match &fetch.pulled {
            Some(Err(error)) => warn!("Server-side sync failed: {}", error),
            _ => info!("Server-side sync finished"),
        }
        log.push(line);
    }

    match fetch.snapshot {
        Ok(next) => {
            let total = next.systems().len();
            let fresh = apply_snapshot(
                &mut galaxy,
                next,
                &mut interaction,
                time.elapsed(),
                config.newly_synced_duration(),
            );
            info!("Synced {} systems ({} new)", total, fresh);
            log.push(format!("Synced {} systems, {} new", total, fresh));
        }
        Err(error) => {
            error!("Star map sync failed: {}", error);
            log.push(format!("Sync failed: {}", error));
        }
    }

    if *state.get() == GameState::Loading {
        next_state.set(GameState::InGame);
    }
}

fn handle_resync_key(
    input: Res<ButtonInput<KeyCode>>,
    bindings: Res<InputBindings>,
    client: Option<Res<ApiClient>>,
    mut tasks: ResMut<SyncTasks>,
    mut marker_tasks: ResMut<MarkerTasks>,
    mut log: ResMut<EventLog>,
) {
    if !input.just_pressed(bindings.resync) {
        return;
    }
    let Some(client) = client else {
        log.push("Resync unavailable: offline".to_string());
        return;
    };
    if tasks.is_syncing() {
        return;
    }
    log.push("Resyncing...".to_string());
    tasks.resync(&client);
    marker_tasks.fetch_all(&client);
}

fn handle_center_key(
    input: Res<ButtonInput<KeyCode>>,
    bindings: Res<InputBindings>,
    client: Option<Res<ApiClient>>,
    mut tasks: ResMut<SyncTasks>,
    mut log: ResMut<EventLog>,
) {
    if !input.just_pressed(bindings.center_on_me) {
        return;
    }
    let Some(client) = client else {
        log.push("Center unavailable: offline".to_string());
        return;
    };
    let client = client.clone();
    tasks.status = Some(IoTaskPool::get().spawn(async move { client.status() }));
}

#[allow(clippy::too_many_arguments)]
fn poll_status_task(
    time: Res<Time>,
    config: Res<MapConfig>,
    galaxy: Res<Galaxy>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut tasks: ResMut<SyncTasks>,
    mut view: ResMut<ViewTransform>,
    mut interaction: ResMut<MapInteraction>,
    mut log: ResMut<EventLog>,
) {
    let Some(task) = tasks.status.as_mut() else {
        return;
    };
    let Some(result) = block_on(future::poll_once(task)) else {
        return;
    };
    tasks.status = None;

    let located = result
        .map_err(|error| error.to_string())
        .and_then(|status| locate_player(&status, &galaxy));
    match located {
        Ok((id, point)) => {
            let viewport = windows
                .single()
                .map(|window| Vec2::new(window.width(), window.height()))
                .unwrap_or(Vec2::new(1280.0, 720.0));
            let now = time.elapsed();
            view.center_on(point, viewport);
            interaction.set_highlight(id, Some(now + config.highlight_duration()));
            interaction.start_ping(id, now);
            let name = galaxy.get(id).map(|system| system.label()).unwrap_or_default();
            log.push(format!("Centered on {}", name));
        }
        Err(reason) => {
            warn!("Center on me failed: {}", reason);
            log.push(format!("Center failed: {}", reason));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::StarSystem;
    use std::sync::Mutex;

    fn galaxy(ids: &[SystemId]) -> Galaxy {
        Galaxy::from_parts(
            ids.iter()
                .map(|id| StarSystem::new(*id, format!("S{}", id), Some(*id as f32 * 10.0), 0.0))
                .collect(),
            Vec::new(),
        )
    }

    #[test]
    fn first_load_marks_nothing_new() {
        assert!(newly_synced_ids(&Galaxy::default(), &galaxy(&[1, 2])).is_empty());
    }

    #[test]
    fn resync_marks_added_systems() {
        let fresh = newly_synced_ids(&galaxy(&[1, 2]), &galaxy(&[1, 2, 3, 4]));
        assert_eq!(fresh, HashSet::from([3, 4]));
    }

    #[test]
    fn apply_snapshot_prunes_vanished_systems() {
        let mut current = galaxy(&[1, 2, 3]);
        let mut interaction = MapInteraction::default();
        interaction.hovered = Some(3);
        interaction.set_highlight(3, None);
        interaction.toggle_range(3);
        interaction.toggle_range(1);

        let now = Duration::from_secs(10);
        let fresh = apply_snapshot(
            &mut current,
            galaxy(&[1, 2, 5]),
            &mut interaction,
            now,
            Duration::from_secs(8),
        );

        assert_eq!(fresh, 1);
        assert_eq!(interaction.hovered, None);
        assert_eq!(interaction.highlighted(), None);
        assert!(interaction.toggled.contains(&1));
        assert!(!interaction.toggled.contains(&3));
        assert_eq!(interaction.newly_synced, HashSet::from([5]));
        assert_eq!(interaction.newly_synced_until, Some(Duration::from_secs(18)));
        assert!(current.get(5).is_some());
    }

    #[test]
    fn unchanged_resync_clears_nothing() {
        let mut current = galaxy(&[1, 2]);
        let mut interaction = MapInteraction::default();
        let fresh = apply_snapshot(
            &mut current,
            galaxy(&[1, 2]),
            &mut interaction,
            Duration::ZERO,
            Duration::from_secs(8),
        );
        assert_eq!(fresh, 0);
        assert!(interaction.newly_synced_until.is_none());
    }

    #[test]
    fn locate_player_requires_login_and_known_system() {
        let map = galaxy(&[1, 2]);
        let logged_out = SessionStatus::default();
        assert!(locate_player(&logged_out, &map).is_err());

        let unknown = SessionStatus {
            logged_in: true,
            username: Some("pilot".to_string()),
            current_system_id: Some(99),
        };
        assert!(locate_player(&unknown, &map).is_err());

        let known = SessionStatus {
            current_system_id: Some(2),
            ..unknown
        };
        let located = locate_player(&known, &map);
        assert_eq!(located.map(|(id, _)| id), Ok(2));
    }

    struct FakeServer {
        pull: Result<String, u16>,
        map: Galaxy,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeServer {
        fn new(pull: Result<String, u16>) -> Self {
            Self {
                pull,
                map: galaxy(&[1, 2, 3]),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &'static str) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }
    }

    impl MapDataService for FakeServer {
        fn trigger_sync(&self) -> Result<String, ApiError> {
            self.record("sync");
            self.pull.clone().map_err(|status| ApiError::Status {
                status,
                message: "developer accounts cannot sync".to_string(),
            })
        }

        fn fetch_snapshot(&self) -> Result<Galaxy, ApiError> {
            self.record("systems");
            Ok(self.map.clone())
        }
    }

    #[test]
    fn initial_load_reads_without_pulling() {
        let server = FakeServer::new(Ok("Sync successful!".to_string()));
        let fetch = load_snapshot(&server);
        assert!(fetch.pulled.is_none());
        assert_eq!(server.calls(), vec!["systems"]);
        assert_eq!(pull_log_line(&fetch.pulled), None);
    }

    #[test]
    fn resync_pulls_before_reading() {
        let server = FakeServer::new(Ok("Sync successful!".to_string()));
        let fetch = refresh_snapshot(&server);
        assert_eq!(server.calls(), vec!["sync", "systems"]);
        assert_eq!(fetch.snapshot.map(|map| map.systems().len()).ok(), Some(3));
        assert_eq!(
            pull_log_line(&fetch.pulled).as_deref(),
            Some("Server: Sync successful!")
        );
    }

    #[test]
    fn failed_pull_is_logged_and_map_still_reloads() {
        let server = FakeServer::new(Err(401));
        let fetch = refresh_snapshot(&server);
        assert_eq!(server.calls(), vec!["sync", "systems"]);
        assert!(fetch.snapshot.is_ok());
        let line = pull_log_line(&fetch.pulled).unwrap_or_default();
        assert!(line.starts_with("Server sync failed"), "got {}", line);
        assert!(line.contains("401"));
    }

    #[test]
    fn initial_sync_without_client_goes_straight_to_map() {
        use bevy::ecs::system::SystemState;
        use bevy::state::app::StatesPlugin;

        let mut app = App::new();
        app.add_plugins(StatesPlugin).init_state::<GameState>();
        app.init_resource::<SyncTasks>();
        let world = app.world_mut();

        let mut system_state: SystemState<(
            Option<Res<ApiClient>>,
            ResMut<SyncTasks>,
            ResMut<NextState<GameState>>,
        )> = SystemState::new(world);
        let (client, tasks, next_state) = system_state.get_mut(world);
        start_initial_sync(client, tasks, next_state);
        system_state.apply(world);

        assert!(matches!(
            world.resource::<NextState<GameState>>(),
            NextState::Pending(GameState::InGame)
        ));
    }
}
