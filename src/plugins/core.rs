use bevy::input::keyboard::Key;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::compat::{NodeBundle, TextBundle, TextStyle};
use crate::plugins::saveload::{read_ron, StorageError};
use crate::world::SystemId;

pub struct CorePlugin;

pub const CONFIG_PATH: &str = "starmap.ron";
pub const API_URL_ENV: &str = "STARMAP_API_URL";

// =============================================================================
// Configuration
// =============================================================================

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub api_base_url: String,
    pub storage_dir: String,
    pub view_storage_key: String,
    pub highlight_seconds: f32,
    pub newly_synced_seconds: f32,
    pub ping_seconds: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".to_string(),
            storage_dir: "saves".to_string(),
            view_storage_key: "starmap.view".to_string(),
            highlight_seconds: 5.0,
            newly_synced_seconds: 8.0,
            ping_seconds: 1.6,
        }
    }
}

impl MapConfig {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        Ok(read_ron::<MapConfig>(path)?.unwrap_or_default())
    }

    pub fn with_api_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        self
    }

    pub fn highlight_duration(&self) -> Duration {
        seconds(self.highlight_seconds, 5.0)
    }

    pub fn newly_synced_duration(&self) -> Duration {
        seconds(self.newly_synced_seconds, 8.0)
    }

    pub fn ping_duration(&self) -> Duration {
        seconds(self.ping_seconds, 1.6)
    }
}

fn seconds(value: f32, fallback: f32) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f32(value)
    } else {
        Duration::from_secs_f32(fallback)
    }
}

fn startup_config() -> MapConfig {
    let config = match MapConfig::load(Path::new(CONFIG_PATH)) {
        Ok(config) => config,
        Err(error) => {
            warn!("Config unreadable, using defaults: {}", error);
            MapConfig::default()
        }
    };
    config.with_api_override(std::env::var(API_URL_ENV).ok())
}

// =============================================================================
// Settings and Interaction State
// =============================================================================

#[derive(Resource, Debug, Clone, PartialEq)]
pub struct MapSettings {
    pub show_ranges: bool,
    pub show_wormholes: bool,
    pub show_unclaimed: bool,
    pub show_labels: bool,
    pub avoid_slow: bool,
    pub avoid_hostile: bool,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            show_ranges: true,
            show_wormholes: true,
            show_unclaimed: false,
            show_labels: true,
            avoid_slow: false,
            avoid_hostile: false,
        }
    }
}

impl MapSettings {
    pub fn avoidance(&self) -> crate::api::Avoidance {
        crate::api::Avoidance {
            avoid_slow: self.avoid_slow,
            avoid_hostile: self.avoid_hostile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Highlight {
    pub id: SystemId,
    /// `None` keeps the highlight until it is replaced.
    pub expires_at: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ping {
    pub id: SystemId,
    pub started_at: Duration,
}

#[derive(Resource, Debug, Default, Clone, PartialEq)]
pub struct MapInteraction {
    pub hovered: Option<SystemId>,
    pub highlight: Option<Highlight>,
    pub toggled: HashSet<SystemId>,
    pub newly_synced: HashSet<SystemId>,
    pub newly_synced_until: Option<Duration>,
    pub ping: Option<Ping>,
}

impl MapInteraction {
    pub fn highlighted(&self) -> Option<SystemId> {
        self.highlight.map(|highlight| highlight.id)
    }

    pub fn set_highlight(&mut self, id: SystemId, expires_at: Option<Duration>) {
        self.highlight = Some(Highlight { id, expires_at });
    }

    pub fn clear_highlight(&mut self) {
        self.highlight = None;
    }

    /// Returns whether `id` is pinned after the call.
    pub fn toggle_range(&mut self, id: SystemId) -> bool {
        if self.toggled.remove(&id) {
            false
        } else {
            self.toggled.insert(id);
            true
        }
    }

    pub fn mark_newly_synced(&mut self, ids: HashSet<SystemId>, until: Duration) {
        self.newly_synced_until = if ids.is_empty() { None } else { Some(until) };
        self.newly_synced = ids;
    }

    /// Starting a ping replaces whatever ping is running.
    pub fn start_ping(&mut self, id: SystemId, now: Duration) {
        self.ping = Some(Ping { id, started_at: now });
    }

    pub fn needs_expiry(&self, now: Duration, ping_duration: Duration) -> bool {
        let highlight = matches!(
            self.highlight,
            Some(Highlight { expires_at: Some(at), .. }) if now >= at
        );
        let synced = matches!(self.newly_synced_until, Some(until) if now >= until);
        let ping = matches!(self.ping, Some(ping) if now >= ping.started_at + ping_duration);
        highlight || synced || ping
    }

    pub fn expire(&mut self, now: Duration, ping_duration: Duration) {
        if let Some(Highlight {
            expires_at: Some(at), ..
        }) = self.highlight
        {
            if now >= at {
                self.highlight = None;
            }
        }
        if matches!(self.newly_synced_until, Some(until) if now >= until) {
            self.newly_synced.clear();
            self.newly_synced_until = None;
        }
        if matches!(self.ping, Some(ping) if now >= ping.started_at + ping_duration) {
            self.ping = None;
        }
    }

    /// Drops references to systems missing from a fresh snapshot.
    pub fn retain_known(&mut self, known: &HashSet<SystemId>) {
        if self.hovered.is_some_and(|id| !known.contains(&id)) {
            self.hovered = None;
        }
        if self.highlighted().is_some_and(|id| !known.contains(&id)) {
            self.highlight = None;
        }
        if self.ping.is_some_and(|ping| !known.contains(&ping.id)) {
            self.ping = None;
        }
        self.toggled.retain(|id| known.contains(id));
    }
}

/// Where typed keys go.
#[derive(Resource, Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum KeyboardFocus {
    #[default]
    Map,
    RouteField(usize),
    MarkerNote,
}

impl KeyboardFocus {
    pub fn route_field(&self) -> Option<usize> {
        match self {
            KeyboardFocus::RouteField(index) => Some(*index),
            _ => None,
        }
    }
}

/// Applies one logical key to a text buffer. Returns whether the buffer changed.
pub fn edit_text(buffer: &mut String, key: &Key) -> bool {
    match key {
        Key::Character(text) => {
            let printable = text.chars().filter(|c| !c.is_control()).collect::<String>();
            if printable.is_empty() {
                return false;
            }
            buffer.push_str(&printable);
            true
        }
        Key::Space => {
            buffer.push(' ');
            true
        }
        Key::Backspace => buffer.pop().is_some(),
        _ => false,
    }
}

// =============================================================================
// Event Log
// =============================================================================

#[derive(Resource, Debug)]
pub struct EventLog {
    entries: Vec<String>,
    max_entries: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            max_entries: 8,
        }
    }
}

impl EventLog {
    pub fn push(&mut self, entry: String) {
        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            let overflow = self.entries.len() - self.max_entries;
            self.entries.drain(0..overflow);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

// =============================================================================
// Bindings and States
// =============================================================================

#[derive(Resource, Debug, Clone)]
pub struct InputBindings {
    pub toggle_ranges: KeyCode,
    pub toggle_wormholes: KeyCode,
    pub toggle_unclaimed: KeyCode,
    pub toggle_labels: KeyCode,
    pub toggle_avoid_slow: KeyCode,
    pub toggle_avoid_hostile: KeyCode,
    pub clear_route: KeyCode,
    pub resync: KeyCode,
    pub center_on_me: KeyCode,
    pub cycle_focus: KeyCode,
    pub add_waypoint: KeyCode,
    pub confirm: KeyCode,
    pub cancel: KeyCode,
    pub delete_marker: KeyCode,
}

impl Default for InputBindings {
    fn default() -> Self {
        Self {
            toggle_ranges: KeyCode::KeyR,
            toggle_wormholes: KeyCode::KeyW,
            toggle_unclaimed: KeyCode::KeyU,
            toggle_labels: KeyCode::KeyL,
            toggle_avoid_slow: KeyCode::KeyS,
            toggle_avoid_hostile: KeyCode::KeyH,
            clear_route: KeyCode::KeyC,
            resync: KeyCode::F5,
            center_on_me: KeyCode::Home,
            cycle_focus: KeyCode::Tab,
            add_waypoint: KeyCode::Insert,
            confirm: KeyCode::Enter,
            cancel: KeyCode::Escape,
            delete_marker: KeyCode::Delete,
        }
    }
}

#[derive(States, Debug, Clone, Eq, PartialEq, Hash, Default)]
pub enum GameState {
    #[default]
    Boot,
    Loading,
    InGame,
}

impl Plugin for CorePlugin {
    fn build(&self, app: &mut App) {
        let config = startup_config();
        info!("Map server: {}", config.api_base_url);

        app.init_state::<GameState>()
            .insert_resource(config)
            .init_resource::<InputBindings>()
            .init_resource::<MapSettings>()
            .init_resource::<MapInteraction>()
            .init_resource::<KeyboardFocus>()
            .init_resource::<EventLog>()
            .add_systems(OnEnter(GameState::Boot), log_enter_boot)
            .add_systems(OnEnter(GameState::Boot), transition_to_loading)
            .add_systems(OnEnter(GameState::Loading), setup_loading_screen)
            .add_systems(OnExit(GameState::Loading), teardown_loading_screen)
            .add_systems(OnEnter(GameState::InGame), log_enter_ingame)
            .add_systems(
                Update,
                (
                    handle_settings_toggles.run_if(keyboard_on_map),
                    expire_interaction_state,
                )
                    .run_if(in_state(GameState::InGame)),
            );
    }
}

pub fn keyboard_on_map(focus: Res<KeyboardFocus>) -> bool {
    matches!(*focus, KeyboardFocus::Map)
}

fn log_enter_boot(mut log: ResMut<EventLog>) {
    log.push("State: Boot".to_string());
    info!("State: Boot");
}

fn transition_to_loading(mut next_state: ResMut<NextState<GameState>>) {
    next_state.set(GameState::Loading);
}

fn log_enter_ingame(mut log: ResMut<EventLog>) {
    log.push("State: InGame".to_string());
    info!("State: InGame");
}

#[derive(Component)]
struct LoadingScreen;

fn setup_loading_screen(mut commands: Commands) {
    commands
        .spawn((
            LoadingScreen,
            NodeBundle {
                node: Node {
                    width: Val::Percent(100.0),
                    height: Val::Percent(100.0),
                    align_items: AlignItems::Center,
                    justify_content: JustifyContent::Center,
                    ..default()
                },
                background_color: Color::srgb(0.02, 0.02, 0.04).into(),
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn(TextBundle::from_section(
                "Syncing star map...",
                TextStyle {
                    font_size: 18.0,
                    color: Color::srgb(0.7, 0.75, 0.82),
                    ..default()
                },
            ));
        });
}

fn teardown_loading_screen(mut commands: Commands, screens: Query<Entity, With<LoadingScreen>>) {
    for entity in screens.iter() {
        commands.entity(entity).despawn();
    }
}

fn handle_settings_toggles(
    input: Res<ButtonInput<KeyCode>>,
    bindings: Res<InputBindings>,
    mut settings: ResMut<MapSettings>,
    mut log: ResMut<EventLog>,
) {
    let toggles: [(KeyCode, &str, fn(&mut MapSettings) -> &mut bool); 6] = [
        (bindings.toggle_ranges, "Travel ranges", |s| &mut s.show_ranges),
        (bindings.toggle_wormholes, "Wormholes", |s| &mut s.show_wormholes),
        (bindings.toggle_unclaimed, "Unclaimed systems", |s| &mut s.show_unclaimed),
        (bindings.toggle_labels, "Labels", |s| &mut s.show_labels),
        (bindings.toggle_avoid_slow, "Avoid slow lanes", |s| &mut s.avoid_slow),
        (bindings.toggle_avoid_hostile, "Avoid hostile space", |s| &mut s.avoid_hostile),
    ];

    for (key, label, field) in toggles {
        if input.just_pressed(key) {
            let flag = field(&mut *settings);
            *flag = !*flag;
            let state = if *flag { "on" } else { "off" };
            info!("{}: {}", label, state);
            log.push(format!("{}: {}", label, state));
        }
    }
}

fn expire_interaction_state(
    time: Res<Time>,
    config: Res<MapConfig>,
    mut interaction: ResMut<MapInteraction>,
) {
    let now = time.elapsed();
    let ping_duration = config.ping_duration();
    // Checked through Deref first so idle frames don't trip change detection.
    if interaction.needs_expiry(now, ping_duration) {
        interaction.expire(now, ping_duration);
    }
}
