//! Intel markers: the server-backed marker set and the marker editor.

use bevy::ecs::schedule::IntoScheduleConfigs;
use bevy::input::keyboard::{Key, KeyboardInput};
use bevy::prelude::*;
use bevy::tasks::{block_on, futures_lite::future, IoTaskPool, Task};

use crate::api::{ApiClient, ApiError};
use crate::hit_test::{nearest_marker, nearest_system};
use crate::plugins::core::{edit_text, EventLog, GameState, InputBindings, KeyboardFocus};
use crate::world::{Galaxy, IntelMarker, MarkerKind};

pub struct IntelPlugin;

impl Plugin for IntelPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MarkerStore>()
            .init_resource::<MarkerEditor>()
            .init_resource::<MarkerTasks>()
            .add_systems(OnEnter(GameState::InGame), start_marker_fetch)
            .add_systems(
                Update,
                (
                    handle_marker_editor_keys,
                    poll_marker_tasks,
                )
                    .chain()
                    .run_if(in_state(GameState::InGame)),
            );
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Markers confirmed by the server. Pending markers never live here.
#[derive(Resource, Debug, Default)]
pub struct MarkerStore {
    markers: Vec<IntelMarker>,
}

impl MarkerStore {
    pub fn markers(&self) -> &[IntelMarker] {
        &self.markers
    }

    pub fn replace_all(&mut self, markers: Vec<IntelMarker>) {
        self.markers = markers.into_iter().filter(|marker| marker.id.is_some()).collect();
    }

    /// Inserts or replaces by id. Returns false for markers without an id.
    pub fn upsert(&mut self, marker: IntelMarker) -> bool {
        let Some(id) = marker.id else {
            return false;
        };
        match self.markers.iter_mut().find(|existing| existing.id == Some(id)) {
            Some(existing) => *existing = marker,
            None => self.markers.push(marker),
        }
        true
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.markers.len();
        self.markers.retain(|marker| marker.id != Some(id));
        self.markers.len() != before
    }
}

#[derive(Resource, Debug, Default)]
pub struct MarkerEditor {
    editing: Option<IntelMarker>,
    saving: bool,
}

impl MarkerEditor {
    pub fn is_open(&self) -> bool {
        self.editing.is_some()
    }

    pub fn editing(&self) -> Option<&IntelMarker> {
        self.editing.as_ref()
    }

    /// The marker under edit when it has not been persisted yet.
    pub fn pending_marker(&self) -> Option<&IntelMarker> {
        self.editing.as_ref().filter(|marker| marker.id.is_none())
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Persisted markers can only be viewed or deleted; the server has no update.
    pub fn is_read_only(&self) -> bool {
        self.editing.as_ref().is_some_and(|marker| marker.id.is_some())
    }

    /// Opens the editor for the marker near `world`, or for a new pending
    /// marker attached to the nearest system.
    pub fn open_at(&mut self, world: Vec2, store: &MarkerStore, galaxy: &Galaxy, scale: f32) {
        let marker = match nearest_marker(world, store.markers(), scale) {
            Some(existing) => existing.clone(),
            None => {
                let system_id =
                    nearest_system(world, galaxy.systems(), scale).map(|system| system.id);
                IntelMarker::pending(world, system_id)
            }
        };
        self.editing = Some(marker);
        self.saving = false;
    }

    pub fn cycle_kind(&mut self) -> bool {
        match self.editing.as_mut() {
            Some(marker) if marker.id.is_none() => {
                marker.kind = next_kind(marker.kind);
                true
            }
            _ => false,
        }
    }

    /// Applies a typed key to the pending marker's note.
    pub fn edit_note(&mut self, key: &Key) -> bool {
        match self.editing.as_mut() {
            Some(marker) if marker.id.is_none() => edit_text(&mut marker.note, key),
            _ => false,
        }
    }

    pub fn close(&mut self) -> Option<IntelMarker> {
        self.saving = false;
        self.editing.take()
    }
}

pub fn next_kind(kind: MarkerKind) -> MarkerKind {
    let index = MarkerKind::ALL
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or(0);
    MarkerKind::ALL[(index + 1) % MarkerKind::ALL.len()]
}

#[derive(Resource, Default)]
pub struct MarkerTasks {
    fetch: Option<Task<Result<Vec<IntelMarker>, ApiError>>>,
    save: Option<Task<Result<IntelMarker, ApiError>>>,
    deletes: Vec<(u64, Task<Result<(), ApiError>>)>,
}

impl MarkerTasks {
    /// Reloads the whole marker set, superseding any fetch in flight.
    pub fn fetch_all(&mut self, client: &ApiClient) {
        let client = client.clone();
        let task = IoTaskPool::get().spawn(async move { client.fetch_markers() });
        if let Some(previous) = self.fetch.replace(task) {
            previous.detach();
        }
    }
}

// =============================================================================
// Systems
// =============================================================================

pub fn start_marker_fetch(client: Option<Res<ApiClient>>, mut tasks: ResMut<MarkerTasks>) {
    if let Some(client) = client {
        tasks.fetch_all(&client);
    }
}

#[allow(deprecated)]
fn handle_marker_editor_keys(
    mut key_events: EventReader<KeyboardInput>,
    bindings: Res<InputBindings>,
    client: Option<Res<ApiClient>>,
    mut editor: ResMut<MarkerEditor>,
    mut tasks: ResMut<MarkerTasks>,
    mut focus: ResMut<KeyboardFocus>,
    mut log: ResMut<EventLog>,
) {
    for event in key_events.read() {
        // Drained even while closed so keys never replay into a later edit.
        if !event.state.is_pressed() || !editor.is_open() || editor.is_saving() {
            continue;
        }
        let key = event.key_code;

        if key == bindings.cancel {
            editor.close();
            *focus = KeyboardFocus::Map;
        } else if key == bindings.cycle_focus {
            editor.cycle_kind();
        } else if key == bindings.confirm {
            match editor.editing().cloned() {
                Some(marker) if marker.id.is_none() => {
                    let Some(client) = client.as_deref() else {
                        log.push("Marker not saved: offline".to_string());
                        continue;
                    };
                    let client = client.clone();
                    tasks.save = Some(
                        IoTaskPool::get().spawn(async move { client.create_marker(&marker) }),
                    );
                    editor.saving = true;
                }
                _ => {
                    editor.close();
                    *focus = KeyboardFocus::Map;
                }
            }
        } else if key == bindings.delete_marker {
            let Some(id) = editor.editing().and_then(|marker| marker.id) else {
                continue;
            };
            let Some(client) = client.as_deref() else {
                log.push("Marker not deleted: offline".to_string());
                continue;
            };
            let client = client.clone();
            tasks
                .deletes
                .push((id, IoTaskPool::get().spawn(async move { client.delete_marker(id) })));
            editor.close();
            *focus = KeyboardFocus::Map;
        } else if !matches!(event.logical_key, Key::Tab | Key::Enter | Key::Escape) {
            editor.edit_note(&event.logical_key);
        }
    }
}

fn poll_marker_tasks(
    mut tasks: ResMut<MarkerTasks>,
    mut store: ResMut<MarkerStore>,
    mut editor: ResMut<MarkerEditor>,
    mut focus: ResMut<KeyboardFocus>,
    mut log: ResMut<EventLog>,
) {
    if let Some(result) = tasks.fetch.as_mut().and_then(|task| block_on(future::poll_once(task))) {
        tasks.fetch = None;
        match result {
            Ok(markers) => {
                info!("Loaded {} intel markers", markers.len());
                store.replace_all(markers);
            }
            Err(error) => {
                warn!("Intel fetch failed: {}", error);
                log.push(format!("Intel fetch failed: {}", error));
            }
        }
    }

    if let Some(result) = tasks.save.as_mut().and_then(|task| block_on(future::poll_once(task))) {
        tasks.save = None;
        if apply_saved_marker(result, &mut store, &mut editor, &mut log) {
            *focus = KeyboardFocus::Map;
        }
    }

    let mut finished = Vec::new();
    tasks.deletes.retain_mut(|(id, task)| match block_on(future::poll_once(task)) {
        Some(result) => {
            finished.push((*id, result));
            false
        }
        None => true,
    });
    for (id, result) in finished {
        apply_deleted_marker(id, result, &mut store, &mut log);
    }
}

/// Returns true when the editor was closed.
pub fn apply_saved_marker(
    result: Result<IntelMarker, ApiError>,
    store: &mut MarkerStore,
    editor: &mut MarkerEditor,
    log: &mut EventLog,
) -> bool {
    editor.saving = false;
    match result {
        Ok(saved) if store.upsert(saved.clone()) => {
            info!("Saved intel marker {:?}", saved.id);
            log.push(format!("Marker saved: {}", saved.kind.label()));
            editor.close();
            true
        }
        Ok(_) => {
            warn!("Server returned a marker without an id");
            log.push("Marker save failed: no id".to_string());
            false
        }
        Err(error) => {
            warn!("Marker save failed: {}", error);
            log.push(format!("Marker save failed: {}", error));
            false
        }
    }
}

pub fn apply_deleted_marker(
    id: u64,
    result: Result<(), ApiError>,
    store: &mut MarkerStore,
    log: &mut EventLog,
) {
    match result {
        Ok(()) => {
            store.remove(id);
            log.push(format!("Marker {} deleted", id));
        }
        Err(error) => {
            warn!("Marker delete failed: {}", error);
            log.push(format!("Marker delete failed: {}", error));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
