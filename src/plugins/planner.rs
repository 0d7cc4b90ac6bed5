//! Route planner: the stop input form and route calculation tasks.

use bevy::ecs::schedule::IntoScheduleConfigs;
use bevy::input::keyboard::{Key, KeyboardInput};
use bevy::prelude::*;
use bevy::tasks::{block_on, futures_lite::future, Task};
use std::sync::Arc;

use crate::api::PathfindingService;
use crate::plugins::core::{
    edit_text, EventLog, GameState, InputBindings, KeyboardFocus, MapSettings,
};
use crate::route::{compose_route, Route, RouteError};
use crate::world::Galaxy;

pub struct PlannerPlugin;

impl Plugin for PlannerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RouteForm>()
            .init_resource::<ActiveRoute>()
            .add_systems(
                Update,
                (handle_route_form_keys, poll_route_task)
                    .chain()
                    .run_if(in_state(GameState::InGame)),
            );
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Backend used for pairwise path queries.
#[derive(Resource, Clone)]
pub struct PathService(pub Arc<dyn PathfindingService>);

/// Ordered stop inputs: start, any waypoints, end.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct RouteForm {
    pub stops: Vec<String>,
}

impl Default for RouteForm {
    fn default() -> Self {
        Self {
            stops: vec![String::new(), String::new()],
        }
    }
}

impl RouteForm {
    pub fn fill(&mut self, index: usize, text: impl Into<String>) -> bool {
        match self.stops.get_mut(index) {
            Some(field) => {
                *field = text.into();
                true
            }
            None => false,
        }
    }

    /// Inserts an empty waypoint before the end field and returns its index.
    pub fn add_waypoint(&mut self) -> usize {
        let index = self.stops.len().saturating_sub(1);
        self.stops.insert(index, String::new());
        index
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Resource, Default)]
pub struct ActiveRoute {
    pub route: Option<Route>,
    pub last_error: Option<String>,
    pending: Option<Task<Result<Route, RouteError>>>,
}

impl ActiveRoute {
    pub fn is_calculating(&self) -> bool {
        self.pending.is_some()
    }

    /// Replaces the in-flight calculation; the older one runs to completion
    /// and its result is discarded.
    pub fn begin(&mut self, task: Task<Result<Route, RouteError>>) {
        if let Some(previous) = self.pending.replace(task) {
            previous.detach();
        }
    }

    pub fn clear(&mut self) {
        if let Some(previous) = self.pending.take() {
            previous.detach();
        }
        self.route = None;
        self.last_error = None;
    }
}

/// Tab order: map, then each route field, then back to the map.
pub fn next_focus(focus: KeyboardFocus, field_count: usize) -> KeyboardFocus {
    match focus {
        KeyboardFocus::Map if field_count > 0 => KeyboardFocus::RouteField(0),
        KeyboardFocus::RouteField(index) if index + 1 < field_count => {
            KeyboardFocus::RouteField(index + 1)
        }
        KeyboardFocus::MarkerNote => KeyboardFocus::MarkerNote,
        _ => KeyboardFocus::Map,
    }
}

/// Applies a finished calculation. A failure keeps the previous route.
pub fn apply_route_result(
    active: &mut ActiveRoute,
    result: Result<Route, RouteError>,
    log: &mut EventLog,
) {
    match result {
        Ok(route) => {
            info!("Route ready: {} legs, distance {:.1}", route.legs.len(), route.distance);
            log.push(format!("Route: {} legs, {:.1} distance", route.legs.len(), route.distance));
            active.route = Some(route);
            active.last_error = None;
        }
        Err(error) => {
            warn!("Route failed: {}", error);
            log.push(format!("Route failed: {}", error));
            active.last_error = Some(error.to_string());
        }
    }
}

pub fn start_route_calculation(
    form: &RouteForm,
    galaxy: &Galaxy,
    settings: &MapSettings,
    service: &PathService,
    active: &mut ActiveRoute,
    log: &mut EventLog,
) {
    match compose_route(&form.stops, galaxy, settings.avoidance(), Arc::clone(&service.0)) {
        Ok(task) => {
            log.push("Calculating route...".to_string());
            active.begin(task);
        }
        Err(error) => {
            warn!("Route not started: {}", error);
            log.push(format!("Route failed: {}", error));
            active.last_error = Some(error.to_string());
        }
    }
}

// =============================================================================
// Systems
// =============================================================================

#[allow(deprecated)]
#[allow(clippy::too_many_arguments)]
fn handle_route_form_keys(
    mut key_events: EventReader<KeyboardInput>,
    bindings: Res<InputBindings>,
    galaxy: Res<Galaxy>,
    settings: Res<MapSettings>,
    service: Option<Res<PathService>>,
    mut focus: ResMut<KeyboardFocus>,
    mut form: ResMut<RouteForm>,
    mut active: ResMut<ActiveRoute>,
    mut log: ResMut<EventLog>,
) {
    for event in key_events.read() {
        if !event.state.is_pressed() || *focus == KeyboardFocus::MarkerNote {
            continue;
        }
        let key = event.key_code;

        if key == bindings.cycle_focus {
            *focus = next_focus(*focus, form.stops.len());
        } else if key == bindings.add_waypoint {
            let index = form.add_waypoint();
            *focus = KeyboardFocus::RouteField(index);
        } else if let Some(index) = focus.route_field() {
            if key == bindings.cancel {
                *focus = KeyboardFocus::Map;
            } else if key == bindings.confirm {
                match service.as_deref() {
                    Some(service) => start_route_calculation(
                        &form,
                        &galaxy,
                        &settings,
                        service,
                        &mut active,
                        &mut log,
                    ),
                    None => log.push("Route failed: no pathfinding service".to_string()),
                }
            } else if !matches!(event.logical_key, Key::Tab | Key::Enter | Key::Escape) {
                if let Some(field) = form.stops.get_mut(index) {
                    edit_text(field, &event.logical_key);
                }
            }
        } else if key == bindings.clear_route {
            active.clear();
            form.clear();
            log.push("Route cleared".to_string());
        }
    }
}

fn poll_route_task(mut active: ResMut<ActiveRoute>, mut log: ResMut<EventLog>) {
    if !active.is_calculating() {
        return;
    }
    // Polling alone must not count as a change, or the map rebuilds every frame.
    let finished = active
        .bypass_change_detection()
        .pending
        .as_mut()
        .and_then(|task| block_on(future::poll_once(task)));
    if let Some(result) = finished {
        active.pending = None;
        apply_route_result(&mut active, result, &mut log);
    }
}

// =============================================================================
// Tests
// =============================================================================
