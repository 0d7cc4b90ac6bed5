//! Pointer input: mouse, touch and wheel are fed to the gesture controller
//! and the resulting intents are applied to the map.

mod gesture;

use bevy::ecs::schedule::IntoScheduleConfigs;
use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::input::touch::{TouchInput, TouchPhase};
use bevy::prelude::*;
use bevy::window::{CursorIcon, CursorLeft, CursorMoved, PrimaryWindow, SystemCursorIcon};

use crate::hit_test::nearest_system;
use crate::plugins::core::{EventLog, GameState, KeyboardFocus, MapInteraction};
use crate::plugins::intel::{MarkerEditor, MarkerStore};
use crate::plugins::planner::RouteForm;
use crate::plugins::render2d::ViewTransform;
use crate::world::{Galaxy, SystemId};

use gesture::{CursorAffordance, GestureController, GestureIntent, PointerEvent, PointerId};

const MOUSE_POINTER: PointerId = 0;
/// Pixel-unit scroll deltas per wheel notch.
const PIXELS_PER_NOTCH: f32 = 100.0;

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<GestureController>()
            .init_resource::<PointerQueue>()
            .add_systems(
                Update,
                (collect_pointer_events, apply_pointer_gestures, update_cursor_icon)
                    .chain()
                    .run_if(in_state(GameState::InGame)),
            );
    }
}

/// Pointer events gathered this frame, in arrival order.
#[derive(Resource, Default, Debug)]
pub struct PointerQueue(pub Vec<PointerEvent>);

// =============================================================================
// Intent Resolution
// =============================================================================

/// A map mutation produced by one gesture intent.
#[derive(Clone, Debug, PartialEq)]
pub enum MapAction {
    SetHover(Option<SystemId>),
    Pan(Vec2),
    Zoom { anchor: Vec2, factor: f32 },
    ToggleRange(SystemId),
    FillRouteField { index: usize, text: String },
    Highlight(SystemId),
    ClearHighlight,
    OpenMarkerEditor(Vec2),
}

/// Read-only state needed to interpret an intent.
pub struct IntentContext<'a> {
    pub view: &'a ViewTransform,
    pub galaxy: &'a Galaxy,
    pub interaction: &'a MapInteraction,
    pub focus: KeyboardFocus,
}

pub fn resolve_intent(intent: GestureIntent, ctx: &IntentContext) -> Option<MapAction> {
    let system_at = |screen: Vec2| {
        nearest_system(ctx.view.screen_to_world(screen), ctx.galaxy.systems(), ctx.view.scale)
    };

    match intent {
        GestureIntent::Hover { position } => {
            let hovered = system_at(position).map(|system| system.id);
            (hovered != ctx.interaction.hovered).then_some(MapAction::SetHover(hovered))
        }
        GestureIntent::Pan { delta } => Some(MapAction::Pan(delta)),
        GestureIntent::ZoomAbout { anchor, factor } => Some(MapAction::Zoom { anchor, factor }),
        GestureIntent::Tap { position, shift } => match (system_at(position), shift) {
            (Some(system), true) => Some(MapAction::ToggleRange(system.id)),
            (None, true) => None,
            (Some(system), false) => match ctx.focus.route_field() {
                Some(index) => Some(MapAction::FillRouteField {
                    index,
                    text: system.label(),
                }),
                None => Some(MapAction::Highlight(system.id)),
            },
            (None, false) => {
                ctx.interaction.highlight.is_some().then_some(MapAction::ClearHighlight)
            }
        },
        GestureIntent::LongPress { position } => match system_at(position) {
            Some(system) if system.has_travel_range() => Some(MapAction::ToggleRange(system.id)),
            _ => Some(MapAction::OpenMarkerEditor(ctx.view.screen_to_world(position))),
        },
        GestureIntent::ContextMenu { position } => {
            Some(MapAction::OpenMarkerEditor(ctx.view.screen_to_world(position)))
        }
    }
}

// =============================================================================
// Systems
// =============================================================================

#[allow(deprecated)]
#[allow(clippy::too_many_arguments)]
fn collect_pointer_events(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    keys: Res<ButtonInput<KeyCode>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cursor_moved: EventReader<CursorMoved>,
    mut cursor_left: EventReader<CursorLeft>,
    mut wheel: EventReader<MouseWheel>,
    mut touches: EventReader<TouchInput>,
    mut queue: ResMut<PointerQueue>,
) {
    let cursor = windows.single().ok().and_then(Window::cursor_position);

    for event in cursor_moved.read() {
        queue.0.push(PointerEvent::Move {
            id: MOUSE_POINTER,
            position: event.position,
        });
    }

    if let Some(position) = cursor {
        if mouse_buttons.just_pressed(MouseButton::Left) {
            let shift = keys.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]);
            queue.0.push(PointerEvent::Down {
                id: MOUSE_POINTER,
                position,
                shift,
            });
        }
        if mouse_buttons.just_released(MouseButton::Left) {
            queue.0.push(PointerEvent::Up {
                id: MOUSE_POINTER,
                position,
            });
        }
        if mouse_buttons.just_pressed(MouseButton::Right) {
            queue.0.push(PointerEvent::Secondary { position });
        }
        for event in wheel.read() {
            let notches = match event.unit {
                MouseScrollUnit::Line => event.y,
                MouseScrollUnit::Pixel => event.y / PIXELS_PER_NOTCH,
            };
            queue.0.push(PointerEvent::Wheel { position, notches });
        }
    } else {
        wheel.clear();
    }

    for event in touches.read() {
        // Offset so touch ids never collide with the mouse.
        let id = event.id + 1;
        queue.0.push(match event.phase {
            TouchPhase::Started => PointerEvent::Down {
                id,
                position: event.position,
                shift: false,
            },
            TouchPhase::Moved => PointerEvent::Move {
                id,
                position: event.position,
            },
            TouchPhase::Ended => PointerEvent::Up {
                id,
                position: event.position,
            },
            TouchPhase::Canceled => PointerEvent::Cancel,
        });
    }

    if cursor_left.read().next().is_some() {
        cursor_left.clear();
        queue.0.push(PointerEvent::Cancel);
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_pointer_gestures(
    time: Res<Time>,
    galaxy: Res<Galaxy>,
    store: Res<MarkerStore>,
    mut queue: ResMut<PointerQueue>,
    mut gestures: ResMut<GestureController>,
    mut view: ResMut<ViewTransform>,
    mut interaction: ResMut<MapInteraction>,
    mut focus: ResMut<KeyboardFocus>,
    mut form: ResMut<RouteForm>,
    mut editor: ResMut<MarkerEditor>,
    mut log: ResMut<EventLog>,
) {
    let now = time.elapsed();
    let mut intents = Vec::new();
    intents.extend(gestures.tick(now));
    for event in queue.0.drain(..) {
        intents.extend(gestures.handle(event, now));
    }

    for intent in intents {
        let action = resolve_intent(
            intent,
            &IntentContext {
                view: &view,
                galaxy: &galaxy,
                interaction: &interaction,
                focus: *focus,
            },
        );
        let Some(action) = action else {
            continue;
        };

        match action {
            MapAction::SetHover(hovered) => interaction.hovered = hovered,
            MapAction::Pan(delta) => view.pan(delta),
            MapAction::Zoom { anchor, factor } => view.zoom_about(anchor, factor),
            MapAction::ToggleRange(id) => {
                let pinned = interaction.toggle_range(id);
                let state = if pinned { "pinned" } else { "unpinned" };
                debug!("Range ring {} for system {}", state, id);
            }
            MapAction::FillRouteField { index, text } => {
                log.push(format!("Route stop {}: {}", index + 1, text));
                form.fill(index, text);
            }
            MapAction::Highlight(id) => interaction.set_highlight(id, None),
            MapAction::ClearHighlight => interaction.clear_highlight(),
            MapAction::OpenMarkerEditor(world) => {
                editor.open_at(world, &store, &galaxy, view.scale);
                *focus = KeyboardFocus::MarkerNote;
            }
        }
    }
}

fn update_cursor_icon(
    mut commands: Commands,
    windows: Query<Entity, With<PrimaryWindow>>,
    gestures: Res<GestureController>,
    interaction: Res<MapInteraction>,
    mut current: Local<Option<CursorAffordance>>,
) {
    let affordance = gestures.cursor(interaction.hovered.is_some());
    if *current == Some(affordance) {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let icon = match affordance {
        CursorAffordance::Pointer => SystemCursorIcon::Pointer,
        CursorAffordance::Grab => SystemCursorIcon::Grab,
        CursorAffordance::Grabbing => SystemCursorIcon::Grabbing,
    };
    commands.entity(window).insert(CursorIcon::System(icon));
    *current = Some(affordance);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::StarSystem;

    fn galaxy() -> Galaxy {
        Galaxy::from_parts(
            vec![
                StarSystem::new(1, "Sol", Some(200.0), 0.0),
                StarSystem::new(2, "Vega", Some(600.0), 25.0),
            ],
            Vec::new(),
        )
    }

    fn screen_of(galaxy: &Galaxy, view: &ViewTransform, id: SystemId) -> Vec2 {
        view.world_to_screen(galaxy.point_of(id).unwrap_or_default())
    }

    fn resolve(
        intent: GestureIntent,
        interaction: &MapInteraction,
        focus: KeyboardFocus,
    ) -> Option<MapAction> {
        let galaxy = galaxy();
        let view = ViewTransform::default();
        resolve_intent(
            intent,
            &IntentContext {
                view: &view,
                galaxy: &galaxy,
                interaction,
                focus,
            },
        )
    }

    #[test]
    fn hover_only_reports_changes() {
        let galaxy = galaxy();
        let position = screen_of(&galaxy, &ViewTransform::default(), 1);
        let mut interaction = MapInteraction::default();

        let first = resolve(GestureIntent::Hover { position }, &interaction, KeyboardFocus::Map);
        assert_eq!(first, Some(MapAction::SetHover(Some(1))));

        interaction.hovered = Some(1);
        let hover = GestureIntent::Hover { position };
        assert_eq!(resolve(hover, &interaction, KeyboardFocus::Map), None);
    }

    #[test]
    fn tap_on_system_highlights() {
        let position = screen_of(&galaxy(), &ViewTransform::default(), 1);
        let action = resolve(
            GestureIntent::Tap { position, shift: false },
            &MapInteraction::default(),
            KeyboardFocus::Map,
        );
        assert_eq!(action, Some(MapAction::Highlight(1)));
    }

    #[test]
    fn tap_with_route_field_focus_fills_field() {
        let position = screen_of(&galaxy(), &ViewTransform::default(), 2);
        let action = resolve(
            GestureIntent::Tap { position, shift: false },
            &MapInteraction::default(),
            KeyboardFocus::RouteField(1),
        );
        assert_eq!(
            action,
            Some(MapAction::FillRouteField {
                index: 1,
                text: "Vega".to_string()
            })
        );
    }

    #[test]
    fn shift_tap_toggles_range_without_highlight() {
        let position = screen_of(&galaxy(), &ViewTransform::default(), 2);
        let action = resolve(
            GestureIntent::Tap { position, shift: true },
            &MapInteraction::default(),
            KeyboardFocus::RouteField(0),
        );
        assert_eq!(action, Some(MapAction::ToggleRange(2)));
    }

    #[test]
    fn tap_on_empty_space_clears_existing_highlight() {
        let far = Vec2::new(-5_000.0, -5_000.0);
        let tap = GestureIntent::Tap {
            position: far,
            shift: false,
        };
        let mut interaction = MapInteraction::default();
        assert_eq!(resolve(tap, &interaction, KeyboardFocus::Map), None);
        interaction.set_highlight(1, None);
        assert_eq!(
            resolve(tap, &interaction, KeyboardFocus::Map),
            Some(MapAction::ClearHighlight)
        );
    }

    #[test]
    fn long_press_on_ranged_system_toggles_range() {
        let position = screen_of(&galaxy(), &ViewTransform::default(), 2);
        let action = resolve(
            GestureIntent::LongPress { position },
            &MapInteraction::default(),
            KeyboardFocus::Map,
        );
        assert_eq!(action, Some(MapAction::ToggleRange(2)));
    }

    #[test]
    fn long_press_elsewhere_opens_marker_editor() {
        let galaxy = galaxy();
        let view = ViewTransform::default();
        let position = screen_of(&galaxy, &view, 1);
        let action = resolve(
            GestureIntent::LongPress { position },
            &MapInteraction::default(),
            KeyboardFocus::Map,
        );
        assert_eq!(action, Some(MapAction::OpenMarkerEditor(view.screen_to_world(position))));
    }

    #[test]
    fn context_menu_converts_to_world_space() {
        let galaxy = galaxy();
        let view = ViewTransform {
            scale: 2.0,
            translate: Vec2::new(100.0, 50.0),
        };
        let action = resolve_intent(
            GestureIntent::ContextMenu {
                position: Vec2::new(300.0, 250.0),
            },
            &IntentContext {
                view: &view,
                galaxy: &galaxy,
                interaction: &MapInteraction::default(),
                focus: KeyboardFocus::Map,
            },
        );
        assert_eq!(action, Some(MapAction::OpenMarkerEditor(Vec2::new(100.0, 100.0))));
    }

    #[test]
    fn pan_and_zoom_pass_through() {
        let interaction = MapInteraction::default();
        assert_eq!(
            resolve(GestureIntent::Pan { delta: Vec2::X }, &interaction, KeyboardFocus::Map),
            Some(MapAction::Pan(Vec2::X))
        );
        assert_eq!(
            resolve(
                GestureIntent::ZoomAbout {
                    anchor: Vec2::ZERO,
                    factor: 2.0
                },
                &interaction,
                KeyboardFocus::Map
            ),
            Some(MapAction::Zoom {
                anchor: Vec2::ZERO,
                factor: 2.0
            })
        );
    }
}
