//! 2D rendering plugin for the star map.

mod camera;
mod components;
mod effects;
mod map;

use bevy::ecs::schedule::IntoScheduleConfigs;
use bevy::prelude::*;
use bevy::ui::Node as UiNode;
use bevy::window::PrimaryWindow;
use std::collections::HashMap;
use std::path::Path;

use crate::compat::{TextBundle, TextStyle};
use crate::plugins::core::{GameState, MapConfig, MapInteraction, MapSettings};
use crate::plugins::intel::{MarkerEditor, MarkerStore};
use crate::plugins::planner::ActiveRoute;
use crate::world::Galaxy;

pub use camera::ViewTransform;

use components::{to_bevy, MapLabel};
use map::{build_frame, DrawCommand, FrameInputs, MapFrame};

use effects::glyph_outline;

const LABEL_FONT_PATH: &str = "fonts/SpaceMono-Regular.ttf";
const LABEL_OFFSET_PX: Vec2 = Vec2::new(6.0, -8.0);
const MAX_LABELS: usize = 600;

// =============================================================================
// Resources
// =============================================================================

/// Last built frame; `generation` bumps on every rebuild.
#[derive(Resource, Default)]
pub struct MapFrameCache {
    pub frame: MapFrame,
    pub generation: u64,
}

// =============================================================================
// Plugin
// =============================================================================

pub struct Render2DPlugin;

impl Plugin for Render2DPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ViewTransform>()
            .init_resource::<MapFrameCache>()
            .add_systems(Startup, camera::setup_camera)
            .add_systems(
                Update,
                (
                    camera::sync_camera_view,
                    rebuild_map_frame,
                    draw_map_frame,
                    sync_map_labels,
                )
                    .chain()
                    .run_if(in_state(GameState::InGame)),
            );
    }
}

// =============================================================================
// Systems
// =============================================================================

#[allow(clippy::too_many_arguments)]
fn rebuild_map_frame(
    time: Res<Time>,
    config: Res<MapConfig>,
    galaxy: Res<Galaxy>,
    view: Res<ViewTransform>,
    settings: Res<MapSettings>,
    interaction: Res<MapInteraction>,
    route: Res<ActiveRoute>,
    store: Res<MarkerStore>,
    editor: Res<MarkerEditor>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cache: ResMut<MapFrameCache>,
) {
    let changed = galaxy.is_changed()
        || view.is_changed()
        || settings.is_changed()
        || interaction.is_changed()
        || route.is_changed()
        || store.is_changed()
        || editor.is_changed();
    let animating = interaction.ping.is_some();
    if !changed && !animating && cache.generation > 0 {
        return;
    }

    let device_pixel_ratio = windows.single().map(Window::scale_factor).unwrap_or(1.0);
    let frame = build_frame(&FrameInputs {
        galaxy: &galaxy,
        view: &view,
        settings: &settings,
        interaction: &interaction,
        route: route.route.as_ref(),
        markers: store.markers(),
        pending_marker: editor.pending_marker(),
        device_pixel_ratio,
        now: time.elapsed(),
        ping_duration: config.ping_duration(),
    });

    if frame != cache.frame || cache.generation == 0 {
        cache.frame = frame;
        cache.generation += 1;
    }
}

fn draw_map_frame(mut gizmos: Gizmos, cache: Res<MapFrameCache>) {
    for item in &cache.frame.items {
        match &item.command {
            DrawCommand::Polyline { points, color } => {
                gizmos.linestrip_2d(points.iter().copied().map(to_bevy), *color);
            }
            DrawCommand::Segment { from, to, color } => {
                gizmos.line_2d(to_bevy(*from), to_bevy(*to), *color);
            }
            DrawCommand::Dashed { dashes, color } => {
                for (from, to) in dashes {
                    gizmos.line_2d(to_bevy(*from), to_bevy(*to), *color);
                }
            }
            DrawCommand::Dot {
                center,
                radius,
                color,
                ..
            } => {
                let center = to_bevy(*center);
                gizmos.circle_2d(center, *radius, *color);
                gizmos.circle_2d(center, *radius * 0.5, *color);
            }
            DrawCommand::Ring {
                center,
                radius,
                color,
            } => {
                gizmos.circle_2d(to_bevy(*center), *radius, *color);
            }
            DrawCommand::Glyph {
                center,
                size,
                shape,
                color,
                pending,
            } => {
                match glyph_outline(*shape, *center, *size) {
                    Some(outline) => {
                        gizmos.linestrip_2d(outline.into_iter().map(to_bevy), *color);
                    }
                    None => {
                        gizmos.circle_2d(to_bevy(*center), *size, *color);
                    }
                }
                if *pending {
                    gizmos.circle_2d(to_bevy(*center), *size * 1.6, *color);
                }
            }
            DrawCommand::Label { .. } => {}
        }
    }
}

/// Stable keys for a frame's labels, in frame order.
pub fn label_keys<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<MapLabel> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    texts
        .into_iter()
        .map(|text| {
            let count = seen.entry(text).or_insert(0);
            let key = MapLabel {
                text: text.to_string(),
                occurrence: *count,
            };
            *count += 1;
            key
        })
        .collect()
}

/// Pairs each wanted key with the existing entity holding it. The second
/// list holds entities no longer wanted.
pub fn match_labels<E>(
    existing: Vec<(MapLabel, E)>,
    wanted: &[MapLabel],
) -> (Vec<Option<E>>, Vec<E>) {
    let mut stale = Vec::new();
    let mut by_key = HashMap::with_capacity(existing.len());
    for (key, entity) in existing {
        if let Some(duplicate) = by_key.insert(key, entity) {
            stale.push(duplicate);
        }
    }
    let slots = wanted.iter().map(|key| by_key.remove(key)).collect();
    stale.extend(by_key.into_values());
    (slots, stale)
}

fn sync_map_labels(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    cache: Res<MapFrameCache>,
    view: Res<ViewTransform>,
    mut labels: Query<(Entity, &MapLabel, &mut UiNode, &mut TextColor, &mut TextFont)>,
    mut last_generation: Local<u64>,
) {
    if *last_generation == cache.generation {
        return;
    }
    *last_generation = cache.generation;

    let wanted = cache.frame.labels().take(MAX_LABELS).collect::<Vec<_>>();
    let keys = label_keys(wanted.iter().map(|(text, ..)| *text));
    let existing = labels
        .iter()
        .map(|(entity, key, ..)| (key.clone(), entity))
        .collect::<Vec<_>>();
    let (slots, stale) = match_labels(existing, &keys);

    for entity in stale {
        commands.entity(entity).despawn();
    }

    let spawning = slots.iter().any(Option::is_none);
    let font = if spawning && Path::new("assets").join(LABEL_FONT_PATH).exists() {
        asset_server.load(LABEL_FONT_PATH)
    } else {
        Handle::default()
    };

    for ((&(text, anchor, color, font_size), key), slot) in wanted.iter().zip(keys).zip(slots) {
        let screen = view.world_to_screen(anchor) + LABEL_OFFSET_PX;
        let (left, top) = (Val::Px(screen.x), Val::Px(screen.y));

        if let Some((_, _, mut node, mut text_color, mut text_font)) =
            slot.and_then(|entity| labels.get_mut(entity).ok())
        {
            // Only touch what moved so unchanged labels skip relayout.
            if node.left != left || node.top != top {
                node.left = left;
                node.top = top;
            }
            if text_color.0 != color {
                text_color.0 = color;
            }
            if text_font.font_size != font_size {
                text_font.font_size = font_size;
            }
            continue;
        }

        commands.spawn((
            key,
            TextBundle::from_section(
                text,
                TextStyle {
                    font: font.clone(),
                    font_size,
                    color,
                },
            )
            .with_node(UiNode {
                position_type: PositionType::Absolute,
                left,
                top,
                ..default()
            }),
        ));
    }
}

// =============================================================================
// Tests
// =============================================================================
