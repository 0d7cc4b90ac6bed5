//! Map frame construction: layers, level of detail, and label selection.
//!
//! [`build_frame`] is a pure function of its inputs. The plugin rebuilds the
//! frame when an input changes and replays it to gizmos every frame, so two
//! builds from the same state always produce the same commands.

use bevy::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

use crate::plugins::core::{MapInteraction, MapSettings};
use crate::route::{PathNode, Route, TravelMethod};
use crate::spiral::{spiral_polyline, SPIRAL_SAMPLE_STEP};
use crate::world::{Galaxy, IntelMarker, StarSystem, SystemId};

use super::camera::ViewTransform;
use super::components::{
    dot_color, guide_color, label_color, leg_color, marker_glyph, ping_color, range_color_default,
    range_color_important, range_color_pinned, virtual_node_color, wormhole_color, DotTone,
    GlyphShape,
};
use super::effects::{dash_segments, ping_rings};

// =============================================================================
// Constants
// =============================================================================

/// Below this zoom only important systems get a dot and label.
pub const LOD_SCALE_THRESHOLD: f32 = 0.4;

const DOT_RADIUS_PX: f32 = 3.0;
const IMPORTANT_DOT_RADIUS_PX: f32 = 4.5;
const VIRTUAL_NODE_RADIUS_PX: f32 = 3.5;
const MARKER_SIZE_PX: f32 = 7.0;
const SYSTEM_LABEL_SIZE: f32 = 13.0;
const VIRTUAL_LABEL_SIZE: f32 = 11.0;

// =============================================================================
// Frame Types
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSetup {
    pub device_pixel_ratio: f32,
    pub translate: Vec2,
    pub scale: f32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Layer {
    Guide,
    Ranges,
    Wormholes,
    Route,
    Systems,
    VirtualNodes,
    Ping,
    Markers,
}

/// One draw call in map (world) coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Polyline {
        points: Vec<Vec2>,
        color: Color,
    },
    Segment {
        from: Vec2,
        to: Vec2,
        color: Color,
    },
    Dashed {
        dashes: Vec<(Vec2, Vec2)>,
        color: Color,
    },
    Dot {
        center: Vec2,
        radius: f32,
        color: Color,
        system: Option<SystemId>,
    },
    Ring {
        center: Vec2,
        radius: f32,
        color: Color,
    },
    Glyph {
        center: Vec2,
        size: f32,
        shape: GlyphShape,
        color: Color,
        pending: bool,
    },
    Label {
        anchor: Vec2,
        text: String,
        color: Color,
        font_size: f32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameItem {
    pub layer: Layer,
    pub command: DrawCommand,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapFrame {
    pub setup: FrameSetup,
    pub items: Vec<FrameItem>,
}

impl Default for MapFrame {
    fn default() -> Self {
        Self {
            setup: FrameSetup {
                device_pixel_ratio: 1.0,
                translate: Vec2::ZERO,
                scale: 1.0,
            },
            items: Vec::new(),
        }
    }
}

impl MapFrame {
    fn push(&mut self, layer: Layer, command: DrawCommand) {
        self.items.push(FrameItem { layer, command });
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, Vec2, Color, f32)> {
        self.items.iter().filter_map(|item| match &item.command {
            DrawCommand::Label {
                anchor,
                text,
                color,
                font_size,
            } => Some((text.as_str(), *anchor, *color, *font_size)),
            _ => None,
        })
    }
}

pub struct FrameInputs<'a> {
    pub galaxy: &'a Galaxy,
    pub view: &'a ViewTransform,
    pub settings: &'a MapSettings,
    pub interaction: &'a MapInteraction,
    pub route: Option<&'a Route>,
    pub markers: &'a [IntelMarker],
    pub pending_marker: Option<&'a IntelMarker>,
    pub device_pixel_ratio: f32,
    pub now: Duration,
    pub ping_duration: Duration,
}

// =============================================================================
// Frame Build
// =============================================================================

pub fn build_frame(inputs: &FrameInputs) -> MapFrame {
    let view = inputs.view;
    let mut frame = MapFrame {
        setup: FrameSetup {
            device_pixel_ratio: inputs.device_pixel_ratio,
            translate: view.translate,
            scale: view.scale,
        },
        items: Vec::new(),
    };

    let route_ids = inputs.route.map(Route::system_ids).unwrap_or_default();
    let importance = Importance {
        interaction: inputs.interaction,
        route_ids: &route_ids,
        wormhole_ids: inputs.galaxy.wormhole_endpoints(),
    };

    draw_guide(&mut frame, inputs.galaxy);
    draw_ranges(&mut frame, inputs, &importance);
    draw_wormholes(&mut frame, inputs);
    if let Some(route) = inputs.route {
        draw_route(&mut frame, inputs.galaxy, route);
    }
    draw_systems(&mut frame, inputs, &importance);
    if let Some(route) = inputs.route {
        draw_virtual_nodes(&mut frame, route, view.scale);
    }
    draw_ping(&mut frame, inputs);
    draw_markers(&mut frame, inputs);

    frame
}

struct Importance<'a> {
    interaction: &'a MapInteraction,
    route_ids: &'a HashSet<SystemId>,
    wormhole_ids: HashSet<SystemId>,
}

impl Importance<'_> {
    fn is_important(&self, system: &StarSystem) -> bool {
        self.route_ids.contains(&system.id)
            || self.interaction.hovered == Some(system.id)
            || self.interaction.highlighted() == Some(system.id)
            || self.interaction.newly_synced.contains(&system.id)
            || system.has_travel_range()
            || self.wormhole_ids.contains(&system.id)
    }

    fn tone(&self, id: SystemId) -> DotTone {
        if self.interaction.highlighted() == Some(id) {
            DotTone::Highlighted
        } else if self.interaction.hovered == Some(id) {
            DotTone::Hovered
        } else if self.interaction.newly_synced.contains(&id) {
            DotTone::NewlySynced
        } else {
            DotTone::Default
        }
    }
}

fn draw_guide(frame: &mut MapFrame, galaxy: &Galaxy) {
    let positions = galaxy.systems().iter().filter_map(|system| system.position);
    let (min, max) = positions.fold((0.0f32, 0.0f32), |(min, max), p| (min.min(p), max.max(p)));

    for end in [max, min] {
        if end != 0.0 {
            frame.push(
                Layer::Guide,
                DrawCommand::Polyline {
                    points: spiral_polyline(0.0, end, SPIRAL_SAMPLE_STEP),
                    color: guide_color(),
                },
            );
        }
    }
}

fn draw_ranges(frame: &mut MapFrame, inputs: &FrameInputs, importance: &Importance) {
    let interaction = inputs.interaction;

    for system in inputs.galaxy.systems() {
        let Some(position) = system.position.filter(|_| system.has_travel_range()) else {
            continue;
        };
        let pinned = interaction.toggled.contains(&system.id);
        let ephemeral =
            interaction.hovered == Some(system.id) || interaction.highlighted() == Some(system.id);
        if !(inputs.settings.show_ranges || pinned || ephemeral) {
            continue;
        }

        let color = if pinned {
            range_color_pinned()
        } else if ephemeral || importance.route_ids.contains(&system.id) {
            range_color_important()
        } else {
            range_color_default()
        };
        frame.push(
            Layer::Ranges,
            DrawCommand::Polyline {
                points: spiral_polyline(
                    position - system.travel_range,
                    position + system.travel_range,
                    SPIRAL_SAMPLE_STEP,
                ),
                color,
            },
        );
    }
}

fn draw_wormholes(frame: &mut MapFrame, inputs: &FrameInputs) {
    if !inputs.settings.show_wormholes {
        return;
    }
    let galaxy = inputs.galaxy;
    for wormhole in galaxy.wormholes() {
        let (Some(a), Some(b)) = (galaxy.point_of(wormhole.a), galaxy.point_of(wormhole.b)) else {
            continue;
        };
        frame.push(
            Layer::Wormholes,
            DrawCommand::Dashed {
                dashes: dash_segments(a, b, inputs.view.scale),
                color: wormhole_color(),
            },
        );
    }
}

fn spiral_or_chord(from: &PathNode, to: &PathNode, galaxy: &Galaxy) -> Option<Vec<Vec2>> {
    match (from.position(galaxy), to.position(galaxy)) {
        (Some(start), Some(end)) => Some(spiral_polyline(start, end, SPIRAL_SAMPLE_STEP)),
        _ => Some(vec![from.point(galaxy)?, to.point(galaxy)?]),
    }
}

fn draw_route(frame: &mut MapFrame, galaxy: &Galaxy, route: &Route) {
    for leg in &route.legs {
        let color = leg_color(leg.method);
        let (Some(from), Some(to)) = (leg.from.point(galaxy), leg.to.point(galaxy)) else {
            continue;
        };

        match (leg.method, &leg.transition) {
            (TravelMethod::Wormhole | TravelMethod::Catapult, _) => {
                frame.push(Layer::Route, DrawCommand::Segment { from, to, color });
            }
            (TravelMethod::CatapultSublight, Some(transition)) => {
                frame.push(
                    Layer::Route,
                    DrawCommand::Segment {
                        from,
                        to: transition.point,
                        color: leg_color(TravelMethod::Catapult),
                    },
                );
                let tail = match (transition.position, leg.to.position(galaxy)) {
                    (Some(start), Some(end)) => spiral_polyline(start, end, SPIRAL_SAMPLE_STEP),
                    _ => vec![transition.point, to],
                };
                frame.push(
                    Layer::Route,
                    DrawCommand::Polyline {
                        points: tail,
                        color: leg_color(TravelMethod::Sublight),
                    },
                );
            }
            (TravelMethod::Sublight | TravelMethod::CatapultSublight, _) => {
                if let Some(points) = spiral_or_chord(&leg.from, &leg.to, galaxy) {
                    frame.push(Layer::Route, DrawCommand::Polyline { points, color });
                }
            }
        }
    }
}

fn draw_systems(frame: &mut MapFrame, inputs: &FrameInputs, importance: &Importance) {
    let scale = inputs.view.scale;
    let detailed = scale >= LOD_SCALE_THRESHOLD;
    let mut labels = Vec::new();

    for system in inputs.galaxy.systems() {
        let Some(point) = system.point else {
            continue;
        };
        let important = importance.is_important(system);
        if !detailed && !important {
            continue;
        }

        let tone = importance.tone(system.id);
        let radius_px = if important && tone != DotTone::Default {
            IMPORTANT_DOT_RADIUS_PX
        } else {
            DOT_RADIUS_PX
        };
        frame.push(
            Layer::Systems,
            DrawCommand::Dot {
                center: point,
                radius: radius_px / scale,
                color: dot_color(tone),
                system: Some(system.id),
            },
        );

        let labelled = system.named || inputs.settings.show_unclaimed || important;
        if inputs.settings.show_labels && labelled {
            labels.push(DrawCommand::Label {
                anchor: point,
                text: system.label(),
                color: label_color(tone),
                font_size: SYSTEM_LABEL_SIZE,
            });
        }
    }

    for label in labels {
        frame.push(Layer::Systems, label);
    }
}

fn draw_virtual_nodes(frame: &mut MapFrame, route: &Route, scale: f32) {
    for node in route.virtual_nodes() {
        frame.push(
            Layer::VirtualNodes,
            DrawCommand::Ring {
                center: node.point,
                radius: VIRTUAL_NODE_RADIUS_PX / scale,
                color: virtual_node_color(),
            },
        );
        frame.push(
            Layer::VirtualNodes,
            DrawCommand::Label {
                anchor: node.point,
                text: node.label.clone(),
                color: virtual_node_color(),
                font_size: VIRTUAL_LABEL_SIZE,
            },
        );
    }
}

fn draw_ping(frame: &mut MapFrame, inputs: &FrameInputs) {
    let Some(ping) = inputs.interaction.ping else {
        return;
    };
    let Some(center) = inputs.galaxy.point_of(ping.id) else {
        return;
    };
    for ring in ping_rings(ping.started_at, inputs.now, inputs.ping_duration) {
        frame.push(
            Layer::Ping,
            DrawCommand::Ring {
                center,
                radius: ring.radius_px / inputs.view.scale,
                color: ping_color(ring.alpha),
            },
        );
    }
}

fn draw_markers(frame: &mut MapFrame, inputs: &FrameInputs) {
    let size = MARKER_SIZE_PX / inputs.view.scale;
    let existing = inputs.markers.iter().map(|marker| (marker, false));
    let pending = inputs.pending_marker.into_iter().map(|marker| (marker, true));

    for (marker, is_pending) in existing.chain(pending) {
        let Some(center) = marker.point.filter(|point| point.is_finite()) else {
            continue;
        };
        let (shape, color) = marker_glyph(marker.kind);
        frame.push(
            Layer::Markers,
            DrawCommand::Glyph {
                center,
                size,
                shape,
                color: if is_pending { color.with_alpha(0.55) } else { color },
                pending: is_pending,
            },
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
