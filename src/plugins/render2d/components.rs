//! Shared components, palette, and helpers for the render2d module.

use bevy::prelude::*;

use crate::route::TravelMethod;
use crate::world::MarkerKind;

/// Map space grows downwards like a canvas; Bevy world space grows upwards.
pub fn to_bevy(world: Vec2) -> Vec2 {
    Vec2::new(world.x, -world.y)
}

// =============================================================================
// Components
// =============================================================================

/// Screen-space text spawned from the current map frame. Keyed by its text
/// and its occurrence among labels sharing that text.
#[derive(Component, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MapLabel {
    pub text: String,
    pub occurrence: usize,
}

// =============================================================================
// Palette
// =============================================================================

pub fn guide_color() -> Color {
    Color::srgba(0.45, 0.55, 0.7, 0.18)
}

pub fn range_color_pinned() -> Color {
    Color::srgba(0.95, 0.7, 0.25, 0.85)
}

pub fn range_color_important() -> Color {
    Color::srgba(0.4, 0.85, 1.0, 0.8)
}

pub fn range_color_default() -> Color {
    Color::srgba(0.35, 0.6, 0.8, 0.35)
}

pub fn wormhole_color() -> Color {
    Color::srgba(0.75, 0.45, 0.95, 0.7)
}

pub fn leg_color(method: TravelMethod) -> Color {
    match method {
        TravelMethod::Sublight => Color::srgb(0.3, 0.9, 0.5),
        TravelMethod::Catapult => Color::srgb(1.0, 0.65, 0.2),
        TravelMethod::CatapultSublight => Color::srgb(1.0, 0.85, 0.3),
        TravelMethod::Wormhole => Color::srgb(0.8, 0.5, 1.0),
    }
}

pub fn virtual_node_color() -> Color {
    Color::srgb(1.0, 0.95, 0.6)
}

pub fn ping_color(alpha: f32) -> Color {
    Color::srgba(0.4, 1.0, 0.85, alpha.clamp(0.0, 1.0))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DotTone {
    Default,
    Hovered,
    Highlighted,
    NewlySynced,
}

pub fn dot_color(tone: DotTone) -> Color {
    match tone {
        DotTone::Default => Color::srgb(0.7, 0.82, 0.95),
        DotTone::Hovered => Color::srgb(1.0, 1.0, 1.0),
        DotTone::Highlighted => Color::srgb(1.0, 0.82, 0.2),
        DotTone::NewlySynced => Color::srgb(0.35, 1.0, 0.45),
    }
}

pub fn label_color(tone: DotTone) -> Color {
    match tone {
        DotTone::Default => Color::srgba(0.82, 0.9, 0.96, 0.85),
        other => dot_color(other),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GlyphShape {
    Diamond,
    Triangle,
    Circle,
    Square,
}

pub fn marker_glyph(kind: MarkerKind) -> (GlyphShape, Color) {
    match kind {
        MarkerKind::MiningRich => (GlyphShape::Diamond, Color::srgb(0.95, 0.8, 0.3)),
        MarkerKind::Hazard => (GlyphShape::Triangle, Color::srgb(1.0, 0.35, 0.3)),
        MarkerKind::PointOfInterest => (GlyphShape::Circle, Color::srgb(0.4, 0.8, 1.0)),
        MarkerKind::Other => (GlyphShape::Square, Color::srgb(0.75, 0.75, 0.8)),
    }
}
