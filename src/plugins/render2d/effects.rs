//! Time and screen-space effects: ping rings, dashes, marker glyph outlines.

use bevy::prelude::*;
use std::time::Duration;

use super::components::GlyphShape;

// =============================================================================
// Constants
// =============================================================================

pub const PING_RING_COUNT: usize = 2;
/// Each ring after the first starts this fraction of the duration later.
pub const PING_RING_STAGGER: f32 = 0.3;
pub const PING_MAX_RADIUS_PX: f32 = 30.0;

pub const DASH_LENGTH_PX: f32 = 6.0;
pub const DASH_GAP_PX: f32 = 4.0;

// Upper bound on dashes per stroke when zoomed far in.
const MAX_DASHES: usize = 4096;

// =============================================================================
// Ping Animation
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PingRing {
    pub radius_px: f32,
    pub alpha: f32,
}

/// Rings visible at `now` for a ping started at `started_at`; empty once the
/// animation is over.
pub fn ping_rings(started_at: Duration, now: Duration, duration: Duration) -> Vec<PingRing> {
    let total = duration.as_secs_f32();
    if total <= 0.0 || now < started_at {
        return Vec::new();
    }
    let elapsed = (now - started_at).as_secs_f32();
    if elapsed >= total {
        return Vec::new();
    }

    let lifetime = total * (1.0 - PING_RING_STAGGER);
    (0..PING_RING_COUNT)
        .filter_map(|ring| {
            let delay = total * PING_RING_STAGGER * ring as f32;
            let t = (elapsed - delay) / lifetime;
            (0.0..=1.0).contains(&t).then(|| PingRing {
                radius_px: PING_MAX_RADIUS_PX * t,
                alpha: 1.0 - t,
            })
        })
        .collect()
}

// =============================================================================
// Dashes
// =============================================================================

/// Splits a segment into dashes of a fixed on-screen length.
pub fn dash_segments(from: Vec2, to: Vec2, scale: f32) -> Vec<(Vec2, Vec2)> {
    let length = from.distance(to);
    if !length.is_finite() || length <= 0.0 || scale <= 0.0 {
        return Vec::new();
    }

    let dash = DASH_LENGTH_PX / scale;
    let period = (DASH_LENGTH_PX + DASH_GAP_PX) / scale;
    let direction = (to - from) / length;

    let mut dashes = Vec::new();
    let mut start = 0.0;
    while start < length && dashes.len() < MAX_DASHES {
        let end = (start + dash).min(length);
        dashes.push((from + direction * start, from + direction * end));
        start += period;
    }
    dashes
}

// =============================================================================
// Glyphs
// =============================================================================

/// Closed outline for a marker glyph; `None` for circles.
pub fn glyph_outline(shape: GlyphShape, center: Vec2, size: f32) -> Option<Vec<Vec2>> {
    let corners = match shape {
        GlyphShape::Circle => return None,
        GlyphShape::Diamond => vec![
            Vec2::new(0.0, -size),
            Vec2::new(size, 0.0),
            Vec2::new(0.0, size),
            Vec2::new(-size, 0.0),
        ],
        // Map space is y-down, so negative y points up on screen.
        GlyphShape::Triangle => vec![
            Vec2::new(0.0, -size),
            Vec2::new(size * 0.87, size * 0.5),
            Vec2::new(-size * 0.87, size * 0.5),
        ],
        GlyphShape::Square => vec![
            Vec2::new(-size, -size) * 0.8,
            Vec2::new(size, -size) * 0.8,
            Vec2::new(size, size) * 0.8,
            Vec2::new(-size, size) * 0.8,
        ],
    };

    let mut points = corners.into_iter().map(|corner| center + corner).collect::<Vec<_>>();
    if let Some(first) = points.first().copied() {
        points.push(first);
    }
    Some(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        let diff = (a - b).abs();
        assert!(diff < 1e-4, "expected {} close to {}", a, b);
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn ping_starts_with_one_ring_at_full_alpha() {
        let rings = ping_rings(SECOND, SECOND, SECOND);
        assert_eq!(rings.len(), 1);
        assert_close(rings[0].radius_px, 0.0);
        assert_close(rings[0].alpha, 1.0);
    }

    #[test]
    fn second_ring_appears_after_stagger() {
        let start = Duration::ZERO;
        assert_eq!(ping_rings(start, Duration::from_millis(200), SECOND).len(), 1);
        let rings = ping_rings(start, Duration::from_millis(500), SECOND);
        assert_eq!(rings.len(), 2);
        assert!(rings[0].radius_px > rings[1].radius_px);
        assert!(rings[0].alpha < rings[1].alpha);
    }

    #[test]
    fn rings_grow_and_fade() {
        let start = Duration::ZERO;
        let early = ping_rings(start, Duration::from_millis(100), SECOND);
        let later = ping_rings(start, Duration::from_millis(250), SECOND);
        assert!(later[0].radius_px > early[0].radius_px);
        assert!(later[0].alpha < early[0].alpha);
        assert!(later[0].radius_px <= PING_MAX_RADIUS_PX);
    }

    #[test]
    fn ping_ends_after_duration() {
        assert!(ping_rings(Duration::ZERO, SECOND, SECOND).is_empty());
        assert!(ping_rings(Duration::ZERO, Duration::from_secs(5), SECOND).is_empty());
    }

    #[test]
    fn ping_is_pure_function_of_time() {
        let a = ping_rings(Duration::ZERO, Duration::from_millis(420), SECOND);
        let b = ping_rings(Duration::ZERO, Duration::from_millis(420), SECOND);
        assert_eq!(a, b);
    }

    #[test]
    fn dash_length_is_constant_on_screen() {
        let dashes = dash_segments(Vec2::ZERO, Vec2::new(100.0, 0.0), 2.0);
        let (from, to) = dashes[0];
        assert_close(from.distance(to) * 2.0, DASH_LENGTH_PX);
        assert_eq!(dashes.len(), 20);

        let wide = dash_segments(Vec2::ZERO, Vec2::new(100.0, 0.0), 1.0);
        assert_eq!(wide.len(), 10);
    }

    #[test]
    fn dashes_stay_on_segment() {
        let end = Vec2::new(9.0, 0.0);
        let dashes = dash_segments(Vec2::ZERO, end, 1.0);
        let last = dashes.last().copied().unwrap_or_default();
        assert!(last.1.x <= end.x);
    }

    #[test]
    fn degenerate_segment_has_no_dashes() {
        assert!(dash_segments(Vec2::ONE, Vec2::ONE, 1.0).is_empty());
    }

    #[test]
    fn outlines_are_closed() {
        let outline = glyph_outline(GlyphShape::Diamond, Vec2::ZERO, 2.0).unwrap_or_default();
        assert_eq!(outline.first(), outline.last());
        assert!(glyph_outline(GlyphShape::Circle, Vec2::ZERO, 2.0).is_none());
    }
}
