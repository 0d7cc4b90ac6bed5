//! Spiral projection: maps a linear system position onto the 2D map.

use bevy::prelude::*;

// =============================================================================
// Constants
// =============================================================================

pub const SPIRAL_SCALE: f32 = 50.0;
pub const SPIRAL_TIGHTNESS: f32 = 0.1;

/// Position step between polyline samples when drawing along the spiral.
pub const SPIRAL_SAMPLE_STEP: f32 = 0.5;

// Hard cap so a malformed range can't allocate an unbounded polyline.
const MAX_SPIRAL_SAMPLES: usize = 20_000;

// =============================================================================
// Projection
// =============================================================================

pub fn spiral_radius(position: f32) -> f32 {
    position * SPIRAL_SCALE / 1000.0
}

/// World coordinates for a linear position.
pub fn spiral_point(position: f32) -> Vec2 {
    let angle = position * SPIRAL_TIGHTNESS;
    let radius = spiral_radius(position);
    Vec2::new(radius * angle.cos(), radius * angle.sin())
}

/// Samples the spiral between two positions, endpoints included.
///
/// Works in either direction; `start > end` walks the spiral inwards.
pub fn spiral_polyline(start: f32, end: f32, step: f32) -> Vec<Vec2> {
    if !start.is_finite() || !end.is_finite() {
        return Vec::new();
    }

    let span = end - start;
    let step = if step > 0.0 { step } else { SPIRAL_SAMPLE_STEP };
    let samples = ((span.abs() / step).ceil() as usize).clamp(1, MAX_SPIRAL_SAMPLES);

    (0..=samples)
        .map(|index| {
            let t = index as f32 / samples as f32;
            spiral_point(start + span * t)
        })
        .collect()
}

// =============================================================================
// Position Parsing
// =============================================================================

/// Parses a position field; anything that isn't a finite number has no projection.
pub fn parse_position(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Display label for a position, e.g. `#1240` or `#12.5`.
pub fn position_label(position: f32) -> String {
    if position.fract() == 0.0 {
        format!("#{}", position as i64)
    } else {
        format!("#{}", position)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        let diff = (a - b).abs();
        assert!(diff < 1e-4, "expected {} close to {}", a, b);
    }

    #[test]
    fn spiral_point_at_origin_is_zero() {
        let point = spiral_point(0.0);
        assert_close(point.x, 0.0);
        assert_close(point.y, 0.0);
    }

    #[test]
    fn spiral_point_matches_polar_formula() {
        let position = 120.0;
        let point = spiral_point(position);
        let radius = position * 50.0 / 1000.0;
        let angle = position * 0.1;
        assert_close(point.x, radius * angle.cos());
        assert_close(point.y, radius * angle.sin());
        assert_close(point.length(), radius);
    }

    #[test]
    fn spiral_radius_grows_with_magnitude() {
        let positions = [1.0, 5.0, 42.0, 300.0, 9000.0];
        for pair in positions.windows(2) {
            assert!(spiral_point(pair[0]).length() < spiral_point(pair[1]).length());
            assert!(spiral_point(-pair[0]).length() < spiral_point(-pair[1]).length());
        }
    }

    #[test]
    fn spiral_polyline_includes_both_endpoints() {
        let points = spiral_polyline(10.0, 20.0, 0.5);
        assert_eq!(points.len(), 21);
        assert_eq!(points.first().copied(), Some(spiral_point(10.0)));
        let last = points.last().copied().unwrap_or_default();
        assert_close(last.x, spiral_point(20.0).x);
        assert_close(last.y, spiral_point(20.0).y);
    }

    #[test]
    fn spiral_polyline_walks_backwards() {
        let points = spiral_polyline(20.0, 10.0, 0.5);
        assert_eq!(points.first().copied(), Some(spiral_point(20.0)));
        assert!(points[0].length() > points[points.len() - 1].length());
    }

    #[test]
    fn spiral_polyline_same_position_is_single_segment() {
        let points = spiral_polyline(7.0, 7.0, 0.5);
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn spiral_polyline_rejects_non_finite_bounds() {
        assert!(spiral_polyline(f32::NAN, 10.0, 0.5).is_empty());
        assert!(spiral_polyline(0.0, f32::INFINITY, 0.5).is_empty());
    }

    #[test]
    fn parse_position_accepts_numbers() {
        assert_eq!(parse_position("42"), Some(42.0));
        assert_eq!(parse_position(" -3.5 "), Some(-3.5));
    }

    #[test]
    fn parse_position_rejects_garbage() {
        assert_eq!(parse_position("abc"), None);
        assert_eq!(parse_position(""), None);
        assert_eq!(parse_position("NaN"), None);
        assert_eq!(parse_position("inf"), None);
    }

    #[test]
    fn position_label_drops_integer_fraction() {
        assert_eq!(position_label(1240.0), "#1240");
        assert_eq!(position_label(12.5), "#12.5");
    }
}
