//! View transform, camera placement, and coordinate conversion.

use bevy::camera::{OrthographicProjection, Projection};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::compat::Camera2dBundle;

use super::components::to_bevy;

// =============================================================================
// Constants
// =============================================================================

pub const VIEW_SCALE_MIN: f32 = 0.05;
pub const VIEW_SCALE_MAX: f32 = 10.0;

// =============================================================================
// Resources
// =============================================================================

/// Pan/zoom state: `screen = world * scale + translate`, in logical pixels
/// with the origin at the window's top-left corner.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub translate: Vec2,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate: Vec2::ZERO,
        }
    }
}

impl ViewTransform {
    pub fn is_valid(&self) -> bool {
        self.scale.is_finite()
            && self.translate.is_finite()
            && (VIEW_SCALE_MIN..=VIEW_SCALE_MAX).contains(&self.scale)
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        (screen - self.translate) / self.scale
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        world * self.scale + self.translate
    }

    /// Zooms keeping the world point under `anchor` fixed on screen.
    pub fn zoom_about(&mut self, anchor: Vec2, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 || !anchor.is_finite() {
            return;
        }
        let world = self.screen_to_world(anchor);
        self.scale = (self.scale * factor).clamp(VIEW_SCALE_MIN, VIEW_SCALE_MAX);
        self.translate = anchor - world * self.scale;
    }

    pub fn pan(&mut self, delta: Vec2) {
        if delta.is_finite() {
            self.translate += delta;
        }
    }

    /// Puts `world` at the middle of the viewport without changing scale.
    pub fn center_on(&mut self, world: Vec2, viewport: Vec2) {
        self.translate = viewport * 0.5 - world * self.scale;
    }

    pub fn label(&self) -> String {
        format!("{:.2}x", self.scale)
    }
}

/// Camera translation and orthographic scale that reproduce `view` for a viewport.
pub fn camera_placement(view: &ViewTransform, viewport: Vec2) -> (Vec2, f32) {
    let center_world = view.screen_to_world(viewport * 0.5);
    (to_bevy(center_world), 1.0 / view.scale)
}

// =============================================================================
// Systems
// =============================================================================

pub fn setup_camera(mut commands: Commands) {
    info!("Setting up map camera");

    commands.spawn((
        Camera2dBundle {
            projection: Projection::Orthographic(OrthographicProjection::default_2d()),
            camera: Camera {
                order: 0,
                ..default()
            },
            ..default()
        },
        Name::new("MapCamera"),
    ));
}

pub fn sync_camera_view(
    view: Res<ViewTransform>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cameras: Query<(&mut Projection, &mut Transform), With<Camera2d>>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let viewport = Vec2::new(window.width(), window.height());
    let (translation, scale) = camera_placement(&view, viewport);

    for (mut projection, mut transform) in cameras.iter_mut() {
        if let Projection::Orthographic(orthographic) = &mut *projection {
            if orthographic.scale != scale {
                orthographic.scale = scale;
            }
        }
        if transform.translation.truncate() != translation {
            transform.translation.x = translation.x;
            transform.translation.y = translation.y;
        }
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
        assert!(diff < 1e-3 * b.abs().max(1.0), "expected {} close to {}", a, b);
    }

    fn assert_close_vec(a: Vec2, b: Vec2) {
        assert_close(a.x, b.x);
        assert_close(a.y, b.y);
    }

    #[test]
    fn default_view_is_identity() {
        let view = ViewTransform::default();
        assert_eq!(view.screen_to_world(Vec2::new(12.0, 34.0)), Vec2::new(12.0, 34.0));
        assert!(view.is_valid());
    }

    #[test]
    fn screen_and_world_are_inverse() {
        let view = ViewTransform {
            scale: 2.5,
            translate: Vec2::new(100.0, -40.0),
        };
        let world = Vec2::new(-7.5, 3.25);
        assert_close_vec(view.screen_to_world(view.world_to_screen(world)), world);
    }

    #[test]
    fn zoom_about_keeps_anchor_fixed() {
        let starts = [
            ViewTransform::default(),
            ViewTransform {
                scale: 0.3,
                translate: Vec2::new(640.0, 360.0),
            },
            ViewTransform {
                scale: 7.0,
                translate: Vec2::new(-1200.0, 80.0),
            },
        ];
        let anchors = [Vec2::ZERO, Vec2::new(400.0, 250.0), Vec2::new(1279.0, 719.0)];
        let factors = [1.1, 1.0 / 1.1, 3.0, 0.2, 40.0, 0.001];

        for start in starts {
            for anchor in anchors {
                for factor in factors {
                    let mut view = start;
                    let world_before = view.screen_to_world(anchor);
                    view.zoom_about(anchor, factor);
                    assert_close_vec(view.world_to_screen(world_before), anchor);
                }
            }
        }
    }

    #[test]
    fn zoom_sequence_stays_clamped() {
        let mut view = ViewTransform::default();
        for _ in 0..200 {
            view.zoom_about(Vec2::new(10.0, 10.0), 1.1);
        }
        assert_eq!(view.scale, VIEW_SCALE_MAX);
        for _ in 0..400 {
            view.zoom_about(Vec2::new(10.0, 10.0), 1.0 / 1.1);
        }
        assert_eq!(view.scale, VIEW_SCALE_MIN);
    }

    #[test]
    fn zoom_ignores_degenerate_factors() {
        let mut view = ViewTransform::default();
        view.zoom_about(Vec2::ZERO, 0.0);
        view.zoom_about(Vec2::ZERO, f32::NAN);
        view.zoom_about(Vec2::ZERO, -2.0);
        assert_eq!(view, ViewTransform::default());
    }

    #[test]
    fn pan_is_additive_and_keeps_scale() {
        let mut view = ViewTransform::default();
        view.pan(Vec2::new(5.0, -3.0));
        view.pan(Vec2::new(1.0, 1.0));
        assert_eq!(view.translate, Vec2::new(6.0, -2.0));
        assert_eq!(view.scale, 1.0);
    }

    #[test]
    fn center_on_puts_world_point_mid_screen() {
        let mut view = ViewTransform {
            scale: 4.0,
            translate: Vec2::new(33.0, 44.0),
        };
        let viewport = Vec2::new(1280.0, 720.0);
        view.center_on(Vec2::new(2.0, -1.5), viewport);
        assert_close_vec(view.world_to_screen(Vec2::new(2.0, -1.5)), viewport * 0.5);
        assert_eq!(view.scale, 4.0);
    }

    #[test]
    fn invalid_views_are_rejected() {
        let too_far = ViewTransform {
            scale: 11.0,
            translate: Vec2::ZERO,
        };
        let nan = ViewTransform {
            scale: 1.0,
            translate: Vec2::new(f32::NAN, 0.0),
        };
        assert!(!too_far.is_valid());
        assert!(!nan.is_valid());
    }

    #[test]
    fn camera_placement_centers_on_viewport_midpoint() {
        let view = ViewTransform {
            scale: 2.0,
            translate: Vec2::new(640.0, 360.0),
        };
        let (translation, projection_scale) = camera_placement(&view, Vec2::new(1280.0, 720.0));
        assert_close_vec(translation, Vec2::ZERO);
        assert_close(projection_scale, 0.5);

        let panned = ViewTransform {
            scale: 1.0,
            translate: Vec2::new(0.0, 0.0),
        };
        let (translation, _) = camera_placement(&panned, Vec2::new(200.0, 100.0));
        // World (100, 50) sits mid-screen; y flips into Bevy space.
        assert_close_vec(translation, Vec2::new(100.0, -50.0));
    }
}
