//! UI plugin for the map interface.
//!
//! Panels:
//! - Status and hover lines (top-left)
//! - Route planner (top-right)
//! - Intel marker editor (bottom-right, shown while editing)
//! - Event log (bottom-left)

mod components;
mod hud;
mod log;

use bevy::ecs::schedule::IntoScheduleConfigs;
use bevy::prelude::*;

use crate::plugins::core::GameState;

pub struct UIPlugin;

impl Plugin for UIPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(GameState::InGame), hud::setup_hud).add_systems(
            Update,
            (
                log::update_log_panel,
                hud::update_status_text,
                hud::update_hover_text,
                hud::update_route_panel,
                hud::update_marker_panel,
            )
                .run_if(in_state(GameState::InGame)),
        );
    }
}
