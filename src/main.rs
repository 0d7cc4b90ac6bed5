use bevy::prelude::*;

mod api;
mod compat;
mod plugins;
mod route;
mod spiral;
mod world;

fn main() {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.03, 0.04, 0.07)))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Star Map".to_string(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins((
            plugins::core::CorePlugin,
            plugins::saveload::SaveLoadPlugin,
            plugins::sync::SyncPlugin,
            plugins::render2d::Render2DPlugin,
            plugins::input::InputPlugin,
            plugins::intel::IntelPlugin,
            plugins::planner::PlannerPlugin,
            plugins::ui::UIPlugin,
        ))
        .run();
}
