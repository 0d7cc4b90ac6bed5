//! HUD setup and update systems.

use bevy::prelude::*;
use bevy::ui::Node as UiNode;
use std::path::Path;

use crate::compat::{NodeBundle, TextBundle, TextStyle};
use crate::plugins::core::{KeyboardFocus, MapInteraction, MapSettings};
use crate::plugins::intel::MarkerEditor;
use crate::plugins::planner::{ActiveRoute, RouteForm};
use crate::plugins::render2d::ViewTransform;
use crate::plugins::sync::SyncTasks;
use crate::world::Galaxy;

use super::components::{
    hover_line, marker_panel_text, route_panel_text, status_line, HoverText, LogContentText,
    LogPanelMarker, MarkerPanelMarker, MarkerPanelText, RoutePanelText, StatusText,
};

const HUD_FONT_PATH: &str = "fonts/SpaceMono-Regular.ttf";

fn panel_background() -> BackgroundColor {
    Color::srgba(0.02, 0.05, 0.08, 0.85).into()
}

// =============================================================================
// Setup Systems
// =============================================================================

pub fn setup_hud(mut commands: Commands, asset_server: Res<AssetServer>) {
    let font_on_disk = Path::new("assets").join(HUD_FONT_PATH);
    let font = if font_on_disk.exists() {
        asset_server.load(HUD_FONT_PATH)
    } else {
        info!("HUD font not found at {}, using default", font_on_disk.display());
        Handle::default()
    };

    // Status line (top-left)
    commands.spawn((
        StatusText,
        TextBundle::from_section(
            "Systems: --",
            TextStyle {
                font: font.clone(),
                font_size: 16.0,
                color: Color::srgb(0.9, 0.9, 0.95),
            },
        )
        .with_node(UiNode {
            position_type: PositionType::Absolute,
            left: Val::Px(14.0),
            top: Val::Px(10.0),
            ..default()
        }),
    ));

    commands.spawn((
        HoverText,
        TextBundle::from_section(
            "Hover: --",
            TextStyle {
                font: font.clone(),
                font_size: 14.0,
                color: Color::srgb(0.82, 0.88, 0.95),
            },
        )
        .with_node(UiNode {
            position_type: PositionType::Absolute,
            left: Val::Px(14.0),
            top: Val::Px(34.0),
            ..default()
        }),
    ));

    commands.spawn(
        TextBundle::from_section(
            "R ranges | W wormholes | U unclaimed | L labels | S/H avoid | F5 resync | Home center | Shift+click pin | Right-click intel",
            TextStyle {
                font: font.clone(),
                font_size: 12.0,
                color: Color::srgb(0.6, 0.65, 0.72),
            },
        )
        .with_node(UiNode {
            position_type: PositionType::Absolute,
            left: Val::Px(14.0),
            top: Val::Px(74.0),
            ..default()
        }),
    );

    spawn_route_panel(&mut commands, &font);
    spawn_marker_panel(&mut commands, &font);
    spawn_log_panel(&mut commands, &font);
}

fn spawn_route_panel(commands: &mut Commands, font: &Handle<Font>) {
    commands
        .spawn(NodeBundle {
            node: UiNode {
                position_type: PositionType::Absolute,
                right: Val::Px(14.0),
                top: Val::Px(14.0),
                flex_direction: FlexDirection::Column,
                padding: UiRect::all(Val::Px(8.0)),
                border: UiRect::all(Val::Px(1.0)),
                min_width: Val::Px(260.0),
                ..default()
            },
            background_color: panel_background(),
            border_color: Color::srgb(0.3, 0.9, 0.5).into(),
            ..default()
        })
        .with_children(|parent| {
            parent.spawn((
                RoutePanelText,
                TextBundle::from_section(
                    "Route",
                    TextStyle {
                        font: font.clone(),
                        font_size: 13.0,
                        color: Color::srgb(0.8, 0.95, 0.85),
                    },
                ),
            ));
        });
}

fn spawn_marker_panel(commands: &mut Commands, font: &Handle<Font>) {
    commands
        .spawn((
            MarkerPanelMarker,
            NodeBundle {
                node: UiNode {
                    position_type: PositionType::Absolute,
                    right: Val::Px(14.0),
                    bottom: Val::Px(14.0),
                    flex_direction: FlexDirection::Column,
                    padding: UiRect::all(Val::Px(8.0)),
                    border: UiRect::all(Val::Px(1.0)),
                    min_width: Val::Px(240.0),
                    ..default()
                },
                visibility: Visibility::Hidden,
                background_color: panel_background(),
                border_color: Color::srgb(0.4, 0.8, 1.0).into(),
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn((
                MarkerPanelText,
                TextBundle::from_section(
                    "",
                    TextStyle {
                        font: font.clone(),
                        font_size: 13.0,
                        color: Color::srgb(0.75, 0.9, 1.0),
                    },
                ),
            ));
        });
}

fn spawn_log_panel(commands: &mut Commands, font: &Handle<Font>) {
    commands
        .spawn((
            LogPanelMarker,
            NodeBundle {
                node: UiNode {
                    position_type: PositionType::Absolute,
                    left: Val::Px(14.0),
                    bottom: Val::Px(14.0),
                    flex_direction: FlexDirection::Column,
                    padding: UiRect::all(Val::Px(8.0)),
                    border: UiRect::all(Val::Px(1.0)),
                    min_width: Val::Px(280.0),
                    max_height: Val::Px(160.0),
                    overflow: Overflow {
                        y: OverflowAxis::Scroll,
                        ..default()
                    },
                    ..default()
                },
                background_color: panel_background(),
                border_color: Color::srgb(0.6, 0.4, 0.8).into(),
                ..default()
            },
        ))
        .with_children(|parent| {
            parent.spawn(TextBundle::from_section(
                "Events",
                TextStyle {
                    font: font.clone(),
                    font_size: 13.0,
                    color: Color::srgb(0.8, 0.6, 1.0),
                },
            ));

            parent.spawn(NodeBundle {
                node: UiNode {
                    width: Val::Percent(100.0),
                    height: Val::Px(1.0),
                    margin: UiRect::vertical(Val::Px(4.0)),
                    ..default()
                },
                background_color: Color::srgb(0.4, 0.25, 0.5).into(),
                ..default()
            });

            parent.spawn((
                LogContentText,
                TextBundle::from_section(
                    "No events yet",
                    TextStyle {
                        font: font.clone(),
                        font_size: 12.0,
                        color: Color::srgb(0.7, 0.75, 0.82),
                    },
                ),
            ));
        });
}

// =============================================================================
// Update Systems
// =============================================================================

pub fn update_status_text(
    galaxy: Res<Galaxy>,
    view: Res<ViewTransform>,
    settings: Res<MapSettings>,
    tasks: Res<SyncTasks>,
    mut panel: Query<&mut Text, With<StatusText>>,
) {
    if let Some(mut text) = panel.iter_mut().next() {
        let line = status_line(&galaxy, &view, &settings, tasks.is_syncing());
        if text.0 != line {
            text.0 = line;
        }
    }
}

pub fn update_hover_text(
    galaxy: Res<Galaxy>,
    interaction: Res<MapInteraction>,
    mut panel: Query<&mut Text, With<HoverText>>,
) {
    if !galaxy.is_changed() && !interaction.is_changed() {
        return;
    }
    if let Some(mut text) = panel.iter_mut().next() {
        text.0 = hover_line(&galaxy, &interaction);
    }
}

pub fn update_route_panel(
    form: Res<RouteForm>,
    active: Res<ActiveRoute>,
    focus: Res<KeyboardFocus>,
    galaxy: Res<Galaxy>,
    settings: Res<MapSettings>,
    mut panel: Query<&mut Text, With<RoutePanelText>>,
) {
    if let Some(mut text) = panel.iter_mut().next() {
        let body = route_panel_text(&form, &active, *focus, &galaxy, &settings);
        if text.0 != body {
            text.0 = body;
        }
    }
}

pub fn update_marker_panel(
    editor: Res<MarkerEditor>,
    galaxy: Res<Galaxy>,
    mut panels: Query<&mut Visibility, With<MarkerPanelMarker>>,
    mut texts: Query<&mut Text, With<MarkerPanelText>>,
) {
    if !editor.is_changed() {
        return;
    }
    let body = marker_panel_text(&editor, &galaxy);
    for mut visibility in panels.iter_mut() {
        *visibility = if body.is_some() {
            Visibility::Visible
        } else {
            Visibility::Hidden
        };
    }
    if let (Some(mut text), Some(body)) = (texts.iter_mut().next(), body) {
        text.0 = body;
    }
}
