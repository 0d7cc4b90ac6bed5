//! Shared UI components and the text shown in each panel.

use bevy::prelude::*;

use crate::plugins::core::{KeyboardFocus, MapInteraction, MapSettings};
use crate::plugins::intel::MarkerEditor;
use crate::plugins::planner::{ActiveRoute, RouteForm};
use crate::plugins::render2d::ViewTransform;
use crate::world::Galaxy;

/// Upper bound on legs listed in the route panel.
const MAX_LISTED_LEGS: usize = 12;

// =============================================================================
// Components
// =============================================================================

#[derive(Component)]
pub struct StatusText;

#[derive(Component)]
pub struct HoverText;

#[derive(Component)]
pub struct RoutePanelText;

#[derive(Component)]
pub struct MarkerPanelMarker;

#[derive(Component)]
pub struct MarkerPanelText;

#[derive(Component)]
pub struct LogPanelMarker;

#[derive(Component)]
pub struct LogContentText;

// =============================================================================
// Text
// =============================================================================

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

pub fn status_line(
    galaxy: &Galaxy,
    view: &ViewTransform,
    settings: &MapSettings,
    syncing: bool,
) -> String {
    let mut line = format!(
        "Systems: {} | Zoom {} | Ranges {} | Wormholes {} | Unclaimed {} | Labels {}",
        galaxy.systems().len(),
        view.label(),
        on_off(settings.show_ranges),
        on_off(settings.show_wormholes),
        on_off(settings.show_unclaimed),
        on_off(settings.show_labels),
    );
    if syncing {
        line.push_str(" | Syncing...");
    }
    line
}

pub fn hover_line(galaxy: &Galaxy, interaction: &MapInteraction) -> String {
    let describe = |id| match galaxy.get(id) {
        Some(system) => {
            let mut text = system.label();
            if system.named {
                if let Some(position) = system.position_label() {
                    text.push(' ');
                    text.push_str(&position);
                }
            }
            if system.has_travel_range() {
                text.push_str(&format!(" | range {:.1}", system.travel_range));
            }
            text
        }
        None => format!("System {}", id),
    };

    let hover = interaction.hovered.map(describe).unwrap_or_else(|| "--".to_string());
    match interaction.highlighted() {
        Some(id) => format!("Hover: {}\nSelected: {}", hover, describe(id)),
        None => format!("Hover: {}", hover),
    }
}

fn field_title(index: usize, count: usize) -> String {
    match index {
        0 => "Start".to_string(),
        _ if index + 1 == count => "End".to_string(),
        _ => format!("Via {}", index),
    }
}

pub fn route_panel_text(
    form: &RouteForm,
    active: &ActiveRoute,
    focus: KeyboardFocus,
    galaxy: &Galaxy,
    settings: &MapSettings,
) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Route{} | avoid slow {} | avoid hostile {}",
        if active.is_calculating() { " (calculating...)" } else { "" },
        on_off(settings.avoid_slow),
        on_off(settings.avoid_hostile),
    ));

    for (index, stop) in form.stops.iter().enumerate() {
        let focused = focus.route_field() == Some(index);
        lines.push(format!(
            "{} {}: {}{}",
            if focused { ">" } else { " " },
            field_title(index, form.stops.len()),
            stop,
            if focused { "_" } else { "" },
        ));
    }

    if let Some(route) = &active.route {
        lines.push(format!("{} legs, distance {:.1}", route.legs.len(), route.distance));
        for leg in route.legs.iter().take(MAX_LISTED_LEGS) {
            lines.push(format!(
                "  {} -> {} ({})",
                leg.from.label(galaxy),
                leg.to.label(galaxy),
                leg.method.label()
            ));
        }
        if route.legs.len() > MAX_LISTED_LEGS {
            lines.push(format!("  ... {} more", route.legs.len() - MAX_LISTED_LEGS));
        }
    }

    if let Some(error) = &active.last_error {
        lines.push(format!("Error: {}", error));
    }

    lines.push("Tab focus | Ins waypoint | Enter calculate | C clear".to_string());
    lines.join("\n")
}

pub fn marker_panel_text(editor: &MarkerEditor, galaxy: &Galaxy) -> Option<String> {
    let marker = editor.editing()?;
    let title = match marker.id {
        Some(id) => format!("Intel marker {}", id),
        None => "New intel marker".to_string(),
    };
    let near = marker
        .system_id
        .and_then(|id| galaxy.get(id))
        .map(|system| format!(" near {}", system.label()))
        .unwrap_or_default();
    let actions = match (marker.id, editor.is_saving()) {
        (_, true) => "Saving...",
        (Some(_), false) => "Enter close | Del delete | Esc cancel",
        (None, false) => "Enter save | Esc discard",
    };
    let (kind_hint, cursor) = if editor.is_read_only() {
        ("", "")
    } else {
        (" [Tab]", "_")
    };
    Some(format!(
        "{}{}\nType: {}{}\nNote: {}{}\n{}",
        title,
        near,
        marker.kind.label(),
        kind_hint,
        marker.note,
        cursor,
        actions
    ))
}
