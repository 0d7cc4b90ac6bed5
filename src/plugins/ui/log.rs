//! Log panel update system.

use bevy::prelude::*;

use crate::plugins::core::EventLog;

use super::components::LogContentText;

pub fn update_log_panel(log: Res<EventLog>, mut log_text: Query<&mut Text, With<LogContentText>>) {
    if !log.is_changed() {
        return;
    }
    if let Some(mut text) = log_text.iter_mut().next() {
        text.0 = log_body(log.entries());
    }
}

pub fn log_body(entries: &[String]) -> String {
    if entries.is_empty() {
        return "No events yet".to_string();
    }
    entries
        .iter()
        .map(|entry| format!("> {}", entry))
        .collect::<Vec<_>>()
        .join("\n")
}
