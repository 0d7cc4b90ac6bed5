//! Durable client storage: the view transform survives restarts.

use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugins::core::{EventLog, MapConfig};
use crate::plugins::render2d::ViewTransform;

pub struct SaveLoadPlugin;

impl Plugin for SaveLoadPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, restore_view_state).add_systems(
            Last,
            persist_view_state.run_if(resource_changed::<ViewTransform>),
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("could not serialize: {0}")]
    Serialize(#[from] ron::Error),
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct StoredView {
    scale: f32,
    translate_x: f32,
    translate_y: f32,
}

impl From<&ViewTransform> for StoredView {
    fn from(view: &ViewTransform) -> Self {
        Self {
            scale: view.scale,
            translate_x: view.translate.x,
            translate_y: view.translate.y,
        }
    }
}

impl StoredView {
    fn into_view(self) -> Option<ViewTransform> {
        let view = ViewTransform {
            scale: self.scale,
            translate: Vec2::new(self.translate_x, self.translate_y),
        };
        view.is_valid().then_some(view)
    }
}

/// Reads a RON file; a missing file is `Ok(None)`.
pub fn read_ron<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents)
        .map(Some)
        .map_err(|source| StorageError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn write_ron<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let serialized = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())?;

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| StorageError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, serialized).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn view_path(config: &MapConfig) -> PathBuf {
    Path::new(&config.storage_dir).join(format!("{}.ron", config.view_storage_key))
}

/// Restores a stored view. Out-of-range or non-finite values count as absent.
pub fn load_view(path: &Path) -> Result<Option<ViewTransform>, StorageError> {
    Ok(read_ron::<StoredView>(path)?.and_then(StoredView::into_view))
}

pub fn save_view(path: &Path, view: &ViewTransform) -> Result<(), StorageError> {
    write_ron(path, &StoredView::from(view))
}

fn restore_view_state(
    config: Res<MapConfig>,
    mut view: ResMut<ViewTransform>,
    mut log: ResMut<EventLog>,
) {
    let path = view_path(&config);
    match load_view(&path) {
        Ok(Some(stored)) => {
            info!("Restored view from {}", path.display());
            *view = stored;
        }
        Ok(None) => {
            info!("No usable stored view at {}, using default", path.display());
            *view = ViewTransform::default();
        }
        Err(error) => {
            warn!("Stored view discarded: {}", error);
            log.push("Stored view was corrupt; reset to default".to_string());
            *view = ViewTransform::default();
        }
    }
}

fn persist_view_state(config: Res<MapConfig>, view: Res<ViewTransform>) {
    let path = view_path(&config);
    if let Err(error) = save_view(&path, &view) {
        error!("View save failed: {}", error);
    }
}
