use bevy::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

use crate::spiral::{parse_position, position_label, spiral_point};

pub type SystemId = u64;

// =============================================================================
// Systems and Wormholes
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct StarSystem {
    pub id: SystemId,
    pub name: String,
    /// Name was given by a player rather than generated on discovery.
    pub named: bool,
    pub position: Option<f32>,
    /// Cached projection of `position`.
    pub point: Option<Vec2>,
    pub travel_range: f32,
}

impl StarSystem {
    pub fn new(
        id: SystemId,
        name: impl Into<String>,
        position: Option<f32>,
        travel_range: f32,
    ) -> Self {
        let name = name.into();
        let named = is_human_name(id, &name);
        Self {
            id,
            name,
            named,
            position,
            point: position.map(spiral_point),
            travel_range: travel_range.max(0.0),
        }
    }

    pub fn has_travel_range(&self) -> bool {
        self.travel_range > 0.0
    }

    /// Name shown on the map: the player's name, or `#<position>` otherwise.
    pub fn label(&self) -> String {
        match (self.named, self.position) {
            (true, _) => self.name.clone(),
            (false, Some(position)) => position_label(position),
            (false, None) => self.name.clone(),
        }
    }

    pub fn position_label(&self) -> Option<String> {
        self.position.map(position_label)
    }
}

pub fn default_system_name(id: SystemId) -> String {
    format!("System {}", id)
}

fn is_human_name(id: SystemId, name: &str) -> bool {
    !name.trim().is_empty() && name != default_system_name(id)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Wormhole {
    pub a: SystemId,
    pub b: SystemId,
}

impl Wormhole {
    /// Endpoints are unordered; the pair is stored smallest id first.
    pub fn new(a: SystemId, b: SystemId) -> Self {
        Self {
            a: a.min(b),
            b: a.max(b),
        }
    }
}

#[derive(Resource, Default, Clone, Debug)]
pub struct Galaxy {
    systems: Vec<StarSystem>,
    index: HashMap<SystemId, usize>,
    wormholes: Vec<Wormhole>,
}

impl Galaxy {
    pub fn from_parts(mut systems: Vec<StarSystem>, wormholes: Vec<Wormhole>) -> Self {
        // Stable iteration order keeps hit-test tie-breaks deterministic.
        systems.sort_by_key(|system| system.id);
        systems.dedup_by_key(|system| system.id);

        let index = systems
            .iter()
            .enumerate()
            .map(|(slot, system)| (system.id, slot))
            .collect::<HashMap<_, _>>();

        let mut seen = HashSet::new();
        let wormholes = wormholes
            .into_iter()
            .map(|wormhole| Wormhole::new(wormhole.a, wormhole.b))
            .filter(|wormhole| wormhole.a != wormhole.b)
            .filter(|wormhole| index.contains_key(&wormhole.a) && index.contains_key(&wormhole.b))
            .filter(|wormhole| seen.insert(*wormhole))
            .collect();

        Self {
            systems,
            index,
            wormholes,
        }
    }

    pub fn systems(&self) -> &[StarSystem] {
        &self.systems
    }

    pub fn wormholes(&self) -> &[Wormhole] {
        &self.wormholes
    }

    pub fn get(&self, id: SystemId) -> Option<&StarSystem> {
        self.index.get(&id).map(|slot| &self.systems[*slot])
    }

    pub fn point_of(&self, id: SystemId) -> Option<Vec2> {
        self.get(id).and_then(|system| system.point)
    }

    pub fn ids(&self) -> HashSet<SystemId> {
        self.index.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn wormhole_endpoints(&self) -> HashSet<SystemId> {
        self.wormholes
            .iter()
            .flat_map(|wormhole| [wormhole.a, wormhole.b])
            .collect()
    }
}

// =============================================================================
// Intel Markers
// =============================================================================

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerKind {
    MiningRich,
    Hazard,
    #[default]
    PointOfInterest,
    #[serde(other)]
    Other,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 4] = [
        MarkerKind::MiningRich,
        MarkerKind::Hazard,
        MarkerKind::PointOfInterest,
        MarkerKind::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MarkerKind::MiningRich => "Mining-rich",
            MarkerKind::Hazard => "Hazard",
            MarkerKind::PointOfInterest => "Point of interest",
            MarkerKind::Other => "Other",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntelMarker {
    /// Assigned by the server; `None` until the marker is persisted.
    pub id: Option<u64>,
    pub point: Option<Vec2>,
    pub system_id: Option<SystemId>,
    pub kind: MarkerKind,
    pub note: String,
}

impl IntelMarker {
    pub fn pending(point: Vec2, system_id: Option<SystemId>) -> Self {
        Self {
            id: None,
            point: Some(point),
            system_id,
            kind: MarkerKind::default(),
            note: String::new(),
        }
    }
}

// =============================================================================
// Wire Records
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default)]
    pub systems: HashMap<String, SystemRecord>,
    #[serde(default)]
    pub wormholes: Vec<(SystemId, SystemId)>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SystemRecord {
    #[serde(default)]
    pub id: Option<SystemId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub named: Option<bool>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub position: Option<f32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub x: Option<f32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub y: Option<f32>,
    #[serde(default, alias = "radius", deserialize_with = "lenient_number")]
    pub catapult_radius: Option<f32>,
}

impl SnapshotRecord {
    pub fn into_galaxy(self) -> Galaxy {
        let systems = self
            .systems
            .into_iter()
            .filter_map(|(key, record)| {
                let id = record.id.or_else(|| key.trim().parse().ok())?;
                Some(record.into_system(id))
            })
            .collect();
        let wormholes = self
            .wormholes
            .into_iter()
            .map(|(a, b)| Wormhole::new(a, b))
            .collect();
        Galaxy::from_parts(systems, wormholes)
    }
}

impl SystemRecord {
    fn into_system(self, id: SystemId) -> StarSystem {
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_system_name(id));
        let travel_range = self.catapult_radius.unwrap_or(0.0);
        let mut system = StarSystem::new(id, name, self.position, travel_range);
        if let Some(named) = self.named {
            system.named = named;
        }
        if system.point.is_none() {
            if let (Some(x), Some(y)) = (self.x, self.y) {
                system.point = Some(Vec2::new(x, y));
            }
        }
        system
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarkerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub x: Option<f32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub y: Option<f32>,
    #[serde(default)]
    pub system_id: Option<SystemId>,
    #[serde(default, rename = "type")]
    pub kind: MarkerKind,
    #[serde(default)]
    pub note: String,
}

impl From<MarkerRecord> for IntelMarker {
    fn from(record: MarkerRecord) -> Self {
        let point = match (record.x, record.y) {
            (Some(x), Some(y)) => Some(Vec2::new(x, y)),
            _ => None,
        };
        Self {
            id: record.id,
            point,
            system_id: record.system_id,
            kind: record.kind,
            note: record.note,
        }
    }
}

impl From<&IntelMarker> for MarkerRecord {
    fn from(marker: &IntelMarker) -> Self {
        Self {
            id: marker.id,
            x: marker.point.map(|point| point.x),
            y: marker.point.map(|point| point.y),
            system_id: marker.system_id,
            kind: marker.kind,
            note: marker.note.clone(),
        }
    }
}

/// Accepts a JSON number or numeric string; anything else decodes as `None`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number
            .as_f64()
            .map(|value| value as f32)
            .filter(|value| value.is_finite()),
        Some(serde_json::Value::String(raw)) => parse_position(&raw),
        _ => None,
    })
}
