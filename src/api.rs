//! HTTP client for the map server.
//!
//! Every call blocks, so callers run them off the main thread and poll the
//! resulting task from a system. Pathfinding goes through the
//! [`PathfindingService`] trait so route composition can be driven by any
//! backend.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::world::{Galaxy, IntelMarker, MarkerRecord, SnapshotRecord, SystemId};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request worker failed: {0}")]
    Worker(String),
}

// =============================================================================
// Pathfinding Wire Types
// =============================================================================

/// One end of a pathfinding query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopRef {
    Position(f32),
    System(SystemId),
}

impl fmt::Display for StopRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopRef::Position(position) => write!(f, "pos:{}", position),
            StopRef::System(id) => write!(f, "sys:{}", id),
        }
    }
}

impl Serialize for StopRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Avoidance {
    pub avoid_slow: bool,
    pub avoid_hostile: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathQuery {
    pub start_id: StopRef,
    pub end_id: StopRef,
    pub avoid_slow: bool,
    pub avoid_hostile: bool,
}

impl PathQuery {
    pub fn new(start: StopRef, end: StopRef, avoidance: Avoidance) -> Self {
        Self {
            start_id: start,
            end_id: end,
            avoid_slow: avoidance.avoid_slow,
            avoid_hostile: avoidance.avoid_hostile,
        }
    }
}

/// Node id as sent by the server: a system id, or a synthetic marker such as
/// `virtual_start` for literal-position endpoints.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireNodeId {
    Number(SystemId),
    Text(String),
}

impl WireNodeId {
    pub fn system_id(&self) -> Option<SystemId> {
        match self {
            WireNodeId::Number(id) => Some(*id),
            WireNodeId::Text(raw) => raw.trim().parse().ok(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WireNode {
    pub id: WireNodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub position: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WireLeg {
    pub from_id: WireNodeId,
    pub to_id: WireNodeId,
    pub method: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct PathResponse {
    #[serde(default)]
    pub distance: Option<f32>,
    #[serde(default)]
    pub path: Vec<WireNode>,
    #[serde(default, alias = "simple_path")]
    pub detailed_path: Vec<WireLeg>,
}

pub trait PathfindingService: Send + Sync + 'static {
    fn find_path(&self, query: &PathQuery) -> Result<PathResponse, ApiError>;
}

/// Source of the star map itself.
pub trait MapDataService: Send + Sync + 'static {
    /// Asks the server to pull fresh game data into its own store.
    fn trigger_sync(&self) -> Result<String, ApiError>;
    fn fetch_snapshot(&self) -> Result<Galaxy, ApiError>;
}

// =============================================================================
// Session
// =============================================================================

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SessionStatus {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub current_system_id: Option<SystemId>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct SyncReply {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct DeleteMarkerBody {
    id: u64,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Resource, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn fetch_markers(&self) -> Result<Vec<IntelMarker>, ApiError> {
        let response = self.http.get(self.url("/api/intel")).send()?;
        let records: Vec<MarkerRecord> = decode(response)?;
        Ok(records.into_iter().map(IntelMarker::from).collect())
    }

    pub fn create_marker(&self, marker: &IntelMarker) -> Result<IntelMarker, ApiError> {
        let response = self
            .http
            .post(self.url("/api/intel"))
            .json(&MarkerRecord::from(marker))
            .send()?;
        let record: MarkerRecord = decode(response)?;
        Ok(IntelMarker::from(record))
    }

    pub fn delete_marker(&self, id: u64) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("/api/intel/delete"))
            .json(&DeleteMarkerBody { id })
            .send()?;
        let _: serde_json::Value = decode(response)?;
        Ok(())
    }

    pub fn status(&self) -> Result<SessionStatus, ApiError> {
        let response = self.http.get(self.url("/status")).send()?;
        decode(response)
    }
}

impl MapDataService for ApiClient {
    fn trigger_sync(&self) -> Result<String, ApiError> {
        let response = self.http.post(self.url("/api/sync")).send()?;
        let reply: SyncReply = decode(response)?;
        Ok(reply.message.unwrap_or_else(|| "Sync successful".to_string()))
    }

    fn fetch_snapshot(&self) -> Result<Galaxy, ApiError> {
        let response = self.http.get(self.url("/api/systems")).send()?;
        let record: SnapshotRecord = decode(response)?;
        Ok(record.into_galaxy())
    }
}

impl PathfindingService for ApiClient {
    fn find_path(&self, query: &PathQuery) -> Result<PathResponse, ApiError> {
        debug!("Path query {} -> {}", query.start_id, query.end_id);
        let response = self.http.post(self.url("/api/path")).json(query).send()?;
        decode(response)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    Ok(serde_json::from_str(&body)?)
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(message),
            ..
        })
        | Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ => body.trim().chars().take(120).collect(),
    }
}
