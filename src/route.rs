//! Multi-stop route composition.
//!
//! A route request is a list of stops typed by the user. Each stop resolves
//! against the loaded [`Galaxy`], each consecutive pair becomes one
//! pathfinding query, and the answers are stitched together in stop order.
//! A single failed or empty segment fails the whole route.

use bevy::prelude::*;
use bevy::tasks::{IoTaskPool, Task};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use crate::api::{
    ApiError, Avoidance, PathQuery, PathResponse, PathfindingService, StopRef, WireNode, WireNodeId,
};
use crate::spiral::{parse_position, position_label, spiral_point};
use crate::world::{Galaxy, SystemId};

// =============================================================================
// Types
// =============================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TravelMethod {
    Sublight,
    Catapult,
    CatapultSublight,
    Wormhole,
}

impl TravelMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sublight" => Some(TravelMethod::Sublight),
            "catapult" => Some(TravelMethod::Catapult),
            "catapult+sublight" | "catapult_sublight" => Some(TravelMethod::CatapultSublight),
            "wormhole" => Some(TravelMethod::Wormhole),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TravelMethod::Sublight => "sublight",
            TravelMethod::Catapult => "catapult",
            TravelMethod::CatapultSublight => "catapult+sublight",
            TravelMethod::Wormhole => "wormhole",
        }
    }
}

/// Synthesized waypoint with no backing system.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualNode {
    pub position: Option<f32>,
    pub point: Vec2,
    pub label: String,
}

impl VirtualNode {
    pub fn at_position(position: f32) -> Self {
        Self {
            position: Some(position),
            point: spiral_point(position),
            label: position_label(position),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PathNode {
    Real(SystemId),
    Virtual(VirtualNode),
}

impl PathNode {
    pub fn point(&self, galaxy: &Galaxy) -> Option<Vec2> {
        match self {
            PathNode::Real(id) => galaxy.point_of(*id),
            PathNode::Virtual(node) => Some(node.point),
        }
    }

    pub fn position(&self, galaxy: &Galaxy) -> Option<f32> {
        match self {
            PathNode::Real(id) => galaxy.get(*id).and_then(|system| system.position),
            PathNode::Virtual(node) => node.position,
        }
    }

    pub fn label(&self, galaxy: &Galaxy) -> String {
        match self {
            PathNode::Real(id) => galaxy
                .get(*id)
                .map(|system| system.label())
                .unwrap_or_else(|| format!("System {}", id)),
            PathNode::Virtual(node) => node.label.clone(),
        }
    }

    pub fn system_id(&self) -> Option<SystemId> {
        match self {
            PathNode::Real(id) => Some(*id),
            PathNode::Virtual(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathLeg {
    pub from: PathNode,
    pub to: PathNode,
    pub method: TravelMethod,
    /// Where the catapult range runs out on a `CatapultSublight` leg.
    pub transition: Option<VirtualNode>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub stops: Vec<StopRef>,
    pub nodes: Vec<PathNode>,
    pub legs: Vec<PathLeg>,
    pub distance: f32,
}

impl Route {
    pub fn system_ids(&self) -> HashSet<SystemId> {
        self.nodes.iter().filter_map(PathNode::system_id).collect()
    }

    pub fn virtual_nodes(&self) -> impl Iterator<Item = &VirtualNode> {
        self.nodes.iter().filter_map(|node| match node {
            PathNode::Virtual(node) => Some(node),
            PathNode::Real(_) => None,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("a route needs a start and an end")]
    NotEnoughStops,
    #[error("could not find a system or position matching \"{0}\"")]
    Unresolved(String),
    #[error("leg {index} request failed: {source}")]
    Segment {
        index: usize,
        #[source]
        source: ApiError,
    },
    #[error("no route found from {from} to {to}")]
    NoRoute { from: StopRef, to: StopRef },
    #[error("leg {index} response is malformed: {reason}")]
    Malformed { index: usize, reason: String },
}

/// One pairwise answer, decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub distance: f32,
    pub nodes: Vec<PathNode>,
    pub legs: Vec<PathLeg>,
}

// =============================================================================
// Stop Resolution
// =============================================================================

/// Resolves a typed stop: system name, then `#<pos>` label, then a literal position.
pub fn resolve_stop(input: &str, galaxy: &Galaxy) -> Result<StopRef, RouteError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RouteError::Unresolved(String::new()));
    }

    let lowered = trimmed.to_lowercase();
    if let Some(system) = galaxy
        .systems()
        .iter()
        .find(|system| system.name.to_lowercase() == lowered)
    {
        return Ok(StopRef::System(system.id));
    }

    if let Some(system) = galaxy
        .systems()
        .iter()
        .find(|system| system.position_label().as_deref() == Some(trimmed))
    {
        return Ok(StopRef::System(system.id));
    }

    if let Some(raw_id) = trimmed.strip_prefix("sys:") {
        let known = raw_id.trim().parse::<SystemId>().ok().filter(|id| galaxy.get(*id).is_some());
        if let Some(id) = known {
            return Ok(StopRef::System(id));
        }
    }

    let literal = trimmed
        .strip_prefix("pos:")
        .or_else(|| trimmed.strip_prefix('#'))
        .unwrap_or(trimmed);
    parse_position(literal)
        .map(StopRef::Position)
        .ok_or_else(|| RouteError::Unresolved(trimmed.to_string()))
}

/// Resolves every non-blank stop; any unresolved stop fails the request.
pub fn resolve_stops(inputs: &[String], galaxy: &Galaxy) -> Result<Vec<StopRef>, RouteError> {
    let stops = inputs
        .iter()
        .filter(|input| !input.trim().is_empty())
        .map(|input| resolve_stop(input, galaxy))
        .collect::<Result<Vec<_>, _>>()?;

    if stops.len() < 2 {
        return Err(RouteError::NotEnoughStops);
    }
    Ok(stops)
}

// =============================================================================
// Segment Decoding
// =============================================================================

fn wire_node_to_path_node(node: &WireNode, galaxy: &Galaxy) -> PathNode {
    match node.id.system_id() {
        Some(id) if galaxy.get(id).is_some() => PathNode::Real(id),
        _ => {
            let label = if node.name.trim().is_empty() {
                node.position.map(position_label).unwrap_or_default()
            } else {
                node.name.clone()
            };
            PathNode::Virtual(VirtualNode {
                position: node.position,
                point: Vec2::new(node.x, node.y),
                label,
            })
        }
    }
}

pub fn decode_segment(
    index: usize,
    from: StopRef,
    to: StopRef,
    response: PathResponse,
    galaxy: &Galaxy,
) -> Result<Segment, RouteError> {
    let distance = match response.distance {
        Some(distance) if distance.is_finite() => distance,
        _ => return Err(RouteError::NoRoute { from, to }),
    };

    let decoded = response
        .path
        .iter()
        .map(|node| (node.id.clone(), wire_node_to_path_node(node, galaxy)))
        .collect::<Vec<(WireNodeId, PathNode)>>();

    let lookup = |id: &WireNodeId| -> Result<PathNode, RouteError> {
        decoded
            .iter()
            .find(|(wire_id, _)| wire_ids_match(wire_id, id))
            .map(|(_, node)| node.clone())
            .ok_or_else(|| RouteError::Malformed {
                index,
                reason: format!("leg endpoint {:?} is not on the path", id),
            })
    };

    let mut legs = Vec::with_capacity(response.detailed_path.len());
    for leg in &response.detailed_path {
        let method = TravelMethod::parse(&leg.method).ok_or_else(|| RouteError::Malformed {
            index,
            reason: format!("unknown travel method '{}'", leg.method),
        })?;
        legs.push(PathLeg {
            from: lookup(&leg.from_id)?,
            to: lookup(&leg.to_id)?,
            method,
            transition: None,
        });
    }

    Ok(Segment {
        distance,
        nodes: decoded.into_iter().map(|(_, node)| node).collect(),
        legs,
    })
}

fn wire_ids_match(a: &WireNodeId, b: &WireNodeId) -> bool {
    match (a.system_id(), b.system_id()) {
        (Some(left), Some(right)) => left == right,
        _ => a == b,
    }
}

/// Splits sublight legs that start inside a catapult range.
///
/// The leg becomes `CatapultSublight` with a virtual node where the range
/// ends, and that node is inserted after the leg's origin in `nodes`.
pub fn synthesize_transitions(segment: &mut Segment, galaxy: &Galaxy) {
    let mut cursor = 0;

    for leg in segment.legs.iter_mut() {
        if leg.method != TravelMethod::Sublight {
            continue;
        }
        let Some(origin) = leg.from.system_id().and_then(|id| galaxy.get(id)) else {
            continue;
        };
        let (Some(from_pos), Some(to_pos)) = (origin.position, leg.to.position(galaxy)) else {
            continue;
        };
        let span = to_pos - from_pos;
        if !origin.has_travel_range() || span.abs() <= origin.travel_range {
            continue;
        }

        let transition = VirtualNode::at_position(from_pos + span.signum() * origin.travel_range);
        leg.method = TravelMethod::CatapultSublight;
        leg.transition = Some(transition.clone());

        if let Some(offset) = segment.nodes[cursor..].iter().position(|node| *node == leg.from) {
            let at = cursor + offset + 1;
            segment.nodes.insert(at, PathNode::Virtual(transition));
            cursor = at + 1;
        }
    }
}

// =============================================================================
// Composition
// =============================================================================

/// Joins decoded segments in stop order.
///
/// Boundary nodes are kept as-is, so a stop shared by two segments appears
/// twice in `nodes`.
pub fn concatenate(stops: Vec<StopRef>, segments: Vec<Segment>) -> Route {
    let mut route = Route {
        stops,
        ..Default::default()
    };
    for segment in segments {
        route.distance += segment.distance;
        route.nodes.extend(segment.nodes);
        route.legs.extend(segment.legs);
    }
    route
}

/// Interprets every pairwise answer; the first failure discards the rest.
pub fn assemble_route(
    stops: Vec<StopRef>,
    responses: Vec<Result<PathResponse, ApiError>>,
    galaxy: &Galaxy,
) -> Result<Route, RouteError> {
    let mut segments = Vec::with_capacity(responses.len());

    for (index, response) in responses.into_iter().enumerate() {
        let (Some(from), Some(to)) = (stops.get(index).copied(), stops.get(index + 1).copied())
        else {
            return Err(RouteError::Malformed {
                index,
                reason: "more answers than legs".to_string(),
            });
        };
        let response = response.map_err(|source| RouteError::Segment { index, source })?;
        let mut segment = decode_segment(index, from, to, response, galaxy)?;
        synthesize_transitions(&mut segment, galaxy);
        segments.push(segment);
    }

    if segments.len() + 1 != stops.len() {
        return Err(RouteError::NotEnoughStops);
    }

    Ok(concatenate(stops, segments))
}

/// Issues one query per consecutive stop pair concurrently and joins them all.
///
/// Stop resolution happens up front, so a typo fails before any request goes out.
pub fn compose_route(
    inputs: &[String],
    galaxy: &Galaxy,
    avoidance: Avoidance,
    service: Arc<dyn PathfindingService>,
) -> Result<Task<Result<Route, RouteError>>, RouteError> {
    let stops = resolve_stops(inputs, galaxy)?;
    let queries = stops
        .windows(2)
        .map(|pair| PathQuery::new(pair[0], pair[1], avoidance))
        .collect::<Vec<_>>();

    info!("Route requested: {} stops, {} legs", stops.len(), queries.len());

    let galaxy = galaxy.clone();
    Ok(IoTaskPool::get().spawn(async move {
        let responses = request_legs(service.as_ref(), &queries);
        assemble_route(stops, responses, &galaxy)
    }))
}

/// Runs every leg query on its own thread and waits until all have settled.
///
/// Answers come back in query order. The IO pool is capped at a few threads,
/// so legs must not share it or they would queue behind each other.
pub fn request_legs(
    service: &dyn PathfindingService,
    queries: &[PathQuery],
) -> Vec<Result<PathResponse, ApiError>> {
    thread::scope(|scope| {
        let handles = queries
            .iter()
            .enumerate()
            .map(|(index, query)| {
                thread::Builder::new()
                    .name(format!("route-leg-{}", index))
                    .spawn_scoped(scope, move || service.find_path(query))
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(ApiError::Worker("leg request panicked".to_string()))),
                Err(error) => Err(ApiError::Worker(error.to_string())),
            })
            .collect()
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::WireLeg;
    use crate::world::StarSystem;
    use bevy::tasks::{block_on, TaskPool};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn assert_close(a: f32, b: f32) {
        let diff = (a - b).abs();
        assert!(diff < 1e-4, "expected {} close to {}", a, b);
    }

    fn galaxy() -> Galaxy {
        Galaxy::from_parts(
            vec![
                StarSystem::new(1, "Alpha", Some(10.0), 0.0),
                StarSystem::new(2, "Beta", Some(20.0), 0.0),
                StarSystem::new(3, "Gamma", Some(40.0), 0.0),
                StarSystem::new(4, "System 4", Some(55.0), 0.0),
                StarSystem::new(5, "Launch", Some(100.0), 30.0),
                StarSystem::new(6, "Far", Some(200.0), 0.0),
            ],
            Vec::new(),
        )
    }

    fn node(id: u64, position: f32) -> WireNode {
        WireNode {
            id: WireNodeId::Text(id.to_string()),
            name: format!("S{}", id),
            x: 0.0,
            y: 0.0,
            position: Some(position),
        }
    }

    fn leg(from: u64, to: u64, method: &str) -> WireLeg {
        WireLeg {
            from_id: WireNodeId::Number(from),
            to_id: WireNodeId::Number(to),
            method: method.to_string(),
        }
    }

    fn response(distance: Option<f32>, nodes: Vec<WireNode>, legs: Vec<WireLeg>) -> PathResponse {
        PathResponse {
            distance,
            path: nodes,
            detailed_path: legs,
        }
    }

    fn alpha_to_beta() -> PathResponse {
        response(
            Some(5.0),
            vec![node(1, 10.0), node(2, 20.0)],
            vec![leg(1, 2, "sublight")],
        )
    }

    struct ScriptedPaths {
        answers: HashMap<(String, String), PathResponse>,
        calls: AtomicUsize,
    }

    impl ScriptedPaths {
        fn new(answers: Vec<((StopRef, StopRef), PathResponse)>) -> Self {
            Self {
                answers: answers
                    .into_iter()
                    .map(|((from, to), answer)| ((from.to_string(), to.to_string()), answer))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PathfindingService for ScriptedPaths {
        fn find_path(&self, query: &PathQuery) -> Result<PathResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(&(query.start_id.to_string(), query.end_id.to_string()))
                .cloned()
                .ok_or(ApiError::Status {
                    status: 404,
                    message: "Start or end system not found in your map.".to_string(),
                })
        }
    }

    fn stops(inputs: &[&str]) -> Vec<String> {
        inputs.iter().map(|input| input.to_string()).collect()
    }

    #[test]
    fn resolve_stop_matches_name_case_insensitively() {
        let galaxy = galaxy();
        assert_eq!(resolve_stop("alpha", &galaxy).ok(), Some(StopRef::System(1)));
        assert_eq!(resolve_stop("  GAMMA ", &galaxy).ok(), Some(StopRef::System(3)));
    }

    #[test]
    fn resolve_stop_matches_position_label() {
        let galaxy = galaxy();
        assert_eq!(resolve_stop("#55", &galaxy).ok(), Some(StopRef::System(4)));
    }

    #[test]
    fn resolve_stop_falls_back_to_literal_position() {
        let galaxy = galaxy();
        assert_eq!(resolve_stop("pos:12.5", &galaxy).ok(), Some(StopRef::Position(12.5)));
        assert_eq!(resolve_stop("77", &galaxy).ok(), Some(StopRef::Position(77.0)));
        assert_eq!(resolve_stop("#78", &galaxy).ok(), Some(StopRef::Position(78.0)));
    }

    #[test]
    fn resolve_stop_accepts_known_system_ids() {
        let galaxy = galaxy();
        assert_eq!(resolve_stop("sys:6", &galaxy).ok(), Some(StopRef::System(6)));
        assert!(resolve_stop("sys:99", &galaxy).is_err());
    }

    #[test]
    fn resolve_stop_rejects_unknown_names() {
        let galaxy = galaxy();
        assert!(matches!(
            resolve_stop("Nowhere", &galaxy),
            Err(RouteError::Unresolved(name)) if name == "Nowhere"
        ));
    }

    #[test]
    fn resolve_stops_skips_blank_waypoints() {
        let galaxy = galaxy();
        let resolved = resolve_stops(&stops(&["Alpha", "", "Beta"]), &galaxy).unwrap_or_default();
        assert_eq!(resolved, vec![StopRef::System(1), StopRef::System(2)]);
    }

    #[test]
    fn resolve_stops_requires_two() {
        let galaxy = galaxy();
        assert!(matches!(
            resolve_stops(&stops(&["Alpha", " "]), &galaxy),
            Err(RouteError::NotEnoughStops)
        ));
    }

    #[test]
    fn resolve_stops_fails_whole_request_on_one_bad_stop() {
        let galaxy = galaxy();
        assert!(resolve_stops(&stops(&["Alpha", "Nowhere", "Beta"]), &galaxy).is_err());
    }

    #[test]
    fn concatenation_sums_distance_and_keeps_boundary_nodes() {
        let galaxy = galaxy();
        let stops = vec![StopRef::System(1), StopRef::System(2), StopRef::System(3)];
        let responses = vec![
            Ok(alpha_to_beta()),
            Ok(response(
                Some(7.0),
                vec![node(2, 20.0), node(3, 40.0)],
                vec![leg(2, 3, "wormhole")],
            )),
        ];

        let route = match assemble_route(stops, responses, &galaxy) {
            Ok(route) => route,
            Err(error) => panic!("route failed: {}", error),
        };

        assert_close(route.distance, 12.0);
        assert_eq!(
            route.nodes,
            vec![
                PathNode::Real(1),
                PathNode::Real(2),
                PathNode::Real(2),
                PathNode::Real(3)
            ]
        );
        assert_eq!(route.legs.len(), 2);
        assert_eq!(route.legs[1].method, TravelMethod::Wormhole);
    }

    #[test]
    fn null_distance_fails_whole_route() {
        let galaxy = galaxy();
        let stops = vec![StopRef::System(1), StopRef::System(2), StopRef::System(3)];
        let responses = vec![
            Ok(alpha_to_beta()),
            Ok(response(None, Vec::new(), Vec::new())),
        ];

        let result = assemble_route(stops, responses, &galaxy);
        assert!(matches!(
            result,
            Err(RouteError::NoRoute {
                from: StopRef::System(2),
                to: StopRef::System(3)
            })
        ));
    }

    #[test]
    fn request_error_fails_whole_route() {
        let galaxy = galaxy();
        let stops = vec![StopRef::System(1), StopRef::System(2)];
        let responses = vec![Err(ApiError::Status {
            status: 401,
            message: "Not authenticated".to_string(),
        })];

        assert!(matches!(
            assemble_route(stops, responses, &galaxy),
            Err(RouteError::Segment { index: 0, .. })
        ));
    }

    #[test]
    fn unknown_method_is_malformed() {
        let galaxy = galaxy();
        let stops = vec![StopRef::System(1), StopRef::System(2)];
        let responses = vec![Ok(response(
            Some(1.0),
            vec![node(1, 10.0), node(2, 20.0)],
            vec![leg(1, 2, "teleport")],
        ))];
        assert!(matches!(
            assemble_route(stops, responses, &galaxy),
            Err(RouteError::Malformed { index: 0, .. })
        ));
    }

    #[test]
    fn server_virtual_nodes_become_tagged_variants() {
        let galaxy = galaxy();
        let start = WireNode {
            id: WireNodeId::Text("virtual_start".to_string()),
            name: "Coordinate #12".to_string(),
            x: 0.5,
            y: -0.25,
            position: Some(12.0),
        };
        let segment = decode_segment(
            0,
            StopRef::Position(12.0),
            StopRef::System(2),
            response(
                Some(8.0),
                vec![start, node(2, 20.0)],
                vec![WireLeg {
                    from_id: WireNodeId::Text("virtual_start".to_string()),
                    to_id: WireNodeId::Text("2".to_string()),
                    method: "sublight".to_string(),
                }],
            ),
            &galaxy,
        );
        let segment = match segment {
            Ok(segment) => segment,
            Err(error) => panic!("segment failed: {}", error),
        };

        match &segment.nodes[0] {
            PathNode::Virtual(node) => {
                assert_eq!(node.label, "Coordinate #12");
                assert_eq!(node.point, Vec2::new(0.5, -0.25));
            }
            other => panic!("expected virtual node, got {:?}", other),
        }
        assert_eq!(segment.nodes[1], PathNode::Real(2));
        assert_eq!(segment.legs[0].to, PathNode::Real(2));
    }

    #[test]
    fn sublight_leg_past_catapult_range_gets_transition_node() {
        let galaxy = galaxy();
        let stops = vec![StopRef::System(5), StopRef::System(6)];
        let responses = vec![Ok(response(
            Some(100.0),
            vec![node(5, 100.0), node(6, 200.0)],
            vec![leg(5, 6, "sublight")],
        ))];

        let route = match assemble_route(stops, responses, &galaxy) {
            Ok(route) => route,
            Err(error) => panic!("route failed: {}", error),
        };

        assert_eq!(route.legs[0].method, TravelMethod::CatapultSublight);
        let transition = route.legs[0]
            .transition
            .clone()
            .unwrap_or_else(|| panic!("no transition"));
        assert_eq!(transition.position, Some(130.0));
        assert_eq!(transition.label, "#130");
        assert_eq!(route.nodes.len(), 3);
        assert_eq!(route.nodes[1], PathNode::Virtual(transition));
    }

    #[test]
    fn transition_walks_inwards_when_destination_is_lower() {
        let galaxy = galaxy();
        let mut segment = Segment {
            distance: 60.0,
            nodes: vec![PathNode::Real(5), PathNode::Real(3)],
            legs: vec![PathLeg {
                from: PathNode::Real(5),
                to: PathNode::Real(3),
                method: TravelMethod::Sublight,
                transition: None,
            }],
        };
        synthesize_transitions(&mut segment, &galaxy);
        let transition = segment.legs[0]
            .transition
            .clone()
            .unwrap_or_else(|| panic!("no transition"));
        assert_eq!(transition.position, Some(70.0));
    }

    #[test]
    fn sublight_leg_inside_range_is_left_alone() {
        let galaxy = galaxy();
        let mut segment = Segment {
            distance: 0.0,
            nodes: vec![PathNode::Real(5), PathNode::Virtual(VirtualNode::at_position(120.0))],
            legs: vec![PathLeg {
                from: PathNode::Real(5),
                to: PathNode::Virtual(VirtualNode::at_position(120.0)),
                method: TravelMethod::Sublight,
                transition: None,
            }],
        };
        synthesize_transitions(&mut segment, &galaxy);
        assert_eq!(segment.legs[0].method, TravelMethod::Sublight);
        assert_eq!(segment.nodes.len(), 2);
    }

    #[test]
    fn compose_route_queries_every_pair() {
        IoTaskPool::get_or_init(TaskPool::new);
        let galaxy = galaxy();
        let service = Arc::new(ScriptedPaths::new(vec![
            (
                (StopRef::System(1), StopRef::System(2)),
                alpha_to_beta(),
            ),
            (
                (StopRef::System(2), StopRef::System(3)),
                response(
                    Some(7.0),
                    vec![node(2, 20.0), node(3, 40.0)],
                    vec![leg(2, 3, "sublight")],
                ),
            ),
        ]));

        let task = match compose_route(
            &stops(&["Alpha", "Beta", "Gamma"]),
            &galaxy,
            Avoidance::default(),
            service.clone(),
        ) {
            Ok(task) => task,
            Err(error) => panic!("compose failed: {}", error),
        };
        let route = match block_on(task) {
            Ok(route) => route,
            Err(error) => panic!("route failed: {}", error),
        };

        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        assert_close(route.distance, 12.0);
        assert_eq!(route.nodes.len(), 4);
        assert_eq!(route.stops.len(), 3);
    }

    #[test]
    fn compose_route_failed_suffix_discards_prefix() {
        IoTaskPool::get_or_init(TaskPool::new);
        let galaxy = galaxy();
        let service = Arc::new(ScriptedPaths::new(vec![
            (
                (StopRef::System(1), StopRef::System(2)),
                alpha_to_beta(),
            ),
            ((StopRef::System(2), StopRef::System(3)), response(None, Vec::new(), Vec::new())),
        ]));

        let task = match compose_route(
            &stops(&["Alpha", "Beta", "Gamma"]),
            &galaxy,
            Avoidance::default(),
            service.clone(),
        ) {
            Ok(task) => task,
            Err(error) => panic!("compose failed: {}", error),
        };

        assert!(block_on(task).is_err());
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    struct SlowPaths {
        delay: Duration,
    }

    impl PathfindingService for SlowPaths {
        fn find_path(&self, query: &PathQuery) -> Result<PathResponse, ApiError> {
            std::thread::sleep(self.delay);
            Ok(PathResponse {
                distance: Some(1.0),
                path: vec![
                    WireNode {
                        id: WireNodeId::Text(query.start_id.to_string()),
                        ..node(0, 0.0)
                    },
                    WireNode {
                        id: WireNodeId::Text(query.end_id.to_string()),
                        ..node(0, 0.0)
                    },
                ],
                detailed_path: Vec::new(),
            })
        }
    }

    #[test]
    fn leg_requests_overlap_instead_of_queueing() {
        let service = SlowPaths {
            delay: Duration::from_millis(250),
        };
        let queries = [(1, 2), (2, 3), (3, 4), (4, 5)]
            .iter()
            .map(|(from, to)| {
                PathQuery::new(StopRef::System(*from), StopRef::System(*to), Avoidance::default())
            })
            .collect::<Vec<_>>();

        let started = Instant::now();
        let responses = request_legs(&service, &queries);
        let elapsed = started.elapsed();

        assert_eq!(responses.len(), 4);
        assert!(responses.iter().all(Result::is_ok));
        assert!(
            elapsed < Duration::from_millis(500),
            "four 250ms legs took {:?}",
            elapsed
        );
    }

    #[test]
    fn leg_answers_keep_query_order() {
        let service = SlowPaths {
            delay: Duration::from_millis(5),
        };
        let queries = vec![
            PathQuery::new(StopRef::System(1), StopRef::System(2), Avoidance::default()),
            PathQuery::new(StopRef::System(2), StopRef::Position(70.0), Avoidance::default()),
        ];
        let ends = request_legs(&service, &queries)
            .into_iter()
            .map(|response| {
                response
                    .ok()
                    .and_then(|answer| answer.path.last().map(|node| node.id.clone()))
            })
            .collect::<Vec<_>>();
        assert_eq!(
            ends,
            vec![
                Some(WireNodeId::Text("sys:2".to_string())),
                Some(WireNodeId::Text("pos:70".to_string()))
            ]
        );
    }

    #[test]
    fn compose_route_fails_before_requests_on_unresolved_stop() {
        IoTaskPool::get_or_init(TaskPool::new);
        let galaxy = galaxy();
        let service = Arc::new(ScriptedPaths::new(Vec::new()));
        let result = compose_route(
            &stops(&["Alpha", "Nowhere"]),
            &galaxy,
            Avoidance::default(),
            service.clone(),
        );
        assert!(result.is_err());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn route_system_ids_skip_virtual_nodes() {
        let route = Route {
            nodes: vec![
                PathNode::Real(1),
                PathNode::Virtual(VirtualNode::at_position(3.0)),
                PathNode::Real(2),
            ],
            ..Default::default()
        };
        let ids = route.system_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1) && ids.contains(&2));
        assert_eq!(route.virtual_nodes().count(), 1);
    }

    #[test]
    fn travel_method_parses_wire_names() {
        assert_eq!(TravelMethod::parse("catapult+sublight"), Some(TravelMethod::CatapultSublight));
        assert_eq!(TravelMethod::parse("Wormhole"), Some(TravelMethod::Wormhole));
        assert_eq!(TravelMethod::parse("warp"), None);
    }
}
