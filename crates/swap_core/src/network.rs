//! Road network: a directed graph of planar nodes and graded edges.
//!
//! Nodes carry origin/destination weights for trip sampling and, once the
//! scenario is built, the station entity placed on them. The builder methods
//! stand in for a real map importer.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use bevy_ecs::prelude::{Entity, Resource};
use lru::LruCache;
use ordered_float::OrderedFloat;
use pathfinding::prelude::astar;

use crate::clock::ONE_HOUR_MS;
use crate::error::NetworkError;

const PATH_CACHE_CAPACITY: usize = 4096;

/// Time to cover `length_km` at a constant `speed_kmh`.
pub fn travel_time_ms(length_km: f64, speed_kmh: f64) -> u64 {
    if speed_kmh <= 0.0 {
        return u64::MAX;
    }
    (length_km / speed_kmh * ONE_HOUR_MS as f64).round() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub x_km: f64,
    pub y_km: f64,
    pub elevation_m: f64,
    /// Relative likelihood of being picked as a trip origin.
    pub start_weight: f64,
    /// Relative likelihood of being picked as a trip destination.
    pub end_weight: f64,
    /// Station type preassigned by the map; overrides random placement.
    pub station_type: Option<u32>,
    pub station: Option<Entity>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub length_km: f64,
    /// Signed rise over run.
    pub grade: f64,
    pub grade_abs: f64,
}

impl Edge {
    pub fn grade_degrees(&self) -> f64 {
        self.grade.atan().to_degrees()
    }
}

#[derive(Resource)]
pub struct RoadNetwork {
    nodes: Vec<Node>,
    adjacency: Vec<Vec<Edge>>,
    path_cache: Mutex<LruCache<(NodeId, NodeId), Option<Vec<NodeId>>>>,
}

impl Default for RoadNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RoadNetwork {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            adjacency: self.adjacency.clone(),
            path_cache: new_cache(),
        }
    }
}

fn new_cache() -> Mutex<LruCache<(NodeId, NodeId), Option<Vec<NodeId>>>> {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(PATH_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
    ))
}

impl RoadNetwork {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            adjacency: Vec::new(),
            path_cache: new_cache(),
        }
    }

    pub fn add_node(&mut self, x_km: f64, y_km: f64) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            x_km,
            y_km,
            elevation_m: 0.0,
            start_weight: 1.0,
            end_weight: 1.0,
            station_type: None,
            station: None,
        });
        self.adjacency.push(Vec::new());
        id
    }

    pub fn add_node_with_elevation(&mut self, x_km: f64, y_km: f64, elevation_m: f64) -> NodeId {
        let id = self.add_node(x_km, y_km);
        self.nodes[id.index()].elevation_m = elevation_m;
        id
    }

    /// Adds a directed edge with an explicit length and signed grade.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        length_km: f64,
        grade: f64,
    ) -> Result<(), NetworkError> {
        self.check(from)?;
        self.check(to)?;
        if !(length_km.is_finite() && length_km > 0.0) {
            return Err(NetworkError::InvalidLength {
                from,
                to,
                length_km,
            });
        }
        self.adjacency[from.index()].push(Edge {
            from,
            to,
            length_km,
            grade,
            grade_abs: grade.abs(),
        });
        self.clear_cache();
        Ok(())
    }

    /// Adds both directions between two nodes. Length is the straight-line
    /// distance and grade follows the elevation difference.
    pub fn add_road(&mut self, a: NodeId, b: NodeId) -> Result<(), NetworkError> {
        self.check(a)?;
        self.check(b)?;
        let length_km = self.straight_line_km(a, b);
        let rise_m = self.nodes[b.index()].elevation_m - self.nodes[a.index()].elevation_m;
        let grade = if length_km > 0.0 {
            rise_m / (length_km * 1000.0)
        } else {
            0.0
        };
        self.add_edge(a, b, length_km, grade)?;
        self.add_edge(b, a, length_km, -grade)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn edges_from(&self, id: NodeId) -> &[Edge] {
        self.adjacency
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edge(&self, from: NodeId, to: NodeId) -> Option<&Edge> {
        self.edges_from(from).iter().find(|edge| edge.to == to)
    }

    pub fn set_weights(
        &mut self,
        id: NodeId,
        start_weight: f64,
        end_weight: f64,
    ) -> Result<(), NetworkError> {
        let node = self.nodes.get_mut(id.index()).ok_or(NetworkError::UnknownNode(id))?;
        node.start_weight = start_weight;
        node.end_weight = end_weight;
        Ok(())
    }

    pub fn preassign_station(&mut self, id: NodeId, station_type: u32) -> Result<(), NetworkError> {
        let node = self.nodes.get_mut(id.index()).ok_or(NetworkError::UnknownNode(id))?;
        node.station_type = Some(station_type);
        Ok(())
    }

    pub fn attach_station(&mut self, id: NodeId, station: Entity) -> Result<(), NetworkError> {
        let node = self.nodes.get_mut(id.index()).ok_or(NetworkError::UnknownNode(id))?;
        node.station = Some(station);
        Ok(())
    }

    pub fn station_at(&self, id: NodeId) -> Option<Entity> {
        self.node(id).and_then(|node| node.station)
    }

    pub fn is_station(&self, id: NodeId) -> bool {
        self.station_at(id).is_some()
    }

    /// Station entities ordered by node id.
    pub fn stations(&self) -> impl Iterator<Item = (NodeId, Entity)> + '_ {
        self.nodes
            .iter()
            .filter_map(|node| node.station.map(|station| (node.id, station)))
    }

    pub fn straight_line_km(&self, a: NodeId, b: NodeId) -> f64 {
        match (self.node(a), self.node(b)) {
            (Some(a), Some(b)) => (a.x_km - b.x_km).hypot(a.y_km - b.y_km),
            _ => f64::INFINITY,
        }
    }

    /// Least-length path, A* with the straight-line distance as lower bound.
    /// Results are cached per (source, target) pair.
    pub fn shortest_path(&self, source: NodeId, target: NodeId) -> Option<Vec<NodeId>> {
        let key = (source, target);
        if let Ok(mut cache) = self.path_cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return cached.clone();
            }
        }

        let result = self.node(source).and(self.node(target)).and_then(|_| {
            astar(
                &source,
                |node| {
                    self.edges_from(*node)
                        .iter()
                        .map(|edge| (edge.to, OrderedFloat(edge.length_km)))
                        .collect::<Vec<_>>()
                },
                |node| OrderedFloat(self.straight_line_km(*node, target)),
                |node| *node == target,
            )
            .map(|(path, _)| path)
        });

        if let Ok(mut cache) = self.path_cache.lock() {
            cache.put(key, result.clone());
        }
        result
    }

    /// Sum of edge lengths along `path`; `None` if two consecutive nodes are not joined.
    pub fn path_length_km(&self, path: &[NodeId]) -> Option<f64> {
        path.windows(2)
            .map(|pair| self.edge(pair[0], pair[1]).map(|edge| edge.length_km))
            .sum()
    }

    /// Square grid of `width x height` nodes joined by two-way roads.
    pub fn grid(width: u32, height: u32, spacing_km: f64) -> Result<Self, NetworkError> {
        let mut network = Self::new();
        for row in 0..height {
            for col in 0..width {
                network.add_node(col as f64 * spacing_km, row as f64 * spacing_km);
            }
        }
        let at = |row: u32, col: u32| NodeId(row * width + col);
        for row in 0..height {
            for col in 0..width {
                if col + 1 < width {
                    network.add_road(at(row, col), at(row, col + 1))?;
                }
                if row + 1 < height {
                    network.add_road(at(row, col), at(row + 1, col))?;
                }
            }
        }
        Ok(network)
    }

    /// `count` nodes on a straight line joined by two-way roads.
    pub fn line(count: u32, spacing_km: f64) -> Result<Self, NetworkError> {
        Self::grid(count, 1, spacing_km)
    }

    fn check(&self, id: NodeId) -> Result<(), NetworkError> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(NetworkError::UnknownNode(id))
        }
    }

    fn clear_cache(&self) {
        if let Ok(mut cache) = self.path_cache.lock() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_path_prefers_shorter_total_length() {
        let mut network = RoadNetwork::new();
        let a = network.add_node(0.0, 0.0);
        let b = network.add_node(1.0, 0.0);
        let c = network.add_node(2.0, 0.0);
        network.add_edge(a, c, 5.0, 0.0).expect("edge");
        network.add_edge(a, b, 1.0, 0.0).expect("edge");
        network.add_edge(b, c, 1.0, 0.0).expect("edge");

        assert_eq!(network.shortest_path(a, c), Some(vec![a, b, c]));
        assert_eq!(network.path_length_km(&[a, b, c]), Some(2.0));
        assert_eq!(network.shortest_path(c, a), None);
    }

    #[test]
    fn road_grades_are_opposite_in_each_direction() {
        let mut network = RoadNetwork::new();
        let low = network.add_node_with_elevation(0.0, 0.0, 0.0);
        let high = network.add_node_with_elevation(1.0, 0.0, 100.0);
        network.add_road(low, high).expect("road");

        let up = network.edge(low, high).expect("uphill");
        let down = network.edge(high, low).expect("downhill");
        assert!((up.grade - 0.1).abs() < 1e-12);
        assert!((down.grade + 0.1).abs() < 1e-12);
        assert_eq!(up.grade_abs, down.grade_abs);
        assert!(up.grade_degrees() > 5.0 && up.grade_degrees() < 6.0);
    }

    #[test]
    fn grid_has_expected_shape() {
        let network = RoadNetwork::grid(3, 2, 1.0).expect("grid");
        assert_eq!(network.node_count(), 6);
        // 2 rows x 2 horizontal + 3 vertical, both directions
        assert_eq!(network.edge_count(), 2 * (4 + 3));
        let path = network.shortest_path(NodeId(0), NodeId(5)).expect("path");
        assert_eq!(network.path_length_km(&path), Some(3.0));
    }

    #[test]
    fn travel_time_follows_speed() {
        assert_eq!(travel_time_ms(36.0, 72.0), ONE_HOUR_MS / 2);
        assert_eq!(travel_time_ms(1.0, 0.0), u64::MAX);
    }

    #[test]
    fn invalid_edges_are_rejected() {
        let mut network = RoadNetwork::new();
        let a = network.add_node(0.0, 0.0);
        assert_eq!(
            network.add_edge(a, NodeId(9), 1.0, 0.0),
            Err(NetworkError::UnknownNode(NodeId(9)))
        );
        let b = network.add_node(0.0, 0.0);
        assert!(matches!(
            network.add_road(a, b),
            Err(NetworkError::InvalidLength { .. })
        ));
    }

    #[test]
    fn cached_path_is_dropped_when_edges_change() {
        let mut network = RoadNetwork::line(3, 1.0).expect("line");
        let (a, c) = (NodeId(0), NodeId(2));
        assert_eq!(network.shortest_path(a, c).map(|p| p.len()), Some(3));
        network.add_edge(a, c, 1.5, 0.0).expect("shortcut");
        assert_eq!(network.shortest_path(a, c), Some(vec![a, c]));
    }
}
