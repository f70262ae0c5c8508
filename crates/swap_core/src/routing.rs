//! Energy-constrained route planning.
//!
//! [`define_path`] plans a least-length baseline, walks it against the
//! vehicle's remaining charge and, when the charge runs out before the target,
//! stops at the last station passed or searches for a detour to a nearby one.
//! The returned path never implies negative charge before its last node.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::error::PathError;
use crate::network::{Edge, NodeId, RoadNetwork};
use crate::vehicle::Vehicle;

/// What the planner needs to know about the traveller.
pub trait EnergyProfile {
    fn level_kwh(&self) -> f64;
    fn edge_consumption(&self, edge: &Edge) -> f64;
}

impl EnergyProfile for Vehicle {
    fn level_kwh(&self) -> f64 {
        self.level()
    }

    fn edge_consumption(&self, edge: &Edge) -> f64 {
        self.vehicle_type.consumption(edge)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlannerOptions {
    /// Hop radius of the detour search around each backtrack root.
    pub max_detour_hops: Option<u32>,
}

pub fn define_path<E: EnergyProfile + ?Sized>(
    network: &RoadNetwork,
    source: NodeId,
    target: NodeId,
    vehicle: &E,
) -> Result<Vec<NodeId>, PathError> {
    define_path_with(network, source, target, vehicle, &PlannerOptions::default())
}

pub fn define_path_with<E: EnergyProfile + ?Sized>(
    network: &RoadNetwork,
    source: NodeId,
    target: NodeId,
    vehicle: &E,
    options: &PlannerOptions,
) -> Result<Vec<NodeId>, PathError> {
    let no_path = PathError::NoPath {
        origin: source,
        target,
    };
    if source == target {
        return network.node(source).map(|_| vec![source]).ok_or(no_path);
    }
    let baseline = network.shortest_path(source, target).ok_or(no_path)?;

    // levels[i] is the charge left on reaching baseline[i].
    let mut levels = Vec::with_capacity(baseline.len());
    levels.push(vehicle.level_kwh());
    let mut last_station = None;

    for (i, pair) in baseline.windows(2).enumerate() {
        let edge = network.edge(pair[0], pair[1]).ok_or(no_path)?;
        let next_level = levels[i] - vehicle.edge_consumption(edge);
        if next_level >= 0.0 {
            levels.push(next_level);
            if network.is_station(pair[1]) {
                last_station = Some(i + 1);
            }
            continue;
        }

        if let Some(station) = last_station {
            debug!(?source, ?target, station = ?baseline[station], "truncating at last station");
            return Ok(baseline[..=station].to_vec());
        }
        return detour(network, &baseline[..=i], &levels, vehicle, options).ok_or(
            PathError::EnergyConstrained {
                origin: source,
                target,
            },
        );
    }

    Ok(baseline)
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    hops: u32,
    seq: u64,
    node: NodeId,
    level: f64,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.hops == other.hops && self.seq == other.seq
    }
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (hops, seq).
        other
            .hops
            .cmp(&self.hops)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Best-first search for a reachable station, backtracking along `prefix`
/// from its last node to its first.
///
/// Nodes are marked visited on first discovery and stay visited for later
/// roots, so a node first reached on a low charge is never revisited with a
/// higher one.
fn detour<E: EnergyProfile + ?Sized>(
    network: &RoadNetwork,
    prefix: &[NodeId],
    levels: &[f64],
    vehicle: &E,
    options: &PlannerOptions,
) -> Option<Vec<NodeId>> {
    let mut visited: HashSet<NodeId> = prefix.iter().copied().collect();
    let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
    let mut seq = 0u64;

    for root in (0..prefix.len()).rev() {
        let mut frontier = BinaryHeap::new();
        frontier.push(Frontier {
            hops: 0,
            seq,
            node: prefix[root],
            level: levels[root],
        });
        seq += 1;

        while let Some(current) = frontier.pop() {
            let hops = current.hops + 1;
            if options.max_detour_hops.is_some_and(|max| hops > max) {
                continue;
            }
            for edge in network.edges_from(current.node) {
                if visited.contains(&edge.to) {
                    continue;
                }
                let level = current.level - vehicle.edge_consumption(edge);
                if level < 0.0 {
                    continue;
                }
                visited.insert(edge.to);
                parent.insert(edge.to, current.node);

                if network.is_station(edge.to) {
                    let mut tail = vec![edge.to];
                    let mut node = current.node;
                    while node != prefix[root] {
                        tail.push(node);
                        let Some(&up) = parent.get(&node) else {
                            break;
                        };
                        node = up;
                    }
                    tail.reverse();
                    let mut path = prefix[..=root].to_vec();
                    path.extend(tail);
                    debug!(root = ?prefix[root], station = ?edge.to, "detour found");
                    return Some(path);
                }

                frontier.push(Frontier {
                    hops,
                    seq,
                    node: edge.to,
                    level,
                });
                seq += 1;
            }
        }
    }
    None
}
