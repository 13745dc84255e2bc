//! # Topological Orderings
//!
//! Two ways to linearize the object graph, both rooted at the highest
//! index (the root table) and both re-establishing reverse topological
//! order when they finish.
//!
//! [`sort_kahn`] is the cheap default: a plain FIFO Kahn's algorithm that
//! preserves the producer's sibling locality. [`sort_shortest_distance`]
//! is the fallback for graphs whose offsets overflow under the Kahn order:
//! it first runs Dijkstra from the root with edge weights that charge a
//! large penalty per link width, then emits ready nodes closest-first, so
//! children behind narrow 16-bit links get packed near their ancestors
//! while children behind wide 32-bit links can drift to the back.
//!
//! Both sorts use linear-scan minimum extraction, so the distance sort is
//! O(V²). An addressable priority queue would bring it down to
//! O((V + E) log V); graph sizes seen in practice haven't justified one.

use std::collections::{BTreeSet, VecDeque};

use crate::error::RepackError;
use crate::graph::{Graph, OffsetWidth};

/// Penalty charged for routing through a narrow (16-bit) link: the full
/// span such a field can address. A child placed past this many bytes is
/// guaranteed to overflow, so the distance metric treats every narrow hop
/// as this expensive.
const NARROW_PENALTY: i64 = 1 << 16;

/// Penalty charged for a wide (32-bit) link. Large enough to dominate any
/// narrow chain, which effectively deprioritizes wide-linked children.
const WIDE_PENALTY: i64 = 1 << 32;

// ─── Kahn Sort ──────────────────────────────────────────────────

/// Re-sort the graph with Kahn's algorithm, FIFO tie-break.
///
/// The current sequence is already reverse-topological, so the last index
/// has no incoming edges and seeds the queue. Ready nodes are emitted in
/// strict discovery order, which keeps the ordering deterministic and
/// stable across runs.
pub fn sort_kahn(graph: &mut Graph) -> Result<(), RepackError> {
    if graph.len() <= 1 {
        // Nothing to reorder.
        return Ok(());
    }

    let mut edge_count = graph.incoming_edge_count();
    let mut queue = VecDeque::new();
    queue.push_back(graph.root());

    let mut order = Vec::with_capacity(graph.len());
    while let Some(next) = queue.pop_front() {
        order.push(next);
        for link in &graph.objects()[next].links {
            edge_count[link.child] -= 1;
            if edge_count[link.child] == 0 {
                queue.push_back(link.child);
            }
        }
    }

    finish(graph, order)
}

// ─── Shortest-Distance Sort ─────────────────────────────────────

/// Re-sort the graph so that, among ready nodes, the one with the smallest
/// weighted distance from the root is always emitted next (ties go to the
/// smaller index).
pub fn sort_shortest_distance(graph: &mut Graph) -> Result<(), RepackError> {
    if graph.len() <= 1 {
        return Ok(());
    }

    let distance = compute_distances(graph)?;
    let mut edge_count = graph.incoming_edge_count();

    let mut ready = BTreeSet::new();
    ready.insert(graph.root());

    let mut order = Vec::with_capacity(graph.len());
    while !ready.is_empty() {
        let next = closest_object(&ready, &distance);
        ready.remove(&next);
        order.push(next);
        for link in &graph.objects()[next].links {
            edge_count[link.child] -= 1;
            if edge_count[link.child] == 0 {
                ready.insert(link.child);
            }
        }
    }

    finish(graph, order)
}

/// Weighted shortest distance from the root to every object (Dijkstra).
///
/// Edge weight is the child's payload size plus the width penalty, so
/// distances are dominated by how many narrow links a path crosses.
/// Returns [`RepackError::GraphStructure`] if any object is unreachable.
pub fn compute_distances(graph: &Graph) -> Result<Vec<i64>, RepackError> {
    let mut distance = vec![i64::MAX; graph.len()];
    distance[graph.root()] = 0;

    let mut unvisited: BTreeSet<usize> = (0..graph.len()).collect();
    while !unvisited.is_empty() {
        let next = closest_object(&unvisited, &distance);
        if distance[next] == i64::MAX {
            let stranded = unvisited.len();
            return Err(RepackError::GraphStructure(format!(
                "{} object(s) unreachable from the root",
                stranded
            )));
        }
        unvisited.remove(&next);

        for link in &graph.objects()[next].links {
            if !unvisited.contains(&link.child) {
                continue;
            }
            let child = &graph.objects()[link.child];
            let penalty = match link.width {
                OffsetWidth::Narrow => NARROW_PENALTY,
                OffsetWidth::Wide => WIDE_PENALTY,
            };
            let child_distance = distance[next] + child.data.len() as i64 + penalty;
            if child_distance < distance[link.child] {
                distance[link.child] = child_distance;
            }
        }
    }

    Ok(distance)
}

/// The member of `set` with the smallest distance. Iteration is in
/// ascending index order and the comparison is strict, so ties resolve to
/// the smaller index.
fn closest_object(set: &BTreeSet<usize>, distance: &[i64]) -> usize {
    let mut closest_distance = i64::MAX;
    let mut closest = *set.iter().next().expect("set is non-empty");
    for &index in set {
        if distance[index] < closest_distance {
            closest_distance = distance[index];
            closest = index;
        }
    }
    closest
}

/// Check the emission order covers the whole graph, then install it.
///
/// `order` is root-first; the graph stores objects leaf-first, so the
/// order is reversed before being applied as a permutation.
fn finish(graph: &mut Graph, mut order: Vec<usize>) -> Result<(), RepackError> {
    if order.len() != graph.len() {
        return Err(RepackError::GraphStructure(format!(
            "{} object(s) never became ready; the graph is disconnected or cyclic",
            graph.len() - order.len()
        )));
    }
    order.reverse();
    graph.apply_permutation(&order)
}

// ─── Tests ──────────────────────────────────────────────────────
