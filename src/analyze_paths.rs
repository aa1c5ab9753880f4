//! Cheapest attack path between two objects
//!
//! Dijkstra over outgoing edges. An edge costs `101 - p` where `p` is the best
//! probability among its filtered techniques, so likelier techniques are
//! cheaper and every usable edge costs at least 1. Edges removed by the filter
//! or the probability floor do not exist for the query.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::config::AnalyzePathsOptions;
use crate::graph::{GraphObject, PwnConnection, PwnGraph};
use crate::object::{Object, ObjectId, PwnLink};
use crate::probability::{max_probability, Probability};

struct Search<'a> {
    options: &'a AnalyzePathsOptions,
    distances: HashMap<ObjectId, u32>,
    predecessors: HashMap<ObjectId, Arc<Object>>,
    reached: HashMap<ObjectId, Arc<Object>>,
    visited: HashSet<ObjectId>,
    queue: BinaryHeap<Reverse<(u32, ObjectId)>>,
}

impl<'a> Search<'a> {
    fn new(options: &'a AnalyzePathsOptions, start: &Arc<Object>) -> Self {
        let start_id = start.ensure_id();
        let mut search = Search {
            options,
            distances: HashMap::new(),
            predecessors: HashMap::new(),
            reached: HashMap::new(),
            visited: HashSet::new(),
            queue: BinaryHeap::new(),
        };
        search.distances.insert(start_id, 0);
        search.reached.insert(start_id, start.clone());
        search.queue.push(Reverse((0, start_id)));
        search
    }

    /// Cost of the edge `source -> link target`, `None` if it is filtered out
    fn edge_weight(&self, source: &Object, target: &Object, link: &PwnLink) -> Option<u32> {
        let methods = link.methods().intersect(self.options.method_filter);
        if !methods.is_usable() {
            return None;
        }
        let probability = max_probability(source, target, methods, link.hints());
        if self.options.min_probability > Probability::NEVER && probability < self.options.min_probability {
            return None;
        }
        Some(probability.weight())
    }

    fn run(&mut self, end_id: ObjectId) {
        while let Some(Reverse((distance, id))) = self.queue.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            // Settled: no later pop can improve on it
            if id == end_id {
                break;
            }
            let Some(current) = self.reached.get(&id).cloned() else {
                continue;
            };

            for (target_id, link) in current.can_pwn() {
                if self.visited.contains(&target_id) {
                    continue;
                }
                let Some(target) = link.object() else {
                    continue;
                };
                let Some(weight) = self.edge_weight(&current, &target, &link) else {
                    continue;
                };

                let candidate = distance + weight;
                let best = self.distances.get(&target_id).copied().unwrap_or(u32::MAX);
                if candidate < best {
                    self.distances.insert(target_id, candidate);
                    self.predecessors.insert(target_id, current.clone());
                    self.reached.insert(target_id, target);
                    self.queue.push(Reverse((candidate, target_id)));
                }
            }
        }
    }

    /// Walk predecessors back from `end`, emitting nodes start to end
    fn into_graph(self, start_id: ObjectId, end: &Arc<Object>) -> PwnGraph {
        let mut graph = PwnGraph::new();
        let mut current = end.clone();
        let mut current_id = end.ensure_id();
        graph.nodes.push(GraphObject {
            object: current.clone(),
            target: true,
            can_expand: 0,
        });

        while current_id != start_id {
            let Some(previous) = self.predecessors.get(&current_id).cloned() else {
                break;
            };
            graph.connections.push(PwnConnection {
                methods: previous.can_pwn_methods(&current),
                source: previous.clone(),
                target: current,
            });
            graph.nodes.push(GraphObject {
                object: previous.clone(),
                target: false,
                can_expand: 0,
            });
            current_id = previous.ensure_id();
            current = previous;
        }

        graph.nodes.reverse();
        graph.connections.reverse();
        graph
    }
}

/// Cheapest route from `start` to `end`, or an empty graph if `end` cannot be
/// reached through edges passing the filter and probability floor.
///
/// Nodes run from `start` to `end`; `end` is flagged as the target.
/// Connections carry the full technique set currently recorded between each
/// pair of hops.
pub fn analyze_paths(start: &Arc<Object>, end: &Arc<Object>, options: &AnalyzePathsOptions) -> PwnGraph {
    let start_id = start.ensure_id();
    let end_id = end.ensure_id();
    if start_id == end_id {
        return PwnGraph::new();
    }

    let mut search = Search::new(options, start);
    search.run(end_id);

    if !search.predecessors.contains_key(&end_id) {
        debug!(
            "No path from {} to {} ({} objects visited)",
            start.dn(),
            end.dn(),
            search.visited.len()
        );
        return PwnGraph::new();
    }
    let cost = search.distances.get(&end_id).copied().unwrap_or_default();

    let graph = search.into_graph(start_id, end);
    debug!(
        "Path from {} to {}: {} hops, cost {}",
        start.dn(),
        end.dn(),
        graph.connection_count(),
        cost
    );
    graph
}
