//! Bounded reachability expansion
//!
//! Expands a seed set round by round over the compromise edges, keeping only
//! edges that pass the technique filter and probability floor. Each round
//! processes every pending object; objects are stamped with the round they
//! were finalized in so later rounds do not walk back behind the frontier.
//!
//! High fan-out nodes ("Everyone", "Domain Users") are capped: past
//! `max_fanout` surviving edges only group edges are followed and the rest is
//! reported as `can_expand` on the node.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::config::{AnalyzeObjectsOptions, Direction};
use crate::graph::{GraphObject, PwnConnection, PwnGraph};
use crate::object::{Object, ObjectId};
use crate::object_type::ObjectType;
use crate::objects::Objects;
use crate::probability::{max_probability, Probability};
use crate::pwn_method::PwnMethodBitmap;

struct Candidate {
    object: Arc<Object>,
    methods: PwnMethodBitmap,
}

struct Expansion<'a> {
    options: &'a AnalyzeObjectsOptions,
    exclude: &'a Objects,
    /// Round each object was finalized in, 0 while pending
    rounds: HashMap<ObjectId, u32>,
    objects: BTreeMap<ObjectId, Arc<Object>>,
    connections: BTreeMap<(ObjectId, ObjectId), PwnConnection>,
    can_expand: HashMap<ObjectId, usize>,
}

impl<'a> Expansion<'a> {
    fn new(options: &'a AnalyzeObjectsOptions, exclude: &'a Objects) -> Self {
        Expansion {
            options,
            exclude,
            rounds: HashMap::new(),
            objects: BTreeMap::new(),
            connections: BTreeMap::new(),
            can_expand: HashMap::new(),
        }
    }

    fn seed(&mut self, object: &Arc<Object>) {
        let id = object.ensure_id();
        self.rounds.insert(id, 0);
        self.objects.insert(id, object.clone());
    }

    fn pending(&self) -> Vec<Arc<Object>> {
        self.objects
            .iter()
            .filter(|(id, _)| self.rounds.get(id) == Some(&0))
            .map(|(_, object)| object.clone())
            .collect()
    }

    /// Edges of `object` in the walked direction that survive filtering
    fn candidates(&self, object: &Arc<Object>, round: u32) -> Vec<Candidate> {
        let links = match self.options.direction {
            Direction::Forward => object.pwnable_by(),
            Direction::Reverse => object.can_pwn(),
        };

        let mut candidates = Vec::new();
        for (id, link) in links {
            let Some(other) = link.object() else {
                continue;
            };

            // Empty, or only the deny indicator left
            let methods = link.methods().intersect(self.options.method_filter);
            if !methods.is_usable() {
                continue;
            }

            if self.options.min_probability > Probability::NEVER {
                let (source, target) = match self.options.direction {
                    Direction::Forward => (&other, object),
                    Direction::Reverse => (object, &other),
                };
                if max_probability(source, target, methods, link.hints()) < self.options.min_probability {
                    continue;
                }
            }

            if !self.options.backlinks && other.object_type() != ObjectType::Attacker {
                if let Some(&finalized) = self.rounds.get(&id) {
                    if finalized != 0 && finalized < round {
                        continue;
                    }
                }
            }

            if self.exclude.find_dn(&other.dn()).is_some() {
                continue;
            }

            candidates.push(Candidate { object: other, methods });
        }
        candidates
    }

    /// Apply the fan-out cap, keeping group edges
    fn cap(&mut self, object: &Object, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let max_fanout = self.options.max_fanout;
        if max_fanout == 0 || candidates.len() < max_fanout {
            return candidates;
        }

        let total = candidates.len();
        let groups: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.object.object_type() == ObjectType::Group)
            .collect();
        let dropped = total - groups.len();
        if dropped > 0 {
            debug!(
                "Fan-out cap on {}: {} edges, keeping {} group edges",
                object.dn(),
                total,
                groups.len()
            );
            self.can_expand.insert(object.ensure_id(), dropped);
        }
        groups
    }

    fn connect(&mut self, object: &Arc<Object>, candidate: Candidate) -> bool {
        let object_id = object.ensure_id();
        let other_id = candidate.object.ensure_id();
        let (key, source, target) = match self.options.direction {
            Direction::Forward => ((other_id, object_id), &candidate.object, object),
            Direction::Reverse => ((object_id, other_id), object, &candidate.object),
        };
        self.connections
            .entry(key)
            .and_modify(|c| c.methods = c.methods.merge(candidate.methods))
            .or_insert_with(|| PwnConnection {
                source: source.clone(),
                target: target.clone(),
                methods: candidate.methods,
            });

        if self.rounds.contains_key(&other_id) {
            return false;
        }
        self.rounds.insert(other_id, 0);
        self.objects.insert(other_id, candidate.object);
        true
    }

    fn run(&mut self) {
        let mut round = 1;
        loop {
            if self.options.max_depth.is_some_and(|max| round > max) {
                break;
            }
            let pending = self.pending();
            if pending.is_empty() {
                break;
            }

            let mut added = 0;
            for object in &pending {
                let candidates = self.candidates(object, round);
                for candidate in self.cap(object, candidates) {
                    if self.connect(object, candidate) {
                        added += 1;
                    }
                }
            }
            for object in &pending {
                self.rounds.insert(object.ensure_id(), round);
            }

            debug!(
                "Round {}: processed {} objects, {} new, {} connections",
                round,
                pending.len(),
                added,
                self.connections.len()
            );
            if added == 0 {
                break;
            }
            round += 1;
        }
    }

    fn into_graph(self, seeds: &HashSet<ObjectId>) -> PwnGraph {
        let can_expand = self.can_expand;
        PwnGraph {
            nodes: self
                .objects
                .into_iter()
                .map(|(id, object)| GraphObject {
                    object,
                    target: seeds.contains(&id),
                    can_expand: can_expand.get(&id).copied().unwrap_or(0),
                })
                .collect(),
            connections: self.connections.into_values().collect(),
        }
    }
}

/// Everything connected to `include` within the configured bounds.
///
/// In [`Direction::Forward`] the result answers "who can reach the seeds";
/// connections always point from attacker to victim whichever adjacency map
/// was walked. Objects whose DN is found in `exclude` are never added.
pub fn analyze_objects(include: &Objects, exclude: &Objects, options: &AnalyzeObjectsOptions) -> PwnGraph {
    let mut expansion = Expansion::new(options, exclude);
    let mut seeds = HashSet::new();
    for object in include {
        expansion.seed(object);
        seeds.insert(object.ensure_id());
    }

    expansion.run();
    let graph = expansion.into_graph(&seeds);
    debug!(
        "Expansion from {} seeds: {} nodes, {} connections",
        seeds.len(),
        graph.node_count(),
        graph.connection_count()
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_value::AttributeValue;
    use crate::attributes;
    use crate::pwn_method::PwnMethod;

    fn typed(dn: &str, category: &str) -> Arc<Object> {
        let object = Object::new(dn);
        object.set_attr(attributes::OBJECT_CATEGORY, AttributeValue::from(category));
        Arc::new(object)
    }

    fn store(objects: &[&Arc<Object>]) -> Objects {
        let mut store = Objects::new();
        store.add(objects.iter().map(|o| (*o).clone())).unwrap();
        store
    }

    fn ids(graph: &PwnGraph) -> Vec<ObjectId> {
        graph.nodes.iter().map(GraphObject::id).collect()
    }

    #[test]
    fn test_forward_depth_one() {
        let a = typed("CN=A,DC=x", "Person");
        let b = typed("CN=B,DC=x", "Person");
        let c = typed("CN=C,DC=x", "Person");
        a.pwns(&b, PwnMethod::ResetPassword, Probability::CERTAIN);
        b.pwns(&c, PwnMethod::ResetPassword, Probability::CERTAIN);
        let _all = store(&[&a, &b, &c]);

        let options = AnalyzeObjectsOptions {
            max_depth: Some(1),
            ..Default::default()
        };
        let graph = analyze_objects(&store(&[&c]), &Objects::new(), &options);

        assert_eq!(graph.node_count(), 2);
        assert!(graph.find_node(c.ensure_id()).unwrap().target);
        assert!(!graph.find_node(b.ensure_id()).unwrap().target);
        assert!(graph.find_node(a.ensure_id()).is_none());
        // Arrow points from attacker to victim
        assert!(graph.find_connection(b.ensure_id(), c.ensure_id()).is_some());
    }

    #[test]
    fn test_reverse_unbounded() {
        let a = typed("CN=A,DC=x", "Person");
        let b = typed("CN=B,DC=x", "Person");
        let c = typed("CN=C,DC=x", "Person");
        a.pwns(&b, PwnMethod::GenericAll, Probability::CERTAIN);
        b.pwns(&c, PwnMethod::GenericAll, Probability::CERTAIN);

        let options = AnalyzeObjectsOptions {
            direction: Direction::Reverse,
            ..Default::default()
        };
        let graph = analyze_objects(&store(&[&a]), &Objects::new(), &options);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.connection_count(), 2);
        assert!(graph.find_connection(a.ensure_id(), b.ensure_id()).is_some());
        assert!(graph.find_connection(b.ensure_id(), c.ensure_id()).is_some());
    }

    #[test]
    fn test_deny_only_edge_ignored() {
        let a = typed("CN=A,DC=x", "Person");
        let b = typed("CN=B,DC=x", "Person");
        a.pwns(&b, PwnMethod::AclContainsDeny, Probability::CERTAIN);
        a.pwns(&b, PwnMethod::WriteDacl, Probability::CERTAIN);

        let options = AnalyzeObjectsOptions {
            method_filter: PwnMethodBitmap::from(PwnMethod::AclContainsDeny).with(PwnMethod::Owns),
            ..Default::default()
        };
        let graph = analyze_objects(&store(&[&b]), &Objects::new(), &options);
        assert_eq!(ids(&graph), vec![b.ensure_id()]);
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_fanout_keeps_groups() {
        let hub = typed("CN=Everyone,DC=x", "Person");
        let mut victims = Vec::new();
        for (i, category) in ["Group", "Person", "Group", "Person", "Computer"].iter().enumerate() {
            let victim = typed(&format!("CN=V{},DC=x", i), category);
            hub.pwns(&victim, PwnMethod::GenericAll, Probability::CERTAIN);
            victims.push(victim);
        }

        let options = AnalyzeObjectsOptions {
            direction: Direction::Reverse,
            max_fanout: 3,
            ..Default::default()
        };
        let graph = analyze_objects(&store(&[&hub]), &Objects::new(), &options);
        let hub_node = graph.find_node(hub.ensure_id()).unwrap();
        assert_eq!(hub_node.can_expand, 3);
        assert_eq!(graph.connection_count(), 2);
        assert!(graph.find_node(victims[0].ensure_id()).is_some());
        assert!(graph.find_node(victims[2].ensure_id()).is_some());
        assert!(graph.find_node(victims[1].ensure_id()).is_none());

        // Below the cap everything is kept
        let options = AnalyzeObjectsOptions {
            max_fanout: 6,
            ..options
        };
        let graph = analyze_objects(&store(&[&hub]), &Objects::new(), &options);
        assert_eq!(graph.connection_count(), 5);
        assert_eq!(graph.find_node(hub.ensure_id()).unwrap().can_expand, 0);
    }

    #[test]
    fn test_exclude_by_dn() {
        let a = typed("CN=A,DC=x", "Person");
        let b = typed("CN=B,DC=x", "Person");
        let c = typed("CN=C,DC=x", "Person");
        a.pwns(&c, PwnMethod::Owns, Probability::CERTAIN);
        b.pwns(&c, PwnMethod::Owns, Probability::CERTAIN);

        let exclude = store(&[&Arc::new(Object::new("cn=a,dc=x"))]);
        let graph = analyze_objects(&store(&[&c]), &exclude, &AnalyzeObjectsOptions::default());
        assert!(graph.find_node(a.ensure_id()).is_none());
        assert!(graph.find_node(b.ensure_id()).is_some());
    }

    #[test]
    fn test_min_probability_floor() {
        let a = typed("CN=A,DC=x", "Person");
        let b = typed("CN=B,DC=x", "Person");
        let c = typed("CN=C,DC=x", "Person");
        a.pwns(&c, PwnMethod::HasSession, Probability::CERTAIN);
        b.pwns(&c, PwnMethod::GenericAll, Probability::CERTAIN);

        let options = AnalyzeObjectsOptions {
            min_probability: Probability::new(50),
            ..Default::default()
        };
        let graph = analyze_objects(&store(&[&c]), &Objects::new(), &options);
        assert!(graph.find_node(a.ensure_id()).is_none());
        assert!(graph.find_node(b.ensure_id()).is_some());
    }

    #[test]
    fn test_backlinks() {
        // A and B own each other; seed A
        let a = typed("CN=A,DC=x", "Person");
        let b = typed("CN=B,DC=x", "Person");
        a.pwns(&b, PwnMethod::Owns, Probability::CERTAIN);
        b.pwns(&a, PwnMethod::Owns, Probability::CERTAIN);

        let options = AnalyzeObjectsOptions {
            direction: Direction::Reverse,
            ..Default::default()
        };
        let graph = analyze_objects(&store(&[&a]), &Objects::new(), &options);
        assert_eq!(graph.connection_count(), 1);

        let options = AnalyzeObjectsOptions {
            backlinks: true,
            ..options
        };
        let graph = analyze_objects(&store(&[&a]), &Objects::new(), &options);
        assert_eq!(graph.connection_count(), 2);
        assert!(graph.find_connection(b.ensure_id(), a.ensure_id()).is_some());
    }

    #[test]
    fn test_attacker_always_reevaluated() {
        let attacker = Arc::new(Object::attacker());
        let victim = typed("CN=Victim,DC=x", "Person");
        attacker.pwns(&victim, PwnMethod::ResetPassword, Probability::CERTAIN);
        victim.pwns(&attacker, PwnMethod::HasSession, Probability::CERTAIN);

        let options = AnalyzeObjectsOptions {
            direction: Direction::Reverse,
            ..Default::default()
        };
        let graph = analyze_objects(&store(&[&attacker]), &Objects::new(), &options);
        assert!(graph
            .find_connection(victim.ensure_id(), attacker.ensure_id())
            .is_some());
    }

    #[test]
    fn test_connections_merge_techniques() {
        let a = typed("CN=A,DC=x", "Person");
        let b = typed("CN=B,DC=x", "Person");
        a.pwns(&b, PwnMethod::GenericAll, Probability::CERTAIN);
        a.pwns(&b, PwnMethod::WriteDacl, Probability::CERTAIN);

        let graph = analyze_objects(&store(&[&b]), &Objects::new(), &AnalyzeObjectsOptions::default());
        let connection = graph.find_connection(a.ensure_id(), b.ensure_id()).unwrap();
        assert_eq!(connection.methods.count(), 2);
    }
}
