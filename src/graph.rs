//! Analysis output
//!
//! A [`PwnGraph`] is built fresh by each analysis call and handed to export
//! code read-only.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::object::{Object, ObjectId};
use crate::pwn_method::PwnMethodBitmap;

/// One node of an analysis result
#[derive(Debug, Clone)]
pub struct GraphObject {
    pub object: Arc<Object>,
    /// Was one of the seeds (or the end of a path)
    pub target: bool,
    /// Outgoing edges left out by the fan-out cap
    pub can_expand: usize,
}

impl GraphObject {
    pub fn id(&self) -> ObjectId {
        self.object.ensure_id()
    }
}

impl Serialize for GraphObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GraphObject", 6)?;
        state.serialize_field("id", &self.id())?;
        state.serialize_field("dn", &self.object.dn())?;
        state.serialize_field("label", &self.object.label())?;
        state.serialize_field("type", &self.object.object_type())?;
        state.serialize_field("target", &self.target)?;
        state.serialize_field("can_expand", &self.can_expand)?;
        state.end()
    }
}

/// Directed compromise edge, always pointing from attacker to victim
#[derive(Debug, Clone)]
pub struct PwnConnection {
    pub source: Arc<Object>,
    pub target: Arc<Object>,
    pub methods: PwnMethodBitmap,
}

impl PwnConnection {
    pub fn key(&self) -> (ObjectId, ObjectId) {
        (self.source.ensure_id(), self.target.ensure_id())
    }
}

impl Serialize for PwnConnection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (source, target) = self.key();
        let mut state = serializer.serialize_struct("PwnConnection", 3)?;
        state.serialize_field("source", &source)?;
        state.serialize_field("target", &target)?;
        state.serialize_field("methods", &self.methods)?;
        state.end()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PwnGraph {
    pub nodes: Vec<GraphObject>,
    pub connections: Vec<PwnConnection>,
}

impl PwnGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn find_node(&self, id: ObjectId) -> Option<&GraphObject> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn find_connection(&self, source: ObjectId, target: ObjectId) -> Option<&PwnConnection> {
        self.connections.iter().find(|c| c.key() == (source, target))
    }

    /// Ascending node ids, then ascending (source, target) connection ids
    pub fn sort(&mut self) {
        self.nodes.sort_by_key(GraphObject::id);
        self.connections.sort_by_key(PwnConnection::key);
    }
}
