//! Secondary attribute indexes
//!
//! One index per attribute maps each value to the unique object holding it.
//! Indexes are built on the first lookup of an attribute by scanning the
//! store, then kept current by every later admission. String values are keyed
//! lowercased; other kinds key on their native value. objectSid and objectGUID
//! values key on the decoded identifier, whichever form the loader stored.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::attribute_value::AttributeValue;
use crate::attributes::{self, Attribute};
use crate::object::Object;
use crate::sid::Sid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IndexKey {
    String(String),
    Int(i64),
    Time(DateTime<Utc>),
    Sid(Sid),
    Guid(Uuid),
    Blob(Vec<u8>),
}

impl IndexKey {
    fn new(attr: &Attribute, value: &AttributeValue) -> Self {
        if *attr == attributes::OBJECT_SID {
            if let Some(sid) = value.to_sid() {
                return IndexKey::Sid(sid);
            }
        } else if *attr == attributes::OBJECT_GUID {
            if let Some(guid) = value.to_guid() {
                return IndexKey::Guid(guid);
            }
        }
        match value {
            AttributeValue::String(s) => IndexKey::String(s.to_lowercase()),
            AttributeValue::Int(i) => IndexKey::Int(*i),
            AttributeValue::Time(t) => IndexKey::Time(*t),
            AttributeValue::Sid(sid) => IndexKey::Sid(sid.clone()),
            AttributeValue::Guid(guid) => IndexKey::Guid(*guid),
            AttributeValue::Blob(bytes) => IndexKey::Blob(bytes.clone()),
        }
    }
}

#[derive(Default)]
struct AttributeIndex {
    entries: HashMap<IndexKey, Arc<Object>>,
}

impl AttributeIndex {
    fn build(attr: &Attribute, objects: &[Arc<Object>]) -> Self {
        let mut index = AttributeIndex::default();
        for object in objects {
            index.insert(attr, object);
        }
        index
    }

    /// First holder of a value wins; later holders are logged and skipped
    fn insert(&mut self, attr: &Attribute, object: &Arc<Object>) {
        let Some(values) = object.attr(attr) else {
            return;
        };
        for value in values.iter() {
            let key = IndexKey::new(attr, value);
            match self.entries.get(&key) {
                Some(existing) if Arc::ptr_eq(existing, object) => {}
                Some(existing) => {
                    warn!(
                        "Duplicate {} value '{}': {} already indexed, not indexing {}",
                        attr,
                        value,
                        existing.dn(),
                        object.dn()
                    );
                }
                None => {
                    self.entries.insert(key, object.clone());
                }
            }
        }
    }

    fn get(&self, attr: &Attribute, value: &AttributeValue) -> Option<Arc<Object>> {
        self.entries.get(&IndexKey::new(attr, value)).cloned()
    }
}

/// Index set owned by one store
#[derive(Default)]
pub struct IndexManager {
    indexes: Mutex<HashMap<Attribute, AttributeIndex>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with empty indexes already registered for `attributes`
    pub fn configured<I>(attributes: I) -> Self
    where
        I: IntoIterator<Item = Attribute>,
    {
        let indexes = attributes
            .into_iter()
            .map(|attr| (attr, AttributeIndex::default()))
            .collect();
        IndexManager {
            indexes: Mutex::new(indexes),
        }
    }

    pub fn attributes(&self) -> Vec<Attribute> {
        let mut attrs: Vec<Attribute> = self.indexes.lock().keys().cloned().collect();
        attrs.sort();
        attrs
    }

    /// Look `value` up, building the index from `objects` if this is the
    /// first lookup on `attr`
    pub fn lookup(
        &self,
        attr: &Attribute,
        value: &AttributeValue,
        objects: &[Arc<Object>],
    ) -> Option<Arc<Object>> {
        let mut indexes = self.indexes.lock();
        let index = indexes.entry(attr.clone()).or_insert_with(|| {
            let index = AttributeIndex::build(attr, objects);
            info!(
                "Built index on {} over {} objects ({} values)",
                attr,
                objects.len(),
                index.entries.len()
            );
            index
        });
        index.get(attr, value)
    }

    /// Merge a newly admitted object into every existing index
    pub fn update(&mut self, object: &Arc<Object>) {
        for (attr, index) in self.indexes.get_mut().iter_mut() {
            index.insert(attr, object);
        }
    }
}
