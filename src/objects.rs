//! Entity store
//!
//! Append-only, insertion-ordered collection of [`Object`]s with lazily built
//! secondary indexes. Stores are filled by a single writer during loading
//! (see [`crate::loader::BulkLoader`]) and only read afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::attribute_value::AttributeValue;
use crate::attributes::{self, Attribute};
use crate::dn;
use crate::errors::{PwnError, Result};
use crate::index::IndexManager;
use crate::object::{Object, ObjectId};
use crate::object_type::ObjectType;
use crate::sid::Sid;

/// Per-type object counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObjectStatistics {
    pub total: usize,
    pub by_type: Vec<(ObjectType, usize)>,
}

impl ObjectStatistics {
    pub fn count(&self, object_type: ObjectType) -> usize {
        self.by_type
            .iter()
            .find(|(t, _)| *t == object_type)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct Objects {
    objects: Vec<Arc<Object>>,
    positions: HashMap<ObjectId, usize>,
    type_counts: [usize; ObjectType::COUNT],
    indexes: IndexManager,
}

impl Objects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store with indexes pre-registered for `attributes`
    pub fn with_indexes<I>(attributes: I) -> Self
    where
        I: IntoIterator<Item = Attribute>,
    {
        Objects {
            indexes: IndexManager::configured(attributes),
            ..Self::default()
        }
    }

    /// Admit objects in order, assigning ids to any that lack one.
    ///
    /// Fails on the first object that has neither a distinguished name nor a
    /// SID to derive one from; such an object could never be indexed, so the
    /// load is not safe to continue.
    pub fn add<I>(&mut self, objects: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<Object>>,
    {
        for object in objects {
            self.add_one(object)?;
        }
        Ok(())
    }

    pub fn add_one(&mut self, object: Arc<Object>) -> Result<()> {
        if object.dn().is_empty() {
            let Some(sid) = object.sid() else {
                return Err(PwnError::MissingDistinguishedName(object.ensure_id().value()));
            };
            debug!("Object without DN, falling back to CN={}", sid);
            object.set_attr(
                attributes::DISTINGUISHED_NAME,
                AttributeValue::String(format!("CN={}", sid)),
            );
        }
        self.admit(object);
        Ok(())
    }

    fn admit(&mut self, object: Arc<Object>) {
        let id = object.ensure_id();
        if self.positions.contains_key(&id) {
            debug!("Object {} ({}) already in store", id, object.dn());
            return;
        }
        self.positions.insert(id, self.objects.len());
        self.type_counts[object.object_type().index()] += 1;
        self.indexes.update(&object);
        self.objects.push(object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Object>> {
        self.objects.iter()
    }

    pub fn as_slice(&self) -> &[Arc<Object>] {
        &self.objects
    }

    pub fn by_id(&self, id: ObjectId) -> Option<Arc<Object>> {
        self.positions.get(&id).map(|pos| self.objects[*pos].clone())
    }

    pub fn contains(&self, object: &Object) -> bool {
        object.id().is_some_and(|id| self.positions.contains_key(&id))
    }

    /// Unique object whose `attr` equals `value`
    pub fn find(&self, attr: &Attribute, value: &AttributeValue) -> Option<Arc<Object>> {
        self.indexes.lookup(attr, value, &self.objects)
    }

    pub fn find_dn(&self, dn: &str) -> Option<Arc<Object>> {
        self.find(&attributes::DISTINGUISHED_NAME, &AttributeValue::from(dn))
    }

    /// Matches typed, binary and text objectSid values alike
    pub fn find_sid(&self, sid: &Sid) -> Option<Arc<Object>> {
        self.find(&attributes::OBJECT_SID, &AttributeValue::Sid(sid.clone()))
    }

    /// Matches typed, binary and text objectGUID values alike
    pub fn find_guid(&self, guid: &Uuid) -> Option<Arc<Object>> {
        self.find(&attributes::OBJECT_GUID, &AttributeValue::Guid(*guid))
    }

    /// Existing holder of `sid`, or a new placeholder principal admitted for it
    pub fn find_or_add_sid(&mut self, sid: &Sid) -> Arc<Object> {
        if let Some(existing) = self.find_sid(sid) {
            return existing;
        }
        let object = Object::new(&format!("CN={}", sid));
        object.set_attr(attributes::OBJECT_SID, AttributeValue::Sid(sid.clone()));
        object.set_attr(attributes::NAME, AttributeValue::String(sid.to_string()));
        let object = Arc::new(object);
        self.admit(object.clone());
        debug!("Added placeholder for unknown SID {}", sid);
        object
    }

    /// New store holding the matching objects in their original order, with
    /// the same index attributes registered
    pub fn filter<F>(&self, predicate: F) -> Objects
    where
        F: Fn(&Object) -> bool,
    {
        let mut filtered = Objects::with_indexes(self.indexes.attributes());
        for object in self.objects.iter().filter(|o| predicate(o)) {
            filtered.admit(object.clone());
        }
        filtered
    }

    /// Parent container, located by trimming the leading RDN off the DN
    pub fn parent(&self, object: &Object) -> Option<Arc<Object>> {
        let object_dn = object.dn();
        let parent_dn = dn::parent_dn(&object_dn)?;
        self.find_dn(parent_dn)
    }

    pub fn indexed_attributes(&self) -> Vec<Attribute> {
        self.indexes.attributes()
    }

    pub fn statistics(&self) -> ObjectStatistics {
        ObjectStatistics {
            total: self.objects.len(),
            by_type: ObjectType::ALL
                .iter()
                .map(|t| (*t, self.type_counts[t.index()]))
                .filter(|(_, n)| *n > 0)
                .collect(),
        }
    }

    pub fn log_statistics(&self) {
        let stats = self.statistics();
        for (object_type, count) in &stats.by_type {
            info!("{:>8} {}", count, object_type);
        }
        info!("{:>8} objects total", stats.total);
    }
}

impl<'a> IntoIterator for &'a Objects {
    type Item = &'a Arc<Object>;
    type IntoIter = std::slice::Iter<'a, Arc<Object>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Arc<Object>> for Objects {
    /// Collects already-admitted objects; objects without a DN are skipped
    fn from_iter<T: IntoIterator<Item = Arc<Object>>>(iter: T) -> Self {
        let mut objects = Objects::new();
        for object in iter {
            if let Err(e) = objects.add_one(object) {
                debug!("Skipping object: {}", e);
            }
        }
        objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(dn: &str, category: &str) -> Arc<Object> {
        let object = Object::new(dn);
        object.set_attr(attributes::OBJECT_CATEGORY, AttributeValue::from(category));
        Arc::new(object)
    }

    fn sample_store() -> Objects {
        let mut objects = Objects::new();
        objects
            .add(vec![
                typed("DC=corp,DC=local", "Domain-DNS"),
                typed("OU=Staff,DC=corp,DC=local", "Organizational-Unit"),
                typed("CN=Alice,OU=Staff,DC=corp,DC=local", "Person"),
                typed("CN=Smith\\, Bob,OU=Staff,DC=corp,DC=local", "Person"),
                typed("CN=Helpdesk,OU=Staff,DC=corp,DC=local", "Group"),
            ])
            .unwrap();
        objects
    }

    #[test]
    fn test_add_assigns_ids_in_order() {
        let objects = sample_store();
        assert_eq!(objects.len(), 5);
        let ids: Vec<ObjectId> = objects.iter().filter_map(|o| o.id()).collect();
        assert_eq!(ids.len(), 5);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(Arc::ptr_eq(&objects.by_id(ids[2]).unwrap(), &objects.as_slice()[2]));
    }

    #[test]
    fn test_add_same_object_twice_is_ignored() {
        let mut objects = Objects::new();
        let a = typed("CN=A", "Person");
        objects.add_one(a.clone()).unwrap();
        objects.add_one(a).unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_find_dn_case_insensitive() {
        let objects = sample_store();
        let alice = objects.find_dn("cn=alice,ou=staff,dc=corp,dc=local").unwrap();
        assert_eq!(alice.dn(), "CN=Alice,OU=Staff,DC=corp,DC=local");
        assert!(objects.find_dn("CN=Nobody,DC=corp,DC=local").is_none());
    }

    #[test]
    fn test_index_kept_current_after_build() {
        let mut objects = sample_store();
        assert!(objects.find_dn("CN=Late,DC=corp,DC=local").is_none());
        objects.add_one(typed("CN=Late,DC=corp,DC=local", "Person")).unwrap();
        assert!(objects.find_dn("CN=Late,DC=corp,DC=local").is_some());
    }

    #[test]
    fn test_parent_lookup() {
        let objects = sample_store();
        let bob = objects.find_dn("CN=Smith\\, Bob,OU=Staff,DC=corp,DC=local").unwrap();
        let parent = objects.parent(&bob).unwrap();
        assert_eq!(parent.dn(), "OU=Staff,DC=corp,DC=local");

        let domain = objects.find_dn("DC=corp,DC=local").unwrap();
        // DC=local is not in the store
        assert!(objects.parent(&domain).is_none());
        let top = Object::new("DC=local");
        assert!(objects.parent(&top).is_none());
    }

    #[test]
    fn test_filter_preserves_order_and_index_config() {
        let objects = sample_store();
        objects.find_dn("DC=corp,DC=local");

        let people = objects.filter(|o| o.object_type() == ObjectType::User);
        assert_eq!(people.len(), 2);
        assert_eq!(people.as_slice()[0].dn(), "CN=Alice,OU=Staff,DC=corp,DC=local");
        assert_eq!(people.indexed_attributes(), vec![attributes::DISTINGUISHED_NAME]);
        assert!(people.find_dn("CN=Alice,OU=Staff,DC=corp,DC=local").is_some());
        assert!(people.find_dn("OU=Staff,DC=corp,DC=local").is_none());
    }

    #[test]
    fn test_missing_dn_without_sid_is_fatal() {
        let mut objects = Objects::new();
        let result = objects.add_one(Arc::new(Object::empty()));
        assert!(matches!(result, Err(PwnError::MissingDistinguishedName(_))));
        assert!(objects.is_empty());
    }

    #[test]
    fn test_missing_dn_falls_back_to_sid() {
        let mut objects = Objects::new();
        let object = Object::empty();
        object.set_attr(attributes::OBJECT_SID, AttributeValue::from("S-1-5-21-1-2-3-500"));
        objects.add_one(Arc::new(object)).unwrap();
        assert!(objects.find_dn("CN=S-1-5-21-1-2-3-500").is_some());
    }

    #[test]
    fn test_find_or_add_sid() {
        let mut objects = sample_store();
        let sid = Sid::parse("S-1-5-21-7-7-7-1108").unwrap();
        let placeholder = objects.find_or_add_sid(&sid);
        assert_eq!(objects.len(), 6);
        let again = objects.find_or_add_sid(&sid);
        assert!(Arc::ptr_eq(&placeholder, &again));
        assert_eq!(objects.len(), 6);
    }

    #[test]
    fn test_find_sid_any_storage_form() {
        let sid = Sid::parse("S-1-5-21-1-2-3-500").unwrap();
        let forms = [
            AttributeValue::Sid(sid.clone()),
            AttributeValue::Blob(sid.as_bytes().to_vec()),
            AttributeValue::from("S-1-5-21-1-2-3-500"),
        ];
        for value in forms {
            let mut objects = Objects::new();
            let admin = typed("CN=Administrator,CN=Users,DC=corp,DC=local", "Person");
            admin.set_attr(attributes::OBJECT_SID, value);
            objects.add_one(admin.clone()).unwrap();

            let found = objects.find_or_add_sid(&sid);
            assert!(Arc::ptr_eq(&found, &admin));
            assert_eq!(objects.len(), 1);
        }
    }

    #[test]
    fn test_find_guid_any_storage_form() {
        let guid = Uuid::parse_str("bf967aba-0de6-11d0-a285-00aa003049e2").unwrap();
        let forms = [
            AttributeValue::Guid(guid),
            AttributeValue::Blob(guid.to_bytes_le().to_vec()),
            AttributeValue::from("{BF967ABA-0DE6-11D0-A285-00AA003049E2}"),
        ];
        for value in forms {
            let mut objects = Objects::new();
            let object = typed("CN=User,CN=Schema,CN=Configuration,DC=corp,DC=local", "Class-Schema");
            object.set_attr(attributes::OBJECT_GUID, value);
            objects.add_one(object.clone()).unwrap();
            assert!(Arc::ptr_eq(&objects.find_guid(&guid).unwrap(), &object));
        }
    }

    #[test]
    fn test_colliding_dn_after_index_built() {
        let mut objects = sample_store();
        let first = objects.find_dn("CN=Alice,OU=Staff,DC=corp,DC=local").unwrap();

        let second = typed("cn=ALICE,ou=staff,dc=corp,dc=local", "Person");
        objects.add_one(second.clone()).unwrap();
        assert_eq!(objects.len(), 6);

        let found = objects.find_dn("CN=Alice,OU=Staff,DC=corp,DC=local").unwrap();
        assert!(Arc::ptr_eq(&found, &first));
        assert!(!Arc::ptr_eq(&found, &second));
    }

    #[test]
    fn test_statistics() {
        let objects = sample_store();
        let stats = objects.statistics();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.count(ObjectType::User), 2);
        assert_eq!(stats.count(ObjectType::Group), 1);
        assert_eq!(stats.count(ObjectType::Computer), 0);
    }
}
