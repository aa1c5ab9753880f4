//! Graph nodes
//!
//! An [`Object`] is one directory (or local machine) entity: its attributes,
//! its outgoing (`can_pwn`) and incoming (`pwnable_by`) compromise edges, and
//! lazily derived fields. Objects are shared as `Arc<Object>` and mutated
//! through interior locks, so loaders and rule engines can record edges
//! through shared handles.
//!
//! Edge maps hold `Weak` handles to the far end; the owning [`crate::Objects`]
//! store keeps every object alive for the session.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute_value::{AttributeValue, AttributeValues};
use crate::attributes::{self, Attribute};
use crate::errors::{PwnError, Result};
use crate::object_type::ObjectType;
use crate::probability::{max_probability, Probability, ProbabilityHints};
use crate::pwn_method::{PwnMethod, PwnMethodBitmap};
use crate::security_descriptor::SecurityDescriptor;
use crate::sid::Sid;
use crate::uac::UserAccountControl;

static NEXT_OBJECT_ID: AtomicU32 = AtomicU32::new(1);

/// Process-local object identity, assigned once and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of a compromise edge, as stored in an adjacency map
#[derive(Debug, Clone)]
pub struct PwnLink {
    object: Weak<Object>,
    methods: PwnMethodBitmap,
    hints: ProbabilityHints,
}

impl PwnLink {
    /// The object at the other end of the edge
    pub fn object(&self) -> Option<Arc<Object>> {
        self.object.upgrade()
    }

    pub fn methods(&self) -> PwnMethodBitmap {
        self.methods
    }

    pub fn hints(&self) -> &ProbabilityHints {
        &self.hints
    }

    fn record(&mut self, method: PwnMethod, hint: Probability) {
        self.methods.set(method);
        self.hints.record(method, hint);
    }
}

/// Adjacency map keyed by the far end's id. Ordered so traversal is
/// reproducible run to run.
pub type PwnLinks = BTreeMap<ObjectId, PwnLink>;

#[derive(Debug, Default)]
struct Derived {
    object_type: Option<ObjectType>,
    sid: Option<Option<Sid>>,
    guid: Option<Option<Uuid>>,
}

pub struct Object {
    id: OnceLock<ObjectId>,
    attributes: RwLock<HashMap<Attribute, AttributeValues>>,
    can_pwn: RwLock<PwnLinks>,
    pwnable_by: RwLock<PwnLinks>,
    derived: RwLock<Derived>,
    security_descriptor: RwLock<Option<Arc<SecurityDescriptor>>>,
}

impl Object {
    /// Empty object with only a distinguished name
    pub fn new(dn: &str) -> Self {
        let object = Self::empty();
        if !dn.is_empty() {
            object.set_attr(attributes::DISTINGUISHED_NAME, AttributeValue::from(dn));
        }
        object
    }

    pub fn empty() -> Self {
        Object {
            id: OnceLock::new(),
            attributes: RwLock::new(HashMap::new()),
            can_pwn: RwLock::new(BTreeMap::new()),
            pwnable_by: RwLock::new(BTreeMap::new()),
            derived: RwLock::new(Derived::default()),
            security_descriptor: RwLock::new(None),
        }
    }

    pub fn with_attributes<I>(attrs: I) -> Self
    where
        I: IntoIterator<Item = (Attribute, AttributeValues)>,
    {
        let object = Self::empty();
        object.attributes.write().extend(attrs);
        object
    }

    /// The synthetic attacker placeholder
    pub fn attacker() -> Self {
        let object = Self::new("CN=Attacker");
        object.set_attr(attributes::NAME, AttributeValue::from("Attacker"));
        object.set_attr(attributes::TYPE, AttributeValue::from("Attacker"));
        object
    }

    /// Id if one has been assigned
    pub fn id(&self) -> Option<ObjectId> {
        self.id.get().copied()
    }

    /// Id, assigning the next free one on first call
    pub fn ensure_id(&self) -> ObjectId {
        *self
            .id
            .get_or_init(|| ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)))
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn dn(&self) -> String {
        self.one_attr_string(&attributes::DISTINGUISHED_NAME)
            .unwrap_or_default()
    }

    /// Display label: displayName, then name, then DN
    pub fn label(&self) -> String {
        self.one_attr_string(&attributes::DISPLAY_NAME)
            .or_else(|| self.one_attr_string(&attributes::NAME))
            .unwrap_or_else(|| self.dn())
    }

    pub fn attr(&self, attr: &Attribute) -> Option<AttributeValues> {
        self.attributes.read().get(attr).cloned()
    }

    pub fn one_attr(&self, attr: &Attribute) -> Option<AttributeValue> {
        self.attributes
            .read()
            .get(attr)
            .and_then(|values| values.first().cloned())
    }

    pub fn one_attr_string(&self, attr: &Attribute) -> Option<String> {
        self.one_attr(attr).map(|value| value.to_string())
    }

    pub fn one_attr_i64(&self, attr: &Attribute) -> Option<i64> {
        self.one_attr(attr).and_then(|value| value.as_i64())
    }

    pub fn attr_strings(&self, attr: &Attribute) -> Vec<String> {
        self.attributes
            .read()
            .get(attr)
            .map(|values| values.strings())
            .unwrap_or_default()
    }

    pub fn has_attr(&self, attr: &Attribute) -> bool {
        self.attributes
            .read()
            .get(attr)
            .is_some_and(|values| !values.is_empty())
    }

    /// Case-insensitive match against any rendered value of `attr`
    pub fn has_attr_value(&self, attr: &Attribute, value: &str) -> bool {
        self.attributes.read().get(attr).is_some_and(|values| {
            values
                .iter()
                .any(|v| v.to_string().eq_ignore_ascii_case(value))
        })
    }

    /// Replace every value of `attr`
    pub fn set_attr(&self, attr: Attribute, values: impl Into<AttributeValues>) {
        self.attributes.write().insert(attr, values.into());
        *self.derived.write() = Derived::default();
    }

    /// Append one value to `attr`
    pub fn add_attr_value(&self, attr: Attribute, value: AttributeValue) {
        {
            let mut attrs = self.attributes.write();
            match attrs.get_mut(&attr) {
                Some(values) => values.push(value),
                None => {
                    attrs.insert(attr, AttributeValues::from(value));
                }
            }
        }
        *self.derived.write() = Derived::default();
    }

    // ------------------------------------------------------------------
    // Derived fields
    // ------------------------------------------------------------------

    pub fn object_type(&self) -> ObjectType {
        if let Some(object_type) = self.derived.read().object_type {
            return object_type;
        }
        let object_type = self.classify();
        self.derived.write().object_type = Some(object_type);
        object_type
    }

    fn classify(&self) -> ObjectType {
        if let Some(category) = self.one_attr_string(&attributes::TYPE) {
            return ObjectType::from_category(&category);
        }
        if let Some(category) = self.one_attr_string(&attributes::OBJECT_CATEGORY) {
            return ObjectType::from_category(&category);
        }
        // objectClass lists the hierarchy, most specific class last
        self.attr_strings(&attributes::OBJECT_CLASS)
            .last()
            .map(|class| ObjectType::from_category(class))
            .unwrap_or(ObjectType::Other)
    }

    pub fn sid(&self) -> Option<Sid> {
        if let Some(sid) = &self.derived.read().sid {
            return sid.clone();
        }
        let sid = self.one_attr(&attributes::OBJECT_SID).and_then(|value| value.to_sid());
        self.derived.write().sid = Some(sid.clone());
        sid
    }

    pub fn guid(&self) -> Option<Uuid> {
        if let Some(guid) = self.derived.read().guid {
            return guid;
        }
        let guid = self.one_attr(&attributes::OBJECT_GUID).and_then(|value| value.to_guid());
        self.derived.write().guid = Some(guid);
        guid
    }

    pub fn uac(&self) -> UserAccountControl {
        let raw = self
            .one_attr_i64(&attributes::USER_ACCOUNT_CONTROL)
            .unwrap_or(0);
        UserAccountControl::new(raw as u32)
    }

    pub fn is_disabled(&self) -> bool {
        self.uac().is_disabled()
    }

    pub fn set_security_descriptor(&self, descriptor: Arc<SecurityDescriptor>) {
        *self.security_descriptor.write() = Some(descriptor);
    }

    pub fn security_descriptor(&self) -> Result<Arc<SecurityDescriptor>> {
        self.security_descriptor
            .read()
            .clone()
            .ok_or_else(|| PwnError::NoSecurityDescriptor(self.dn()))
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Record that `self` can compromise `target` via `method`.
    ///
    /// The edge lands in `self.can_pwn` and `target.pwnable_by` under one
    /// pair of locks. Self edges, edges between two imports of the same SID
    /// and edges touching the SELF / CREATOR OWNER / SYSTEM placeholders are
    /// ignored. Returns whether the edge was recorded.
    ///
    /// `hint` caps the probability of this technique on this edge;
    /// [`Probability::CERTAIN`] records no cap.
    pub fn pwns(self: &Arc<Self>, target: &Arc<Object>, method: PwnMethod, hint: Probability) -> bool {
        if Arc::ptr_eq(self, target) {
            return false;
        }

        let source_sid = self.sid();
        let target_sid = target.sid();
        if source_sid.is_some() && source_sid == target_sid {
            return false;
        }
        if source_sid.as_ref().is_some_and(Sid::is_placeholder)
            || target_sid.as_ref().is_some_and(Sid::is_placeholder)
        {
            return false;
        }

        let source_id = self.ensure_id();
        let target_id = target.ensure_id();
        if source_id == target_id {
            return false;
        }

        // can_pwn locks are always taken before pwnable_by locks
        let mut outgoing = self.can_pwn.write();
        let mut incoming = target.pwnable_by.write();

        outgoing
            .entry(target_id)
            .or_insert_with(|| PwnLink {
                object: Arc::downgrade(target),
                methods: PwnMethodBitmap::EMPTY,
                hints: ProbabilityHints::default(),
            })
            .record(method, hint);
        incoming
            .entry(source_id)
            .or_insert_with(|| PwnLink {
                object: Arc::downgrade(self),
                methods: PwnMethodBitmap::EMPTY,
                hints: ProbabilityHints::default(),
            })
            .record(method, hint);
        true
    }

    /// Snapshot of outgoing edges
    pub fn can_pwn(&self) -> PwnLinks {
        self.can_pwn.read().clone()
    }

    /// Snapshot of incoming edges
    pub fn pwnable_by(&self) -> PwnLinks {
        self.pwnable_by.read().clone()
    }

    /// Live outgoing technique set towards `target`
    pub fn can_pwn_methods(&self, target: &Object) -> PwnMethodBitmap {
        target
            .id()
            .and_then(|id| self.can_pwn.read().get(&id).map(|link| link.methods))
            .unwrap_or_default()
    }

    /// Live incoming technique set from `source`
    pub fn pwnable_by_methods(&self, source: &Object) -> PwnMethodBitmap {
        source
            .id()
            .and_then(|id| self.pwnable_by.read().get(&id).map(|link| link.methods))
            .unwrap_or_default()
    }

    pub fn can_pwn_count(&self) -> usize {
        self.can_pwn.read().len()
    }

    pub fn pwnable_by_count(&self) -> usize {
        self.pwnable_by.read().len()
    }

    /// Best probability of `self` compromising `target` with any of `methods`
    pub fn pwn_probability(&self, target: &Object, methods: PwnMethodBitmap) -> Probability {
        let Some(id) = target.id() else {
            return Probability::NEVER;
        };
        let links = self.can_pwn.read();
        match links.get(&id) {
            Some(link) => max_probability(self, target, link.methods.intersect(methods), &link.hints),
            None => Probability::NEVER,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id())
            .field("dn", &self.dn())
            .field("type", &self.object_type())
            .finish()
    }
}
