//! Cached security descriptors
//!
//! The byte-level parser lives with the loaders; this module only defines the
//! decoded shape they hand over and the content-keyed cache that makes sure a
//! descriptor shared by thousands of objects (the common case for inherited
//! ACLs) is decoded once and shared as a single `Arc`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::Result;
use crate::sid::Sid;

/// ACE kinds relevant to edge decisions (MS-DTYP 2.4.4.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AceType {
    AccessAllowed,
    AccessDenied,
    AccessAllowedObject,
    AccessDeniedObject,
    SystemAudit,
    Unknown,
}

impl AceType {
    pub fn from_raw(ace_type: u8) -> Self {
        match ace_type {
            0x00 => AceType::AccessAllowed,
            0x01 => AceType::AccessDenied,
            0x02 => AceType::SystemAudit,
            0x05 => AceType::AccessAllowedObject,
            0x06 => AceType::AccessDeniedObject,
            _ => AceType::Unknown,
        }
    }

    pub fn is_deny(self) -> bool {
        matches!(self, AceType::AccessDenied | AceType::AccessDeniedObject)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AceEntry {
    pub ace_type: AceType,
    pub ace_flags: u8,
    pub access_mask: u32,
    pub trustee: Sid,
    pub object_type: Option<Uuid>,
    pub inherited_object_type: Option<Uuid>,
}

/// Decoded security descriptor as produced by a loader's parser
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDescriptor {
    pub control_flags: u16,
    pub owner: Option<Sid>,
    pub group: Option<Sid>,
    pub dacl: Vec<AceEntry>,
}

impl SecurityDescriptor {
    /// Drives the informative ACLContainsDeny edge
    pub fn has_deny_entries(&self) -> bool {
        self.dacl.iter().any(|ace| ace.ace_type.is_deny())
    }

    pub fn entries_for<'a>(&'a self, trustee: &'a Sid) -> impl Iterator<Item = &'a AceEntry> + 'a {
        self.dacl.iter().filter(move |ace| &ace.trustee == trustee)
    }
}

struct CachedDescriptor {
    raw: Arc<[u8]>,
    descriptor: Arc<SecurityDescriptor>,
}

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    collisions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn collisions(&self) -> u64 {
        self.collisions.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 { hits / total } else { 0.0 }
    }
}

/// Concurrent descriptor cache keyed by a hash of the raw bytes.
/// Entries keep their raw bytes so a hash collision is detected rather than
/// handing back the wrong ACL.
#[derive(Default)]
pub struct DescriptorCache {
    entries: DashMap<u64, CachedDescriptor>,
    stats: Arc<CacheStats>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn content_hash(raw: &[u8]) -> u64 {
        let mut hasher = DefaultHasher::new();
        raw.hash(&mut hasher);
        hasher.finish()
    }

    /// Return the shared descriptor for `raw`, running `parse` only the first
    /// time these exact bytes are seen
    pub fn get_or_parse<F>(&self, raw: &[u8], parse: F) -> Result<Arc<SecurityDescriptor>>
    where
        F: FnOnce(&[u8]) -> anyhow::Result<SecurityDescriptor>,
    {
        let key = Self::content_hash(raw);

        if let Some(entry) = self.entries.get(&key) {
            if *entry.raw == *raw {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.descriptor.clone());
            }
            drop(entry);
            self.stats.collisions.fetch_add(1, Ordering::Relaxed);
            warn!("Security descriptor hash collision on {:016x}, parsing uncached", key);
            return Ok(Arc::new(parse(raw)?));
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let descriptor = Arc::new(parse(raw)?);

        // A concurrent loader may have inserted the same bytes meanwhile; keep theirs
        let entry = self.entries.entry(key).or_insert_with(|| CachedDescriptor {
            raw: Arc::from(raw),
            descriptor: descriptor.clone(),
        });
        if *entry.raw == *raw {
            Ok(entry.descriptor.clone())
        } else {
            Ok(descriptor)
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!("Descriptor cache cleared: {} entries removed", count);
    }
}
