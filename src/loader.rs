//! Bulk loading of snapshots into an entity store
//!
//! Producers (directory readers, dump parsers, collectors) decode their own
//! formats into [`Object`]s and hand them over in batches. All store mutation
//! goes through one mutex; producers themselves run on scoped worker threads.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::errors::{PwnError, Result};
use crate::object::Object;
use crate::objects::Objects;
use crate::security_descriptor::{DescriptorCache, SecurityDescriptor};
use crate::sid::Sid;

/// Load statistics for progress reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoadStats {
    pub batches: u32,
    pub objects: usize,
    pub failed_producers: u32,
    pub total_duration_ms: u64,
    pub descriptor_cache_hit_rate: f64,
    pub last_load: Option<String>,
}

pub struct BulkLoader {
    config: LoaderConfig,
    objects: Mutex<Objects>,
    descriptors: DescriptorCache,
    stats: Mutex<LoadStats>,
}

impl BulkLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_store(Objects::new(), config)
    }

    /// Continue loading into an existing store
    pub fn with_store(objects: Objects, config: LoaderConfig) -> Self {
        Self {
            config,
            objects: Mutex::new(objects),
            descriptors: DescriptorCache::new(),
            stats: Mutex::new(LoadStats::default()),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    /// Admit a batch, taking the store lock once per `batch_size` objects.
    /// Returns how many objects were handed over.
    pub fn ingest(&self, batch: Vec<Arc<Object>>) -> Result<usize> {
        let total = batch.len();
        let chunk_size = self.config.batch_size.max(1);
        let mut batch = batch.into_iter().peekable();
        while batch.peek().is_some() {
            let chunk: Vec<Arc<Object>> = batch.by_ref().take(chunk_size).collect();
            self.objects.lock().add(chunk)?;
        }

        let mut stats = self.stats.lock();
        stats.batches += 1;
        stats.objects += total;
        debug!("Ingested batch of {} objects", total);
        Ok(total)
    }

    /// Run `producers` on up to `max_workers` threads and admit what they
    /// return.
    ///
    /// A failing producer is logged and counted; with `continue_on_error`
    /// off, the first failure stops workers from starting new producers and
    /// is returned. Admission failures are always fatal.
    pub fn ingest_parallel<F>(&self, producers: Vec<F>) -> Result<LoadStats>
    where
        F: FnOnce(&DescriptorCache) -> anyhow::Result<Vec<Arc<Object>>> + Send,
    {
        let total = producers.len();
        let start = Instant::now();
        let queue = Mutex::new(producers.into_iter().collect::<VecDeque<F>>());
        let stop = AtomicBool::new(false);
        let first_error: Mutex<Option<PwnError>> = Mutex::new(None);
        let workers = self.config.max_workers.clamp(1, total.max(1));

        std::thread::scope(|scope| {
            for worker in 0..workers {
                let queue = &queue;
                let stop = &stop;
                let first_error = &first_error;
                scope.spawn(move || loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let Some(producer) = queue.lock().pop_front() else {
                        break;
                    };

                    let outcome = match producer(&self.descriptors) {
                        Ok(batch) => self.ingest(batch),
                        Err(e) => {
                            warn!("Loader worker {}: producer failed: {}", worker, e);
                            self.stats.lock().failed_producers += 1;
                            if self.config.continue_on_error {
                                continue;
                            }
                            Err(PwnError::LoadFailed(e.to_string()))
                        }
                    };

                    if let Err(e) = outcome {
                        stop.store(true, Ordering::SeqCst);
                        first_error.lock().get_or_insert(e);
                        break;
                    }
                });
            }
        });

        let elapsed = start.elapsed();
        let stats = {
            let mut stats = self.stats.lock();
            stats.total_duration_ms += elapsed.as_millis() as u64;
            stats.descriptor_cache_hit_rate = self.descriptors.stats().hit_rate();
            stats.last_load = Some(chrono::Utc::now().to_rfc3339());
            stats.clone()
        };

        if let Some(e) = first_error.into_inner() {
            return Err(e);
        }

        info!(
            "Bulk load complete: {} producers, {} failed, {} objects in {:?} ({} descriptors cached)",
            total,
            stats.failed_producers,
            stats.objects,
            elapsed,
            self.descriptors.len()
        );
        Ok(stats)
    }

    /// Decode `raw` through the shared cache and attach it to `object`
    pub fn attach_descriptor<F>(&self, object: &Object, raw: &[u8], parse: F) -> Result<()>
    where
        F: FnOnce(&[u8]) -> anyhow::Result<SecurityDescriptor>,
    {
        let descriptor = self.descriptors.get_or_parse(raw, parse)?;
        object.set_security_descriptor(descriptor);
        Ok(())
    }

    /// Trustee lookup for edge rules, adding a placeholder for unknown SIDs
    pub fn find_or_add_sid(&self, sid: &Sid) -> Arc<Object> {
        self.objects.lock().find_or_add_sid(sid)
    }

    /// Run `f` against the store under the load lock
    pub fn with_objects<R>(&self, f: impl FnOnce(&Objects) -> R) -> R {
        f(&self.objects.lock())
    }

    pub fn stats(&self) -> LoadStats {
        self.stats.lock().clone()
    }

    /// Hand over the loaded store for analysis
    pub fn finish(self) -> Objects {
        let objects = self.objects.into_inner();
        objects.log_statistics();
        objects
    }
}
