//! The explicit `Engine` value.
//!
//! One value owns the input/output roots, the worker pool, the lease table,
//! the push channel, and the collaborator handle, and is passed explicitly
//! to every component instead of being reached for through global state —
//! the one root object this service is built around.

use crate::core::case_model::CaseModel;
use crate::core::collaborators::Collaborator;
use crate::core::config::EngineConfig;
use crate::core::lease::LeaseTable;
use crate::core::manifest::ManifestStore;
use crate::core::push::PushChannel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct Engine {
    pub config: Arc<EngineConfig>,
    pub manifest: Arc<ManifestStore>,
    pub leases: LeaseTable,
    pub push: PushChannel,
    pub collaborator: Arc<dyn Collaborator>,
    /// Bounds the number of cases processing concurrently: multiple cases
    /// may process in parallel, bounded by a configurable worker pool.
    /// Within one case, files still run sequentially — the pool bounds
    /// cross-case concurrency, not per-file concurrency.
    pub worker_pool: Arc<Semaphore>,
    /// Jobs accepted but not yet holding a worker-pool permit. The HTTP
    /// layer increments this on acceptance and decrements it once the job
    /// starts running, checking it against `queue_capacity` before
    /// accepting a new `process`/`render` request.
    queued: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(config: EngineConfig, collaborator: Arc<dyn Collaborator>) -> Self {
        let manifest = Arc::new(ManifestStore::new(&config.output_root));
        let worker_pool = Arc::new(Semaphore::new(config.max_workers));
        Self {
            config: Arc::new(config),
            manifest,
            leases: LeaseTable::new(),
            push: PushChannel::new(),
            collaborator,
            worker_pool,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn case_model(&self) -> CaseModel {
        CaseModel::new(&self.config.input_root, &self.config.output_root)
    }

    /// Reserves a queue slot, returning `false` if the bounded queue is
    /// already at capacity (caller maps that to HTTP 503). The returned
    /// guard releases the slot on drop.
    pub fn try_reserve_queue_slot(&self) -> Option<QueueSlotGuard> {
        let capacity = self.config.queue_capacity();
        let previous = self.queued.fetch_add(1, Ordering::SeqCst);
        if previous >= capacity {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(QueueSlotGuard {
            queued: self.queued.clone(),
        })
    }
}

pub struct QueueSlotGuard {
    queued: Arc<AtomicUsize>,
}

impl Drop for QueueSlotGuard {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::SeqCst);
    }
}
