use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::destination::{DestinationRef, DestinationSet};
use crate::entry::InstanceId;
use crate::error::Result;
use crate::logging::Logger;
use crate::metrics::NavMetrics;

use super::NavController;

/// Whether a controller participates in save/restore. A child controller
/// inherits its parent's mode unless the flow seed overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Not persisted; the controller resets to its start destination when
    /// the host is recreated.
    Memory,
    /// Full round-trip through the persistence layer.
    Savable,
}

/// How the route resolver treats a segment that resolves to the destination
/// already current on the cursor controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Rewrite the current entry's args in place when the segment carries
    /// args; an arg-less duplicate leaves the entry untouched (the default).
    #[default]
    UpdateArgs,
    /// Push a fresh occurrence on top.
    PushDuplicate,
}

/// Configuration knobs shared by every controller in one tree.
#[derive(Clone, Default)]
pub struct NavConfig {
    /// Optional structured logger used by all controllers.
    pub logger: Option<Logger>,
    /// Metrics accumulator shared across the tree.
    pub metrics: Option<Arc<Mutex<NavMetrics>>>,
    /// Duplicate handling default for routes; individual routes may override.
    pub route_duplicates: DuplicatePolicy,
}

impl NavConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(NavMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<NavMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Explicit root context for one controller tree. Constructed once at
/// process start and threaded into every controller creation; there is no
/// ambient singleton. Cloning shares the same id sequence and config.
#[derive(Clone)]
pub struct NavContext {
    config: NavConfig,
    ids: Arc<AtomicU64>,
}

impl NavContext {
    pub fn new(config: NavConfig) -> Self {
        Self {
            config,
            ids: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    /// Mint an instance id: a blake3 digest over the destination name and a
    /// monotonic sequence, prefixed with the name for log readability. Ids
    /// are unique per creation, never per destination.
    pub(crate) fn next_instance_id(&self, destination: &str) -> InstanceId {
        let seq = self.ids.fetch_add(1, Ordering::Relaxed);
        let digest = blake3::hash(format!("{destination}#{seq}").as_bytes());
        format!("{destination}#{}", &digest.to_hex().as_str()[..12])
    }

    /// Create a root controller over the given destination set.
    pub fn controller(
        &self,
        key: impl Into<String>,
        destinations: impl IntoIterator<Item = DestinationRef>,
        start: &str,
        mode: StorageMode,
    ) -> Result<NavController> {
        NavController::new(
            key.into(),
            Vec::new(),
            DestinationSet::new(destinations),
            start,
            mode,
            self.clone(),
        )
    }
}

impl Default for NavContext {
    fn default() -> Self {
        Self::new(NavConfig::default())
    }
}
