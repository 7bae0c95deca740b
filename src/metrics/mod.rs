use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Saturating counters for the navigation core. Shared between controllers
/// as `Arc<Mutex<NavMetrics>>` via [`crate::NavContext`].
#[derive(Debug, Default, Clone)]
pub struct NavMetrics {
    navigations: u64,
    replaces: u64,
    pops: u64,
    routes: u64,
    edits: u64,
    saves: u64,
    restores: u64,
    entries_closed: u64,
    entries_dropped: u64,
}

impl NavMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_navigation(&mut self) {
        self.navigations = self.navigations.saturating_add(1);
    }

    pub fn record_replace(&mut self) {
        self.replaces = self.replaces.saturating_add(1);
    }

    pub fn record_pops(&mut self, count: usize) {
        if count > 0 {
            self.pops = self.pops.saturating_add(count as u64);
        }
    }

    pub fn record_route(&mut self) {
        self.routes = self.routes.saturating_add(1);
    }

    pub fn record_edit(&mut self) {
        self.edits = self.edits.saturating_add(1);
    }

    pub fn record_save(&mut self) {
        self.saves = self.saves.saturating_add(1);
    }

    pub fn record_restore(&mut self) {
        self.restores = self.restores.saturating_add(1);
    }

    pub fn record_entries_closed(&mut self, count: usize) {
        if count > 0 {
            self.entries_closed = self.entries_closed.saturating_add(count as u64);
        }
    }

    /// Entries discarded during restore because their destination is no
    /// longer declared.
    pub fn record_entries_dropped(&mut self, count: usize) {
        if count > 0 {
            self.entries_dropped = self.entries_dropped.saturating_add(count as u64);
        }
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            navigations: self.navigations,
            replaces: self.replaces,
            pops: self.pops,
            routes: self.routes,
            edits: self.edits,
            saves: self.saves,
            restores: self.restores,
            entries_closed: self.entries_closed,
            entries_dropped: self.entries_dropped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub navigations: u64,
    pub replaces: u64,
    pub pops: u64,
    pub routes: u64,
    pub edits: u64,
    pub saves: u64,
    pub restores: u64,
    pub entries_closed: u64,
    pub entries_dropped: u64,
}

impl MetricSnapshot {
    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("navigations".to_string(), json!(self.navigations));
        map.insert("replaces".to_string(), json!(self.replaces));
        map.insert("pops".to_string(), json!(self.pops));
        map.insert("routes".to_string(), json!(self.routes));
        map.insert("edits".to_string(), json!(self.edits));
        map.insert("saves".to_string(), json!(self.saves));
        map.insert("restores".to_string(), json!(self.restores));
        map.insert("entries_closed".to_string(), json!(self.entries_closed));
        map.insert("entries_dropped".to_string(), json!(self.entries_dropped));
        map
    }

    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target.to_string(),
            "nav_metrics".to_string(),
            self.as_fields(),
        )
    }
}
