use crate::cluster::ClusterClient;
use crate::oci_registry::HttpTransport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone)]
pub struct ControllerContext {
    pub(crate) cluster: Arc<dyn ClusterClient>,
    pub(crate) http: Arc<dyn HttpTransport>,
    pub(crate) namespace: Option<String>,
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub workloads_checked: usize,
    pub pods_checked: usize,
    pub pods_deleted: usize,
    pub failures: usize,
}

impl PassReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            workloads_checked: 0,
            pods_checked: 0,
            pods_deleted: 0,
            failures: 0,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

/// State shared between the scheduler and the probe endpoints.
#[derive(Default)]
pub struct ControllerState {
    /// Held for the duration of a pass so overlapping triggers are skipped.
    pub(crate) pass_lock: Mutex<()>,
    pub(crate) last_pass: RwLock<Option<PassReport>>,
}

impl ControllerState {
    pub async fn record(&self, report: PassReport) {
        *self.last_pass.write().await = Some(report);
    }

    pub async fn last_pass(&self) -> Option<PassReport> {
        self.last_pass.read().await.clone()
    }
}
