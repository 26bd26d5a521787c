//! Sync pass fan-out.
//!
//! A pass snapshots the directory's device identifiers once and spawns one
//! reconciler task per identifier. Tasks do not block on each other; the
//! only shared resource is the store, which is safe across distinct
//! partitions. The spawned handles are returned rather than dropped so the
//! caller decides whether a pass is fire-and-forget or awaited.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::directory::DeviceDirectory;
use crate::reconciler::Reconciler;
use crate::store::RecordStore;
use crate::telemetry::TelemetryClient;

/// Join handles for one launched sync pass.
///
/// Per-identifier outcomes are observable through logging and the resulting
/// store state only; joining waits for completion without aggregating a
/// pass-level result.
pub struct PassHandles {
    handles: Vec<JoinHandle<()>>,
}

impl PassHandles {
    /// Number of reconciler invocations launched.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every invocation to finish.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "reconcile task panicked");
            }
        }
    }

    /// Let the invocations run to completion on their own.
    pub fn detach(self) {
        drop(self.handles);
    }
}

/// Driver launches one reconciler invocation per directory entry.
pub struct Driver<C, S> {
    reconciler: Arc<Reconciler<C, S>>,
}

impl<C, S> Driver<C, S>
where
    C: TelemetryClient + 'static,
    S: RecordStore + 'static,
{
    pub fn new(reconciler: Arc<Reconciler<C, S>>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler<C, S>> {
        &self.reconciler
    }

    /// Launch one pass over the directory's value set.
    ///
    /// Returns as soon as every invocation is spawned. Duplicate device
    /// identifiers in the directory each get their own invocation.
    pub fn run_pass(&self, directory: &DeviceDirectory) -> PassHandles {
        let mut handles = Vec::with_capacity(directory.len());

        for device_id in directory.device_ids() {
            let id = device_id.to_string();
            let reconciler = Arc::clone(&self.reconciler);

            info!(device_id = %id, "starting reconcile");
            handles.push(tokio::spawn(async move {
                match reconciler.reconcile(&id).await {
                    Ok(outcome) => {
                        info!(device_id = %id, outcome = %outcome, "reconcile complete");
                    }
                    Err(e) => {
                        warn!(device_id = %id, error = %e, "reconcile failed");
                    }
                }
            }));
        }

        PassHandles { handles }
    }
}
