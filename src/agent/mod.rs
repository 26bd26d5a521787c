use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{BackendKind, Config};
use crate::directory::DeviceDirectory;
use crate::reconciler::Reconciler;
use crate::store::{Backend, HttpStore, MemoryStore};
use crate::sync::Driver;
use crate::telemetry;

/// Agent wires the components together: telemetry client, record store,
/// reconciler, and the periodic sync pass loop.
pub struct Agent {
    cfg: Config,
    reconciler: Arc<Reconciler<telemetry::Client, Backend>>,
    cancel: CancellationToken,
    pass_loop: Option<tokio::task::JoinHandle<()>>,
}

impl Agent {
    /// Creates a new Agent, constructing the telemetry client and the
    /// configured store backend.
    pub fn new(cfg: Config) -> Result<Self> {
        let client =
            telemetry::Client::new(&cfg.telemetry).context("creating telemetry client")?;

        let store = match cfg.store.backend {
            BackendKind::Memory => Backend::Memory(MemoryStore::new()),
            BackendKind::Http => {
                let store = HttpStore::new(&cfg.store).context("creating store client")?;
                info!(endpoint = %cfg.store.endpoint, "HTTP store configured");
                Backend::Http(store)
            }
        };

        Ok(Self {
            cfg,
            reconciler: Arc::new(Reconciler::new(client, store)),
            cancel: CancellationToken::new(),
            pass_loop: None,
        })
    }

    /// Start the periodic pass loop.
    pub async fn start(&mut self) -> Result<()> {
        // Fail fast on an unreadable directory record before going periodic.
        let directory = self.load_directory().context("loading device directory")?;
        info!(
            sites = directory.len(),
            path = %self.cfg.directory.path.display(),
            "device directory loaded",
        );

        self.spawn_pass_loop();
        info!(
            poll_interval = ?self.cfg.sync.poll_interval,
            "agent started",
        );

        Ok(())
    }

    /// Gracefully stop the pass loop. Detached reconciler invocations from
    /// an already-launched pass run to completion on their own.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(handle) = self.pass_loop.take() {
            handle.await.context("joining pass loop")?;
        }

        Ok(())
    }

    /// Run exactly one awaited sync pass and return.
    pub async fn run_once(&self) -> Result<()> {
        let directory = self.load_directory().context("loading device directory")?;

        let driver = Driver::new(Arc::clone(&self.reconciler));
        let handles = driver.run_pass(&directory);
        info!(devices = handles.len(), "sync pass launched");

        handles.join().await;
        info!("sync pass complete");

        Ok(())
    }

    /// Read the directory record fresh from disk.
    fn load_directory(&self) -> Result<DeviceDirectory> {
        let directory = DeviceDirectory::load(
            &self.cfg.directory.path,
            &self.cfg.directory.record_id,
        )?;
        Ok(directory)
    }

    /// Spawn the periodic pass loop.
    fn spawn_pass_loop(&mut self) {
        let cancel = self.cancel.clone();
        let reconciler = Arc::clone(&self.reconciler);
        let dir_cfg = self.cfg.directory.clone();
        let poll_interval = self.cfg.sync.poll_interval;
        let await_passes = self.cfg.sync.await_passes;

        let handle = tokio::spawn(async move {
            let driver = Driver::new(reconciler);
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        // The directory collaborator owns the record; read it
                        // fresh each pass.
                        let directory =
                            match DeviceDirectory::load(&dir_cfg.path, &dir_cfg.record_id) {
                                Ok(directory) => directory,
                                Err(e) => {
                                    warn!(error = %e, "directory load failed, skipping pass");
                                    continue;
                                }
                            };

                        if directory.is_empty() {
                            warn!("device directory is empty, nothing to reconcile");
                            continue;
                        }

                        let handles = driver.run_pass(&directory);
                        info!(devices = handles.len(), "sync pass launched");

                        if await_passes {
                            handles.join().await;
                            info!("sync pass complete");
                        } else {
                            handles.detach();
                        }
                    }
                }
            }
        });

        self.pass_loop = Some(handle);
    }
}
