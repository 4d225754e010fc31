//! Background reconciliation of the registry with the filesystem.
//!
//! # States
//! ```text
//! Running ──shutdown──▶ Stopped   (irreversible)
//! ```
//!
//! # Tick
//! a. read the hosts file mtime; unreadable → skip the config check
//! b. advanced → load; valid → swap entries and rebuild every folder,
//!    invalid → keep serving the old entries
//! c. for each installed root, read its marker mtime; unreadable → keep
//!    the root; advanced → rebuild and swap just that folder, keeping the
//!    old root if the rebuild fails
//! d. stop if shutdown was requested

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::load_hosts;
use crate::config::watcher::{modified_at, MtimeWatch};
use crate::observability::metrics;
use crate::registry::manager::{build_roots, compile_root};
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Running,
    Stopped,
}

/// What a single tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The hosts file was reloaded and every folder rebuilt.
    pub config_reloaded: bool,
    /// Folders whose root was rebuilt because their marker advanced.
    pub rebuilt: Vec<PathBuf>,
    /// Reloads or rebuilds that failed and were skipped.
    pub failures: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.config_reloaded || !self.rebuilt.is_empty()
    }
}

impl Registry {
    /// Run one reconciliation tick synchronously.
    ///
    /// Every failure is logged and absorbed; the registry keeps serving its
    /// last good state.
    pub fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if self.is_shut_down() {
            return report;
        }

        // serialises ticks; never taken by readers
        let mut watch = self
            .shared
            .config_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.reconcile_config(&mut watch, &mut report);
        self.reconcile_folders(&mut report);
        report
    }

    fn reconcile_config(&self, watch: &mut MtimeWatch, report: &mut ReconcileReport) {
        let modified = match watch.poll() {
            Ok(Some(modified)) => modified,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    path = %watch.path().display(),
                    error = %e,
                    "Cannot read hosts file, skipping config check"
                );
                return;
            }
        };

        tracing::info!(path = %watch.path().display(), "Hosts file changed, reloading");
        // a rejected file is not retried until it changes again
        watch.acknowledge(modified);

        let entries = match load_hosts(watch.path()) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload hosts file. Keeping current configuration.");
                metrics::record_reload("config", "error");
                report.failures += 1;
                return;
            }
        };

        let roots = build_roots(&entries, &self.shared.options.extensions);
        let hosts = entries.len();
        let built = roots.len();
        if let Some(previous) = self.install_all(entries, roots) {
            tracing::info!(hosts, roots = built, replaced = previous.roots().len(), "Hosts file reloaded");
            metrics::record_reload("config", "ok");
            report.config_reloaded = true;
        }
    }

    fn reconcile_folders(&self, report: &mut ReconcileReport) {
        let snapshot = self.snapshot();

        for root in snapshot.roots().values() {
            let marker = root.marker_path();
            let modified = match modified_at(&marker) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(
                        marker = %marker.display(),
                        error = %e,
                        "Modifier marker unreadable, keeping current templates"
                    );
                    continue;
                }
            };
            if modified <= root.last_seen() {
                continue;
            }

            tracing::info!(folder = %root.folder().display(), "Templates changed, rebuilding");
            match compile_root(root.folder(), root.modifier(), &self.shared.options.extensions) {
                Ok(fresh) => {
                    if self.install_root(root, Arc::new(fresh)).is_some() {
                        tracing::info!(folder = %root.folder().display(), "Templates swapped");
                        metrics::record_reload("folder", "ok");
                        report.rebuilt.push(root.folder().to_path_buf());
                    }
                }
                Err(e) => {
                    tracing::error!(
                        folder = %root.folder().display(),
                        error = %e,
                        "Could not rebuild templates, using old ones"
                    );
                    metrics::record_reload("folder", "error");
                    report.failures += 1;
                }
            }
        }
    }
}

/// Shortest tick period; `interval_at` rejects a zero period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Clears the running flag however the loop exits, unwinding included.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Periodic driver for [`Registry::reconcile`].
pub struct Reconciler {
    registry: Registry,
    interval: Duration,
}

impl Reconciler {
    /// Periods below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(registry: Registry, interval: Duration) -> Self {
        Self {
            registry,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs_f64(), "Reconciler starting");
        let _running = RunningGuard(&self.registry.shared.reconciler_running);

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.registry.is_shut_down() {
            tokio::select! {
                _ = ticker.tick() => {
                    let registry = self.registry.clone();
                    match tokio::task::spawn_blocking(move || registry.reconcile()).await {
                        Ok(report) if report.changed() => {
                            tracing::debug!(?report, "Reconcile tick applied changes");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Reconcile tick failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Reconciler received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        tracing::info!("Reconciler stopped");
    }
}
