//! Reconciliation scheduler.
//!
//! Periodically re-probes every tracked account, applies resolved status
//! changes through the store and drives the admission controller:
//! online accounts are admitted, offline accounts give up their slot.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::LiveProbe;
use crate::admission::AdmissionController;
use crate::domain::{Handle, ProbeOutcome};
use crate::state::{LiveSignal, LiveStateStore, LiveTransition};

/// Reconciliation configuration.
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Maximum number of probes in flight during a sweep.
    pub max_concurrent_probes: usize,
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub went_live: usize,
    pub went_offline: usize,
    pub unknown: usize,
    pub heartbeats: usize,
}

/// Periodic live status reconciliation.
pub struct ReconciliationScheduler {
    config: ReconciliationConfig,
    probe: Arc<dyn LiveProbe>,
    store: Arc<LiveStateStore>,
    admission: Arc<AdmissionController>,
    /// Serializes sweeps.
    sweep_lock: tokio::sync::Mutex<()>,
}

impl ReconciliationScheduler {
    pub fn new(
        config: ReconciliationConfig,
        probe: Arc<dyn LiveProbe>,
        store: Arc<LiveStateStore>,
        admission: Arc<AdmissionController>,
    ) -> Self {
        Self {
            config,
            probe,
            store,
            admission,
            sweep_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Probe every tracked account once and apply the results.
    ///
    /// Probes run concurrently. Every result is collected before any is
    /// applied, so drains started while applying never stall probes still in
    /// flight. Inconclusive probes change nothing.
    pub async fn sweep(&self) -> SweepReport {
        let _guard = self.sweep_lock.lock().await;
        let handles = self.store.handles();
        let mut report = SweepReport::default();

        if handles.is_empty() {
            return report;
        }

        debug!("Reconciling {} accounts", handles.len());

        let probe = self.probe.clone();
        let results: Vec<(Handle, ProbeOutcome)> = futures::stream::iter(handles)
            .map(|handle| {
                let probe = probe.clone();
                async move {
                    let outcome = match probe.probe(&handle).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            debug!(handle = %handle, "Probe error: {}", e);
                            ProbeOutcome::Unknown
                        }
                    };
                    (handle, outcome)
                }
            })
            .buffer_unordered(self.config.max_concurrent_probes.max(1))
            .collect()
            .await;

        for (handle, outcome) in results {
            report.probed += 1;
            self.apply(&handle, outcome, &mut report).await;
        }

        info!(
            probed = report.probed,
            went_live = report.went_live,
            went_offline = report.went_offline,
            unknown = report.unknown,
            heartbeats = report.heartbeats,
            "Reconciliation sweep finished"
        );
        report
    }

    async fn apply(&self, handle: &Handle, outcome: ProbeOutcome, report: &mut SweepReport) {
        let Some(is_live) = outcome.as_live() else {
            report.unknown += 1;
            return;
        };

        match self.store.set_live(handle, LiveSignal::from_probe(is_live)) {
            // Untracked while the probe was in flight.
            None => {}
            Some(LiveTransition::Unchanged) => report.heartbeats += 1,
            Some(LiveTransition::WentLive) => {
                report.went_live += 1;
                info!(handle = %handle, "Reconciliation: went live");
                if !self.admission.is_active(handle) {
                    self.admission.request_admission(handle).await;
                }
            }
            Some(LiveTransition::WentOffline) => {
                report.went_offline += 1;
                info!(handle = %handle, "Reconciliation: went offline");
                self.admission.park_offline(handle, None).await;
            }
        }
    }

    /// Spawn the periodic sweep loop.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        scheduler.sweep().await;
                    }
                }
            }
            debug!("Reconciliation loop stopped");
        });
    }
}
