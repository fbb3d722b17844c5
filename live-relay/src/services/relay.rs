//! Relay service.
//!
//! Wires the store, the admission controller and the reconciliation
//! scheduler together and exposes the operations callers use to manage
//! tracked accounts.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::admission::{Admission, AdmissionController, QueueState};
use crate::config::RelayConfig;
use crate::database::{LiveStateRepository, PersistenceWriter, PersistenceWriterConfig};
use crate::domain::{AccountStatus, Handle, LiveState};
use crate::monitor::{LiveProbe, ReconciliationScheduler, SweepReport};
use crate::notification::{Notifier, RelayEvent};
use crate::state::LiveStateStore;
use crate::stream::EventStreamSource;
use crate::{Error, Result};

/// Collaborators the relay is built from.
pub struct RelayDependencies {
    pub source: Arc<dyn EventStreamSource>,
    pub probe: Arc<dyn LiveProbe>,
    pub notifier: Arc<dyn Notifier>,
    /// Durable store; without one nothing survives a restart.
    pub repository: Option<Arc<dyn LiveStateRepository>>,
}

/// Result of tracking an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResult {
    pub status: AccountStatus,
    pub queue_position: Option<usize>,
}

/// Relay statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub tracked: usize,
    pub live: usize,
    pub active: usize,
    pub queued: usize,
}

/// Core relay facade.
pub struct RelayService {
    store: Arc<LiveStateStore>,
    admission: Arc<AdmissionController>,
    scheduler: Arc<ReconciliationScheduler>,
    notifier: Arc<dyn Notifier>,
    repository: Option<Arc<dyn LiveStateRepository>>,
    writer: Option<PersistenceWriter>,
    cancellation_token: CancellationToken,
}

impl RelayService {
    /// Build the relay. Must be called within a Tokio runtime.
    pub fn new(config: &RelayConfig, deps: RelayDependencies) -> Result<Self> {
        config.validate()?;

        let writer = deps
            .repository
            .as_ref()
            .map(|repo| PersistenceWriter::new(repo.clone(), PersistenceWriterConfig::default()));
        let store = Arc::new(LiveStateStore::new(deps.notifier.clone(), writer.clone()));
        let admission = Arc::new(AdmissionController::new(
            config.admission(),
            deps.source,
            store.clone(),
        )?);
        let scheduler = Arc::new(ReconciliationScheduler::new(
            config.reconciliation(),
            deps.probe,
            store.clone(),
            admission.clone(),
        ));

        Ok(Self {
            store,
            admission,
            scheduler,
            notifier: deps.notifier,
            repository: deps.repository,
            writer,
            cancellation_token: CancellationToken::new(),
        })
    }

    // ========== Lifecycle ==========

    /// Reload tracked accounts from the durable store.
    ///
    /// Accounts are resumed oldest first. Monitoring accounts request
    /// admission and waiting accounts join the queue, which is drained before
    /// the next row so an older waiting account is never overtaken.
    pub async fn restore(&self) -> Result<usize> {
        let Some(repo) = &self.repository else {
            return Ok(0);
        };

        let accounts = repo.load_tracked().await?;
        let count = accounts.len();
        let mut waiting = 0;
        let mut monitoring = 0;

        // Rows arrive oldest first; admitting them one by one keeps that order.
        for account in accounts {
            let handle = account.handle.clone();
            let status = account.status;
            self.store.restore(account);
            match status {
                AccountStatus::Monitoring => {
                    monitoring += 1;
                    self.admission.request_admission(&handle).await;
                }
                AccountStatus::Waiting => {
                    waiting += 1;
                    self.admission.enqueue(&handle);
                    self.admission.drain_queue().await;
                }
            }
        }

        info!(
            restored = count,
            monitoring,
            waiting,
            "Restored tracked accounts"
        );
        Ok(count)
    }

    /// Start the queue drain and reconciliation loops.
    pub fn start(&self) {
        self.admission.start(self.cancellation_token.child_token());
        self.scheduler.start(self.cancellation_token.child_token());
        info!("Relay started");
    }

    /// Stop background loops, close every stream and flush pending writes.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down relay");
        self.cancellation_token.cancel();

        let closed = self.admission.close_all();
        info!("Closed {} active streams", closed);

        if let Some(writer) = &self.writer
            && let Err(e) = writer.flush().await
        {
            warn!("Failed to flush pending writes: {}", e);
        }

        info!("Relay shut down");
        Ok(())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    // ========== Operations ==========

    /// Start tracking an account.
    ///
    /// Returns whether it was admitted right away or queued.
    pub async fn track(&self, input: &str) -> Result<TrackResult> {
        let handle = Handle::parse(input)?;
        self.store
            .insert_new(handle.clone(), AccountStatus::Waiting)?;

        let result = match self.admission.request_admission(&handle).await {
            Admission::Active => TrackResult {
                status: AccountStatus::Monitoring,
                queue_position: None,
            },
            Admission::Queued { position } => TrackResult {
                status: AccountStatus::Waiting,
                queue_position: Some(position),
            },
            Admission::Connecting => TrackResult {
                status: AccountStatus::Waiting,
                queue_position: None,
            },
            Admission::Withdrawn => {
                return Err(Error::not_found("Account", handle.as_str()));
            }
        };

        self.notifier.notify(RelayEvent::AccountTracked {
            handle: handle.clone(),
            status: result.status,
            queue_position: result.queue_position,
            timestamp: Utc::now(),
        });
        info!(handle = %handle, status = %result.status, "Tracking account");
        Ok(result)
    }

    /// Stop tracking an account and drop its counters.
    pub async fn untrack(&self, input: &str) -> Result<()> {
        let handle = Handle::parse(input)?;
        if self.store.remove(&handle).is_none() {
            return Err(Error::not_found("Account", handle.as_str()));
        }

        self.admission.release(&handle).await;

        self.notifier.notify(RelayEvent::AccountRemoved {
            handle: handle.clone(),
            timestamp: Utc::now(),
        });
        info!(handle = %handle, "Untracked account");
        Ok(())
    }

    /// Point-in-time copy of every account's state.
    pub fn snapshot(&self) -> HashMap<Handle, LiveState> {
        self.store.snapshot()
    }

    pub fn queue_state(&self) -> QueueState {
        self.admission.queue_state()
    }

    /// Run one reconciliation sweep now.
    pub async fn force_reconcile(&self) -> SweepReport {
        self.scheduler.sweep().await
    }

    pub fn get(&self, input: &str) -> Result<LiveState> {
        let handle = Handle::parse(input)?;
        self.store
            .get(&handle)
            .ok_or_else(|| Error::not_found("Account", handle.as_str()))
    }

    pub fn status(&self, input: &str) -> Result<AccountStatus> {
        let handle = Handle::parse(input)?;
        self.store
            .status(&handle)
            .ok_or_else(|| Error::not_found("Account", handle.as_str()))
    }

    pub fn stats(&self) -> RelayStats {
        let snapshot = self.store.snapshot();
        let queue = self.admission.queue_state();
        RelayStats {
            tracked: snapshot.len(),
            live: snapshot.values().filter(|state| state.is_live).count(),
            active: queue.active,
            queued: queue.queued.len(),
        }
    }
}
