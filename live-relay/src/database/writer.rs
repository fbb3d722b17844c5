//! Write-behind persistence.
//!
//! Mutations are handed to a background worker that coalesces pending
//! writes per account and flushes them periodically or when the buffer is
//! full. Callers never wait on the durable store; failures are logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, warn};

use super::repositories::LiveStateRepository;
use crate::domain::{Handle, TrackedAccount};
use crate::{Error, Result};

/// Configuration for the persistence writer.
#[derive(Debug, Clone)]
pub struct PersistenceWriterConfig {
    /// Maximum number of accounts with pending writes before flushing.
    pub max_pending: usize,
    /// Maximum time to wait before flushing.
    pub flush_interval: Duration,
}

impl Default for PersistenceWriterConfig {
    fn default() -> Self {
        Self {
            max_pending: 100,
            flush_interval: Duration::from_secs(2),
        }
    }
}

enum PersistCommand {
    Save(TrackedAccount),
    Delete(Handle),
    Flush(oneshot::Sender<()>),
}

enum PendingWrite {
    Save(TrackedAccount),
    Delete,
}

/// Handle to the write-behind worker. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceWriter {
    sender: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceWriter {
    /// Spawn the worker for the given repository.
    pub fn new(repo: Arc<dyn LiveStateRepository>, config: PersistenceWriterConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_flush_loop(receiver, repo, config));
        Self { sender }
    }

    /// Schedule a save. Never blocks.
    pub fn save(&self, account: TrackedAccount) {
        if self.sender.send(PersistCommand::Save(account)).is_err() {
            warn!("Persistence writer stopped, dropping save");
        }
    }

    /// Schedule a delete. Never blocks.
    pub fn delete(&self, handle: Handle) {
        if self.sender.send(PersistCommand::Delete(handle)).is_err() {
            warn!("Persistence writer stopped, dropping delete");
        }
    }

    /// Wait until every write scheduled so far has been attempted.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender
            .send(PersistCommand::Flush(done_tx))
            .map_err(|_| Error::Other("Persistence writer channel closed".to_string()))?;
        done_rx
            .await
            .map_err(|_| Error::Other("Persistence writer stopped during flush".to_string()))
    }
}

async fn run_flush_loop(
    mut receiver: mpsc::UnboundedReceiver<PersistCommand>,
    repo: Arc<dyn LiveStateRepository>,
    config: PersistenceWriterConfig,
) {
    let mut pending: HashMap<Handle, PendingWrite> = HashMap::new();
    let mut flush_timer = interval(config.flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = receiver.recv() => {
                match command {
                    Some(PersistCommand::Save(account)) => {
                        pending.insert(account.handle.clone(), PendingWrite::Save(account));
                        if pending.len() >= config.max_pending {
                            flush_pending(repo.as_ref(), &mut pending).await;
                        }
                    }
                    Some(PersistCommand::Delete(handle)) => {
                        pending.insert(handle, PendingWrite::Delete);
                        if pending.len() >= config.max_pending {
                            flush_pending(repo.as_ref(), &mut pending).await;
                        }
                    }
                    Some(PersistCommand::Flush(done)) => {
                        flush_pending(repo.as_ref(), &mut pending).await;
                        let _ = done.send(());
                    }
                    None => {
                        // All writers dropped, flush remaining items
                        flush_pending(repo.as_ref(), &mut pending).await;
                        break;
                    }
                }
            }

            _ = flush_timer.tick() => {
                if !pending.is_empty() {
                    flush_pending(repo.as_ref(), &mut pending).await;
                }
            }
        }
    }

    debug!("Persistence writer stopped");
}

async fn flush_pending(
    repo: &dyn LiveStateRepository,
    pending: &mut HashMap<Handle, PendingWrite>,
) {
    for (handle, write) in pending.drain() {
        let result = match write {
            PendingWrite::Save(account) => repo.save(&account).await,
            PendingWrite::Delete => repo.delete(&handle).await,
        };

        if let Err(e) = result {
            let err = Error::DurableWriteFailed(format!("{}: {}", handle, e));
            error!(handle = %handle, "{}", err);
        }
    }
}
