//! Scripted collaborators shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::database::LiveStateRepository;
use crate::domain::{Handle, ProbeOutcome, TrackedAccount};
use crate::monitor::LiveProbe;
use crate::notification::{Notifier, RelayEvent};
use crate::stream::{EventStreamSource, StreamConnection, StreamEvent};
use crate::{Error, Result};

/// In-memory durable store.
#[derive(Default)]
pub struct MemoryRepository {
    rows: Mutex<HashMap<String, TrackedAccount>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: TrackedAccount) {
        self.rows
            .lock()
            .insert(account.handle.as_str().to_string(), account);
    }

    pub fn get(&self, name: &str) -> Option<TrackedAccount> {
        self.rows.lock().get(name).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Other("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LiveStateRepository for MemoryRepository {
    async fn save(&self, account: &TrackedAccount) -> Result<()> {
        self.check()?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.insert(account.clone());
        Ok(())
    }

    async fn delete(&self, handle: &Handle) -> Result<()> {
        self.check()?;
        self.rows.lock().remove(handle.as_str());
        Ok(())
    }

    async fn load_tracked(&self) -> Result<Vec<TrackedAccount>> {
        self.check()?;
        let mut accounts: Vec<_> = self.rows.lock().values().cloned().collect();
        accounts.sort_by_key(|a| a.tracked_at);
        Ok(accounts)
    }
}

struct OpenStream {
    sender: mpsc::Sender<StreamEvent>,
    closer: CancellationToken,
}

/// Event stream source whose connect results are scripted per handle.
#[derive(Default)]
pub struct ScriptedSource {
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    attempts: Mutex<Vec<String>>,
    streams: Mutex<HashMap<String, OpenStream>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn succeed(&self, name: &str) {
        self.failing.lock().remove(name);
        self.hanging.lock().remove(name);
    }

    /// Make connects for `name` never resolve.
    pub fn hang(&self, name: &str) {
        self.hanging.lock().insert(name.to_string());
    }

    /// Make connects for `name` take `delay` before resolving.
    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays.lock().insert(name.to_string(), delay);
    }

    /// Every connect attempt so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self, name: &str) -> usize {
        self.attempts.lock().iter().filter(|n| *n == name).count()
    }

    /// Whether a stream for `name` is open and not yet closed.
    pub fn is_open(&self, name: &str) -> bool {
        self.streams
            .lock()
            .get(name)
            .is_some_and(|s| !s.closer.is_cancelled())
    }

    pub fn open_count(&self) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|s| !s.closer.is_cancelled())
            .count()
    }

    /// Push an event into the open stream for `name`.
    pub async fn emit(&self, name: &str, event: StreamEvent) -> bool {
        let sender = self.streams.lock().get(name).map(|s| s.sender.clone());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl EventStreamSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, handle: &Handle) -> Result<StreamConnection> {
        let name = handle.as_str().to_string();
        self.attempts.lock().push(name.clone());

        let hangs = self.hanging.lock().contains(&name);
        if hangs {
            std::future::pending::<()>().await;
        }
        let delay = self.delays.lock().get(&name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fails = self.failing.lock().contains(&name);
        if fails {
            return Err(Error::connection_failed(name, "scripted failure"));
        }

        let (sender, events) = mpsc::channel(64);
        let closer = CancellationToken::new();
        self.streams.lock().insert(
            name,
            OpenStream {
                sender,
                closer: closer.clone(),
            },
        );
        Ok(StreamConnection::new(handle.clone(), events, closer))
    }
}

/// Probe returning scripted outcomes, `Unknown` by default.
#[derive(Default)]
pub struct ScriptedProbe {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
    latency: Mutex<HashMap<String, Duration>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, name: &str, outcome: ProbeOutcome) {
        self.outcomes.lock().insert(name.to_string(), outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make probes for `name` take `latency`, spent in 5 ms steps that only
    /// advance while the probe is polled.
    pub fn set_latency(&self, name: &str, latency: Duration) {
        self.latency.lock().insert(name.to_string(), latency);
    }
}

#[async_trait]
impl LiveProbe for ScriptedProbe {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn probe(&self, handle: &Handle) -> Result<ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency.lock().get(handle.as_str()).copied();
        if let Some(latency) = latency {
            let step = Duration::from_millis(5);
            let mut spent = Duration::ZERO;
            while spent < latency {
                tokio::time::sleep(step).await;
                spent += step;
            }
        }
        Ok(self
            .outcomes
            .lock()
            .get(handle.as_str())
            .copied()
            .unwrap_or(ProbeOutcome::Unknown))
    }
}

/// Notifier that records every event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<RelayEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count(&self, predicate: impl Fn(&RelayEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn went_live(&self, name: &str) -> usize {
        self.count(|e| matches!(e, RelayEvent::WentLive { handle, .. } if handle.as_str() == name))
    }

    pub fn went_offline(&self, name: &str) -> usize {
        self.count(
            |e| matches!(e, RelayEvent::WentOffline { handle, .. } if handle.as_str() == name),
        )
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: RelayEvent) {
        self.events.lock().push(event);
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
