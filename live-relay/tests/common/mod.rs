//! Scripted collaborators for the relay scenarios.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use live_relay::config::RelayConfig;
use live_relay::database::{
    DbPool, LiveStateRepository, SqlxLiveStateRepository, init_pool, run_migrations,
};
use live_relay::domain::{Handle, ProbeOutcome};
use live_relay::monitor::LiveProbe;
use live_relay::notification::{Notifier, RelayEvent};
use live_relay::services::{RelayDependencies, RelayService};
use live_relay::stream::{EventStreamSource, StreamConnection, StreamEvent};
use live_relay::{Error, Result};

/// Create an in-memory database with migrations applied.
pub async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Stream source with per-handle scripted connect results.
#[derive(Default)]
pub struct FakeSource {
    failing: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
    streams: Mutex<HashMap<String, (mpsc::Sender<StreamEvent>, CancellationToken)>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn succeed(&self, name: &str) {
        self.failing.lock().remove(name);
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.streams
            .lock()
            .get(name)
            .is_some_and(|(_, closer)| !closer.is_cancelled())
    }

    pub fn open_count(&self) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|(_, closer)| !closer.is_cancelled())
            .count()
    }

    pub async fn emit(&self, name: &str, event: StreamEvent) -> bool {
        let sender = self.streams.lock().get(name).map(|(tx, _)| tx.clone());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl EventStreamSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn open(&self, handle: &Handle) -> Result<StreamConnection> {
        let name = handle.as_str().to_string();
        self.attempts.lock().push(name.clone());
        // Yield so concurrent admissions interleave.
        tokio::task::yield_now().await;

        let fails = self.failing.lock().contains(&name);
        if fails {
            return Err(Error::connection_failed(name, "account offline"));
        }

        let (tx, rx) = mpsc::channel(64);
        let closer = CancellationToken::new();
        self.streams.lock().insert(name, (tx, closer.clone()));
        Ok(StreamConnection::new(handle.clone(), rx, closer))
    }
}

/// Probe answering from a script; `Unknown` when nothing is scripted.
#[derive(Default)]
pub struct FakeProbe {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, name: &str, outcome: ProbeOutcome) {
        self.outcomes.lock().insert(name.to_string(), outcome);
    }
}

#[async_trait]
impl LiveProbe for FakeProbe {
    fn name(&self) -> &str {
        "fake"
    }

    async fn probe(&self, handle: &Handle) -> Result<ProbeOutcome> {
        Ok(self
            .outcomes
            .lock()
            .get(handle.as_str())
            .copied()
            .unwrap_or(ProbeOutcome::Unknown))
    }
}

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<RelayEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count(&self, predicate: impl Fn(&RelayEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn went_offline(&self, name: &str) -> usize {
        self.count(
            |e| matches!(e, RelayEvent::WentOffline { handle, .. } if handle.as_str() == name),
        )
    }
}

impl Notifier for EventLog {
    fn notify(&self, event: RelayEvent) {
        self.events.lock().push(event);
    }
}

pub struct TestRelay {
    pub relay: RelayService,
    pub source: Arc<FakeSource>,
    pub probe: Arc<FakeProbe>,
    pub events: Arc<EventLog>,
}

pub fn test_config(max_connections: usize) -> RelayConfig {
    RelayConfig {
        max_concurrent_connections: max_connections,
        connect_timeout_ms: 500,
        queue_drain_interval_ms: 50,
        reconciliation_interval_ms: 3_600_000,
        ..Default::default()
    }
}

pub fn build_relay(config: &RelayConfig, pool: Option<DbPool>) -> TestRelay {
    let source = FakeSource::new();
    let probe = FakeProbe::new();
    let events = EventLog::new();
    let repository = pool.map(|pool| {
        Arc::new(SqlxLiveStateRepository::new(pool)) as Arc<dyn LiveStateRepository>
    });

    let relay = RelayService::new(
        config,
        RelayDependencies {
            source: source.clone(),
            probe: probe.clone(),
            notifier: events.clone(),
            repository,
        },
    )
    .expect("Failed to build relay");

    TestRelay {
        relay,
        source,
        probe,
        events,
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

pub fn handles(names: &[&str]) -> Vec<Handle> {
    names.iter().map(|name| Handle::from_trusted(*name)).collect()
}
