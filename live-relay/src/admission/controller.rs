//! Admission controller implementation.
//!
//! The AdmissionController owns the fixed-size pool of active streams and
//! the FIFO wait queue. A slot is reserved under the pool lock before any
//! connect is awaited, so concurrent admissions, releases and drains can
//! never push the pool above its cap.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::WaitQueue;
use super::runner::{SlotSignal, SlotSignalKind, run_slot};
use crate::domain::{AccountStatus, Handle};
use crate::notification::OfflineReason;
use crate::state::{LiveSignal, LiveStateStore};
use crate::stream::EventStreamSource;
use crate::{Error, Result};

/// Admission controller configuration.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Maximum number of simultaneously active streams.
    pub max_concurrent: usize,
    /// Upper bound for a single connect attempt.
    pub connect_timeout: Duration,
    /// Cadence of the safety-net queue drain.
    pub drain_interval: Duration,
}

/// Result of an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A stream is open and holds a slot.
    Active,
    /// Waiting for a slot at the given 1-based queue position.
    Queued { position: usize },
    /// Another attempt for this handle is already connecting.
    Connecting,
    /// The handle was released while the attempt was in flight.
    Withdrawn,
}

/// Point-in-time view of the pool and the wait queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    pub active: usize,
    pub max_concurrent: usize,
    pub active_handles: Vec<Handle>,
    /// Queued handles, head first.
    pub queued: Vec<Handle>,
    /// Queued handles confirmed offline, skipped by drains.
    pub parked: Vec<Handle>,
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub admitted: usize,
    pub failed: usize,
}

struct ActiveSlot {
    slot_id: u64,
    connection_id: String,
    closer: CancellationToken,
    admitted_at: DateTime<Utc>,
}

#[derive(Default)]
struct PoolState {
    active: HashMap<Handle, ActiveSlot>,
    /// Reserved slots with a connect in flight, keyed to the attempt ticket.
    connecting: HashMap<Handle, u64>,
    queue: WaitQueue,
    /// Confirmed offline. They keep their queue place but drains pass over
    /// them until an admission request clears the mark.
    parked: HashSet<Handle>,
}

impl PoolState {
    fn occupied(&self) -> usize {
        self.active.len() + self.connecting.len()
    }

    fn next_admissible(&mut self) -> Option<Handle> {
        let parked = &self.parked;
        self.queue.pop_first_except(|handle| parked.contains(handle))
    }
}

/// Bounded pool of active event streams with a FIFO wait queue.
pub struct AdmissionController {
    config: AdmissionConfig,
    source: Arc<dyn EventStreamSource>,
    store: Arc<LiveStateStore>,
    pool: Mutex<PoolState>,
    /// Serializes drain cycles.
    drain_lock: tokio::sync::Mutex<()>,
    next_ticket: AtomicU64,
    signal_tx: mpsc::UnboundedSender<SlotSignal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<SlotSignal>>>,
}

impl AdmissionController {
    pub fn new(
        config: AdmissionConfig,
        source: Arc<dyn EventStreamSource>,
        store: Arc<LiveStateStore>,
    ) -> Result<Self> {
        if config.max_concurrent == 0 {
            return Err(Error::config("max_concurrent must be at least 1"));
        }

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            source,
            store,
            pool: Mutex::new(PoolState::default()),
            drain_lock: tokio::sync::Mutex::new(()),
            next_ticket: AtomicU64::new(1),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
        })
    }

    // ========== Admission ==========

    /// Try to give the handle a slot.
    ///
    /// With a free slot the connect attempt is awaited; on failure the handle
    /// goes to the queue tail. Without a free slot no connection is attempted.
    pub async fn request_admission(&self, handle: &Handle) -> Admission {
        if !self.store.contains(handle) {
            return Admission::Withdrawn;
        }

        let ticket = {
            let mut pool = self.pool.lock();
            pool.parked.remove(handle);
            if pool.active.contains_key(handle) {
                return Admission::Active;
            }
            if pool.connecting.contains_key(handle) {
                return Admission::Connecting;
            }
            if pool.occupied() >= self.config.max_concurrent {
                let position = pool.queue.push_back(handle.clone());
                drop(pool);
                self.store.set_status(handle, AccountStatus::Waiting);
                debug!(handle = %handle, position, "No free slot, queued");
                return Admission::Queued { position };
            }
            pool.queue.remove(handle);
            self.reserve(&mut pool, handle)
        };

        self.attempt(handle, ticket).await
    }

    /// Put the handle at the queue tail without attempting a connection.
    pub fn enqueue(&self, handle: &Handle) -> Option<usize> {
        let position = {
            let mut pool = self.pool.lock();
            if pool.active.contains_key(handle) || pool.connecting.contains_key(handle) {
                return None;
            }
            pool.queue.push_back(handle.clone())
        };
        self.store.set_status(handle, AccountStatus::Waiting);
        Some(position)
    }

    /// Stop everything held for the handle, then drain.
    ///
    /// Returns whether the handle held a slot, a reservation or a queue entry.
    pub async fn release(&self, handle: &Handle) -> bool {
        let (slot, was_connecting, was_queued) = {
            let mut pool = self.pool.lock();
            pool.parked.remove(handle);
            (
                pool.active.remove(handle),
                pool.connecting.remove(handle).is_some(),
                pool.queue.remove(handle),
            )
        };

        if let Some(slot) = &slot {
            slot.closer.cancel();
            info!(
                handle = %handle,
                connection_id = %slot.connection_id,
                held_for = ?(Utc::now() - slot.admitted_at).to_std().unwrap_or_default(),
                "Released slot"
            );
        }

        self.drain_queue().await;
        slot.is_some() || was_connecting || was_queued
    }

    /// Vacate the handle's slot and put it at the queue tail, then drain.
    ///
    /// With `slot_id` set, only that specific slot is vacated. Returns the
    /// queue position, or `None` when nothing matching was held.
    pub async fn requeue(&self, handle: &Handle, slot_id: Option<u64>) -> Option<usize> {
        let position = self.vacate(handle, slot_id, false);
        if let Some(position) = position {
            info!(handle = %handle, position, "Slot vacated, requeued");
        }

        self.drain_queue().await;
        position
    }

    /// Vacate the slot of an account confirmed offline and park it in the
    /// queue, then drain.
    ///
    /// A parked account is not reconnected by drains; the next
    /// [`request_admission`](Self::request_admission) for it clears the mark.
    /// Without `slot_id`, an account that is queued or connecting is parked
    /// where it is.
    pub async fn park_offline(&self, handle: &Handle, slot_id: Option<u64>) -> Option<usize> {
        let position = self.vacate(handle, slot_id, true);
        info!(handle = %handle, ?position, "Offline, parked");

        self.drain_queue().await;
        position
    }

    fn vacate(&self, handle: &Handle, slot_id: Option<u64>, park: bool) -> Option<usize> {
        let mut pool = self.pool.lock();
        let matches = pool
            .active
            .get(handle)
            .is_some_and(|slot| slot_id.is_none_or(|id| id == slot.slot_id));

        if matches {
            if let Some(slot) = pool.active.remove(handle) {
                slot.closer.cancel();
            }
            let position = pool.queue.push_back(handle.clone());
            if park {
                pool.parked.insert(handle.clone());
            }
            self.store.set_status(handle, AccountStatus::Waiting);
            return Some(position);
        }

        if park
            && slot_id.is_none()
            && !pool.active.contains_key(handle)
            && self.store.contains(handle)
        {
            pool.parked.insert(handle.clone());
            return pool.queue.position(handle);
        }
        None
    }

    /// Promote queued handles into free slots.
    ///
    /// Stops at the first failed attempt; the failed handle goes to the tail
    /// so the next cycle starts with whoever was behind it.
    pub async fn drain_queue(&self) -> DrainReport {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        loop {
            let (handle, ticket) = {
                let mut pool = self.pool.lock();
                if pool.occupied() >= self.config.max_concurrent {
                    break;
                }
                let Some(handle) = pool.next_admissible() else {
                    break;
                };
                let ticket = self.reserve(&mut pool, &handle);
                (handle, ticket)
            };

            match self.attempt(&handle, ticket).await {
                Admission::Active => report.admitted += 1,
                Admission::Queued { .. } => {
                    report.failed += 1;
                    break;
                }
                Admission::Connecting | Admission::Withdrawn => {}
            }
        }

        if report != DrainReport::default() {
            debug!(
                admitted = report.admitted,
                failed = report.failed,
                "Queue drain finished"
            );
        }
        report
    }

    fn reserve(&self, pool: &mut PoolState, handle: &Handle) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        pool.connecting.insert(handle.clone(), ticket);
        ticket
    }

    /// Drop the reservation made with `ticket`.
    ///
    /// Returns false when the reservation was already released or the handle
    /// is no longer tracked.
    fn take_reservation(&self, pool: &mut PoolState, handle: &Handle, ticket: u64) -> bool {
        if pool.connecting.get(handle) != Some(&ticket) {
            return false;
        }
        pool.connecting.remove(handle);
        self.store.contains(handle)
    }

    /// Connect with the reserved slot identified by `ticket`.
    async fn attempt(&self, handle: &Handle, ticket: u64) -> Admission {
        let result = match tokio::time::timeout(
            self.config.connect_timeout,
            self.source.open(handle),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::connection_failed(
                handle.as_str(),
                format!("timed out after {:?}", self.config.connect_timeout),
            )),
        };

        match result {
            Ok(mut connection) => {
                let events = connection.take_events();
                {
                    let mut pool = self.pool.lock();
                    if !self.take_reservation(&mut pool, handle, ticket) {
                        drop(pool);
                        connection.close();
                        debug!(handle = %handle, "Released while connecting, stream discarded");
                        return Admission::Withdrawn;
                    }
                    if pool.parked.contains(handle) {
                        let position = pool.queue.push_back(handle.clone());
                        drop(pool);
                        connection.close();
                        debug!(handle = %handle, "Went offline while connecting, stream discarded");
                        return Admission::Queued { position };
                    }
                    pool.active.insert(
                        handle.clone(),
                        ActiveSlot {
                            slot_id: ticket,
                            connection_id: connection.id().to_string(),
                            closer: connection.closer(),
                            admitted_at: Utc::now(),
                        },
                    );
                    // Under the pool lock so a concurrent requeue cannot run
                    // between the slot insert and these updates.
                    self.store.set_status(handle, AccountStatus::Monitoring);
                    self.store.set_live(handle, LiveSignal::Online);
                }

                match events {
                    Some(events) => {
                        tokio::spawn(run_slot(
                            handle.clone(),
                            ticket,
                            events,
                            connection.closer(),
                            self.store.clone(),
                            self.signal_tx.clone(),
                        ));
                    }
                    None => {
                        let _ = self.signal_tx.send(SlotSignal {
                            handle: handle.clone(),
                            slot_id: ticket,
                            kind: SlotSignalKind::Disconnected(Some(
                                "stream delivered no events".to_string(),
                            )),
                        });
                    }
                }

                info!(
                    handle = %handle,
                    source = self.source.name(),
                    connection_id = %connection.id(),
                    "Admitted"
                );
                Admission::Active
            }
            Err(e) => {
                let position = {
                    let mut pool = self.pool.lock();
                    if !self.take_reservation(&mut pool, handle, ticket) {
                        return Admission::Withdrawn;
                    }
                    self.store.set_status(handle, AccountStatus::Waiting);
                    pool.queue.push_back(handle.clone())
                };
                warn!(handle = %handle, position, "Admission failed: {}", e);
                Admission::Queued { position }
            }
        }
    }

    // ========== Background work ==========

    /// Spawn the slot signal loop and the periodic drain.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        let Some(mut signals) = self.signal_rx.lock().take() else {
            warn!("Admission controller already started");
            return;
        };

        let controller = self.clone();
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = signal_cancel.cancelled() => break,
                    signal = signals.recv() => {
                        match signal {
                            Some(signal) => controller.handle_signal(signal).await,
                            None => break,
                        }
                    }
                }
            }
            debug!("Slot signal loop stopped");
        });

        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.config.drain_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        controller.drain_queue().await;
                    }
                }
            }
            debug!("Queue drain loop stopped");
        });
    }

    async fn handle_signal(&self, signal: SlotSignal) {
        let current = self
            .pool
            .lock()
            .active
            .get(&signal.handle)
            .map(|slot| slot.slot_id);
        if current != Some(signal.slot_id) {
            debug!(handle = %signal.handle, slot_id = signal.slot_id, "Ignoring stale slot signal");
            return;
        }

        match &signal.kind {
            SlotSignalKind::StreamEnded => {
                info!(handle = %signal.handle, "Stream ended");
                self.store.set_live(
                    &signal.handle,
                    LiveSignal::Offline(OfflineReason::StreamEnded),
                );
                self.park_offline(&signal.handle, Some(signal.slot_id))
                    .await;
            }
            SlotSignalKind::Disconnected(reason) => {
                warn!(
                    handle = %signal.handle,
                    reason = reason.as_deref().unwrap_or("unknown"),
                    "Stream disconnected"
                );
                self.requeue(&signal.handle, Some(signal.slot_id)).await;
            }
        }
    }

    /// Close every active stream and drop pending reservations.
    pub fn close_all(&self) -> usize {
        let slots: Vec<_> = {
            let mut pool = self.pool.lock();
            pool.connecting.clear();
            pool.active.drain().collect()
        };
        for (_, slot) in &slots {
            slot.closer.cancel();
        }
        slots.len()
    }

    // ========== Queries ==========

    pub fn is_active(&self, handle: &Handle) -> bool {
        self.pool.lock().active.contains_key(handle)
    }

    pub fn queue_position(&self, handle: &Handle) -> Option<usize> {
        self.pool.lock().queue.position(handle)
    }

    pub fn active_count(&self) -> usize {
        self.pool.lock().active.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent
    }

    pub fn queue_state(&self) -> QueueState {
        let pool = self.pool.lock();
        let mut active: Vec<_> = pool
            .active
            .iter()
            .map(|(handle, slot)| (slot.admitted_at, handle.clone()))
            .collect();
        active.sort();

        QueueState {
            active: pool.active.len(),
            max_concurrent: self.config.max_concurrent,
            active_handles: active.into_iter().map(|(_, handle)| handle).collect(),
            queued: pool.queue.to_vec(),
            parked: pool
                .queue
                .to_vec()
                .into_iter()
                .filter(|handle| pool.parked.contains(handle))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::RelayEvent;
    use crate::stream::StreamEvent;
    use crate::test_support::{RecordingNotifier, ScriptedSource, wait_until};

    struct Harness {
        controller: Arc<AdmissionController>,
        source: Arc<ScriptedSource>,
        store: Arc<LiveStateStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(max_concurrent: usize) -> Harness {
        let notifier = RecordingNotifier::new();
        let store = Arc::new(LiveStateStore::new(notifier.clone(), None));
        let source = ScriptedSource::new();
        let config = AdmissionConfig {
            max_concurrent,
            connect_timeout: Duration::from_millis(200),
            drain_interval: Duration::from_secs(3600),
        };
        let controller =
            Arc::new(AdmissionController::new(config, source.clone(), store.clone()).unwrap());
        Harness {
            controller,
            source,
            store,
            notifier,
        }
    }

    fn handle(name: &str) -> Handle {
        Handle::from_trusted(name)
    }

    impl Harness {
        fn track(&self, name: &str) -> Handle {
            let handle = handle(name);
            self.store
                .insert_new(handle.clone(), AccountStatus::Waiting)
                .unwrap();
            handle
        }

        fn queued(&self) -> Vec<String> {
            self.controller
                .queue_state()
                .queued
                .into_iter()
                .map(|h| h.as_str().to_string())
                .collect()
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = AdmissionConfig {
            max_concurrent: 0,
            connect_timeout: Duration::from_secs(1),
            drain_interval: Duration::from_secs(1),
        };
        let store = Arc::new(LiveStateStore::new(RecordingNotifier::new(), None));
        assert!(AdmissionController::new(config, ScriptedSource::new(), store).is_err());
    }

    #[tokio::test]
    async fn test_admit_until_full_then_queue() {
        let h = harness(2);
        let alice = h.track("alice");
        let bob = h.track("bob");
        let carol = h.track("carol");

        assert_eq!(h.controller.request_admission(&alice).await, Admission::Active);
        assert_eq!(h.controller.request_admission(&bob).await, Admission::Active);
        assert_eq!(
            h.controller.request_admission(&carol).await,
            Admission::Queued { position: 1 }
        );

        // No connect attempt beyond capacity.
        assert_eq!(h.source.attempt_count("carol"), 0);
        assert_eq!(h.store.status(&alice), Some(AccountStatus::Monitoring));
        assert_eq!(h.store.status(&carol), Some(AccountStatus::Waiting));
        assert!(h.store.get(&alice).unwrap().is_live);

        h.controller.release(&alice).await;

        assert!(h.controller.is_active(&carol));
        assert!(!h.source.is_open("alice"));
        assert!(h.queued().is_empty());
        assert_eq!(h.controller.active_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_admission_queues_at_tail() {
        let h = harness(3);
        let alice = h.track("alice");
        h.source.fail("alice");

        assert_eq!(
            h.controller.request_admission(&alice).await,
            Admission::Queued { position: 1 }
        );
        assert_eq!(h.controller.active_count(), 0);
        assert_eq!(h.store.status(&alice), Some(AccountStatus::Waiting));
        assert!(!h.store.get(&alice).unwrap().is_live);
    }

    #[tokio::test]
    async fn test_connect_timeout_is_failure() {
        let h = harness(1);
        let slow = h.track("slow");
        h.source.hang("slow");

        assert_eq!(
            h.controller.request_admission(&slow).await,
            Admission::Queued { position: 1 }
        );
        assert_eq!(h.controller.queue_state().active, 0);
    }

    #[tokio::test]
    async fn test_drain_requeues_failure_at_tail_and_stops() {
        let h = harness(1);
        let holder = h.track("holder");
        h.controller.request_admission(&holder).await;
        for name in ["a", "b", "c"] {
            let queued = h.track(name);
            h.controller.request_admission(&queued).await;
        }
        assert_eq!(h.queued(), vec!["a", "b", "c"]);

        h.source.fail("a");
        h.controller.release(&holder).await;

        assert_eq!(h.queued(), vec!["b", "c", "a"]);
        assert_eq!(h.source.attempt_count("b"), 0);
        assert_eq!(h.controller.active_count(), 0);

        let report = h.controller.drain_queue().await;
        assert_eq!(report, DrainReport { admitted: 1, failed: 0 });
        assert!(h.controller.is_active(&handle("b")));
        assert_eq!(h.queued(), vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_drain_fills_every_free_slot() {
        let h = harness(3);
        for name in ["a", "b", "c", "d"] {
            let queued = h.track(name);
            h.controller.enqueue(&queued);
        }

        let report = h.controller.drain_queue().await;
        assert_eq!(report.admitted, 3);
        assert_eq!(h.queued(), vec!["d"]);
        assert_eq!(h.source.attempts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_release_removes_queue_entry() {
        let h = harness(1);
        let alice = h.track("alice");
        let bob = h.track("bob");
        h.controller.request_admission(&alice).await;
        h.controller.request_admission(&bob).await;

        assert!(h.controller.release(&bob).await);
        assert!(h.queued().is_empty());
        assert!(h.controller.is_active(&alice));
        assert!(!h.controller.release(&bob).await);
    }

    #[tokio::test]
    async fn test_release_while_connecting_withdraws() {
        let h = Arc::new(harness(1));
        let slow = h.track("slow");
        h.source.hang("slow");

        let attempt = {
            let h = h.clone();
            let slow = slow.clone();
            tokio::spawn(async move { h.controller.request_admission(&slow).await })
        };
        assert!(wait_until(|| h.source.attempt_count("slow") == 1).await);

        h.controller.release(&slow).await;
        assert_eq!(attempt.await.unwrap(), Admission::Withdrawn);
        assert_eq!(h.controller.queue_state().active, 0);
        assert!(h.queued().is_empty());
    }

    #[tokio::test]
    async fn test_parked_while_connecting_discards_stream() {
        let h = Arc::new(harness(1));
        let erin = h.track("erin");
        h.source.delay("erin", Duration::from_millis(100));

        let attempt = {
            let h = h.clone();
            let erin = erin.clone();
            tokio::spawn(async move { h.controller.request_admission(&erin).await })
        };
        assert!(wait_until(|| h.source.attempt_count("erin") == 1).await);

        h.controller.park_offline(&erin, None).await;

        assert_eq!(attempt.await.unwrap(), Admission::Queued { position: 1 });
        assert!(!h.controller.is_active(&erin));
        assert!(!h.source.is_open("erin"));
        assert!(!h.store.get(&erin).unwrap().is_live);
        assert_eq!(h.store.status(&erin), Some(AccountStatus::Waiting));
        assert_eq!(h.controller.queue_state().parked, vec![erin.clone()]);
    }

    #[tokio::test]
    async fn test_admission_request_clears_park() {
        let h = harness(1);
        let dave = h.track("dave");
        h.controller.request_admission(&dave).await;

        h.controller.park_offline(&dave, None).await;
        assert!(!h.controller.is_active(&dave));
        assert_eq!(h.controller.drain_queue().await, DrainReport::default());

        assert_eq!(h.controller.request_admission(&dave).await, Admission::Active);
        assert!(h.controller.queue_state().parked.is_empty());
        assert!(h.queued().is_empty());
    }

    #[tokio::test]
    async fn test_cap_holds_under_concurrent_requests() {
        let h = Arc::new(harness(3));
        let mut tasks = Vec::new();
        for i in 0..12 {
            let handle = h.track(&format!("user{}", i));
            let h = h.clone();
            tasks.push(tokio::spawn(async move {
                h.controller.request_admission(&handle).await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let state = h.controller.queue_state();
        assert_eq!(state.active, 3);
        assert_eq!(state.queued.len(), 9);
        assert!(h.source.open_count() <= 3);
    }

    #[tokio::test]
    async fn test_stream_ended_goes_offline_and_requeues() {
        let h = harness(1);
        h.controller.start(CancellationToken::new());
        let erin = h.track("erin");
        h.controller.request_admission(&erin).await;
        h.source.fail("erin");

        h.source.emit("erin", StreamEvent::StreamEnded).await;

        assert!(wait_until(|| !h.controller.is_active(&erin)).await);
        assert!(wait_until(|| h.store.status(&erin) == Some(AccountStatus::Waiting)).await);
        assert!(!h.store.get(&erin).unwrap().is_live);
        assert_eq!(h.notifier.went_offline("erin"), 1);
    }

    #[tokio::test]
    async fn test_disconnect_requeues_without_offline() {
        let h = harness(1);
        h.controller.start(CancellationToken::new());
        let bob = h.track("bob");
        let carol = h.track("carol");
        h.controller.request_admission(&bob).await;
        h.controller.request_admission(&carol).await;

        h.source
            .emit("bob", StreamEvent::Disconnected { reason: None })
            .await;

        assert!(wait_until(|| h.controller.is_active(&carol)).await);
        assert_eq!(h.queued(), vec!["bob"]);
        assert!(h.store.get(&bob).unwrap().is_live);
        assert_eq!(
            h.notifier
                .count(|e| matches!(e, RelayEvent::WentOffline { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_close_all() {
        let h = harness(2);
        for name in ["alice", "bob"] {
            let tracked = h.track(name);
            h.controller.request_admission(&tracked).await;
        }

        assert_eq!(h.controller.close_all(), 2);
        assert_eq!(h.source.open_count(), 0);
        assert_eq!(h.controller.active_count(), 0);
    }
}
