//! Live state store implementation.
//!
//! The LiveStateStore holds the latest known state of every tracked account
//! and owns all per-account mutation. Each mutation runs under the account's
//! map entry lock, so mutations for one handle never interleave while
//! different handles proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace};

use crate::database::PersistenceWriter;
use crate::domain::{
    AccountStatus, CommentEntry, GiftEntry, Handle, LiveState, TrackedAccount,
};
use crate::notification::{Notifier, OfflineReason, RelayEvent};
use crate::stream::StreamEvent;
use crate::{Error, Result};

/// A conclusive signal about whether an account is broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveSignal {
    Online,
    Offline(OfflineReason),
}

impl LiveSignal {
    /// Offline signal resolved by a probe, online otherwise.
    pub fn from_probe(is_live: bool) -> Self {
        if is_live {
            Self::Online
        } else {
            Self::Offline(OfflineReason::Probe)
        }
    }
}

/// Outcome of resolving an account's live flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveTransition {
    WentLive,
    WentOffline,
    /// Resolved status matched; only the heartbeat was refreshed.
    Unchanged,
}

/// In-memory authoritative view of every tracked account.
pub struct LiveStateStore {
    accounts: DashMap<Handle, TrackedAccount>,
    notifier: Arc<dyn Notifier>,
    writer: Option<PersistenceWriter>,
}

impl LiveStateStore {
    /// Create a store. Without a writer nothing is persisted.
    pub fn new(notifier: Arc<dyn Notifier>, writer: Option<PersistenceWriter>) -> Self {
        Self {
            accounts: DashMap::new(),
            notifier,
            writer,
        }
    }

    // ========== Creation / Removal ==========

    /// Start tracking a new account.
    pub fn insert_new(&self, handle: Handle, status: AccountStatus) -> Result<TrackedAccount> {
        match self.accounts.entry(handle.clone()) {
            Entry::Occupied(_) => Err(Error::already_tracked(handle.as_str())),
            Entry::Vacant(vacant) => {
                let account = TrackedAccount::new(handle, status, Utc::now());
                self.persist(&account);
                vacant.insert(account.clone());
                debug!(handle = %account.handle, "Account added to store");
                Ok(account)
            }
        }
    }

    /// Put back an account loaded from the durable store.
    ///
    /// The live flag is cleared: only a fresh connection or probe may assert it.
    pub fn restore(&self, mut account: TrackedAccount) {
        account.state.is_live = false;
        self.persist(&account);
        self.accounts.insert(account.handle.clone(), account);
    }

    /// Drop an account and its counters. Idempotent.
    pub fn remove(&self, handle: &Handle) -> Option<TrackedAccount> {
        let removed = self.accounts.remove(handle).map(|(_, account)| account);
        if removed.is_some() {
            if let Some(writer) = &self.writer {
                writer.delete(handle.clone());
            }
            debug!(handle = %handle, "Account removed from store");
        }
        removed
    }

    // ========== Mutation ==========

    /// Apply `mutate` to an existing account only.
    ///
    /// Returns `None` when the account is not tracked.
    pub fn update<F>(&self, handle: &Handle, mutate: F) -> Option<LiveState>
    where
        F: FnOnce(&mut LiveState),
    {
        let mut entry = self.accounts.get_mut(handle)?;
        let before = entry.state.clone();
        mutate(&mut entry.state);
        self.commit(&entry, &before);
        Some(entry.state.clone())
    }

    /// Resolve the live flag of a tracked account.
    ///
    /// Returns `None` when the account is not tracked.
    pub fn set_live(&self, handle: &Handle, signal: LiveSignal) -> Option<LiveTransition> {
        let mut entry = self.accounts.get_mut(handle)?;
        let now = Utc::now();
        let is_live = matches!(signal, LiveSignal::Online);
        let changed = entry.state.set_live(is_live, now);
        self.persist(&entry);

        if !changed {
            trace!(handle = %handle, is_live, "Live status heartbeat");
            return Some(LiveTransition::Unchanged);
        }

        let transition = match signal {
            LiveSignal::Online => {
                self.notifier.notify(RelayEvent::WentLive {
                    handle: handle.clone(),
                    timestamp: now,
                });
                LiveTransition::WentLive
            }
            LiveSignal::Offline(reason) => {
                self.notifier.notify(RelayEvent::WentOffline {
                    handle: handle.clone(),
                    reason,
                    timestamp: now,
                });
                LiveTransition::WentOffline
            }
        };
        self.notifier.notify(RelayEvent::StateUpdated {
            handle: handle.clone(),
            state: entry.state.clone(),
        });
        Some(transition)
    }

    /// Set the desired connection status. Returns whether it changed.
    pub fn set_status(&self, handle: &Handle, status: AccountStatus) -> bool {
        let Some(mut entry) = self.accounts.get_mut(handle) else {
            return false;
        };
        if entry.status == status {
            return false;
        }
        entry.status = status;
        self.persist(&entry);
        self.notifier.notify(RelayEvent::StatusChanged {
            handle: handle.clone(),
            status,
            timestamp: Utc::now(),
        });
        true
    }

    /// Apply a non-terminal stream event to a tracked account.
    ///
    /// Events for accounts that are no longer tracked are dropped. Returns
    /// whether the event was applied.
    pub fn apply_event(&self, handle: &Handle, event: StreamEvent) -> bool {
        let Some(mut entry) = self.accounts.get_mut(handle) else {
            trace!(handle = %handle, "Dropping event for untracked account");
            return false;
        };
        let before = entry.state.clone();
        let now = Utc::now();

        let forwarded = match event {
            StreamEvent::Comment {
                user_id,
                nickname,
                comment,
            } => {
                let comment = CommentEntry {
                    user_id,
                    nickname,
                    comment,
                    timestamp: now,
                };
                entry.state.record_comment(comment.clone());
                Some(RelayEvent::Comment {
                    handle: handle.clone(),
                    comment,
                })
            }
            StreamEvent::Gift {
                user_id,
                nickname,
                gift_name,
                diamond_count,
                repeat_count,
            } => {
                let gift = GiftEntry {
                    user_id,
                    nickname,
                    gift_name,
                    repeat_count: repeat_count.unwrap_or(1).max(1),
                    diamonds: GiftEntry::diamond_value(diamond_count, repeat_count),
                    timestamp: now,
                };
                entry.state.record_gift(gift.clone());
                Some(RelayEvent::Gift {
                    handle: handle.clone(),
                    gift,
                })
            }
            StreamEvent::ViewerCount { viewer_count } => {
                entry.state.set_viewer_count(viewer_count, now);
                None
            }
            StreamEvent::Follow { user_id, nickname } => {
                entry.state.record_follow(now);
                Some(RelayEvent::Follow {
                    handle: handle.clone(),
                    user_id,
                    nickname,
                    timestamp: now,
                })
            }
            StreamEvent::StreamEnded | StreamEvent::Disconnected { .. } => return false,
        };

        if let Some(event) = forwarded {
            self.notifier.notify(event);
        }
        self.commit(&entry, &before);
        true
    }

    // ========== Queries ==========

    pub fn get(&self, handle: &Handle) -> Option<LiveState> {
        self.accounts.get(handle).map(|entry| entry.state.clone())
    }

    pub fn account(&self, handle: &Handle) -> Option<TrackedAccount> {
        self.accounts.get(handle).map(|entry| entry.clone())
    }

    pub fn status(&self, handle: &Handle) -> Option<AccountStatus> {
        self.accounts.get(handle).map(|entry| entry.status)
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.accounts.contains_key(handle)
    }

    /// Tracked handles in tracking order.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<_> = self
            .accounts
            .iter()
            .map(|entry| (entry.tracked_at, entry.key().clone()))
            .collect();
        handles.sort();
        handles.into_iter().map(|(_, handle)| handle).collect()
    }

    /// Point-in-time copy of every account's state.
    pub fn snapshot(&self) -> HashMap<Handle, LiveState> {
        self.accounts
            .iter()
            .map(|entry| (entry.key().clone(), entry.state.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    // ========== Internals ==========

    /// Persist and notify according to what changed.
    ///
    /// A content change is persisted and announced; a timestamp-only change
    /// is persisted silently.
    fn commit(&self, account: &TrackedAccount, before: &LiveState) {
        if !account.state.same_content(before) {
            self.persist(account);
            self.notifier.notify(RelayEvent::StateUpdated {
                handle: account.handle.clone(),
                state: account.state.clone(),
            });
        } else if account.state.last_update != before.last_update {
            self.persist(account);
        }
    }

    fn persist(&self, account: &TrackedAccount) {
        if let Some(writer) = &self.writer {
            writer.save(account.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RECENT_CAPACITY;
    use crate::test_support::RecordingNotifier;

    fn handle(name: &str) -> Handle {
        Handle::from_trusted(name)
    }

    fn store() -> (LiveStateStore, Arc<RecordingNotifier>) {
        let notifier = RecordingNotifier::new();
        (LiveStateStore::new(notifier.clone(), None), notifier)
    }

    fn gift(diamonds: Option<u64>) -> StreamEvent {
        StreamEvent::Gift {
            user_id: "42".to_string(),
            nickname: "fan".to_string(),
            gift_name: "rose".to_string(),
            diamond_count: diamonds,
            repeat_count: None,
        }
    }

    #[test]
    fn test_insert_new_rejects_duplicates() {
        let (store, _) = store();
        store.insert_new(handle("alice"), AccountStatus::Waiting).unwrap();

        let err = store
            .insert_new(handle("alice"), AccountStatus::Monitoring)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyTracked { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_gift_accumulates_diamonds() {
        let (store, notifier) = store();
        let erin = handle("erin");
        store.insert_new(erin.clone(), AccountStatus::Monitoring).unwrap();

        assert!(store.apply_event(&erin, gift(Some(5))));
        assert!(store.apply_event(&erin, gift(Some(5))));

        let state = store.get(&erin).unwrap();
        assert_eq!(state.total_diamonds, 10);
        assert_eq!(state.total_gifts, 2);
        assert_eq!(state.recent_gifts.len(), 2);
        assert!(state.recent_gifts[0].timestamp >= state.recent_gifts[1].timestamp);
        assert_eq!(
            notifier.count(|e| matches!(e, RelayEvent::Gift { .. })),
            2
        );
    }

    #[test]
    fn test_gift_diamond_fallback() {
        let (store, _) = store();
        let erin = handle("erin");
        store.insert_new(erin.clone(), AccountStatus::Monitoring).unwrap();

        store.apply_event(&erin, gift(None));
        store.apply_event(
            &erin,
            StreamEvent::Gift {
                user_id: "1".to_string(),
                nickname: "a".to_string(),
                gift_name: "heart".to_string(),
                diamond_count: Some(0),
                repeat_count: Some(3),
            },
        );

        assert_eq!(store.get(&erin).unwrap().total_diamonds, 4);
    }

    #[test]
    fn test_recent_comments_bounded_newest_first() {
        let (store, _) = store();
        let alice = handle("alice");
        store.insert_new(alice.clone(), AccountStatus::Monitoring).unwrap();

        for i in 0..15 {
            store.apply_event(
                &alice,
                StreamEvent::Comment {
                    user_id: i.to_string(),
                    nickname: format!("viewer{}", i),
                    comment: format!("message {}", i),
                },
            );
        }

        let state = store.get(&alice).unwrap();
        assert_eq!(state.total_comments, 15);
        assert_eq!(state.recent_comments.len(), RECENT_CAPACITY);
        assert_eq!(state.recent_comments[0].comment, "message 14");
        assert_eq!(state.recent_comments[9].comment, "message 5");
    }

    #[test]
    fn test_events_for_untracked_account_dropped() {
        let (store, notifier) = store();
        let ghost = handle("ghost");

        assert!(!store.apply_event(&ghost, StreamEvent::ViewerCount { viewer_count: 3 }));
        assert!(!store.contains(&ghost));
        assert_eq!(notifier.len(), 0);
    }

    #[test]
    fn test_set_live_transitions_and_heartbeats() {
        let (store, notifier) = store();
        let dave = handle("dave");
        store.insert_new(dave.clone(), AccountStatus::Monitoring).unwrap();

        assert_eq!(
            store.set_live(&dave, LiveSignal::Online),
            Some(LiveTransition::WentLive)
        );
        let events = notifier.len();

        assert_eq!(
            store.set_live(&dave, LiveSignal::Online),
            Some(LiveTransition::Unchanged)
        );
        assert_eq!(notifier.len(), events);

        assert_eq!(
            store.set_live(&dave, LiveSignal::from_probe(false)),
            Some(LiveTransition::WentOffline)
        );
        assert_eq!(notifier.went_live("dave"), 1);
        assert_eq!(notifier.went_offline("dave"), 1);
        assert_eq!(store.set_live(&handle("nobody"), LiveSignal::Online), None);
    }

    #[test]
    fn test_counters_survive_live_flips() {
        let (store, _) = store();
        let erin = handle("erin");
        store.insert_new(erin.clone(), AccountStatus::Monitoring).unwrap();
        store.apply_event(&erin, gift(Some(7)));

        store.set_live(&erin, LiveSignal::Online);
        store.set_live(&erin, LiveSignal::Offline(OfflineReason::StreamEnded));
        store.set_live(&erin, LiveSignal::Online);

        assert_eq!(store.get(&erin).unwrap().total_diamonds, 7);
    }

    #[test]
    fn test_update_never_creates_account() {
        let (store, notifier) = store();
        let bob = handle("bob");

        assert!(store.update(&bob, |s| s.viewer_count = 10).is_none());
        assert!(!store.contains(&bob));
        assert!(notifier.events().is_empty());

        store.insert_new(bob.clone(), AccountStatus::Waiting).unwrap();
        let state = store.update(&bob, |s| s.viewer_count = 10).unwrap();
        assert_eq!(state.viewer_count, 10);

        store.apply_event(&bob, StreamEvent::ViewerCount { viewer_count: 4 });
        assert_eq!(store.get(&bob).unwrap().viewer_count, 4);
        assert_eq!(
            notifier.count(|e| matches!(e, RelayEvent::StateUpdated { .. })),
            2
        );
    }

    #[test]
    fn test_set_status_notifies_on_change_only() {
        let (store, notifier) = store();
        let carol = handle("carol");
        store.insert_new(carol.clone(), AccountStatus::Waiting).unwrap();

        assert!(!store.set_status(&carol, AccountStatus::Waiting));
        assert!(store.set_status(&carol, AccountStatus::Monitoring));
        assert_eq!(
            notifier.count(|e| matches!(e, RelayEvent::StatusChanged { .. })),
            1
        );
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let (store, _) = store();
        let alice = handle("alice");
        store.insert_new(alice.clone(), AccountStatus::Monitoring).unwrap();

        let snapshot = store.snapshot();
        store.apply_event(&alice, StreamEvent::ViewerCount { viewer_count: 99 });

        assert_eq!(snapshot[&alice].viewer_count, 0);
        assert_eq!(store.get(&alice).unwrap().viewer_count, 99);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _) = store();
        let alice = handle("alice");
        store.insert_new(alice.clone(), AccountStatus::Waiting).unwrap();

        assert!(store.remove(&alice).is_some());
        assert!(store.remove(&alice).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_clears_live_flag() {
        let (store, _) = store();
        let mut account =
            TrackedAccount::new(handle("frank"), AccountStatus::Monitoring, Utc::now());
        account.state.is_live = true;
        account.state.total_comments = 3;

        store.restore(account);

        let state = store.get(&handle("frank")).unwrap();
        assert!(!state.is_live);
        assert_eq!(state.total_comments, 3);
    }

    #[test]
    fn test_handles_in_tracking_order() {
        let (store, _) = store();
        let start = Utc::now();
        for (offset, name) in ["carol", "alice", "bob"].into_iter().enumerate() {
            let tracked_at = start + chrono::Duration::seconds(offset as i64);
            store.restore(TrackedAccount::new(
                handle(name),
                AccountStatus::Waiting,
                tracked_at,
            ));
        }

        let names: Vec<_> = store
            .handles()
            .into_iter()
            .map(|h| h.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
    }
}
