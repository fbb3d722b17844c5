//! FIFO wait queue of handles awaiting a slot.

use std::collections::VecDeque;

use crate::domain::Handle;

/// FIFO of handles awaiting admission. A handle appears at most once.
#[derive(Debug, Default)]
pub struct WaitQueue {
    entries: VecDeque<Handle>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail and return the 1-based position.
    ///
    /// A handle that is already queued keeps its place.
    pub fn push_back(&mut self, handle: Handle) -> usize {
        if let Some(position) = self.position(&handle) {
            return position;
        }
        self.entries.push_back(handle);
        self.entries.len()
    }

    pub fn pop_front(&mut self) -> Option<Handle> {
        self.entries.pop_front()
    }

    /// Remove and return the first handle `skip` does not reject.
    ///
    /// Skipped handles keep their places.
    pub fn pop_first_except(&mut self, skip: impl Fn(&Handle) -> bool) -> Option<Handle> {
        let index = self.entries.iter().position(|h| !skip(h))?;
        self.entries.remove(index)
    }

    /// Remove a handle wherever it is. Returns whether it was queued.
    pub fn remove(&mut self, handle: &Handle) -> bool {
        match self.entries.iter().position(|h| h == handle) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// 1-based position of a handle.
    pub fn position(&self, handle: &Handle) -> Option<usize> {
        self.entries
            .iter()
            .position(|h| h == handle)
            .map(|index| index + 1)
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.entries.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued handles, head first.
    pub fn to_vec(&self) -> Vec<Handle> {
        self.entries.iter().cloned().collect()
    }
}
