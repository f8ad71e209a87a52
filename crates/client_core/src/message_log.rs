use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use shared::domain::ConversationEntry;

#[derive(Default)]
struct LogState {
    entries: Vec<ConversationEntry>,
    selected: Option<usize>,
}

/// Ordered conversation log. Insertion order is display order.
///
/// Every mutation takes the write lock for its whole duration and never
/// awaits, so readers see the log either before or after a mutation.
#[derive(Default)]
pub struct MessageLog {
    state: RwLock<LogState>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends and returns the new entry's position.
    pub fn append(&self, entry: ConversationEntry) -> usize {
        let mut state = self.write();
        state.entries.push(entry);
        state.entries.len() - 1
    }

    /// Removes the entry at `position` when a selection is active.
    ///
    /// Out-of-range positions and calls without a selection are no-ops. A
    /// successful delete clears the selection.
    pub fn delete_at(&self, position: usize) -> Option<ConversationEntry> {
        let mut state = self.write();
        state.selected?;
        if position >= state.entries.len() {
            return None;
        }
        let removed = state.entries.remove(position);
        state.selected = None;
        Some(removed)
    }

    /// Deletes whatever is currently selected, revalidating the position
    /// against the current length first.
    pub fn delete_selected(&self) -> Option<(usize, ConversationEntry)> {
        let mut state = self.write();
        let position = state.selected?;
        if position >= state.entries.len() {
            state.selected = None;
            return None;
        }
        let removed = state.entries.remove(position);
        state.selected = None;
        Some((position, removed))
    }

    /// Swaps in a whole new log. Any selection pointed into the old content
    /// and is dropped.
    pub fn replace_all(&self, entries: Vec<ConversationEntry>) {
        let mut state = self.write();
        state.entries = entries;
        state.selected = None;
    }

    /// Selects `position`, replacing any previous selection. Returns false
    /// (and leaves the selection untouched) when out of range.
    pub fn select(&self, position: usize) -> bool {
        let mut state = self.write();
        if position >= state.entries.len() {
            return false;
        }
        state.selected = Some(position);
        true
    }

    pub fn selected(&self) -> Option<usize> {
        self.read().selected
    }

    pub fn get(&self, position: usize) -> Option<ConversationEntry> {
        self.read().entries.get(position).cloned()
    }

    pub fn snapshot(&self) -> Vec<ConversationEntry> {
        self.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/message_log_tests.rs"]
mod tests;
