/// Timer maps used by the spawn manager
///
/// Both maps key absolute millisecond timestamps by object id. Ordered maps
/// keep iteration stable so a tick can snapshot the due entries, process
/// them, and write back only what is still present.

use std::collections::BTreeMap;

/// One activity tier: id -> next check time
#[derive(Debug, Default, Clone)]
pub struct ActivityQueue {
    entries: BTreeMap<u64, u64>,
}

impl ActivityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the next check time for `id`
    pub fn insert(&mut self, id: u64, due_ms: u64) {
        self.entries.insert(id, due_ms);
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn due_time(&self, id: u64) -> Option<u64> {
        self.entries.get(&id).copied()
    }

    /// Move an existing entry to `due_ms`; no-op when absent
    pub fn reschedule(&mut self, id: u64, due_ms: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(due) => {
                *due = due_ms;
                true
            }
            None => false,
        }
    }

    /// Snapshot of (id, due) for every entry due at `now`
    pub fn due(&self, now: u64) -> Vec<(u64, u64)> {
        self.entries
            .iter()
            .filter(|&(_, &due)| due <= now)
            .map(|(&id, &due)| (id, due))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// id -> expiry time, with per-call insertion policies
#[derive(Debug, Default, Clone)]
pub struct DeadlineMap {
    entries: BTreeMap<u64, u64>,
}

impl DeadlineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `expiry_ms` unless an earlier expiry is already pending
    ///
    /// Returns true when the stored value changed.
    pub fn insert_earliest(&mut self, id: u64, expiry_ms: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(current) if *current <= expiry_ms => false,
            Some(current) => {
                *current = expiry_ms;
                true
            }
            None => {
                self.entries.insert(id, expiry_ms);
                true
            }
        }
    }

    /// Store `expiry_ms` only if `id` has no entry yet
    pub fn insert_if_absent(&mut self, id: u64, expiry_ms: u64) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, expiry_ms);
        true
    }

    /// Overwrite an existing entry; no-op when absent
    pub fn reschedule(&mut self, id: u64, expiry_ms: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(current) => {
                *current = expiry_ms;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn expiry(&self, id: u64) -> Option<u64> {
        self.entries.get(&id).copied()
    }

    /// Ids expired at `now`, left in place
    pub fn expired(&self, now: u64) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|&(_, &expiry)| expiry <= now)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Remove and return every id expired at `now`
    pub fn take_expired(&mut self, now: u64) -> Vec<u64> {
        let expired = self.expired(now);
        for id in &expired {
            self.entries.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
