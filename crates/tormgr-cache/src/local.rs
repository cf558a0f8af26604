//! In-process store backing [`CacheBackend::Local`](crate::CacheBackend).
//!
//! Mirrors the subset of Redis the cache uses: hash entries with an optional
//! deadline, and plain string sets. A single mutex guards the whole state, so
//! each multi-key operation is atomic with respect to every other one.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::backend::Expiry;

struct LocalEntry {
    fields: HashMap<String, Vec<u8>>,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Default)]
struct LocalState {
    hashes: HashMap<String, LocalEntry>,
    sets: HashMap<String, HashSet<String>>,
}

impl LocalState {
    /// Remove `key` and report whether a live entry was deleted.
    fn delete(&mut self, key: &str, now: Instant) -> bool {
        self.hashes
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }
}

/// Local cache state shared by clones of a local backend.
#[derive(Default)]
pub struct LocalStore {
    state: Mutex<LocalState>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of `fields` in the hash at `key`, `None` for each missing field.
    pub fn read_fields(&self, key: &str, fields: &[&str]) -> Vec<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = state.hashes.get(key).is_some_and(|e| e.is_expired(now));
        if expired {
            state.hashes.remove(key);
        }

        match state.hashes.get(key) {
            Some(entry) => fields
                .iter()
                .map(|field| entry.fields.get(*field).cloned())
                .collect(),
            None => vec![None; fields.len()],
        }
    }

    /// Replace the hash at `key` and add `key` to every set in `sets`.
    pub fn write(&self, key: &str, fields: &[(&str, &[u8])], expiry: Expiry, sets: &[String]) {
        let now = Instant::now();
        let expires_at = match expiry {
            Expiry::Never => None,
            Expiry::After(ttl) => Some(now + ttl),
            Expiry::At(at) => {
                let remaining = at - OffsetDateTime::now_utc();
                if remaining.is_positive() {
                    Some(now + remaining.unsigned_abs())
                } else {
                    Some(now)
                }
            }
        };

        let entry = LocalEntry {
            fields: fields
                .iter()
                .map(|(field, value)| ((*field).to_string(), value.to_vec()))
                .collect(),
            expires_at,
        };

        let mut state = self.state.lock();
        state.hashes.insert(key.to_string(), entry);
        for set in sets {
            state
                .sets
                .entry(set.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Delete the hash at `key` and drop it from `set`.
    pub fn remove(&self, key: &str, set: &str) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.delete(key, now);
        if let Some(members) = state.sets.get_mut(set) {
            members.remove(key);
            if members.is_empty() {
                state.sets.remove(set);
            }
        }
    }

    /// Delete every member of every set in `sets`, then the sets themselves.
    ///
    /// Returns the number of live entries deleted; a key listed in several
    /// sets is counted once.
    pub fn drain_sets(&self, sets: &[String]) -> u64 {
        let now = Instant::now();
        let mut state = self.state.lock();
        let mut removed = 0;
        for set in sets {
            let Some(members) = state.sets.remove(set) else {
                continue;
            };
            for member in members {
                if state.delete(&member, now) {
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn set_members(&self, set: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live hash entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock();
        state.hashes.values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired hash entries. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.hashes.len();
        state.hashes.retain(|_, entry| !entry.is_expired(now));
        before - state.hashes.len()
    }
}
