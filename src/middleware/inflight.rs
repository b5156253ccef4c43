//! In-flight request table.
//!
//! Two-level mapping from client key to the set of request identifiers that
//! have been admitted and not yet completed:
//!
//! ```text
//! "203.0.113.7"  → { "abc", "def" }
//! "198.51.100.2" → { "abc" }
//! ```
//!
//! # Locking
//!
//! The whole table sits behind one `std::sync::RwLock`. Lookups share the
//! read lock; every structural change (bucket creation, insert, remove,
//! clear) takes the write lock. Critical sections never `.await`, and
//! release runs in `Drop`, so the lock is a blocking one.
//!
//! [`InflightTable::reserve`] performs the presence check and the insert
//! under a single write guard, so two concurrent first requests for the same
//! pair can never both be admitted.
//!
//! Poisoning is ignored: no critical section can leave the map half-updated,
//! so the data behind a poisoned lock is still consistent.
//!
//! # Generations
//!
//! `clear` bumps a generation counter kept under the same lock. A
//! [`Reservation`] remembers the generation it was admitted in and releases
//! only if it still matches, so a guard outliving a clear cannot free the
//! same pair reserved again afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::metrics;

type Buckets = HashMap<String, HashSet<String>>;

/// Table contents plus the generation bumped by every `clear`.
#[derive(Debug, Default)]
struct Entries {
    buckets: Buckets,
    generation: u64,
}

impl Entries {
    fn reserve(&mut self, client: &str, request_id: &str) -> bool {
        if let Some(bucket) = self.buckets.get_mut(client) {
            if bucket.contains(request_id) {
                return false;
            }
            bucket.insert(request_id.to_owned());
        } else {
            self.buckets.insert(
                client.to_owned(),
                HashSet::from([request_id.to_owned()]),
            );
        }
        true
    }

    fn release(&mut self, client: &str, request_id: &str) -> bool {
        let Some(bucket) = self.buckets.get_mut(client) else {
            return false;
        };
        let removed = bucket.remove(request_id);
        if bucket.is_empty() {
            self.buckets.remove(client);
        }
        removed
    }
}

/// Shared table of reserved `(client, request id)` pairs.
#[derive(Debug, Default)]
pub struct InflightTable {
    requests: RwLock<Entries>,
}

impl InflightTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.requests.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.requests.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty bucket for `client` if it has none yet.
    ///
    /// `reserve` creates buckets itself, so the guard never needs this. A
    /// bucket created here stays until a release empties it or `clear` runs.
    pub fn ensure_bucket(&self, client: &str) {
        self.write()
            .buckets
            .entry(client.to_owned())
            .or_default();
    }

    /// Atomically reserve `request_id` for `client`.
    ///
    /// Returns `true` if the pair was absent and is now reserved, `false` if
    /// it was already reserved (the table is left untouched).
    pub fn reserve(&self, client: &str, request_id: &str) -> bool {
        let reserved = self.write().reserve(client, request_id);
        if reserved {
            metrics::inc_reservations();
        }
        reserved
    }

    /// Remove `request_id` from `client`'s bucket.
    ///
    /// Idempotent: releasing an absent pair is a no-op. A bucket left empty
    /// is removed. Returns whether a reservation was actually removed.
    pub fn release(&self, client: &str, request_id: &str) -> bool {
        let removed = self.write().release(client, request_id);
        if removed {
            metrics::dec_reservations();
        }
        removed
    }

    /// Release a pair only if no `clear` happened since it was reserved.
    fn release_from(&self, generation: u64, client: &str, request_id: &str) -> bool {
        let mut entries = self.write();
        if entries.generation != generation {
            return false;
        }
        let removed = entries.release(client, request_id);
        drop(entries);

        if removed {
            metrics::dec_reservations();
        }
        removed
    }

    /// Reserve the pair and return a guard that releases it when dropped.
    ///
    /// Returns `None` if the pair is already reserved. A guard that outlives
    /// a `clear` releases nothing, so it cannot free a newer holder's
    /// reservation of the same pair.
    pub fn admit(self: &Arc<Self>, client: String, request_id: String) -> Option<Reservation> {
        let mut entries = self.write();
        if !entries.reserve(&client, &request_id) {
            return None;
        }
        let generation = entries.generation;
        drop(entries);

        metrics::inc_reservations();
        Some(Reservation {
            table: Arc::clone(self),
            generation,
            client,
            request_id,
        })
    }

    /// Whether `request_id` is currently reserved for `client`.
    pub fn contains(&self, client: &str, request_id: &str) -> bool {
        self.read()
            .buckets
            .get(client)
            .is_some_and(|bucket| bucket.contains(request_id))
    }

    /// Total number of reservations across all clients.
    pub fn len(&self) -> usize {
        self.read().buckets.values().map(HashSet::len).sum()
    }

    /// Whether no reservation and no bucket exists.
    pub fn is_empty(&self) -> bool {
        self.read().buckets.is_empty()
    }

    /// Number of clients with a bucket.
    pub fn client_count(&self) -> usize {
        self.read().buckets.len()
    }

    /// Ordered copy of the table contents.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.read()
            .buckets
            .iter()
            .map(|(client, bucket)| (client.clone(), bucket.iter().cloned().collect()))
            .collect()
    }

    /// Drop every bucket, returning the number of reservations discarded.
    ///
    /// Guards admitted before the call become inert.
    pub fn clear(&self) -> usize {
        let mut entries = self.write();
        let discarded = entries.buckets.values().map(HashSet::len).sum();
        entries.buckets.clear();
        entries.generation = entries.generation.wrapping_add(1);
        drop(entries);

        metrics::sub_reservations(discarded);
        discarded
    }
}

/// A held reservation. Dropping it releases the pair, on normal return as
/// well as during unwinding or future cancellation.
#[derive(Debug)]
pub struct Reservation {
    table: Arc<InflightTable>,
    generation: u64,
    client: String,
    request_id: String,
}

impl Reservation {
    /// Client key the reservation belongs to.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Reserved request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let released = self
            .table
            .release_from(self.generation, &self.client, &self.request_id);
        debug!(
            client = %self.client,
            request_id = %self.request_id,
            released,
            "Reservation released"
        );
    }
}
