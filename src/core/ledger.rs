//! Resource ledger with deadlock-free multi-key reservations.
//!
//! Every resource key owns one mutex, created on first reference and kept for
//! the life of the ledger. An operation that touches several keys acquires
//! their mutexes in the **canonical lock order**: byte-wise ascending order of
//! the key strings. Because every multi-key operation agrees on that order, two
//! overlapping requests can never wait on each other in a cycle.
//!
//! A reservation holds all of its locks from validation through mutation, so a
//! request is either applied in full or not at all and no record ever drops
//! below zero.
//!
//! ```
//! use orderflow::core::{ReservationError, ReservationRequest, ResourceLedger};
//!
//! let ledger = ResourceLedger::with_resources([("A", 2), ("B", 2)]);
//!
//! let request = ReservationRequest::new().with("A", 1).with("B", 2);
//! assert!(ledger.check_and_reserve(&request).is_ok());
//! assert_eq!(ledger.get_quantity("B"), 0);
//!
//! let err = ledger.check_and_reserve(&request).unwrap_err();
//! assert_eq!(err.to_string(), "insufficient: B");
//! assert!(matches!(err, ReservationError::InsufficientQuantity { .. }));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::ReservationError;

/// Identifier of a reservable resource.
pub type ResourceKey = String;

/// One `{key, quantity}` pair of a reservation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    /// Resource to draw from.
    pub key: ResourceKey,
    /// Units to reserve.
    pub quantity: u64,
}

/// A set of lines reserved as one atomic unit.
///
/// Lines naming the same key are collapsed by **summing** their quantities
/// (saturating at `u64::MAX`) into the line where the key first appeared. Line
/// order is first-occurrence order, and that is the order in which validation
/// reports the first failing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationRequest {
    lines: Vec<ReservationLine>,
}

impl ReservationRequest {
    /// Create an empty request.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Add a line, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<ResourceKey>, quantity: u64) -> Self {
        self.add(key, quantity);
        self
    }

    /// Add a line, summing into an existing line for the same key.
    pub fn add(&mut self, key: impl Into<ResourceKey>, quantity: u64) {
        let key = key.into();
        if let Some(line) = self.lines.iter_mut().find(|line| line.key == key) {
            line.quantity = line.quantity.saturating_add(quantity);
        } else {
            self.lines.push(ReservationLine { key, quantity });
        }
    }

    /// Collapsed lines in first-occurrence order.
    #[must_use]
    pub fn lines(&self) -> &[ReservationLine] {
        &self.lines
    }

    /// Distinct keys in canonical lock order.
    #[must_use]
    pub fn lock_order(&self) -> Vec<&str> {
        self.lines
            .iter()
            .map(|line| line.key.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the request names no key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl<K: Into<ResourceKey>> FromIterator<(K, u64)> for ReservationRequest {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut request = Self::new();
        for (key, quantity) in iter {
            request.add(key, quantity);
        }
        request
    }
}

impl<K: Into<ResourceKey>> Extend<(K, u64)> for ReservationRequest {
    fn extend<I: IntoIterator<Item = (K, u64)>>(&mut self, iter: I) {
        for (key, quantity) in iter {
            self.add(key, quantity);
        }
    }
}

/// Per-key state guarded by the key's mutex. `None` means the lock exists
/// but no resource record does.
#[derive(Debug, Default)]
struct Slot {
    available: Option<u64>,
}

type SlotGuard = ArcMutexGuard<RawMutex, Slot>;

/// Locks held by one multi-key operation, sorted by key.
struct HeldLocks<'k> {
    guards: Vec<(&'k str, SlotGuard)>,
}

impl HeldLocks<'_> {
    fn slot(&self, key: &str) -> &Slot {
        let idx = self.index_of(key);
        &self.guards[idx].1
    }

    fn slot_mut(&mut self, key: &str) -> &mut Slot {
        let idx = self.index_of(key);
        &mut self.guards[idx].1
    }

    fn index_of(&self, key: &str) -> usize {
        match self.guards.binary_search_by(|(held, _)| (*held).cmp(key)) {
            Ok(idx) => idx,
            Err(_) => unreachable!("lock for `{key}` was not acquired"),
        }
    }
}

/// Thread-safe mapping from resource key to available quantity.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    /// Lock table. Entries are only ever inserted.
    slots: RwLock<HashMap<ResourceKey, Arc<Mutex<Slot>>>>,
}

impl ResourceLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger seeded with initial quantities.
    #[must_use]
    pub fn with_resources<K, I>(resources: I) -> Self
    where
        K: Into<ResourceKey>,
        I: IntoIterator<Item = (K, u64)>,
    {
        let slots = resources
            .into_iter()
            .map(|(key, quantity)| {
                let slot = Slot {
                    available: Some(quantity),
                };
                (key.into(), Arc::new(Mutex::new(slot)))
            })
            .collect();
        Self {
            slots: RwLock::new(slots),
        }
    }

    /// Atomically check and reserve every line of `request`.
    ///
    /// Locks are taken in canonical order, every line is validated in request
    /// order, and only then is any record decremented. On failure nothing is
    /// mutated and the first failing line is reported.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::NotFound`] if a key names no resource
    /// - [`ReservationError::InsufficientQuantity`] if a resource holds less
    ///   than its line asks for
    pub fn check_and_reserve(&self, request: &ReservationRequest) -> Result<(), ReservationError> {
        let mut held = self.lock_in_order(request.lock_order());

        for line in request.lines() {
            match held.slot(&line.key).available {
                None => {
                    debug!(key = %line.key, "reservation rejected: unknown resource");
                    return Err(ReservationError::NotFound(line.key.clone()));
                }
                Some(available) if available < line.quantity => {
                    debug!(
                        key = %line.key,
                        requested = line.quantity,
                        available,
                        "reservation rejected: insufficient quantity"
                    );
                    return Err(ReservationError::InsufficientQuantity {
                        key: line.key.clone(),
                        requested: line.quantity,
                        available,
                    });
                }
                Some(_) => {}
            }
        }

        for line in request.lines() {
            if let Some(available) = held.slot_mut(&line.key).available.as_mut() {
                *available -= line.quantity;
            }
            debug!(key = %line.key, quantity = line.quantity, "reserved");
        }
        Ok(())
    }

    /// Return previously reserved quantities, under the same lock protocol.
    ///
    /// # Errors
    ///
    /// [`ReservationError::NotFound`] if any key names no resource; nothing is
    /// returned in that case.
    pub fn release(&self, request: &ReservationRequest) -> Result<(), ReservationError> {
        let mut held = self.lock_in_order(request.lock_order());

        if let Some(line) = request
            .lines()
            .iter()
            .find(|line| held.slot(&line.key).available.is_none())
        {
            warn!(key = %line.key, "release of unknown resource");
            return Err(ReservationError::NotFound(line.key.clone()));
        }

        for line in request.lines() {
            if let Some(available) = held.slot_mut(&line.key).available.as_mut() {
                *available = available.saturating_add(line.quantity);
            }
            debug!(key = %line.key, quantity = line.quantity, "released");
        }
        Ok(())
    }

    /// Add stock to a resource, creating its record if needed. Returns the
    /// new quantity.
    pub fn restock(&self, key: &str, quantity: u64) -> u64 {
        let slot = self.slot(key);
        let mut slot = slot.lock();
        let updated = slot.available.unwrap_or(0).saturating_add(quantity);
        slot.available = Some(updated);
        debug!(key, quantity, available = updated, "restocked");
        updated
    }

    /// Point-in-time quantity for `key`, read under the key's lock. Unknown
    /// keys read as 0.
    #[must_use]
    pub fn get_quantity(&self, key: &str) -> u64 {
        let Some(slot) = self.slots.read().get(key).cloned() else {
            return 0;
        };
        let available = slot.lock().available;
        available.unwrap_or(0)
    }

    /// Consistent view of every record, taken with all key locks held.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<ResourceKey, u64> {
        let keys: BTreeSet<ResourceKey> = self.slots.read().keys().cloned().collect();
        let held = self.lock_in_order(keys.iter().map(String::as_str));
        held.guards
            .iter()
            .filter_map(|(key, slot)| slot.available.map(|q| ((*key).to_string(), q)))
            .collect()
    }

    /// Number of known resources.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.read().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().available.is_some()).count()
    }

    /// True when no resource is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock table entry for `key`, created on first reference.
    fn slot(&self, key: &str) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(key.to_owned()).or_default())
    }

    /// Acquire the locks for `keys`, which must already be sorted and
    /// distinct. The table lock is released before any key lock is awaited.
    fn lock_in_order<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> HeldLocks<'k> {
        let slots: Vec<(&str, Arc<Mutex<Slot>>)> =
            keys.into_iter().map(|key| (key, self.slot(key))).collect();
        debug_assert!(slots.windows(2).all(|pair| pair[0].0 < pair[1].0));

        let guards = slots
            .into_iter()
            .map(|(key, slot)| (key, slot.lock_arc()))
            .collect();
        HeldLocks { guards }
    }
}
