//! Per-user eligibility result cache keyed by `(user, catalog version)`.
//!
//! Each user owns one slot carrying a generation. Invalidation bumps the generation and drops
//! the cached value; a `put` is only accepted when the caller presents the generation it saw
//! before reading the profile. A result computed from a pre-mutation profile can therefore
//! never be stored after the mutation was acknowledged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::catalog::CatalogVersion;
use super::domain::{SchemeId, UserId};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Eligible scheme ids computed for one user against one catalog version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedEligibility {
    pub catalog_version: CatalogVersion,
    pub scheme_ids: Vec<SchemeId>,
    pub computed_at: DateTime<Utc>,
}

/// Result of a cache read. Misses carry the generation a later `put` must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Fresh(CachedEligibility),
    Stale { generation: u64 },
    Absent { generation: u64 },
}

/// Observable state of a user's entry for a given catalog version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Fresh,
    Stale,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
}

/// Cache seam injected into the eligibility service.
pub trait EligibilityCache: Send + Sync {
    fn get(&self, user_id: &UserId, version: CatalogVersion) -> CacheLookup;
    /// Store a computed result; returns `false` when the slot moved on since `generation`.
    fn put(&self, user_id: &UserId, generation: u64, value: CachedEligibility) -> bool;
    fn invalidate(&self, user_id: &UserId);
    fn invalidate_all(&self);
    fn state(&self, user_id: &UserId, version: CatalogVersion) -> EntryState;
    fn stats(&self) -> CacheStats;
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    // `None` once invalidated; the slot itself stays so the generation is remembered.
    entry: Option<Entry>,
}

#[derive(Debug)]
struct Entry {
    value: CachedEligibility,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct Slots {
    by_user: HashMap<UserId, Slot>,
    clock: u64,
    // Generation handed to readers with no slot; raised whenever slots are dropped.
    floor: u64,
}

impl Slots {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[derive(Debug)]
pub struct InMemoryEligibilityCache {
    ttl: Duration,
    slots: Mutex<Slots>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for InMemoryEligibilityCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl InMemoryEligibilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(Slots::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop expired values and value-less slots to bound memory.
    pub fn purge_expired(&self) -> usize {
        let mut slots = self.lock();
        let ttl = self.ttl;
        let before = slots.by_user.len();
        slots.by_user.retain(|_, slot| {
            slot.entry
                .as_ref()
                .is_some_and(|entry| entry.stored_at.elapsed() < ttl)
        });
        let removed = before - slots.by_user.len();
        if removed > 0 {
            let tick = slots.tick();
            slots.floor = tick;
        }
        removed
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn classify(
        &self,
        slots: &mut Slots,
        user_id: &UserId,
        version: CatalogVersion,
    ) -> CacheLookup {
        let floor = slots.floor;
        let Some(slot) = slots.by_user.get_mut(user_id) else {
            return CacheLookup::Absent { generation: floor };
        };

        let expired = slot
            .entry
            .as_ref()
            .is_some_and(|entry| entry.stored_at.elapsed() >= self.ttl);
        if expired {
            slot.entry = None;
            return CacheLookup::Absent {
                generation: slot.generation,
            };
        }

        match &slot.entry {
            Some(entry) if entry.value.catalog_version == version => {
                CacheLookup::Fresh(entry.value.clone())
            }
            _ => CacheLookup::Stale {
                generation: slot.generation,
            },
        }
    }
}

impl EligibilityCache for InMemoryEligibilityCache {
    fn get(&self, user_id: &UserId, version: CatalogVersion) -> CacheLookup {
        let lookup = {
            let mut slots = self.lock();
            self.classify(&mut slots, user_id, version)
        };

        if matches!(lookup, CacheLookup::Fresh(_)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        lookup
    }

    fn put(&self, user_id: &UserId, generation: u64, value: CachedEligibility) -> bool {
        let mut slots = self.lock();
        let floor = slots.floor;
        let entry = Entry {
            value,
            stored_at: Instant::now(),
        };

        match slots.by_user.get_mut(user_id) {
            Some(slot) if slot.generation == generation => {
                slot.entry = Some(entry);
                true
            }
            None if generation == floor => {
                slots.by_user.insert(
                    user_id.clone(),
                    Slot {
                        generation,
                        entry: Some(entry),
                    },
                );
                true
            }
            _ => {
                debug!(%user_id, generation, "discarding eligibility computed before invalidation");
                false
            }
        }
    }

    fn invalidate(&self, user_id: &UserId) {
        let mut slots = self.lock();
        let generation = slots.tick();
        let slot = slots.by_user.entry(user_id.clone()).or_insert(Slot {
            generation,
            entry: None,
        });
        slot.generation = generation;
        slot.entry = None;
        debug!(%user_id, generation, "eligibility cache entry invalidated");
    }

    fn invalidate_all(&self) {
        let mut slots = self.lock();
        let generation = slots.tick();
        for slot in slots.by_user.values_mut() {
            slot.generation = generation;
            slot.entry = None;
        }
        slots.floor = generation;
        debug!(generation, "eligibility cache invalidated for all users");
    }

    fn state(&self, user_id: &UserId, version: CatalogVersion) -> EntryState {
        let mut slots = self.lock();
        match self.classify(&mut slots, user_id, version) {
            CacheLookup::Fresh(_) => EntryState::Fresh,
            CacheLookup::Stale { .. } => EntryState::Stale,
            CacheLookup::Absent { .. } => EntryState::Absent,
        }
    }

    fn stats(&self) -> CacheStats {
        let entries = self
            .lock()
            .by_user
            .values()
            .filter(|slot| slot.entry.is_some())
            .count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
            entries,
        }
    }
}
