//! Per-key markup cache.
//!
//! Every key gets its own slot. A slot's build lock makes concurrent first
//! requests for one key run a single load; requests for other keys are not
//! blocked by it.

use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::{
    error::MarkletResult,
    markup::{Markup, MarkupKey},
};

/// What the cache knows about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Found(Markup),
    /// The key was looked up and no template exists for it.
    Missing,
}

impl CacheEntry {
    pub const fn markup(&self) -> Option<&Markup> {
        match self {
            Self::Found(markup) => Some(markup),
            Self::Missing => None,
        }
    }

    pub fn into_markup(self) -> Option<Markup> {
        match self {
            Self::Found(markup) => Some(markup),
            Self::Missing => None,
        }
    }
}

/// Storage for parsed markup, shared between threads.
pub trait MarkupStore: Send + Sync {
    fn get(&self, key: &MarkupKey) -> Option<CacheEntry>;

    /// Stores `entry` unless `key` already has one, and returns whichever
    /// entry the store holds afterwards.
    fn put(&self, key: MarkupKey, entry: CacheEntry) -> CacheEntry;

    /// Drops `key`, returning whether it was stored.
    fn invalidate(&self, key: &MarkupKey) -> bool;
}

#[derive(Debug, Default)]
struct Slot {
    entry: RwLock<Option<CacheEntry>>,
    build: Mutex<()>,
}

impl Slot {
    fn entry(&self) -> Option<CacheEntry> {
        self.entry.read().clone()
    }

    fn base(&self) -> Option<MarkupKey> {
        self.entry
            .read()
            .as_ref()
            .and_then(CacheEntry::markup)
            .and_then(Markup::base_key)
            .cloned()
    }
}

#[derive(Debug, Default)]
pub struct MarkupCache {
    slots: RwLock<HashMap<MarkupKey, Arc<Slot>>>,
}

impl MarkupCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &MarkupKey) -> Arc<Slot> {
        let existing = self.slots.read().get(key).map(Arc::clone);
        if let Some(slot) = existing {
            return slot;
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Returns the entry for `key`, running `load` to create it if needed.
    ///
    /// Concurrent callers for the same key wait for the first one's load
    /// rather than running their own. A load that fails stores nothing, so
    /// the next request tries again.
    ///
    /// `load` must not request `key` itself.
    pub fn get_or_load<F>(&self, key: &MarkupKey, load: F) -> MarkletResult<CacheEntry>
    where
        F: FnOnce() -> MarkletResult<CacheEntry>,
    {
        let slot = self.slot(key);
        if let Some(entry) = slot.entry() {
            return Ok(entry);
        }

        let _build = slot.build.lock();
        // Someone else may have finished loading while we waited.
        if let Some(entry) = slot.entry() {
            return Ok(entry);
        }

        debug!(%key, "loading markup");
        let entry = load()?;
        *slot.entry.write() = Some(entry.clone());
        Ok(entry)
    }

    /// Removes `key` and, transitively, every markup derived from it.
    ///
    /// Handles to removed markup stay valid.
    pub fn remove(&self, key: &MarkupKey) -> bool {
        let mut slots = self.slots.write();
        let removed = slots
            .remove(key)
            .is_some_and(|slot| slot.entry().is_some());

        let mut gone = vec![key.clone()];
        while let Some(base) = gone.pop() {
            let derived: Vec<MarkupKey> = slots
                .iter()
                .filter(|(_, slot)| slot.base().as_ref() == Some(&base))
                .map(|(derived, _)| derived.clone())
                .collect();
            for derived in derived {
                debug!(key = %derived, %base, "evicting derived markup");
                slots.remove(&derived);
                gone.push(derived);
            }
        }

        if removed {
            debug!(%key, "markup removed");
        }
        removed
    }

    /// Whether an entry, found or missing, is stored for `key`.
    pub fn contains(&self, key: &MarkupKey) -> bool {
        self.slots
            .read()
            .get(key)
            .is_some_and(|slot| slot.entry().is_some())
    }

    /// Number of keys with a stored entry.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.entry().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.write().clear();
        debug!("markup cache cleared");
    }
}

impl MarkupStore for MarkupCache {
    fn get(&self, key: &MarkupKey) -> Option<CacheEntry> {
        let slot = self.slots.read().get(key).map(Arc::clone)?;
        slot.entry()
    }

    fn put(&self, key: MarkupKey, entry: CacheEntry) -> CacheEntry {
        let slot = self.slot(&key);
        let mut stored = slot.entry.write();
        stored.get_or_insert(entry).clone()
    }

    fn invalidate(&self, key: &MarkupKey) -> bool {
        self.remove(key)
    }
}
