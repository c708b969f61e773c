// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Storage of decided values.
use fnv::FnvHashMap;
use log::debug;
use std::sync::{Mutex, PoisonError};

/// The map each node applies decided writes to.
///
/// Every mutating method returns the value previously associated with the key, if any.
pub trait Store: Send + Sync + 'static {
    /// Returns the value associated with `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Associate `value` with `key`.
    fn put(&self, key: &str, value: String) -> Option<String>;

    /// Remove `key`.
    fn delete(&self, key: &str) -> Option<String>;
}

/// A [Store] that lives in memory.
#[derive(Debug, Default)]
pub struct MemStore {
    map: Mutex<FnvHashMap<String, String>>,
}

impl MemStore {
    fn map(&self) -> std::sync::MutexGuard<'_, FnvHashMap<String, String>> {
        // a panic while holding the lock can't leave the map half-updated
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of keys stored.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Returns true if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) -> Option<String> {
        debug!("[key]{} added/updated", key);
        self.map().insert(key.to_owned(), value)
    }

    fn delete(&self, key: &str) -> Option<String> {
        let prev = self.map().remove(key);
        match prev {
            Some(_) => debug!("[key]{} deleted", key),
            None => debug!("[key]{} not found", key),
        }
        prev
    }
}
