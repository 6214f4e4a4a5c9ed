//! Explicit contract-field cache.
//!
//! Entries are keyed by `(contract address, field name)` and carry a scope:
//! [`Scope::Static`] values (token decimals, pool tokens) live for the whole
//! session, [`Scope::Block`] values are only valid at one height. Reading or
//! writing at a different height drops every block-scoped entry, so a reader
//! pinned to one block can never observe a value fetched at another.

use std::{collections::HashMap, future::Future, sync::Mutex};

use alloy::primitives::Address;

use crate::error::Result;

/// Lifetime of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Immutable for a deployed contract.
    Static,
    /// Valid at this block height only.
    Block(u64),
}

type Key = (Address, &'static str);

#[derive(Debug)]
struct Entries<V> {
    height: Option<u64>,
    statics: HashMap<Key, V>,
    pinned: HashMap<Key, V>,
}

impl<V> Entries<V> {
    fn repin(&mut self, block: u64) {
        if self.height != Some(block) {
            self.pinned.clear();
            self.height = Some(block);
        }
    }
}

/// Thread-safe cache of contract fields.
#[derive(Debug)]
pub struct FieldCache<V> {
    entries: Mutex<Entries<V>>,
}

impl<V> Default for FieldCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                height: None,
                statics: HashMap::new(),
                pinned: HashMap::new(),
            }),
        }
    }
}

impl<V> FieldCache<V>
where
    V: Clone,
{
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value, if any.
    pub fn get(&self, address: Address, field: &'static str, scope: Scope) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        match scope {
            Scope::Static => entries.statics.get(&(address, field)).cloned(),
            Scope::Block(block) => {
                entries.repin(block);
                entries.pinned.get(&(address, field)).cloned()
            }
        }
    }

    /// Stores a value.
    pub fn insert(&self, address: Address, field: &'static str, scope: Scope, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        match scope {
            Scope::Static => {
                entries.statics.insert((address, field), value);
            }
            Scope::Block(block) => {
                entries.repin(block);
                entries.pinned.insert((address, field), value);
            }
        }
    }

    /// Drops every block-scoped entry.
    pub fn invalidate(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        entries.pinned.clear();
        entries.height = None;
    }

    /// Returns the cached value or fetches and stores it.
    ///
    /// The lock is not held while `fetch` runs; concurrent misses may both
    /// fetch, the last write wins.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        address: Address,
        field: &'static str,
        scope: Scope,
        fetch: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(address, field, scope) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(address, field, scope, value.clone());
        Ok(value)
    }
}
