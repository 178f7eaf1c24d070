//! Per-category connection registries.
//!
//! Each category has its own lock, held only for insert/remove/snapshot.
//! Sealing a category (at shutdown) snapshots it and refuses later inserts,
//! so a connection accepted after the snapshot is closed by its own worker
//! instead of being missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::net::connection::{Category, Connection, ConnectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} registry is sealed for shutdown")]
pub struct RegistrySealed(pub Category);

#[derive(Default)]
struct CategoryState {
    conns: HashMap<ConnectionId, Arc<Connection>>,
    sealed: bool,
}

#[derive(Default)]
struct CategoryRegistry {
    state: Mutex<CategoryState>,
}

impl CategoryRegistry {
    fn lock(&self) -> MutexGuard<'_, CategoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live connections of every category.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: CategoryRegistry,
    routes: CategoryRegistry,
    gateways: CategoryRegistry,
    leafs: CategoryRegistry,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, category: Category) -> &CategoryRegistry {
        match category {
            Category::Client => &self.clients,
            Category::Route => &self.routes,
            Category::Gateway => &self.gateways,
            Category::Leaf => &self.leafs,
        }
    }

    /// Register a connection under its own category.
    pub fn insert(&self, conn: Arc<Connection>) -> Result<(), RegistrySealed> {
        let category = conn.category();
        let mut state = self.slot(category).lock();
        if state.sealed {
            return Err(RegistrySealed(category));
        }
        state.conns.insert(conn.id(), conn);
        Ok(())
    }

    /// Remove a connection. Allowed after sealing.
    pub fn remove(&self, conn: &Connection) -> bool {
        self.slot(conn.category())
            .lock()
            .conns
            .remove(&conn.id())
            .is_some()
    }

    pub fn get(&self, category: Category, id: ConnectionId) -> Option<Arc<Connection>> {
        self.slot(category).lock().conns.get(&id).cloned()
    }

    pub fn len(&self, category: Category) -> usize {
        self.slot(category).lock().conns.len()
    }

    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|c| self.len(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Connections currently registered under `category`.
    pub fn connections(&self, category: Category) -> Vec<Arc<Connection>> {
        self.slot(category).lock().conns.values().cloned().collect()
    }

    /// Seal every category and return everything registered at that point.
    pub fn seal_and_snapshot(&self) -> Vec<Arc<Connection>> {
        let mut snapshot = Vec::new();
        for category in Category::ALL {
            let mut state = self.slot(category).lock();
            state.sealed = true;
            snapshot.extend(state.conns.values().cloned());
        }
        snapshot
    }

    pub fn is_sealed(&self) -> bool {
        Category::ALL.iter().all(|c| self.slot(*c).lock().sealed)
    }
}
