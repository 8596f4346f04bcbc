//! Registry of live sandboxes and per-sandbox exec serialization.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::{OwnedMutexGuard, RwLock};

use crate::{
    error::{Result, SandboxError},
    sandbox::Sandbox,
};


/// Name to handle map shared by all façades.
///
/// Readers run concurrently; writers hold the lock only for the map update,
/// never across a cluster call.
#[derive(Default)]
pub struct SandboxRegistry {
    sandboxes: RwLock<HashMap<String, Sandbox>>,
    /// Names whose creation is in flight. Only touched while `sandboxes` is
    /// write-locked, except for release, which needs no await.
    pending: Mutex<HashSet<String>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle under its name. Fails if the name is live or being
    /// created.
    pub async fn add(&self, sandbox: Sandbox) -> Result<()> {
        let mut sandboxes = self.sandboxes.write().await;
        let name = sandbox.name();
        if sandboxes.contains_key(name) || self.pending().contains(name) {
            return Err(SandboxError::AlreadyExists(name.to_string()));
        }
        sandboxes.insert(name.to_string(), sandbox);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Sandbox> {
        self.sandboxes.read().await.get(name).cloned()
    }

    pub async fn remove(&self, name: &str) -> Option<Sandbox> {
        self.sandboxes.write().await.remove(name)
    }

    /// Remove `sandbox` only if it is the handle registered under its name.
    pub(crate) async fn remove_handle(&self, sandbox: &Sandbox) -> bool {
        let mut sandboxes = self.sandboxes.write().await;
        match sandboxes.get(sandbox.name()) {
            Some(current) if current.ptr_eq(sandbox) => {
                sandboxes.remove(sandbox.name());
                true
            },
            _ => false,
        }
    }

    /// Point-in-time snapshot, sorted by name.
    pub async fn list(&self) -> Vec<Sandbox> {
        let mut sandboxes: Vec<Sandbox> =
            self.sandboxes.read().await.values().cloned().collect();
        sandboxes.sort_by(|a, b| a.name().cmp(b.name()));
        sandboxes
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.sandboxes.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.sandboxes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `name` for a creation in progress.
    pub(crate) async fn reserve(&self, name: &str) -> Result<()> {
        let sandboxes = self.sandboxes.write().await;
        if sandboxes.contains_key(name) || !self.pending().insert(name.to_string()) {
            return Err(SandboxError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Turn a reservation into a registered handle.
    pub(crate) async fn commit(&self, sandbox: Sandbox) {
        let mut sandboxes = self.sandboxes.write().await;
        self.pending().remove(sandbox.name());
        sandboxes.insert(sandbox.name().to_string(), sandbox);
    }

    pub(crate) fn release(&self, name: &str) {
        self.pending().remove(name);
    }
}

/// One async mutex per pod, held for the duration of a single run or exec.
#[derive(Default)]
pub struct ExecLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExecLocks {
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    pub fn forget(&self, key: &str) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
