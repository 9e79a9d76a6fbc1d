//! Object store client used by the reconciler.
//!
//! The cluster API server is an external collaborator; [`ObjectStore`] is the seam
//! and [`MemoryStore`] an in-process implementation with the same optimistic
//! concurrency rules.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;

use super::resource::{NamespacedName, Object};

/// Errors returned by an [`ObjectStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(NamespacedName),

    #[error("{0} already exists")]
    AlreadyExists(NamespacedName),

    #[error("conflict updating {0}: the object has been modified")]
    Conflict(NamespacedName),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Get/create/update access to objects of one kind.
#[async_trait]
pub trait ObjectStore<T: Object>: Send + Sync {
    async fn get(&self, key: &NamespacedName) -> Result<T, StoreError>;

    /// Creates `object`. Fails with [`StoreError::AlreadyExists`] if the key is taken.
    async fn create(&self, object: &T) -> Result<T, StoreError>;

    /// Replaces an existing object. The resource version must match the stored one.
    async fn update(&self, object: &T) -> Result<T, StoreError>;
}

/// Store operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Update,
}

#[derive(Debug)]
struct StoreState<T> {
    objects: BTreeMap<NamespacedName, T>,
    failures: HashMap<(StoreOp, String), String>,
    next_version: u64,
}

/// In-memory [`ObjectStore`].
///
/// Each write assigns a new resource version from a store-wide counter, so
/// versions are unique across objects and strictly increasing.
#[derive(Debug)]
pub struct MemoryStore<T> {
    state: Mutex<StoreState<T>>,
}

impl<T: Object> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Object> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                objects: BTreeMap::new(),
                failures: HashMap::new(),
                next_version: 1,
            }),
        }
    }

    /// Makes `op` on objects named `name` fail with a backend error.
    pub fn fail_on(&self, op: StoreOp, name: impl Into<String>, message: impl Into<String>) {
        self.lock()
            .failures
            .insert((op, name.into()), message.into());
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Inserts `object` directly, assigning it a resource version.
    pub fn insert(&self, mut object: T) -> T {
        let mut state = self.lock();
        let version = state.bump();
        object.metadata_mut().resource_version = Some(version);
        state.objects.insert(object.key(), object.clone());
        object
    }

    /// Every stored object, ordered by key.
    pub fn list(&self) -> Vec<T> {
        self.lock().objects.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> StoreState<T> {
    fn bump(&mut self) -> String {
        let version = self.next_version;
        self.next_version += 1;
        version.to_string()
    }

    fn injected(&self, op: StoreOp, key: &NamespacedName) -> Result<(), StoreError> {
        match self.failures.get(&(op, key.name.clone())) {
            Some(message) => Err(StoreError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<T: Object> ObjectStore<T> for MemoryStore<T> {
    async fn get(&self, key: &NamespacedName) -> Result<T, StoreError> {
        let state = self.lock();
        state.injected(StoreOp::Get, key)?;
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn create(&self, object: &T) -> Result<T, StoreError> {
        let key = object.key();
        let mut state = self.lock();
        state.injected(StoreOp::Create, &key)?;
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }

        let mut created = object.clone();
        created.metadata_mut().resource_version = Some(state.bump());
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, object: &T) -> Result<T, StoreError> {
        let key = object.key();
        let mut state = self.lock();
        state.injected(StoreOp::Update, &key)?;
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if current.metadata().resource_version != object.metadata().resource_version {
            return Err(StoreError::Conflict(key));
        }

        let mut updated = object.clone();
        updated.metadata_mut().resource_version = Some(state.bump());
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }
}
