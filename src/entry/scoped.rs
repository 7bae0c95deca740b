use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Type-erased store for values scoped to one nav entry or one controller.
/// Values are keyed by [`TypeId`], so each type appears once per scope; they
/// are created once and dropped when the owning scope closes. Handles are
/// cheap clones over the same backing map.
#[derive(Clone, Default)]
pub struct ScopedStore {
    inner: Arc<RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

impl ScopedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_arc<T>(&self, value: Arc<T>) -> Result<(), ScopedError>
    where
        T: Send + Sync + 'static,
    {
        let mut guard = self.inner.write().map_err(|_| ScopedError::Poisoned)?;
        let type_id = TypeId::of::<T>();
        if guard.contains_key(&type_id) {
            return Err(ScopedError::Occupied);
        }
        guard.insert(type_id, Box::new(value));
        Ok(())
    }

    pub fn get<T>(&self) -> Result<Arc<T>, ScopedError>
    where
        T: Send + Sync + 'static,
    {
        let guard = self.inner.read().map_err(|_| ScopedError::Poisoned)?;
        let boxed = guard.get(&TypeId::of::<T>()).ok_or(ScopedError::Missing)?;
        boxed
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or(ScopedError::TypeMismatch)
    }

    /// Fetch the scoped value, creating it on first access. This is the
    /// "created once per scope" guarantee screens rely on.
    pub fn get_or_insert_with<T, F>(&self, make: F) -> Result<Arc<T>, ScopedError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        if let Ok(value) = self.get::<T>() {
            return Ok(value);
        }
        let value = Arc::new(make());
        {
            let mut guard = self.inner.write().map_err(|_| ScopedError::Poisoned)?;
            guard
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Box::new(value.clone()));
        }
        Ok(value)
    }

    /// Drop every value in this scope. Called when the owning entry or
    /// controller closes.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().map(|g| g.is_empty()).unwrap_or(true)
    }
}

#[derive(Debug, Error)]
pub enum ScopedError {
    #[error("scoped value already exists")]
    Occupied,
    #[error("scoped value missing")]
    Missing,
    #[error("scoped value type mismatch")]
    TypeMismatch,
    #[error("scoped store poisoned")]
    Poisoned,
}
