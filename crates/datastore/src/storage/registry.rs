use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use once_cell::sync::Lazy;

use crate::errors::StoreError;

static GLOBAL: Lazy<StoreRegistry> = Lazy::new(StoreRegistry::new);

/// Process-local table of open stores keyed by backing file.
///
/// Every handle opened on the same file shares one state (one commit lock,
/// one committed value, one set of observers). Entries are weak, so a store
/// is torn down once its last handle is dropped.
pub struct StoreRegistry {
    open: Mutex<HashMap<PathBuf, Weak<dyn Any + Send + Sync>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        StoreRegistry { open: Mutex::new(HashMap::new()) }
    }

    pub fn global() -> &'static StoreRegistry {
        &GLOBAL
    }

    /// Return the live state registered for `path`, or register the one built
    /// by `create`. Fails when the live state has a different type.
    pub fn get_or_open<S, F>(&self, path: &Path, create: F) -> Result<Arc<S>, StoreError>
    where
        S: Send + Sync + 'static,
        F: FnOnce() -> S,
    {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        open.retain(|_, state| state.strong_count() > 0);

        if let Some(existing) = open.get(path).and_then(Weak::upgrade) {
            return existing
                .downcast::<S>()
                .map_err(|_| StoreError::Conflict(path.to_path_buf()));
        }

        let state = Arc::new(create());
        let erased: Arc<dyn Any + Send + Sync> = state.clone();
        open.insert(path.to_path_buf(), Arc::downgrade(&erased));
        Ok(state)
    }

    /// Number of stores with at least one live handle.
    pub fn open_count(&self) -> usize {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        open.values().filter(|state| state.strong_count() > 0).count()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
