use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::keys::{Key, PreferenceType, Preferences};
use crate::errors::StoreError;
use crate::storage::{CorruptionPolicy, DataStore, FileStore, Serializer, SerializerError, ValueStream};

/// Preferences persisted as a JSON object of tagged values.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferencesSerializer;

impl Serializer<Preferences> for PreferencesSerializer {
    fn default_value(&self) -> Preferences {
        Preferences::new()
    }

    fn read_from(&self, bytes: &[u8]) -> Result<Preferences, SerializerError> {
        serde_json::from_slice(bytes).map_err(|e| SerializerError::new(e.to_string()))
    }

    fn write_to(&self, value: &Preferences, out: &mut Vec<u8>) -> Result<(), SerializerError> {
        serde_json::to_writer(out, value).map_err(|e| SerializerError::new(e.to_string()))
    }
}

/// File-backed key-value store.
/// A corrupt or unreadable file degrades to an empty set of preferences.
#[derive(Clone)]
pub struct PreferenceStore {
    store: FileStore<Preferences, PreferencesSerializer>,
}

impl PreferenceStore {
    /// Open the store backed by `path`.
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_policy(path, CorruptionPolicy::ReplaceWithDefault).await
    }

    /// Open the store named `name` inside `dir` (`<dir>/<name>.preferences.json`).
    pub async fn open_named(dir: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        Self::open(dir.as_ref().join(format!("{name}.preferences.json"))).await
    }

    pub async fn open_with_policy<P: Into<PathBuf>>(
        path: P,
        corruption: CorruptionPolicy,
    ) -> Result<Self, StoreError> {
        let store = FileStore::open(path, PreferencesSerializer, corruption).await?;
        Ok(Self { store })
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Mutate a copy of the current preferences and commit it.
    pub async fn edit<F>(&self, edit: F) -> Result<Preferences, StoreError>
    where
        F: FnOnce(&mut Preferences) + Send + 'static,
    {
        self.store
            .update(move |mut prefs| {
                edit(&mut prefs);
                prefs
            })
            .await
    }

    /// Current value under `key`.
    pub async fn get<T: PreferenceType>(&self, key: &Key<T>) -> Result<Option<T>, StoreError> {
        let prefs = self.store.data().first().await?;
        Ok(prefs.get(key))
    }
}

#[async_trait]
impl DataStore<Preferences> for PreferenceStore {
    fn data(&self) -> ValueStream<Preferences> {
        self.store.data()
    }

    async fn update_data<F, Fut>(&self, transform: F) -> Result<Preferences, StoreError>
    where
        F: FnOnce(Preferences) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Preferences>> + Send + 'static,
    {
        self.store.update_data(transform).await
    }
}
