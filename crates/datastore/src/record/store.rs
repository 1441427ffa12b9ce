use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use prost::Message;

use super::serializer::ProtoSerializer;
use crate::errors::StoreError;
use crate::storage::{CorruptionPolicy, DataStore, FileStore, ValueStream};

/// File-backed store for one Protocol Buffers record.
///
/// Unlike [`PreferenceStore`](crate::preferences::PreferenceStore), a
/// non-empty file that fails to decode is reported as
/// [`StoreError::Corruption`] instead of being replaced by the default.
pub struct RecordStore<M> {
    store: FileStore<M, ProtoSerializer<M>>,
}

impl<M> Clone for RecordStore<M> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<M> RecordStore<M>
where
    M: Message + Default + Clone + PartialEq + 'static,
{
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_policy(path, CorruptionPolicy::Fail).await
    }

    pub async fn open_with_policy<P: Into<PathBuf>>(
        path: P,
        corruption: CorruptionPolicy,
    ) -> Result<Self, StoreError> {
        let store = FileStore::open(path, ProtoSerializer::new(), corruption).await?;
        Ok(Self { store })
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }
}

#[async_trait]
impl<M> DataStore<M> for RecordStore<M>
where
    M: Message + Default + Clone + PartialEq + 'static,
{
    fn data(&self) -> ValueStream<M> {
        self.store.data()
    }

    async fn update_data<F, Fut>(&self, transform: F) -> Result<M, StoreError>
    where
        F: FnOnce(M) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<M>> + Send + 'static,
    {
        self.store.update_data(transform).await
    }
}
