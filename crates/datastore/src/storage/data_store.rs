use std::future::Future;

use async_trait::async_trait;

use super::stream::ValueStream;
use crate::errors::StoreError;

/// Common contract of every store: observe the committed value, replace it
/// atomically.
#[async_trait]
pub trait DataStore<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Stream of committed values, starting with the one current at the time
    /// of the first poll.
    fn data(&self) -> ValueStream<T>;

    /// Apply `transform` to the latest committed value and commit its result.
    ///
    /// Updates on one store run one at a time in arrival order. Returns the
    /// value that is committed once this call completes.
    async fn update_data<F, Fut>(&self, transform: F) -> Result<T, StoreError>
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static;

    /// Synchronous variant of [`DataStore::update_data`].
    async fn update<F>(&self, transform: F) -> Result<T, StoreError>
    where
        F: FnOnce(T) -> T + Send + 'static,
    {
        self.update_data(move |current| async move { Ok::<T, anyhow::Error>(transform(current)) }).await
    }
}
