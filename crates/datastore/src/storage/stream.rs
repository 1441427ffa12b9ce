use std::marker::PhantomData;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::trace;

use crate::errors::StoreError;

/// Something a [`ValueStream`] can subscribe to. Loading is deferred until
/// the first subscription.
#[async_trait]
pub(crate) trait ValueSource<T>: Send + Sync {
    async fn subscribe(&self) -> Result<watch::Receiver<T>, StoreError>;
}

/// Lazy, restartable stream of committed values.
///
/// Nothing is read until the first call to [`ValueStream::next`], which yields
/// the value committed at that moment. Later calls wait for the next commit.
/// Commits that land between two polls are conflated: the stream always
/// jumps to the newest value and never goes back to an older one.
///
/// Dropping the stream (or calling [`ValueStream::close`]) unsubscribes.
pub struct ValueStream<T> {
    source: Arc<dyn ValueSource<T>>,
    receiver: Option<watch::Receiver<T>>,
}

impl<T> ValueStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(source: Arc<dyn ValueSource<T>>) -> Self {
        Self { source, receiver: None }
    }

    /// Next committed value.
    pub async fn next(&mut self) -> Result<T, StoreError> {
        if let Some(receiver) = self.receiver.as_mut() {
            receiver.changed().await.map_err(|_| StoreError::Closed)?;
            return Ok(receiver.borrow_and_update().clone());
        }
        let mut receiver = self.source.subscribe().await?;
        let current = receiver.borrow_and_update().clone();
        self.receiver = Some(receiver);
        Ok(current)
    }

    /// Current value, then unsubscribe.
    pub async fn first(mut self) -> Result<T, StoreError> {
        self.next().await
    }

    /// Block the calling thread until the stream yields its first value or
    /// `timeout` elapses.
    ///
    /// The read runs on `handle`; the calling thread only waits on a one-shot
    /// channel. Must not be called from a current-thread runtime's own thread.
    pub fn first_blocking(self, handle: &Handle, timeout: Duration) -> Result<T, StoreError> {
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let task = handle.spawn(async move {
            let _ = done_tx.send(self.first().await);
        });
        match done_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                task.abort();
                Err(StoreError::Timeout(timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(StoreError::Closed),
        }
    }

    /// Project every value through `f`.
    pub fn map<U, F>(self, f: F) -> MappedStream<T, U, F>
    where
        F: FnMut(T) -> U,
    {
        MappedStream { inner: self, f, _out: PhantomData }
    }

    /// Explicit unsubscribe; same as dropping the stream.
    pub fn close(self) {
        trace!(subscribed = self.receiver.is_some(), "value stream closed");
    }
}

/// A [`ValueStream`] with a projection applied to each item.
pub struct MappedStream<T, U, F> {
    inner: ValueStream<T>,
    f: F,
    _out: PhantomData<fn() -> U>,
}

impl<T, U, F> MappedStream<T, U, F>
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(T) -> U,
{
    pub async fn next(&mut self) -> Result<U, StoreError> {
        let value = self.inner.next().await?;
        Ok((self.f)(value))
    }

    pub async fn first(mut self) -> Result<U, StoreError> {
        self.next().await
    }

    pub fn close(self) {
        self.inner.close();
    }
}
