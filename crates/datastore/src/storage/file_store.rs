use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use super::data_store::DataStore;
use super::registry::StoreRegistry;
use super::serializer::Serializer;
use super::stream::{ValueSource, ValueStream};
use crate::errors::StoreError;

/// What a store does when its backing file exists but cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Surface the failure to whoever reads or updates the store.
    #[default]
    Fail,
    /// Log it and carry on from the serializer's default value. The file is
    /// replaced on the next successful update.
    ReplaceWithDefault,
}

/// Generic single-value store persisted to one file.
///
/// Handles are cheap to clone. Handles opened on the same path within one
/// process share their state, see [`StoreRegistry`].
pub struct FileStore<T, S> {
    shared: Arc<Shared<T, S>>,
}

impl<T, S> Clone for FileStore<T, S> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

struct Shared<T, S> {
    path: PathBuf,
    serializer: S,
    corruption: CorruptionPolicy,
    // filled on first access; holds the committed value
    state: OnceCell<watch::Sender<T>>,
    commit: Arc<Mutex<()>>,
}

impl<T, S> FileStore<T, S>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Serializer<T>,
{
    /// Open a handle on `path`. Creates the parent directory if missing but
    /// reads nothing: the file is loaded on first observation or update.
    pub async fn open<P: Into<PathBuf>>(
        path: P,
        serializer: S,
        corruption: CorruptionPolicy,
    ) -> Result<Self, StoreError> {
        let path = normalize(path.into()).await?;
        let shared = StoreRegistry::global().get_or_open(&path, || Shared {
            path: path.clone(),
            serializer,
            corruption,
            state: OnceCell::new(),
            commit: Arc::new(Mutex::new(())),
        })?;
        if shared.corruption != corruption {
            debug!(
                store = %path.display(),
                event = "open_shared",
                policy = ?shared.corruption,
                "store already open; keeping its corruption policy"
            );
        }
        Ok(Self { shared })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn corruption_policy(&self) -> CorruptionPolicy {
        self.shared.corruption
    }

    /// Whether the backing file has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.shared.state.initialized()
    }

    /// Number of live subscriptions across all handles on this file.
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.get().map_or(0, |sender| sender.receiver_count())
    }
}

#[async_trait]
impl<T, S> DataStore<T> for FileStore<T, S>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Serializer<T>,
{
    fn data(&self) -> ValueStream<T> {
        ValueStream::new(Arc::clone(&self.shared) as Arc<dyn ValueSource<T>>)
    }

    async fn update_data<F, Fut>(&self, transform: F) -> Result<T, StoreError>
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let sender = shared.sender().await?;
        let guard = Arc::clone(&shared.commit).lock_owned().await;

        let current = sender.borrow().clone();
        let next = match transform(current.clone()).await {
            Ok(next) => next,
            Err(e) => {
                warn!(store = %shared.path.display(), event = "update_rejected", error = %e, "update function failed; nothing committed");
                return Err(StoreError::UpdateFunction(e));
            }
        };
        if next == current {
            debug!(store = %shared.path.display(), event = "commit_skipped", "value unchanged");
            return Ok(current);
        }

        // Persist and publish on a task of its own so a caller dropping this
        // future cannot leave disk and memory disagreeing.
        let committer = Arc::clone(&shared);
        let commit = tokio::spawn(async move {
            let _guard = guard;
            committer.commit(next).await
        });
        commit.await.map_err(|e| StoreError::Aborted(e.to_string()))?
    }
}

impl<T, S> Shared<T, S>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Serializer<T>,
{
    async fn sender(&self) -> Result<&watch::Sender<T>, StoreError> {
        self.state
            .get_or_try_init(|| async {
                let initial = self.load().await?;
                Ok::<_, StoreError>(watch::channel(initial).0)
            })
            .await
    }

    async fn load(&self) -> Result<T, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(store = %self.path.display(), event = "load_default", "no backing file yet");
                return Ok(self.serializer.default_value());
            }
            Err(e) => {
                return self.recover(StoreError::Read { path: self.path.clone(), source: e });
            }
        };
        if bytes.is_empty() {
            debug!(store = %self.path.display(), event = "load_default", "backing file is empty");
            return Ok(self.serializer.default_value());
        }
        match self.serializer.read_from(&bytes) {
            Ok(value) => {
                debug!(store = %self.path.display(), event = "load", bytes = bytes.len(), "store loaded");
                Ok(value)
            }
            Err(e) => self.recover(StoreError::Corruption {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn recover(&self, err: StoreError) -> Result<T, StoreError> {
        match self.corruption {
            CorruptionPolicy::Fail => {
                error!(store = %self.path.display(), event = "load_failed", error = %err, "cannot load store");
                Err(err)
            }
            CorruptionPolicy::ReplaceWithDefault => {
                warn!(store = %self.path.display(), event = "load_replaced", error = %err, "unreadable store file; using default value");
                Ok(self.serializer.default_value())
            }
        }
    }

    async fn commit(&self, next: T) -> Result<T, StoreError> {
        self.persist(&next).await?;
        if let Some(sender) = self.state.get() {
            sender.send_replace(next.clone());
        }
        info!(store = %self.path.display(), event = "commit", observers = self.state.get().map_or(0, |s| s.receiver_count()), "value committed");
        Ok(next)
    }

    async fn persist(&self, value: &T) -> Result<(), StoreError> {
        let mut bytes = Vec::new();
        if let Err(e) = self.serializer.write_to(value, &mut bytes) {
            warn!(store = %self.path.display(), event = "serialize_failed", error = %e, "value not persisted");
            return Err(StoreError::Serialize { path: self.path.clone(), reason: e.to_string() });
        }

        let scratch = scratch_path(&self.path);
        let written = match write_synced(&scratch, &bytes).await {
            Ok(()) => fs::rename(&scratch, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(source) = written {
            let _ = fs::remove_file(&scratch).await;
            warn!(store = %self.path.display(), event = "write_failed", error = %source, "value not persisted");
            return Err(StoreError::Write { path: self.path.clone(), source });
        }
        if let Err(e) = sync_parent(&self.path).await {
            debug!(store = %self.path.display(), event = "dir_sync_skipped", error = %e, "parent directory not synced");
        }
        Ok(())
    }
}

#[async_trait]
impl<T, S> ValueSource<T> for Shared<T, S>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Serializer<T>,
{
    async fn subscribe(&self) -> Result<watch::Receiver<T>, StoreError> {
        Ok(self.sender().await?.subscribe())
    }
}

/// Absolute path with the parent directory created and canonicalized, so two
/// spellings of one file map to one registry entry.
async fn normalize(path: PathBuf) -> Result<PathBuf, StoreError> {
    let write_err = |source: io::Error| StoreError::Write { path: path.clone(), source };
    let file_name = path
        .file_name()
        .ok_or_else(|| write_err(io::Error::new(io::ErrorKind::InvalidInput, "store path has no file name")))?
        .to_owned();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).await.map_err(write_err)?;
    let parent = fs::canonicalize(&parent).await.map_err(write_err)?;
    Ok(parent.join(file_name))
}

fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// Flush the directory entry created by a rename. Some platforms refuse to
/// open or sync a directory; callers treat failure as non-fatal.
async fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "store path has no parent"))?;
    fs::File::open(parent).await?.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SerializerError;
    use crate::test_support::{cleanup, temp_store_path};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Counter persisted as decimal text.
    struct TextCounter;

    impl Serializer<i64> for TextCounter {
        fn default_value(&self) -> i64 { 0 }

        fn read_from(&self, bytes: &[u8]) -> Result<i64, SerializerError> {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| SerializerError::new("not a decimal counter"))
        }

        fn write_to(&self, value: &i64, out: &mut Vec<u8>) -> Result<(), SerializerError> {
            out.extend_from_slice(value.to_string().as_bytes());
            Ok(())
        }
    }

    /// Writes half of its output, then fails.
    struct TornWriter;

    impl Serializer<i64> for TornWriter {
        fn default_value(&self) -> i64 { 0 }

        fn read_from(&self, bytes: &[u8]) -> Result<i64, SerializerError> {
            TextCounter.read_from(bytes)
        }

        fn write_to(&self, value: &i64, out: &mut Vec<u8>) -> Result<(), SerializerError> {
            let text = value.to_string();
            out.extend_from_slice(&text.as_bytes()[..text.len() / 2]);
            Err(SerializerError::new("disk full"))
        }
    }

    async fn counter_store(path: &Path, policy: CorruptionPolicy) -> Result<FileStore<i64, TextCounter>, StoreError> {
        FileStore::open(path, TextCounter, policy).await
    }

    #[tokio::test]
    async fn absent_file_yields_default_and_is_loaded_lazily() -> anyhow::Result<()> {
        let path = temp_store_path("absent", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        assert!(!store.is_loaded());

        assert_eq!(store.data().first().await?, 0);
        assert!(store.is_loaded());
        assert!(tokio::fs::metadata(&path).await.is_err(), "reading must not create the file");

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn empty_file_yields_default_even_when_strict() -> anyhow::Result<()> {
        let path = temp_store_path("empty", "txt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await?;
        tokio::fs::write(&path, b"").await?;

        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        assert_eq!(store.data().first().await?, 0);

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_follows_policy() -> anyhow::Result<()> {
        let strict_path = temp_store_path("strict", "txt");
        tokio::fs::create_dir_all(strict_path.parent().unwrap()).await?;
        tokio::fs::write(&strict_path, b"garbage").await?;
        let strict = counter_store(&strict_path, CorruptionPolicy::Fail).await?;
        let err = strict.data().first().await.unwrap_err();
        assert!(err.is_corruption());
        // updates hit the same load path
        assert!(strict.update(|v| v + 1).await.unwrap_err().is_corruption());
        assert_eq!(tokio::fs::read(&strict_path).await?, b"garbage");

        let lenient_path = temp_store_path("lenient", "txt");
        tokio::fs::create_dir_all(lenient_path.parent().unwrap()).await?;
        tokio::fs::write(&lenient_path, b"garbage").await?;
        let lenient = counter_store(&lenient_path, CorruptionPolicy::ReplaceWithDefault).await?;
        assert_eq!(lenient.data().first().await?, 0);
        assert_eq!(lenient.update(|v| v + 5).await?, 5);
        assert_eq!(tokio::fs::read_to_string(&lenient_path).await?, "5");

        cleanup(&strict_path).await;
        cleanup(&lenient_path).await;
        Ok(())
    }

    #[tokio::test]
    async fn update_persists_and_survives_reopen() -> anyhow::Result<()> {
        let path = temp_store_path("reopen", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        assert_eq!(store.update(|v| v + 1).await?, 1);
        assert_eq!(store.update(|v| v + 1).await?, 2);
        drop(store);

        let reopened = counter_store(&path, CorruptionPolicy::Fail).await?;
        assert!(!reopened.is_loaded(), "old state must have been torn down");
        assert_eq!(reopened.data().first().await?, 2);
        assert!(tokio::fs::metadata(scratch_path(reopened.path())).await.is_err());

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn torn_write_keeps_previous_value() -> anyhow::Result<()> {
        let path = temp_store_path("torn", "txt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await?;
        tokio::fs::write(&path, b"1234").await?;

        let store = FileStore::<i64, TornWriter>::open(&path, TornWriter, CorruptionPolicy::Fail).await?;
        let mut observer = store.data();
        assert_eq!(observer.next().await?, 1234);

        let err = store.update(|v| v + 1).await.unwrap_err();
        assert!(err.is_write_failure());

        assert_eq!(store.data().first().await?, 1234);
        assert_eq!(tokio::fs::read(&path).await?, b"1234");
        let nothing = tokio::time::timeout(Duration::from_millis(50), observer.next()).await;
        assert!(nothing.is_err(), "observer must not be notified of a failed write");

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn failed_rename_keeps_previous_value() -> anyhow::Result<()> {
        let path = temp_store_path("blocked", "txt");
        // a non-empty directory where the file should go: loads fail, renames fail
        tokio::fs::create_dir_all(path.join("occupied")).await?;

        let store = counter_store(&path, CorruptionPolicy::ReplaceWithDefault).await?;
        assert_eq!(store.data().first().await?, 0);
        let err = store.update(|v| v + 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(store.data().first().await?, 0);
        assert!(tokio::fs::metadata(scratch_path(store.path())).await.is_err(), "scratch file must be cleaned up");

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_file_fails_strict_store() -> anyhow::Result<()> {
        let path = temp_store_path("dir", "txt");
        tokio::fs::create_dir_all(&path).await?;
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        assert!(matches!(store.data().first().await, Err(StoreError::Read { .. })));
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn failing_update_function_commits_nothing() -> anyhow::Result<()> {
        let path = temp_store_path("rejected", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        store.update(|_| 10).await?;

        let err = store
            .update_data(|_| async { Err::<i64, _>(anyhow::anyhow!("refusing")) })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UpdateFunction(_)));
        assert_eq!(store.data().first().await?, 10);
        assert_eq!(tokio::fs::read_to_string(&path).await?, "10");

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn unchanged_value_is_not_written_or_published() -> anyhow::Result<()> {
        let path = temp_store_path("unchanged", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        let mut observer = store.data();
        assert_eq!(observer.next().await?, 0);

        assert_eq!(store.update(|v| v).await?, 0);
        assert!(tokio::fs::metadata(&path).await.is_err());
        let nothing = tokio::time::timeout(Duration::from_millis(50), observer.next()).await;
        assert!(nothing.is_err());

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn handles_on_same_file_share_state() -> anyhow::Result<()> {
        let path = temp_store_path("shared", "txt");
        let a = counter_store(&path, CorruptionPolicy::Fail).await?;
        // different spelling of the same file
        let dotted = path.parent().unwrap().join(".").join(path.file_name().unwrap());
        let b = counter_store(&dotted, CorruptionPolicy::ReplaceWithDefault).await?;
        assert_eq!(a.path(), b.path());
        assert_eq!(b.corruption_policy(), CorruptionPolicy::Fail);

        let mut observer = a.data();
        assert_eq!(observer.next().await?, 0);
        b.update(|v| v + 1).await?;
        assert_eq!(observer.next().await?, 1);
        assert_eq!(a.update(|v| v + 1).await?, 2);

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn same_file_with_other_value_type_conflicts() -> anyhow::Result<()> {
        struct Text;
        impl Serializer<String> for Text {
            fn default_value(&self) -> String { String::new() }
            fn read_from(&self, bytes: &[u8]) -> Result<String, SerializerError> {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
            fn write_to(&self, value: &String, out: &mut Vec<u8>) -> Result<(), SerializerError> {
                out.extend_from_slice(value.as_bytes());
                Ok(())
            }
        }

        let path = temp_store_path("conflict", "txt");
        let _counter = counter_store(&path, CorruptionPolicy::Fail).await?;
        let clash = FileStore::<String, Text>::open(&path, Text, CorruptionPolicy::Fail).await;
        assert!(matches!(clash, Err(StoreError::Conflict(_))));

        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() -> anyhow::Result<()> {
        let path = temp_store_path("concurrent", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update_data(|v| async move {
                        tokio::task::yield_now().await;
                        Ok::<_, anyhow::Error>(v + 1)
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await??;
        }

        assert_eq!(store.data().first().await?, 50);
        assert_eq!(tokio::fs::read_to_string(&path).await?, "50");
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_update_releases_commit_path() -> anyhow::Result<()> {
        let path = temp_store_path("cancelled", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        let entered = Arc::new(Notify::new());

        let stuck = {
            let store = store.clone();
            let entered = Arc::clone(&entered);
            tokio::spawn(async move {
                store
                    .update_data(move |v| async move {
                        entered.notify_one();
                        std::future::pending::<()>().await;
                        Ok::<_, anyhow::Error>(v + 100)
                    })
                    .await
            })
        };
        entered.notified().await;

        let queued = {
            let store = store.clone();
            tokio::spawn(async move { store.update(|v| v + 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!queued.is_finished(), "second update must wait for the first");

        stuck.abort();
        assert_eq!(queued.await??, 1);
        assert_eq!(store.data().first().await?, 1);

        cleanup(&path).await;
        Ok(())
    }

    /// Ordered log of the callers that committed, kept as a JSON array.
    struct Journal;

    impl Serializer<Vec<u32>> for Journal {
        fn default_value(&self) -> Vec<u32> {
            Vec::new()
        }

        fn read_from(&self, bytes: &[u8]) -> Result<Vec<u32>, SerializerError> {
            serde_json::from_slice(bytes).map_err(|e| SerializerError::new(e.to_string()))
        }

        fn write_to(&self, value: &Vec<u32>, out: &mut Vec<u8>) -> Result<(), SerializerError> {
            serde_json::to_writer(out, value).map_err(|e| SerializerError::new(e.to_string()))
        }
    }

    #[tokio::test]
    async fn queued_updates_commit_in_arrival_order() -> anyhow::Result<()> {
        let path = temp_store_path("order", "json");
        let store = FileStore::<Vec<u32>, Journal>::open(&path, Journal, CorruptionPolicy::Fail).await?;
        store.data().first().await?;

        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut tasks = Vec::new();
        {
            let store = store.clone();
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            tasks.push(tokio::spawn(async move {
                store
                    .update_data(move |mut log| async move {
                        entered.notify_one();
                        release.notified().await;
                        log.push(0);
                        Ok::<_, anyhow::Error>(log)
                    })
                    .await
            }));
        }
        entered.notified().await;

        // each caller gets a few milliseconds to reach the lock queue before the next one starts
        for caller in 1..20u32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(move |mut log| {
                        log.push(caller);
                        log
                    })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        release.notify_one();
        for task in tasks {
            task.await??;
        }

        let expected: Vec<u32> = (0..20).collect();
        assert_eq!(store.data().first().await?, expected);
        let on_disk: Vec<u32> = serde_json::from_slice(&tokio::fs::read(&path).await?)?;
        assert_eq!(on_disk, expected);

        cleanup(&path).await;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn parent_directory_can_be_synced_after_commit() -> anyhow::Result<()> {
        let path = temp_store_path("dirsync", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        store.update(|v| v + 1).await?;
        sync_parent(store.path()).await?;
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn dropped_streams_release_subscriptions() -> anyhow::Result<()> {
        let path = temp_store_path("subs", "txt");
        let store = counter_store(&path, CorruptionPolicy::Fail).await?;
        let mut a = store.data();
        let mut b = store.data();
        a.next().await?;
        b.next().await?;
        assert_eq!(store.subscriber_count(), 2);

        a.close();
        drop(b);
        assert_eq!(store.subscriber_count(), 0);

        cleanup(&path).await;
        Ok(())
    }
}
