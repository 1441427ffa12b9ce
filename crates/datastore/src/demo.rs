//! Demonstration controller: one read and one delayed write against each
//! store flavour, with the results logged.

use std::time::Duration;

use configs::{DemoConfig, StorageConfig};
use tokio::runtime::Handle;
use tracing::info;

use crate::errors::StoreError;
use crate::preferences::{int_key, Key, PreferenceStore};
use crate::record::{RecordStore, Settings};
use crate::storage::DataStore;

/// Values seen by one demo run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoReport {
    pub counter_before: i32,
    pub counter_after: i32,
    pub settings_before: i32,
    pub settings_after: i32,
}

pub struct DemoController {
    preferences: PreferenceStore,
    settings: RecordStore<Settings>,
    counter: Key<i32>,
    write_delay: Duration,
    read_timeout: Duration,
}

impl DemoController {
    pub async fn open(storage: &StorageConfig, demo: &DemoConfig) -> Result<Self, StoreError> {
        let preferences = PreferenceStore::open(storage.preferences_path()).await?;
        let settings = RecordStore::<Settings>::open(storage.record_path()).await?;
        info!(
            event = "stores_opened",
            preferences = %preferences.path().display(),
            settings = %settings.path().display(),
            "demo stores ready"
        );
        Ok(Self {
            preferences,
            settings,
            counter: int_key(demo.counter_key.as_str()),
            write_delay: demo.write_delay(),
            read_timeout: demo.read_timeout(),
        })
    }

    /// Stored counter, 0 when never written.
    pub async fn read_counter(&self) -> Result<i32, StoreError> {
        let key = self.counter.clone();
        let counter = self.preferences.data().map(move |p| p.get(&key).unwrap_or(0)).first().await?;
        info!(event = "read", store = "preferences", counter, "counter read");
        Ok(counter)
    }

    /// Blocking read for callers outside the runtime. Gives up after the
    /// configured read timeout.
    pub fn read_counter_blocking(&self, handle: &Handle) -> Result<i32, StoreError> {
        let prefs = self.preferences.data().first_blocking(handle, self.read_timeout)?;
        let counter = prefs.get(&self.counter).unwrap_or(0);
        info!(event = "read_blocking", store = "preferences", counter, "counter read");
        Ok(counter)
    }

    pub async fn increment_counter(&self) -> Result<i32, StoreError> {
        let key = self.counter.clone();
        let prefs = self
            .preferences
            .update_data(move |mut prefs| async move {
                let next = match prefs.get(&key) {
                    Some(n) => bump(n, key.name())?,
                    None => 1,
                };
                prefs.set(&key, next);
                Ok::<_, anyhow::Error>(prefs)
            })
            .await?;
        let counter = prefs.get(&self.counter).unwrap_or(0);
        info!(event = "write", store = "preferences", counter, "counter incremented");
        Ok(counter)
    }

    pub async fn read_example_counter(&self) -> Result<i32, StoreError> {
        let counter = self.settings.data().map(|s| s.example_counter).first().await?;
        info!(event = "read", store = "settings", example_counter = counter, "settings read");
        Ok(counter)
    }

    pub fn read_example_counter_blocking(&self, handle: &Handle) -> Result<i32, StoreError> {
        let counter = self.settings.data().first_blocking(handle, self.read_timeout)?.example_counter;
        info!(event = "read_blocking", store = "settings", example_counter = counter, "settings read");
        Ok(counter)
    }

    pub async fn increment_example_counter(&self) -> Result<i32, StoreError> {
        let settings = self
            .settings
            .update_data(|s| async move {
                let next = bump(s.example_counter, "example_counter")?;
                Ok::<_, anyhow::Error>(s.with_example_counter(next))
            })
            .await?;
        info!(event = "write", store = "settings", example_counter = settings.example_counter, "settings updated");
        Ok(settings.example_counter)
    }

    pub async fn increment_sequential_counter(&self) -> Result<i32, StoreError> {
        let settings = self
            .settings
            .update_data(|s| async move {
                let next = bump(s.sequential_counter, "sequential_counter")?;
                Ok::<_, anyhow::Error>(s.with_sequential_counter(next))
            })
            .await?;
        Ok(settings.sequential_counter)
    }

    /// Read both stores, wait the configured delay, then increment both
    /// concurrently and read the record back.
    pub async fn run(&self) -> Result<DemoReport, StoreError> {
        let counter_before = self.read_counter().await?;
        let settings_before = self.read_example_counter().await?;

        tokio::time::sleep(self.write_delay).await;
        let (counter_after, _) =
            tokio::try_join!(self.increment_counter(), self.increment_example_counter())?;
        let settings_after = self.read_example_counter().await?;

        let report = DemoReport { counter_before, counter_after, settings_before, settings_after };
        info!(event = "demo_finished", ?report, "demo run complete");
        Ok(report)
    }

    /// Read, write and read again on the record's second counter, one step
    /// after the other. Returns the counter before and after.
    pub async fn run_sequential(&self) -> Result<(i32, i32), StoreError> {
        let before = self.settings.data().map(|s| s.sequential_counter).first().await?;
        self.increment_sequential_counter().await?;
        let after = self.settings.data().map(|s| s.sequential_counter).first().await?;
        info!(event = "sequential_finished", before, after, "read-write-read complete");
        Ok((before, after))
    }
}

fn bump(counter: i32, name: &str) -> anyhow::Result<i32> {
    counter
        .checked_add(1)
        .ok_or_else(|| anyhow::anyhow!("counter {name} is already at {counter}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (StorageConfig, DemoConfig) {
        let storage = StorageConfig {
            data_dir: std::env::temp_dir().join(format!("datastore_demo_{}", uuid::Uuid::new_v4())),
            ..StorageConfig::default()
        };
        let demo = DemoConfig { write_delay_ms: 5, ..DemoConfig::default() };
        (storage, demo)
    }

    #[tokio::test]
    async fn run_increments_both_stores() -> anyhow::Result<()> {
        let (storage, demo) = temp_config();
        let controller = DemoController::open(&storage, &demo).await?;

        let first = controller.run().await?;
        assert_eq!(first, DemoReport { counter_before: 0, counter_after: 1, settings_before: 0, settings_after: 1 });

        let second = controller.run().await?;
        assert_eq!(second.counter_before, 1);
        assert_eq!(second.counter_after, 2);
        assert_eq!(second.settings_after, 2);

        let _ = tokio::fs::remove_dir_all(&storage.data_dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn sequential_run_touches_second_counter_only() -> anyhow::Result<()> {
        let (storage, demo) = temp_config();
        let controller = DemoController::open(&storage, &demo).await?;
        assert_eq!(controller.run_sequential().await?, (0, 1));
        assert_eq!(controller.read_example_counter().await?, 0);

        let _ = tokio::fs::remove_dir_all(&storage.data_dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn saturated_counters_reject_increment() -> anyhow::Result<()> {
        let (storage, demo) = temp_config();
        let controller = DemoController::open(&storage, &demo).await?;
        let key = int_key(demo.counter_key.as_str());
        controller
            .preferences
            .edit(move |prefs| {
                prefs.set(&key, i32::MAX);
            })
            .await?;
        controller
            .settings
            .update(|s| s.with_example_counter(i32::MAX).with_sequential_counter(i32::MAX))
            .await?;

        let err = controller.increment_counter().await.unwrap_err();
        assert!(matches!(err, StoreError::UpdateFunction(_)));
        assert_eq!(controller.read_counter().await?, i32::MAX);

        let err = controller.increment_example_counter().await.unwrap_err();
        assert!(matches!(err, StoreError::UpdateFunction(_)));
        assert!(matches!(controller.increment_sequential_counter().await, Err(StoreError::UpdateFunction(_))));
        assert_eq!(controller.read_example_counter().await?, i32::MAX);

        let _ = tokio::fs::remove_dir_all(&storage.data_dir).await;
        Ok(())
    }

    #[test]
    fn blocking_reads_from_outside_the_runtime() -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        let (storage, demo) = temp_config();
        let controller = rt.block_on(DemoController::open(&storage, &demo))?;
        rt.block_on(controller.increment_counter())?;

        assert_eq!(controller.read_counter_blocking(rt.handle())?, 1);
        assert_eq!(controller.read_example_counter_blocking(rt.handle())?, 0);

        let _ = std::fs::remove_dir_all(&storage.data_dir);
        Ok(())
    }
}
