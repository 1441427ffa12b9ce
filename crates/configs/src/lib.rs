use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Where the stores keep their backing files.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Name of the preference store; the file becomes `<name>.preferences.json`.
    #[serde(default = "default_preferences_name")]
    pub preferences_name: String,
    /// File name of the typed record store, relative to `data_dir`.
    #[serde(default = "default_record_file")]
    pub record_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            preferences_name: default_preferences_name(),
            record_file: default_record_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_write_delay")]
    pub write_delay_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_counter_key")]
    pub counter_key: String,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            write_delay_ms: default_write_delay(),
            read_timeout_ms: default_read_timeout(),
            counter_key: default_counter_key(),
            worker_threads: None,
        }
    }
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_preferences_name() -> String { "pref_settings".into() }
fn default_record_file() -> String { "proto_settings.pb".into() }
fn default_write_delay() -> u64 { 2000 }
fn default_read_timeout() -> u64 { 5000 }
fn default_counter_key() -> String { "counter_key".into() }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.storage.validate()?;
        self.demo.normalize()?;
        Ok(())
    }
}

impl StorageConfig {
    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.preferences.json", self.preferences_name))
    }

    pub fn record_path(&self) -> PathBuf {
        self.data_dir.join(&self.record_file)
    }

    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        if self.preferences_name.trim().is_empty() {
            return Err(anyhow!("storage.preferences_name must not be empty"));
        }
        if self.record_file.trim().is_empty() {
            return Err(anyhow!("storage.record_file must not be empty"));
        }
        if self.preferences_name.contains(['/', '\\']) || self.record_file.contains(['/', '\\']) {
            return Err(anyhow!("store names must be plain file names, not paths"));
        }
        Ok(())
    }
}

impl DemoConfig {
    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn normalize(&mut self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(anyhow!("demo.read_timeout_ms must be a positive number of milliseconds"));
        }
        if self.counter_key.trim().is_empty() {
            self.counter_key = default_counter_key();
        }
        if self.worker_threads == Some(0) {
            self.worker_threads = None;
        }
        Ok(())
    }
}
