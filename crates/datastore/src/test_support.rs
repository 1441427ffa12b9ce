#![cfg(test)]
use std::path::PathBuf;

/// Fresh, not-yet-existing path under the system temp dir.
pub fn temp_store_path(prefix: &str, extension: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("datastore_tests_{}", uuid::Uuid::new_v4()))
        .join(format!("{prefix}.{extension}"))
}

pub async fn cleanup(path: &std::path::Path) {
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::remove_dir_all(parent).await;
    }
}
