// registry/store.rs: durable storage for registry snapshots
use super::DeviceRecord;
use crate::errors::{GatewayError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;
use tracing::{info, warn};

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn load(&self) -> Result<Vec<DeviceRecord>>;
    /// Replaces the stored table with `records`.
    async fn save(&self, records: &[DeviceRecord]) -> Result<()>;
    fn describe(&self) -> String;
}

#[derive(Serialize)]
struct Snapshot<'a> {
    devices: &'a [DeviceRecord],
}

/// `{"devices":[...]}` on disk, replaced atomically via temp file + rename.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<DeviceRecord>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let doc: serde_json::Value = serde_json::from_str(&text)?;
        let entries = doc
            .get("devices")
            .and_then(|d| d.as_array())
            .ok_or_else(|| GatewayError::Storage(format!("{}: no devices array", self.path.display())))?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<DeviceRecord>(entry.clone()) {
                Ok(rec) => records.push(rec),
                Err(e) => warn!(event = "registry_record_skipped", error = %e),
            }
        }
        Ok(records)
    }

    async fn save(&self, records: &[DeviceRecord]) -> Result<()> {
        let body = serde_json::to_vec_pretty(&Snapshot { devices: records })?;
        let tmp = self.temp_path();
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Volatile store used when the storage directory is unavailable, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<DeviceRecord>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with_records(records: Vec<DeviceRecord>) -> Self {
        Self { records: Mutex::new(records), saves: AtomicUsize::new(0) }
    }

    pub fn saved(&self) -> Vec<DeviceRecord> {
        self.records.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn load(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn save(&self, records: &[DeviceRecord]) -> Result<()> {
        *self.records.lock() = records.to_vec();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

/// File-backed store at `path`, or memory-only when its directory cannot be
/// created. Never fails.
pub async fn open_store(path: &Path) -> Arc<dyn RegistryStore> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        if let Err(e) = fs::create_dir_all(dir).await {
            warn!(
                event = "storage_unavailable",
                dir = %dir.display(),
                error = %e,
                "registry will not survive restart"
            );
            return Arc::new(MemoryStore::default());
        }
    }
    info!(event = "storage_ready", path = %path.display());
    Arc::new(JsonFileStore::new(path))
}
