// registry/mod.rs: known devices, last-seen telemetry, duplicate windows
pub mod store;
pub mod window;

pub use store::{JsonFileStore, MemoryStore, RegistryStore, open_store};
pub use window::{DEDUP_WINDOW, SeqWindow};

use crate::errors::{GatewayError, Result};
use crate::ids::DeviceHex;
use crate::radio::LinkQuality;
use chrono::{DateTime, Utc};
use gateway_protocol::{DeviceId, SensorKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(with = "crate::ids::hex_id")]
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub sensor_kind: SensorKind,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_rssi: i16,
    #[serde(default)]
    pub last_snr: i8,
    #[serde(default)]
    pub packet_count: u64,
    #[serde(default)]
    pub last_sequence: Option<u16>,
    /// Last reported measurement interval, seconds.
    #[serde(default)]
    pub sensor_interval: Option<u16>,
    /// Last reported deep-sleep duration, seconds.
    #[serde(default)]
    pub deep_sleep_sec: Option<u16>,
    #[serde(skip)]
    pub window: SeqWindow,
}

impl DeviceRecord {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            name: format!("sensor_{:x}", id & 0xFFFF_FFFF),
            location: "Unknown".into(),
            sensor_kind: SensorKind::Unknown,
            last_seen: None,
            last_rssi: 0,
            last_snr: 0,
            packet_count: 0,
            last_sequence: None,
            sensor_interval: None,
            deep_sleep_sec: None,
            window: SeqWindow::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Known,
    Registered,
}

pub struct DeviceRegistry {
    devices: Mutex<BTreeMap<DeviceId, DeviceRecord>>,
    max_devices: usize,
    store: Arc<dyn RegistryStore>,
    /// Keeps flushes ordered; the table lock is never held across I/O.
    flush_lock: tokio::sync::Mutex<()>,
}

impl DeviceRegistry {
    /// Starts empty when the store cannot be read.
    pub async fn load(store: Arc<dyn RegistryStore>, max_devices: usize) -> Self {
        let records = match store.load().await {
            Ok(r) => r,
            Err(e) => {
                warn!(event = "registry_load_failed", store = %store.describe(), error = %e);
                Vec::new()
            }
        };

        let mut devices = BTreeMap::new();
        for rec in records {
            if devices.len() >= max_devices {
                warn!(event = "registry_record_skipped", device = %DeviceHex(rec.id), max_devices);
                continue;
            }
            devices.insert(rec.id, rec);
        }
        info!(event = "registry_loaded", store = %store.describe(), devices = devices.len());

        Self {
            devices: Mutex::new(devices),
            max_devices,
            store,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn entry<'a>(
        devices: &'a mut BTreeMap<DeviceId, DeviceRecord>,
        id: DeviceId,
        max: usize,
    ) -> Result<(&'a mut DeviceRecord, Registration)> {
        let len = devices.len();
        match devices.entry(id) {
            Entry::Occupied(e) => Ok((e.into_mut(), Registration::Known)),
            Entry::Vacant(_) if len >= max => Err(GatewayError::RegistryFull { max }),
            Entry::Vacant(e) => Ok((e.insert(DeviceRecord::new(id)), Registration::Registered)),
        }
    }

    /// Registers `id` without persisting; fails once the table is full.
    pub fn add_device(&self, id: DeviceId) -> Result<Registration> {
        let mut devices = self.devices.lock();
        Self::entry(&mut devices, id, self.max_devices).map(|(_, reg)| reg)
    }

    /// Bookkeeping for an accepted frame, auto-registering unknown senders.
    pub async fn record_frame(
        &self,
        id: DeviceId,
        seq: u16,
        quality: LinkQuality,
    ) -> Result<Registration> {
        let registration = {
            let mut devices = self.devices.lock();
            let (rec, registration) = Self::entry(&mut devices, id, self.max_devices)?;
            rec.last_seen = Some(Utc::now());
            rec.last_rssi = quality.rssi;
            rec.last_snr = quality.snr;
            rec.packet_count += 1;
            rec.last_sequence = Some(seq);
            rec.window.push(seq);
            registration
        };

        if registration == Registration::Registered {
            info!(event = "device_registered", device = %DeviceHex(id));
            self.persist().await;
        }
        Ok(registration)
    }

    pub fn is_duplicate(&self, id: DeviceId, seq: u16) -> bool {
        self.devices
            .lock()
            .get(&id)
            .is_some_and(|rec| rec.window.contains(seq))
    }

    pub fn reset_duplicate_window(&self, id: DeviceId) -> bool {
        match self.devices.lock().get_mut(&id) {
            Some(rec) => {
                rec.window.clear();
                debug!(event = "dedup_window_reset", device = %DeviceHex(id));
                true
            }
            None => false,
        }
    }

    /// Applies non-blank values that differ from the stored ones; persists on change.
    pub async fn upsert_identity(
        &self,
        id: DeviceId,
        name: Option<&str>,
        location: Option<&str>,
    ) -> bool {
        let name = name.map(str::trim).filter(|s| !s.is_empty());
        let location = location.map(str::trim).filter(|s| !s.is_empty());
        let changed = {
            let mut devices = self.devices.lock();
            let Some(rec) = devices.get_mut(&id) else { return false };
            let mut changed = false;
            if let Some(name) = name.filter(|n| *n != rec.name) {
                rec.name = name.to_string();
                changed = true;
            }
            if let Some(location) = location.filter(|l| *l != rec.location) {
                rec.location = location.to_string();
                changed = true;
            }
            changed
        };
        if changed {
            info!(event = "device_identity", device = %DeviceHex(id), ?name, ?location);
            self.persist().await;
        }
        changed
    }

    /// Zero means "not reported" and never overwrites a stored value.
    pub async fn upsert_config(
        &self,
        id: DeviceId,
        sensor_interval: Option<u16>,
        deep_sleep_sec: Option<u16>,
    ) -> bool {
        let interval = sensor_interval.filter(|v| *v > 0);
        let sleep = deep_sleep_sec.filter(|v| *v > 0);
        let changed = {
            let mut devices = self.devices.lock();
            let Some(rec) = devices.get_mut(&id) else { return false };
            let mut changed = false;
            if interval.is_some() && interval != rec.sensor_interval {
                rec.sensor_interval = interval;
                changed = true;
            }
            if sleep.is_some() && sleep != rec.deep_sleep_sec {
                rec.deep_sleep_sec = sleep;
                changed = true;
            }
            changed
        };
        if changed {
            info!(event = "device_config", device = %DeviceHex(id), ?interval, ?sleep);
            self.persist().await;
        }
        changed
    }

    pub async fn set_sensor_kind(&self, id: DeviceId, kind: SensorKind) -> bool {
        if kind == SensorKind::Unknown {
            return false;
        }
        let changed = match self.devices.lock().get_mut(&id) {
            Some(rec) if rec.sensor_kind != kind => {
                rec.sensor_kind = kind;
                true
            }
            _ => false,
        };
        if changed {
            info!(event = "sensor_detected", device = %DeviceHex(id), kind = kind.as_str());
            self.persist().await;
        }
        changed
    }

    pub fn get(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.devices.lock().get(&id).cloned()
    }

    /// Copy of the whole table, ordered by device id.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    pub fn max_devices(&self) -> usize {
        self.max_devices
    }

    /// Writes the current table; failures are logged and the table stays in memory.
    pub async fn persist(&self) {
        let _flush = self.flush_lock.lock().await;
        let records = self.snapshot();
        if let Err(e) = self.store.save(&records).await {
            warn!(event = "registry_save_failed", store = %self.store.describe(), error = %e);
        }
    }
}
