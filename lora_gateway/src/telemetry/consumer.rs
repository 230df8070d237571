// telemetry/consumer.rs: drains the hand-off: registry side effects, then the sink
use super::{Handoff, HandoffReceiver, ReceivedFrame};
use crate::registry::{DeviceRecord, DeviceRegistry};
use async_trait::async_trait;
use gateway_protocol::Payload;
use std::sync::Arc;
use tracing::info;

/// Downstream of the gateway (bus bridge, packet log, ...).
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn deliver(&self, frame: &ReceivedFrame, device: Option<&DeviceRecord>);
}

pub struct Consumer {
    registry: Arc<DeviceRegistry>,
    sink: Arc<dyn FrameSink>,
}

impl Consumer {
    pub fn new(registry: Arc<DeviceRegistry>, sink: Arc<dyn FrameSink>) -> Self {
        Self { registry, sink }
    }

    pub async fn process(&self, frame: &ReceivedFrame) {
        let id = frame.header.device_id;
        match &frame.payload {
            Payload::Status(s) => {
                self.registry
                    .upsert_identity(id, s.device_name.as_deref(), s.location.as_deref())
                    .await;
                self.registry
                    .upsert_config(id, Some(s.sensor_interval_secs), Some(s.deep_sleep_secs))
                    .await;
            }
            Payload::Readings(r) => {
                self.registry.set_sensor_kind(id, r.sensor_kind).await;
            }
            _ => {}
        }
        let device = self.registry.get(id);
        self.sink.deliver(frame, device.as_ref()).await;
    }

    pub async fn run(self, mut handoff: HandoffReceiver) {
        loop {
            match handoff.next().await {
                Handoff::Frame(frame) => self.process(&frame).await,
                Handoff::Idle => {}
                Handoff::Closed => break,
            }
        }
        info!(event = "consumer_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::LinkQuality;
    use crate::registry::MemoryStore;
    use crate::telemetry::handoff;
    use chrono::Utc;
    use gateway_protocol::{PacketHeader, Readings, SensorKind, Status};
    use parking_lot::Mutex;
    use tokio::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(u16, Option<String>)>>);

    #[async_trait]
    impl FrameSink for Collect {
        async fn deliver(&self, frame: &ReceivedFrame, device: Option<&DeviceRecord>) {
            self.0.lock().push((frame.header.sequence, device.map(|d| d.name.clone())));
        }
    }

    fn status(name: &str) -> Status {
        Status {
            uptime_secs: 10,
            wake_count: 1,
            sensor_healthy: true,
            lora_rssi: -70,
            lora_snr: 8,
            free_heap_kb: 200,
            sensor_failures: 0,
            tx_failures: 0,
            last_success_tx: 9,
            deep_sleep_secs: 900,
            sensor_interval_secs: 0,
            device_name: Some(name.into()),
            location: Some("shed".into()),
        }
    }

    fn received(seq: u16, payload: Payload) -> ReceivedFrame {
        ReceivedFrame {
            header: PacketHeader::new(payload.msg_type(), 5, seq, 0),
            payload,
            rssi: -70,
            snr: 8,
            received_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn status_updates_identity_before_delivery() {
        let registry = Arc::new(DeviceRegistry::load(Arc::new(MemoryStore::default()), 10).await);
        registry.record_frame(5, 1, LinkQuality::default()).await.unwrap();
        let sink = Arc::new(Collect::default());
        let consumer = Consumer::new(registry.clone(), sink.clone());

        consumer.process(&received(1, Payload::Status(status("weather-1")))).await;

        let rec = registry.get(5).unwrap();
        assert_eq!(rec.name, "weather-1");
        assert_eq!(rec.location, "shed");
        assert_eq!(rec.deep_sleep_sec, Some(900));
        assert_eq!(rec.sensor_interval, None);
        assert_eq!(sink.0.lock()[0], (1, Some("weather-1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn run_drains_until_closed() {
        let registry = Arc::new(DeviceRegistry::load(Arc::new(MemoryStore::default()), 10).await);
        registry.record_frame(5, 1, LinkQuality::default()).await.unwrap();
        let sink = Arc::new(Collect::default());
        let (tx, rx) = handoff(4, Duration::from_millis(100), Duration::from_millis(100));
        let task = tokio::spawn(Consumer::new(registry.clone(), sink.clone()).run(rx));

        let readings = Readings {
            timestamp: 0,
            temperature_centi: 0,
            humidity_centi: 0,
            pressure_centi: 0,
            altitude_m: 0,
            battery_millivolts: 0,
            battery_percent: 0,
            pressure_change_centi: 0,
            pressure_trend: 1,
            sensor_kind: SensorKind::Ds18b20,
        };
        assert!(tx.offer(received(2, Payload::Readings(readings))).await);
        drop(tx);
        task.await.unwrap();

        assert_eq!(registry.get(5).unwrap().sensor_kind, SensorKind::Ds18b20);
        assert_eq!(sink.0.lock().len(), 1);
    }
}
