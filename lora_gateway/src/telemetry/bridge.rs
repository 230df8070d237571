// telemetry/bridge.rs: decoded frames rendered for the message-bus bridge
use super::ReceivedFrame;
use crate::ids::format_id;
use crate::registry::DeviceRecord;
use gateway_protocol::Payload;
use serde::Serialize;
use serde_json::{Value, json};

pub const TOPIC_PREFIX: &str = "sensor-hub/";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeMessage {
    pub topic: String,
    pub body: Value,
}

/// Readings, status and events become `<prefix><device>/<kind>` messages with
/// scaled values converted back to engineering units (`pressure_change` stays
/// in raw hundredths of hPa). Commands and ACKs are
/// link traffic and are not bridged.
pub fn render(frame: &ReceivedFrame, device: Option<&DeviceRecord>) -> Option<BridgeMessage> {
    let id = format_id(frame.header.device_id);
    let name = device.map(|d| d.name.as_str()).unwrap_or("unknown");
    let location = device.map(|d| d.location.as_str()).unwrap_or("unknown");
    let gateway_time = frame.received_at.to_rfc3339();

    let (kind, body) = match &frame.payload {
        Payload::Readings(r) => (
            "readings",
            json!({
                "device_id": id,
                "device_name": name,
                "location": location,
                "timestamp": r.timestamp,
                "sequence": frame.header.sequence,
                "temperature": r.temperature_c(),
                "humidity": r.humidity_pct(),
                "pressure": r.pressure_hpa(),
                "altitude": r.altitude_m,
                "battery_voltage": r.battery_volts(),
                "battery_percent": r.battery_percent,
                "pressure_change": r.pressure_change_centi,
                "pressure_trend": r.trend_label(),
                "sensor_type": r.sensor_kind.as_str(),
                "rssi": frame.rssi,
                "snr": frame.snr,
                "gateway_time": gateway_time,
            }),
        ),
        Payload::Status(s) => (
            "status",
            json!({
                "device_id": id,
                "device_name": name,
                "location": location,
                "uptime": s.uptime_secs,
                "wake_count": s.wake_count,
                "sensor_healthy": s.sensor_healthy,
                "lora_rssi": s.lora_rssi,
                "lora_snr": s.lora_snr,
                "free_heap_kb": s.free_heap_kb,
                "sensor_failures": s.sensor_failures,
                "tx_failures": s.tx_failures,
                "last_success_tx": s.last_success_tx,
                "deep_sleep_sec": s.deep_sleep_secs,
                "sensor_interval": s.sensor_interval_secs,
                "rssi": frame.rssi,
                "snr": frame.snr,
                "gateway_time": gateway_time,
            }),
        ),
        Payload::Event(e) => (
            "events",
            json!({
                "device_id": id,
                "device_name": name,
                "location": location,
                "event_type": e.kind,
                "severity": e.severity,
                "message": e.message,
                "gateway_time": gateway_time,
            }),
        ),
        Payload::Command(_) | Payload::Ack(_) => return None,
    };

    Some(BridgeMessage { topic: format!("{TOPIC_PREFIX}{id}/{kind}"), body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gateway_protocol::{Ack, Event, EventKind, MessageType, PacketHeader, Readings, SensorKind, Severity};

    fn received(payload: Payload) -> ReceivedFrame {
        ReceivedFrame {
            header: PacketHeader::new(payload.msg_type(), 0xAABB_CCDD_EEFF_0011, 42, 0),
            payload,
            rssi: -81,
            snr: 7,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn readings_are_scaled_to_units() {
        let r = Readings {
            timestamp: 100,
            temperature_centi: -525,
            humidity_centi: 5000,
            pressure_centi: 100_000,
            altitude_m: 10,
            battery_millivolts: 4100,
            battery_percent: 95,
            pressure_change_centi: 120,
            pressure_trend: 2,
            sensor_kind: SensorKind::Bme280,
        };
        let mut rec = DeviceRecord::new(0xAABB_CCDD_EEFF_0011);
        rec.name = "porch".into();
        let msg = render(&received(Payload::Readings(r)), Some(&rec)).unwrap();
        assert_eq!(msg.topic, "sensor-hub/AABBCCDDEEFF0011/readings");
        assert_eq!(msg.body["device_name"], "porch");
        assert_eq!(msg.body["temperature"], -5.25);
        assert_eq!(msg.body["pressure"], 1000.0);
        assert_eq!(msg.body["battery_voltage"], 4.1);
        assert_eq!(msg.body["pressure_trend"], "rising");
        // published as the raw hundredths-of-hPa field
        assert_eq!(msg.body["pressure_change"], 120);
        assert_eq!(msg.body["sequence"], 42);
    }

    #[test]
    fn events_use_symbolic_codes() {
        let e = Event { kind: EventKind::LowBattery, severity: Severity::Warning, message: "3.3V".into() };
        let msg = render(&received(Payload::Event(e)), None).unwrap();
        assert_eq!(msg.topic, "sensor-hub/AABBCCDDEEFF0011/events");
        assert_eq!(msg.body["event_type"], "low_battery");
        assert_eq!(msg.body["severity"], "warning");
        assert_eq!(msg.body["device_name"], "unknown");
    }

    #[test]
    fn link_traffic_is_not_bridged() {
        let mut f = received(Payload::Ack(Ack::new(1, true, -50, 3)));
        f.header = PacketHeader::new(MessageType::Ack, 1, 0, 7);
        assert!(render(&f, None).is_none());
    }
}
