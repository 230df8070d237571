// rx/mod.rs: receive context: poll, validate, dedup, accept, hand off, ACK
use crate::commands::CommandRetryQueue;
use crate::health::{GatewayStats, bump};
use crate::ids::DeviceHex;
use crate::radio::{RadioArbiter, RxFrame};
use crate::registry::DeviceRegistry;
use crate::telemetry::{HandoffSender, ReceivedFrame};
use crate::tx::TxPath;
use gateway_protocol::{EventKind, Frame, FramingError, Payload, decode_frame};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxOutcome {
    Invalid(FramingError),
    Duplicate,
    Accepted { acked: bool },
}

pub struct RxLoop {
    pub(crate) arbiter: Arc<RadioArbiter>,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) queue: Arc<CommandRetryQueue>,
    pub(crate) tx: Arc<TxPath>,
    pub(crate) handoff: HandoffSender,
    pub(crate) stats: Arc<GatewayStats>,
    pub(crate) poll: Duration,
}

impl RxLoop {
    pub async fn run(self) {
        info!(event = "rx_loop_started", poll_ms = self.poll.as_millis() as u64);
        loop {
            match self.arbiter.on_receive_ready() {
                Some(frame) => {
                    self.handle(frame).await;
                    self.arbiter.rearm();
                }
                None => {
                    self.arbiter.rearm();
                    time::sleep(self.poll).await;
                }
            }
        }
    }

    pub async fn handle(&self, raw: RxFrame) -> RxOutcome {
        bump(&self.stats.frames_received);

        let Frame { header, payload } = match decode_frame(&raw.bytes) {
            Ok(frame) => frame,
            Err(e) => {
                bump(&self.stats.frames_invalid);
                warn!(
                    event = "frame_invalid",
                    error = %e,
                    bytes = raw.bytes.len(),
                    raw = %hex::encode(&raw.bytes[..raw.bytes.len().min(16)]),
                );
                return RxOutcome::Invalid(e);
            }
        };
        let device = header.device_id;

        // A restarted sensor counts from zero again; forget its old window first.
        if let Payload::Event(ev) = &payload {
            if ev.kind == EventKind::Startup {
                self.registry.reset_duplicate_window(device);
                info!(event = "device_restarted", device = %DeviceHex(device), seq = header.sequence);
            }
        }

        if self.registry.is_duplicate(device, header.sequence) {
            bump(&self.stats.frames_duplicate);
            debug!(event = "frame_duplicate", device = %DeviceHex(device), seq = header.sequence);
            return RxOutcome::Duplicate;
        }

        if let Err(e) = self.registry.record_frame(device, header.sequence, raw.quality).await {
            warn!(event = "device_not_registered", device = %DeviceHex(device), error = %e);
        }

        let report = self.queue.on_device_activity(device).await;
        if report.attempted > 0 {
            debug!(event = "command_window", device = %DeviceHex(device), attempted = report.attempted, delivered = report.delivered);
        }

        let forwarded = ReceivedFrame {
            header,
            payload,
            rssi: raw.quality.rssi,
            snr: raw.quality.snr,
            received_at: raw.received_at,
        };
        if !self.handoff.offer(forwarded).await {
            bump(&self.stats.handoff_dropped);
            warn!(event = "handoff_full", device = %DeviceHex(device), seq = header.sequence);
        }

        let acked = match header.message_type() {
            Some(t) if t.requires_ack() => self.tx.send_ack(&header, raw.quality).await.is_ok(),
            _ => false,
        };
        bump(&self.stats.frames_accepted);
        debug!(event = "frame_accepted", device = %DeviceHex(device), seq = header.sequence, acked);
        RxOutcome::Accepted { acked }
    }
}
