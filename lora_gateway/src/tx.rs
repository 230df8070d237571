// tx.rs: outbound frames (ACKs, commands), serialized through the radio arbiter
use crate::errors::Result;
use crate::health::{GatewayStats, bump};
use crate::ids::DeviceHex;
use crate::radio::{LinkQuality, RadioArbiter, TxReceipt};
use gateway_protocol::{Ack, CommandPayload, DeviceId, PacketHeader, Payload, encode_frame};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use tracing::{debug, info, warn};

pub struct TxPath {
    arbiter: Arc<RadioArbiter>,
    gateway_id: DeviceId,
    /// Sequence field of COMMAND frames; wraps.
    command_seq: AtomicU16,
    stats: Arc<GatewayStats>,
}

impl TxPath {
    pub fn new(arbiter: Arc<RadioArbiter>, gateway_id: DeviceId, stats: Arc<GatewayStats>) -> Self {
        Self { arbiter, gateway_id, command_seq: AtomicU16::new(0), stats }
    }

    pub fn arbiter(&self) -> &Arc<RadioArbiter> {
        &self.arbiter
    }

    pub fn gateway_id(&self) -> DeviceId {
        self.gateway_id
    }

    /// Acknowledges `header`, echoing the link quality it arrived with.
    pub async fn send_ack(&self, header: &PacketHeader, quality: LinkQuality) -> Result<TxReceipt> {
        let ack = Ack::new(header.sequence, true, quality.rssi, quality.snr);
        let frame = encode_frame(self.gateway_id, 0, &Payload::Ack(ack))?;
        match self.arbiter.transmit(&frame).await {
            Ok(receipt) => {
                bump(&self.stats.acks_sent);
                debug!(event = "ack_sent", device = %DeviceHex(header.device_id), seq = header.sequence);
                Ok(receipt)
            }
            Err(e) => {
                bump(&self.stats.ack_failures);
                warn!(event = "ack_failed", device = %DeviceHex(header.device_id), seq = header.sequence, error = %e);
                Err(e.into())
            }
        }
    }

    /// Addresses the frame to `device` so sleeping sensors can filter on it.
    pub async fn send_command(&self, device: DeviceId, command: &CommandPayload) -> Result<TxReceipt> {
        let seq = self.command_seq.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(device, seq, &Payload::Command(command.clone()))?;
        let receipt = self.arbiter.transmit(&frame).await?;
        bump(&self.stats.commands_sent);
        info!(
            event = "command_sent",
            device = %DeviceHex(device),
            command = command.command_type().map(|c| c.as_str()).unwrap_or("UNKNOWN"),
            params = %String::from_utf8_lossy(&command.params),
            seq,
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{RadioTiming, scripted::ScriptedRadio};
    use gateway_protocol::{CommandType, MessageType, decode_frame};

    fn path(radio: &ScriptedRadio) -> (TxPath, Arc<GatewayStats>) {
        let arbiter = Arc::new(RadioArbiter::new(Box::new(radio.clone()), RadioTiming::default()).unwrap());
        let stats = Arc::new(GatewayStats::default());
        (TxPath::new(arbiter, 0x6A7E_0000_0000_0001, stats.clone()), stats)
    }

    #[tokio::test(start_paused = true)]
    async fn ack_carries_gateway_id_and_echoed_quality() {
        let radio = ScriptedRadio::default();
        let (tx, stats) = path(&radio);
        let inbound = PacketHeader::new(MessageType::Readings, 0xAABB, 42, 21);
        tx.send_ack(&inbound, LinkQuality { rssi: -95, snr: -3 }).await.unwrap();

        let sent = decode_frame(&radio.sent()[0]).unwrap();
        assert_eq!(sent.header.device_id, 0x6A7E_0000_0000_0001);
        assert_eq!(sent.header.sequence, 0);
        match sent.payload {
            Payload::Ack(ack) => {
                assert_eq!(ack.ack_sequence, 42);
                assert!(ack.success);
                assert_eq!((ack.rssi, ack.snr), (-95, -3));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(stats.snapshot().acks_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_target_the_device_with_wrapping_seq() {
        let radio = ScriptedRadio::default();
        let (tx, stats) = path(&radio);
        tx.command_seq.store(u16::MAX, Ordering::Relaxed);
        let cmd = CommandPayload::new(CommandType::SetSleep, b"600").unwrap();
        tx.send_command(0xBEEF, &cmd).await.unwrap();
        tx.send_command(0xBEEF, &cmd).await.unwrap();

        let frames: Vec<_> = radio.sent().iter().map(|f| decode_frame(f).unwrap()).collect();
        assert_eq!(frames[0].header.device_id, 0xBEEF);
        assert_eq!(frames[0].header.sequence, u16::MAX);
        assert_eq!(frames[1].header.sequence, 0);
        assert_eq!(frames[0].payload, Payload::Command(cmd));
        assert_eq!(stats.snapshot().commands_sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ack_is_counted() {
        let radio = ScriptedRadio::default();
        radio.shared.lock().fail_tx = true;
        let (tx, stats) = path(&radio);
        let inbound = PacketHeader::new(MessageType::Status, 1, 1, 58);
        assert!(tx.send_ack(&inbound, LinkQuality::default()).await.is_err());
        assert_eq!(stats.snapshot().ack_failures, 1);
        assert_eq!(stats.snapshot().acks_sent, 0);
    }
}
