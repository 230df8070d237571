// telemetry/mod.rs: bounded hand-off from the receive context to the consumer context
pub mod bridge;
pub mod consumer;

pub use consumer::{Consumer, FrameSink};

use chrono::{DateTime, Utc};
use gateway_protocol::{PacketHeader, Payload};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Duration};

/// An accepted frame plus the radio metadata it arrived with.
#[derive(Debug, Clone, Serialize)]
pub struct ReceivedFrame {
    pub header: PacketHeader,
    pub payload: Payload,
    pub rssi: i16,
    pub snr: i8,
    pub received_at: DateTime<Utc>,
}

pub fn handoff(
    capacity: usize,
    send_timeout: Duration,
    recv_timeout: Duration,
) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (HandoffSender { tx, send_timeout }, HandoffReceiver { rx, recv_timeout })
}

#[derive(Clone)]
pub struct HandoffSender {
    tx: mpsc::Sender<ReceivedFrame>,
    send_timeout: Duration,
}

impl HandoffSender {
    /// Waits at most the send timeout; `false` means the frame was dropped.
    pub async fn offer(&self, frame: ReceivedFrame) -> bool {
        self.tx.send_timeout(frame, self.send_timeout).await.is_ok()
    }
}

#[derive(Debug)]
pub enum Handoff {
    Frame(ReceivedFrame),
    Idle,
    Closed,
}

pub struct HandoffReceiver {
    rx: mpsc::Receiver<ReceivedFrame>,
    recv_timeout: Duration,
}

impl HandoffReceiver {
    pub async fn next(&mut self) -> Handoff {
        match time::timeout(self.recv_timeout, self.rx.recv()).await {
            Ok(Some(frame)) => Handoff::Frame(frame),
            Ok(None) => Handoff::Closed,
            Err(_) => Handoff::Idle,
        }
    }
}
