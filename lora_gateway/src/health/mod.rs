// health/mod.rs: observability counters
pub mod heartbeat;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GatewayStats {
    pub frames_received: AtomicU64,
    pub frames_accepted: AtomicU64,
    pub frames_invalid: AtomicU64,
    pub frames_duplicate: AtomicU64,
    pub handoff_dropped: AtomicU64,
    pub acks_sent: AtomicU64,
    pub ack_failures: AtomicU64,
    pub commands_sent: AtomicU64,
    pub commands_expired: AtomicU64,
    pub commands_rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub frames_accepted: u64,
    pub frames_invalid: u64,
    pub frames_duplicate: u64,
    pub handoff_dropped: u64,
    pub acks_sent: u64,
    pub ack_failures: u64,
    pub commands_sent: u64,
    pub commands_expired: u64,
    pub commands_rejected: u64,
}

/// Relaxed increment; counters are independent and only read for reporting.
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl GatewayStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_received: read(&self.frames_received),
            frames_accepted: read(&self.frames_accepted),
            frames_invalid: read(&self.frames_invalid),
            frames_duplicate: read(&self.frames_duplicate),
            handoff_dropped: read(&self.handoff_dropped),
            acks_sent: read(&self.acks_sent),
            ack_failures: read(&self.ack_failures),
            commands_sent: read(&self.commands_sent),
            commands_expired: read(&self.commands_expired),
            commands_rejected: read(&self.commands_rejected),
        }
    }
}
