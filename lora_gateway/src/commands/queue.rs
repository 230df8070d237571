// commands/queue.rs: commands waiting for their device's next listening window
use crate::config::Config;
use crate::errors::{GatewayError, Result};
use crate::health::{GatewayStats, add, bump};
use crate::ids::DeviceHex;
use crate::tx::TxPath;
use gateway_protocol::{CommandParams, CommandPayload, CommandType, DeviceId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub device_id: DeviceId,
    pub command: CommandType,
    pub params: CommandParams,
    pub enqueued_at: Instant,
    pub retries: u32,
    /// Bumped on every add or refresh.
    pub generation: u64,
}

impl QueuedCommand {
    fn payload(&self) -> CommandPayload {
        CommandPayload { command: self.command.code(), params: self.params.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Enqueued {
    Added,
    /// Replaced the params of an entry for the same (device, command).
    Coalesced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityReport {
    pub attempted: usize,
    pub delivered: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct QueuePolicy {
    pub capacity: usize,
    pub ttl: Duration,
    pub retry_pause: Duration,
}

impl QueuePolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            capacity: cfg.queue_capacity,
            ttl: cfg.command_ttl(),
            retry_pause: cfg.retry_pause(),
        }
    }
}

pub struct CommandRetryQueue {
    entries: Mutex<Vec<QueuedCommand>>,
    next_generation: AtomicU64,
    policy: QueuePolicy,
    tx: Arc<TxPath>,
    stats: Arc<GatewayStats>,
}

impl CommandRetryQueue {
    pub fn new(policy: QueuePolicy, tx: Arc<TxPath>, stats: Arc<GatewayStats>) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(policy.capacity)),
            next_generation: AtomicU64::new(0),
            policy,
            tx,
            stats,
        }
    }

    /// Queues (or refreshes) a command, then tries it once right away.
    /// The immediate attempt never removes the entry.
    pub async fn enqueue(
        &self,
        device: DeviceId,
        command: CommandType,
        params: &[u8],
    ) -> Result<Enqueued> {
        let payload = CommandPayload::new(command, params)?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let outcome = {
            let mut entries = self.entries.lock();
            let existing = entries
                .iter()
                .position(|e| e.device_id == device && e.command == command);
            match existing {
                Some(i) => {
                    let entry = &mut entries[i];
                    entry.params = payload.params.clone();
                    entry.enqueued_at = Instant::now();
                    entry.retries = 0;
                    entry.generation = generation;
                    Enqueued::Coalesced
                }
                None if entries.len() >= self.policy.capacity => {
                    drop(entries);
                    bump(&self.stats.commands_rejected);
                    warn!(
                        event = "command_rejected",
                        device = %DeviceHex(device),
                        command = command.as_str(),
                        capacity = self.policy.capacity,
                    );
                    return Err(GatewayError::QueueFull { capacity: self.policy.capacity });
                }
                None => {
                    entries.push(QueuedCommand {
                        device_id: device,
                        command,
                        params: payload.params.clone(),
                        enqueued_at: Instant::now(),
                        retries: 0,
                        generation,
                    });
                    Enqueued::Added
                }
            }
        };
        info!(
            event = "command_queued",
            device = %DeviceHex(device),
            command = command.as_str(),
            ?outcome,
            depth = self.len(),
        );

        if let Err(e) = self.tx.send_command(device, &payload).await {
            debug!(event = "command_immediate_failed", device = %DeviceHex(device), error = %e);
        }
        Ok(outcome)
    }

    /// `device` just transmitted and is briefly listening: sweep expired
    /// entries, then try every command queued for it.
    pub async fn on_device_activity(&self, device: DeviceId) -> ActivityReport {
        self.purge_expired();

        let due: Vec<QueuedCommand> = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter(|e| e.device_id == device)
                .map(|e| {
                    e.retries += 1;
                    e.clone()
                })
                .collect()
        };

        let mut report = ActivityReport { attempted: due.len(), delivered: 0 };
        for (i, cmd) in due.iter().enumerate() {
            if i > 0 {
                time::sleep(self.policy.retry_pause).await;
            }
            match self.tx.send_command(device, &cmd.payload()).await {
                Ok(_) => {
                    report.delivered += 1;
                    // A refresh during the send keeps the newer entry queued.
                    self.entries.lock().retain(|e| {
                        !(e.device_id == device
                            && e.command == cmd.command
                            && e.generation == cmd.generation)
                    });
                }
                Err(e) => warn!(
                    event = "command_retry_failed",
                    device = %DeviceHex(device),
                    command = cmd.command.as_str(),
                    retries = cmd.retries,
                    error = %e,
                ),
            }
        }
        report
    }

    /// Drops entries older than the TTL regardless of retry count.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.policy.ttl;
        let mut expired = Vec::new();
        self.entries.lock().retain(|e| {
            let keep = now.duration_since(e.enqueued_at) <= ttl;
            if !keep {
                expired.push(e.clone());
            }
            keep
        });
        for e in &expired {
            warn!(
                event = "command_expired",
                device = %DeviceHex(e.device_id),
                command = e.command.as_str(),
                retries = e.retries,
            );
        }
        add(&self.stats.commands_expired, expired.len() as u64);
        expired.len()
    }

    pub fn depth(&self, device: DeviceId) -> usize {
        self.entries.lock().iter().filter(|e| e.device_id == device).count()
    }

    pub fn depths(&self) -> BTreeMap<DeviceId, usize> {
        let mut out = BTreeMap::new();
        for e in self.entries.lock().iter() {
            *out.entry(e.device_id).or_insert(0) += 1;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn pending(&self) -> Vec<QueuedCommand> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{RadioArbiter, RadioTiming, scripted::ScriptedRadio};
    use gateway_protocol::{Payload, decode_frame};

    const DEV: DeviceId = 0xAABB_CCDD_EEFF_0011;

    fn policy(capacity: usize) -> QueuePolicy {
        QueuePolicy {
            capacity,
            ttl: Duration::from_secs(300),
            retry_pause: Duration::from_millis(100),
        }
    }

    fn queue(radio: &ScriptedRadio, capacity: usize) -> (CommandRetryQueue, Arc<GatewayStats>) {
        let arbiter = Arc::new(RadioArbiter::new(Box::new(radio.clone()), RadioTiming::default()).unwrap());
        let stats = Arc::new(GatewayStats::default());
        let tx = Arc::new(TxPath::new(arbiter, 1, stats.clone()));
        (CommandRetryQueue::new(policy(capacity), tx, stats.clone()), stats)
    }

    #[tokio::test(start_paused = true)]
    async fn same_command_coalesces_with_newer_params() {
        let radio = ScriptedRadio::default();
        let (q, _) = queue(&radio, 10);
        assert_eq!(q.enqueue(DEV, CommandType::SetInterval, b"60").await.unwrap(), Enqueued::Added);
        assert_eq!(
            q.enqueue(DEV, CommandType::SetInterval, b"120").await.unwrap(),
            Enqueued::Coalesced
        );
        let pending = q.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].params.as_slice(), b"120");
        assert_eq!(pending[0].retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_rejects_new_pairs_but_still_coalesces() {
        let radio = ScriptedRadio::default();
        let (q, stats) = queue(&radio, 2);
        q.enqueue(DEV, CommandType::SetInterval, b"60").await.unwrap();
        q.enqueue(DEV, CommandType::SetSleep, b"900").await.unwrap();
        assert!(matches!(
            q.enqueue(DEV, CommandType::Restart, b"").await,
            Err(GatewayError::QueueFull { capacity: 2 })
        ));
        assert_eq!(q.enqueue(DEV, CommandType::SetSleep, b"600").await.unwrap(), Enqueued::Coalesced);
        assert_eq!(q.len(), 2);
        assert_eq!(stats.snapshot().commands_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_attempt_keeps_the_entry() {
        let radio = ScriptedRadio::default();
        let (q, _) = queue(&radio, 10);
        q.enqueue(DEV, CommandType::Calibrate, b"").await.unwrap();
        assert_eq!(radio.sent().len(), 1);
        assert_eq!(q.depth(DEV), 1);
        assert_eq!(q.pending()[0].retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_delivers_only_that_devices_commands() {
        let radio = ScriptedRadio::default();
        let (q, _) = queue(&radio, 10);
        q.enqueue(DEV, CommandType::SetInterval, b"60").await.unwrap();
        q.enqueue(DEV, CommandType::StatusRequest, b"").await.unwrap();
        q.enqueue(7, CommandType::Restart, b"").await.unwrap();
        let before = radio.sent().len();

        let started = Instant::now();
        let report = q.on_device_activity(DEV).await;
        assert_eq!(report, ActivityReport { attempted: 2, delivered: 2 });
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(q.depth(DEV), 0);
        assert_eq!(q.depth(7), 1);

        let sent = radio.sent();
        assert_eq!(sent.len(), before + 2);
        let frame = decode_frame(&sent[before]).unwrap();
        assert_eq!(frame.header.device_id, DEV);
        assert!(matches!(frame.payload, Payload::Command(c) if c.params.as_slice() == b"60"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_retries_count_up_and_stay_queued() {
        let radio = ScriptedRadio::default();
        let (q, _) = queue(&radio, 10);
        q.enqueue(DEV, CommandType::SetBaseline, b"1013.25").await.unwrap();
        radio.shared.lock().fail_tx = true;
        q.on_device_activity(DEV).await;
        q.on_device_activity(DEV).await;
        let pending = q.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_purged_regardless_of_retries() {
        let radio = ScriptedRadio::default();
        radio.shared.lock().fail_tx = true;
        let (q, stats) = queue(&radio, 10);
        q.enqueue(DEV, CommandType::Restart, b"").await.unwrap();
        q.on_device_activity(DEV).await;
        q.enqueue(9, CommandType::Calibrate, b"").await.unwrap();

        time::advance(Duration::from_secs(301)).await;
        let report = q.on_device_activity(DEV).await;
        assert_eq!(report.attempted, 0);
        assert!(q.is_empty());
        assert_eq!(stats.snapshot().commands_expired, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_extends_lifetime() {
        let radio = ScriptedRadio::default();
        let (q, _) = queue(&radio, 10);
        q.enqueue(DEV, CommandType::SetSleep, b"900").await.unwrap();
        time::advance(Duration::from_secs(200)).await;
        q.enqueue(DEV, CommandType::SetSleep, b"600").await.unwrap();
        time::advance(Duration::from_secs(200)).await;
        assert_eq!(q.purge_expired(), 0);
        assert_eq!(q.depths().get(&DEV), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_during_a_retry_survives_within_the_same_tick() {
        let radio = ScriptedRadio::default();
        let (q, _) = queue(&radio, 10);
        q.enqueue(DEV, CommandType::SetInterval, b"60").await.unwrap();
        let first = q.pending()[0].enqueued_at;

        // the retry parks on the busy line before any time has passed
        radio.shared.lock().busy_polls = 2;
        let (report, refreshed) = tokio::join!(
            q.on_device_activity(DEV),
            q.enqueue(DEV, CommandType::SetInterval, b"120"),
        );
        assert_eq!(report.delivered, 1);
        assert_eq!(refreshed.unwrap(), Enqueued::Coalesced);

        let pending = q.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].enqueued_at, first);
        assert_eq!(pending[0].params.as_slice(), b"120");
    }

    #[tokio::test]
    async fn oversized_params_never_enter_the_queue() {
        let radio = ScriptedRadio::default();
        let (q, _) = queue(&radio, 10);
        assert!(matches!(
            q.enqueue(DEV, CommandType::SetBaseline, &[b'1'; 239]).await,
            Err(GatewayError::Framing(_))
        ));
        assert!(q.is_empty());
    }
}
