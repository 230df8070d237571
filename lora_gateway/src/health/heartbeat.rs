// health/heartbeat.rs: periodic stats report + command expiry sweep
use super::GatewayStats;
use crate::commands::CommandRetryQueue;
use crate::registry::DeviceRegistry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::info;

pub fn spawn_stats_reporter(
    stats: Arc<GatewayStats>,
    registry: Arc<DeviceRegistry>,
    queue: Arc<CommandRetryQueue>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        tick.tick().await;
        loop {
            tick.tick().await;
            // Sleeping devices may never wake; expire without waiting for activity.
            queue.purge_expired();
            let s = stats.snapshot();
            info!(
                event = "stats",
                received = s.frames_received,
                accepted = s.frames_accepted,
                invalid = s.frames_invalid,
                duplicate = s.frames_duplicate,
                handoff_dropped = s.handoff_dropped,
                acks_sent = s.acks_sent,
                ack_failures = s.ack_failures,
                commands_sent = s.commands_sent,
                commands_expired = s.commands_expired,
                commands_rejected = s.commands_rejected,
                devices = registry.len(),
                queued = queue.len(),
            );
        }
    })
}
