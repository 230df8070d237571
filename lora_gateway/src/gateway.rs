// gateway.rs: the engine's shared components and the surface offered to collaborators
use crate::commands::{CommandRequest, CommandRetryQueue, Enqueued, QueuePolicy};
use crate::config::Config;
use crate::errors::Result;
use crate::health::{GatewayStats, StatsSnapshot, heartbeat};
use crate::ids::DeviceHex;
use crate::radio::{RadioArbiter, RadioState, RadioTiming, Transceiver};
use crate::registry::{DeviceRecord, DeviceRegistry, RegistryStore};
use crate::rx::RxLoop;
use crate::telemetry::{Consumer, FrameSink, HandoffSender, handoff};
use crate::tx::TxPath;
use gateway_protocol::{CommandType, DeviceId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Clone)]
pub struct Gateway {
    cfg: Arc<Config>,
    registry: Arc<DeviceRegistry>,
    arbiter: Arc<RadioArbiter>,
    tx: Arc<TxPath>,
    queue: Arc<CommandRetryQueue>,
    stats: Arc<GatewayStats>,
}

impl Gateway {
    /// Arms the radio and loads the registry. A radio that fails to arm is
    /// returned as an error for the caller to treat as fatal.
    pub async fn start(
        cfg: Config,
        device: Box<dyn Transceiver>,
        store: Arc<dyn RegistryStore>,
    ) -> Result<Self> {
        let arbiter = Arc::new(RadioArbiter::new(device, RadioTiming::from_config(&cfg))?);
        let stats = Arc::new(GatewayStats::default());
        let registry = Arc::new(DeviceRegistry::load(store, cfg.max_devices).await);
        let tx = Arc::new(TxPath::new(arbiter.clone(), cfg.gateway_id, stats.clone()));
        let queue = Arc::new(CommandRetryQueue::new(
            QueuePolicy::from_config(&cfg),
            tx.clone(),
            stats.clone(),
        ));
        info!(
            event = "gateway_ready",
            gateway = %DeviceHex(cfg.gateway_id),
            devices = registry.len(),
            max_devices = cfg.max_devices,
        );
        Ok(Self { cfg: Arc::new(cfg), registry, arbiter, tx, queue, stats })
    }

    pub fn receive_loop(&self, handoff: HandoffSender) -> RxLoop {
        RxLoop {
            arbiter: self.arbiter.clone(),
            registry: self.registry.clone(),
            queue: self.queue.clone(),
            tx: self.tx.clone(),
            handoff,
            stats: self.stats.clone(),
            poll: self.cfg.rx_poll(),
        }
    }

    /// Starts the receive context, the consumer context and the stats reporter.
    pub fn spawn(&self, sink: Arc<dyn FrameSink>) -> Vec<JoinHandle<()>> {
        let (to_consumer, from_rx) = handoff(
            self.cfg.handoff_capacity,
            self.cfg.handoff_send_timeout(),
            self.cfg.handoff_recv_timeout(),
        );
        let rx = self.receive_loop(to_consumer);
        let consumer = Consumer::new(self.registry.clone(), sink);
        vec![
            tokio::spawn(rx.run()),
            tokio::spawn(consumer.run(from_rx)),
            heartbeat::spawn_stats_reporter(
                self.stats.clone(),
                self.registry.clone(),
                self.queue.clone(),
                self.cfg.stats_interval(),
            ),
        ]
    }

    pub async fn enqueue_command(
        &self,
        device: DeviceId,
        command: CommandType,
        params: &[u8],
    ) -> Result<Enqueued> {
        self.queue.enqueue(device, command, params).await
    }

    /// Validates an external request before it can reach the queue.
    pub async fn submit(&self, request: &CommandRequest) -> Result<Enqueued> {
        let valid = request.validate()?;
        self.enqueue_command(valid.device_id, valid.command, &valid.params).await
    }

    pub fn registry_snapshot(&self) -> Vec<DeviceRecord> {
        self.registry.snapshot()
    }

    pub fn queue_depth(&self, device: DeviceId) -> usize {
        self.queue.depth(device)
    }

    pub fn queue_depths(&self) -> BTreeMap<DeviceId, usize> {
        self.queue.depths()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn radio_state(&self) -> RadioState {
        self.arbiter.state()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub async fn persist_registry(&self) {
        self.registry.persist().await;
    }
}
