// config.rs: command line + optional TOML file + GATEWAY_* environment
use anyhow::{Context, Result, ensure};
use clap::Parser;
use gateway_protocol::DeviceId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifier stamped on ACK frames; random when not configured.
    #[serde(with = "crate::ids::hex_id")]
    pub gateway_id: DeviceId,
    pub registry_path: PathBuf,
    pub log_dir: PathBuf,
    pub max_devices: usize,
    pub queue_capacity: usize,
    pub command_ttl_secs: u64,
    pub retry_pause_ms: u64,
    pub acquire_timeout_ms: u64,
    pub busy_timeout_ms: u64,
    pub busy_poll_ms: u64,
    pub rx_poll_ms: u64,
    pub handoff_capacity: usize,
    pub handoff_send_timeout_ms: u64,
    pub handoff_recv_timeout_ms: u64,
    pub stats_interval_secs: u64,
    pub radio_bind: String,
    pub radio_peer: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_id: rand::random(),
            registry_path: PathBuf::from("data/sensor_registry.json"),
            log_dir: PathBuf::from("logs"),
            max_devices: 10,
            queue_capacity: 10,
            command_ttl_secs: 300,
            retry_pause_ms: 100,
            acquire_timeout_ms: 5000,
            busy_timeout_ms: 1000,
            busy_poll_ms: 1,
            rx_poll_ms: 10,
            handoff_capacity: 20,
            handoff_send_timeout_ms: 100,
            handoff_recv_timeout_ms: 100,
            stats_interval_secs: 60,
            radio_bind: "0.0.0.0:1700".into(),
            radio_peer: "127.0.0.1:1701".into(),
        }
    }
}

impl Config {
    pub fn command_ttl(&self) -> Duration {
        Duration::from_secs(self.command_ttl_secs)
    }
    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
    pub fn busy_poll(&self) -> Duration {
        Duration::from_millis(self.busy_poll_ms)
    }
    pub fn rx_poll(&self) -> Duration {
        Duration::from_millis(self.rx_poll_ms)
    }
    pub fn handoff_send_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_send_timeout_ms)
    }
    pub fn handoff_recv_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_recv_timeout_ms)
    }
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.max_devices > 0, "max_devices must be at least 1");
        ensure!(self.queue_capacity > 0, "queue_capacity must be at least 1");
        ensure!(self.handoff_capacity > 0, "handoff_capacity must be at least 1");
        ensure!(self.busy_poll_ms > 0, "busy_poll_ms must be at least 1");
        ensure!(self.rx_poll_ms > 0, "rx_poll_ms must be at least 1");
        ensure!(self.stats_interval_secs > 0, "stats_interval_secs must be at least 1");
        Ok(())
    }
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "lora_gateway", about = "LoRa sensor gateway radio engine")]
pub struct Cli {
    /// TOML file layered under GATEWAY_* environment variables.
    #[arg(long)]                  pub config: Option<PathBuf>,
    #[arg(long)]                  pub gateway_id: Option<String>,
    #[arg(long)]                  pub registry_path: Option<PathBuf>,
    #[arg(long)]                  pub log_dir: Option<PathBuf>,
    #[arg(long)]                  pub radio_bind: Option<String>,
    #[arg(long)]                  pub radio_peer: Option<String>,
    #[arg(long)]                  pub max_devices: Option<usize>,
    #[arg(long)]                  pub queue_capacity: Option<usize>,
    #[arg(long)]                  pub command_ttl_secs: Option<u64>,
    /// Print the effective configuration as TOML and exit.
    #[arg(long, default_value_t = false)] pub print_config: bool,
}

impl Cli {
    pub fn parse_and_build_config() -> Result<(Cli, Config)> {
        let cli = <Cli as Parser>::parse();
        let cfg = cli.build_config()?;
        Ok((cli, cfg))
    }

    pub fn build_config(&self) -> Result<Config> {
        let mut builder = config::Config::builder();
        if let Some(path) = &self.config {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix("GATEWAY").try_parsing(true));
        let mut cfg: Config = builder
            .build()
            .context("loading configuration")?
            .try_deserialize()
            .context("parsing configuration")?;

        if let Some(id) = &self.gateway_id {
            cfg.gateway_id = crate::ids::parse_id(id)
                .with_context(|| format!("invalid --gateway-id {id:?}"))?;
        }
        if let Some(p) = &self.registry_path { cfg.registry_path = p.clone(); }
        if let Some(p) = &self.log_dir { cfg.log_dir = p.clone(); }
        if let Some(a) = &self.radio_bind { cfg.radio_bind = a.clone(); }
        if let Some(a) = &self.radio_peer { cfg.radio_peer = a.clone(); }
        if let Some(n) = self.max_devices { cfg.max_devices = n; }
        if let Some(n) = self.queue_capacity { cfg.queue_capacity = n; }
        if let Some(n) = self.command_ttl_secs { cfg.command_ttl_secs = n; }

        cfg.validate()?;
        Ok(cfg)
    }
}

pub fn render_toml(cfg: &Config) -> Result<String> {
    Ok(toml::to_string_pretty(cfg)?)
}
