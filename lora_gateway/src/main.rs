// src/main.rs
use anyhow::{Context, Result};
use lora_gateway::{
    Gateway,
    commands::console,
    config::{self, Cli},
    logging::{self, packets::PacketLog},
    net::UdpLink,
    registry,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // -------- config ----------
    let (cli, cfg) = Cli::parse_and_build_config()?;
    if cli.print_config {
        print!("{}", config::render_toml(&cfg)?);
        return Ok(());
    }

    // -------- logging ----------
    let _log_guard = logging::init(&cfg.log_dir)?;
    info!(?cfg, "LoRa gateway starting");

    // -------- radio + storage ----------
    let radio = UdpLink::connect(&cfg.radio_bind, &cfg.radio_peer)
        .await
        .context("radio initialization failed")?;
    let store = registry::open_store(&cfg.registry_path).await;
    let gateway = Gateway::start(cfg.clone(), Box::new(radio), store).await?;

    // -------- spawn contexts ----------
    let sink = Arc::new(PacketLog::open(&cfg.log_dir).await?);
    let mut tasks = gateway.spawn(sink);

    // Operator console on stdin
    let console_gw = gateway.clone();
    tasks.push(tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = console::run_console(console_gw, stdin, tokio::io::stdout()).await {
            warn!(?e, "console stopped");
        }
    }));

    info!("gateway running. Press Ctrl+C to stop…");

    // -------- graceful shutdown ----------
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "failed to install Ctrl+C handler");
    }
    info!("shutdown signal received; exiting.");
    for t in &tasks {
        t.abort();
    }
    gateway.persist_registry().await;
    info!(stats = ?gateway.stats(), "final counters");
    Ok(())
}
