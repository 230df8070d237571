// commands/console.rs: line-oriented operator console (JSON requests + queries)
use super::handler::CommandRequest;
use crate::gateway::Gateway;
use crate::ids::format_id;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Reads until EOF, answering each non-blank line with one JSON line.
pub async fn run_console<R, W>(gateway: Gateway, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(reply) = respond(&gateway, line.trim()).await else { continue };
        output.write_all(reply.to_string().as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    info!(event = "console_closed");
    Ok(())
}

async fn respond(gateway: &Gateway, line: &str) -> Option<Value> {
    match line {
        "" => None,
        "stats" => Some(json!(gateway.stats())),
        "devices" => Some(json!(gateway.registry_snapshot())),
        "queue" => {
            let depths: BTreeMap<String, usize> = gateway
                .queue_depths()
                .into_iter()
                .map(|(id, n)| (format_id(id), n))
                .collect();
            Some(json!(depths))
        }
        _ => {
            let reply = match serde_json::from_str::<CommandRequest>(line) {
                Ok(req) => match gateway.submit(&req).await {
                    Ok(outcome) => json!({ "ok": true, "outcome": outcome }),
                    Err(e) => {
                        warn!(event = "console_command_rejected", device = %req.device_id, action = %req.action, error = %e);
                        json!({ "ok": false, "error": e.to_string() })
                    }
                },
                Err(e) => {
                    warn!(event = "console_bad_line", error = %e);
                    json!({ "ok": false, "error": format!("unrecognized input: {e}") })
                }
            };
            Some(reply)
        }
    }
}
