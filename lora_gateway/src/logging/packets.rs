// logging/packets.rs: packets.csv + bridge-format JSON events for every forwarded frame
use crate::ids::format_id;
use crate::registry::DeviceRecord;
use crate::telemetry::{FrameSink, ReceivedFrame, bridge};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{info, warn};

const HEADER: &str = "ts,device_id,device_name,msg_type,seq,rssi,snr\n";

pub struct PacketLog {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
}

impl PacketLog {
    pub async fn open(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir).await?;
        let path = dir.join("packets.csv");
        let fresh = !fs::try_exists(&path).await.unwrap_or(false);
        let f = OpenOptions::new().create(true).append(true).open(&path).await?;
        let mut writer = BufWriter::new(f);
        if fresh {
            writer.write_all(HEADER.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok(Self { path, file: Mutex::new(writer) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut f = self.file.lock().await;
        f.write_all(line.as_bytes()).await?;
        f.flush().await
    }
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[async_trait]
impl FrameSink for PacketLog {
    async fn deliver(&self, frame: &ReceivedFrame, device: Option<&DeviceRecord>) {
        let kind = frame
            .header
            .message_type()
            .map(|t| format!("{t:?}").to_lowercase())
            .unwrap_or_else(|| format!("0x{:02x}", frame.header.msg_type));
        let name = device.map(|d| d.name.as_str()).unwrap_or("");
        let line = format!(
            "{},{},{},{},{},{},{}\n",
            frame.received_at.to_rfc3339(),
            format_id(frame.header.device_id),
            csv_field(name),
            kind,
            frame.header.sequence,
            frame.rssi,
            frame.snr,
        );
        if let Err(e) = self.append(&line).await {
            warn!(event = "packet_log_write_failed", path = %self.path.display(), error = %e);
        }

        if let Some(msg) = bridge::render(frame, device) {
            info!(event = "bridge_publish", topic = %msg.topic, body = %msg.body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gateway_protocol::{Event, EventKind, PacketHeader, Payload, Severity};

    #[tokio::test]
    async fn appends_one_row_per_frame_under_a_single_header() {
        let dir = std::env::temp_dir().join(format!("gw-packets-{}", rand::random::<u64>()));
        let log = PacketLog::open(&dir).await.unwrap();
        let payload = Payload::Event(Event {
            kind: EventKind::Startup,
            severity: Severity::Info,
            message: "boot".into(),
        });
        let frame = ReceivedFrame {
            header: PacketHeader::new(payload.msg_type(), 0x42, 7, 7),
            payload,
            rssi: -90,
            snr: -2,
            received_at: Utc::now(),
        };
        let mut rec = DeviceRecord::new(0x42);
        rec.name = "attic, east".into();
        log.deliver(&frame, Some(&rec)).await;
        log.deliver(&frame, None).await;
        drop(log);

        let reopened = PacketLog::open(&dir).await.unwrap();
        let text = std::fs::read_to_string(reopened.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HEADER.trim_end());
        assert!(lines[1].ends_with(",0000000000000042,\"attic, east\",event,7,-90,-2"));
        assert!(lines[2].contains(",0000000000000042,,event,7,"));
    }
}
