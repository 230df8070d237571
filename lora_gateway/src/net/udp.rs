// net/udp.rs: UDP datagrams standing in for the RF channel (sensor emulator link)
use crate::errors::RadioError;
use crate::radio::{LinkQuality, Transceiver};
use gateway_protocol::MAX_FRAME_LEN;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{info, warn};

/// Reported for every datagram; UDP carries no signal metrics.
const SYNTHETIC_QUALITY: LinkQuality = LinkQuality { rssi: -60, snr: 10 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Standby,
    Receive,
}

pub struct UdpLink {
    socket: UdpSocket,
    peer: SocketAddr,
    mode: Mode,
    /// One datagram latched by `irq_pending`, consumed by `read_frame`.
    pending: Mutex<Option<Vec<u8>>>,
}

impl UdpLink {
    pub async fn connect(bind: &str, peer: &str) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| RadioError::Init(format!("bind {bind}: {e}")))?;
        let peer = tokio::net::lookup_host(peer)
            .await
            .map_err(|e| RadioError::Init(format!("resolve {peer}: {e}")))?
            .next()
            .ok_or_else(|| RadioError::Init(format!("no address for {peer}")))?;
        let local = socket.local_addr().map_err(|e| RadioError::Init(e.to_string()))?;
        info!(event = "udp_link_up", %local, %peer);
        Ok(Self { socket, peer, mode: Mode::Standby, pending: Mutex::new(None) })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transceiver for UdpLink {
    fn start_receive(&mut self) -> Result<(), RadioError> {
        self.mode = Mode::Receive;
        Ok(())
    }

    fn standby(&mut self) -> Result<(), RadioError> {
        self.mode = Mode::Standby;
        Ok(())
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn irq_pending(&self) -> bool {
        if self.mode != Mode::Receive {
            return false;
        }
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return true;
        }
        let mut buf = [0u8; MAX_FRAME_LEN];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, _from)) => {
                *pending = Some(buf[..n].to_vec());
                true
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(e) => {
                warn!(event = "udp_recv_error", error = %e);
                false
            }
        }
    }

    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, RadioError> {
        let frame = self
            .pending
            .get_mut()
            .take()
            .ok_or_else(|| RadioError::Hardware("no datagram latched".into()))?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }

    fn link_quality(&self) -> LinkQuality {
        SYNTHETIC_QUALITY
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        self.socket
            .try_send_to(frame, self.peer)
            .map(|_| ())
            .map_err(|e| RadioError::Hardware(format!("udp send: {e}")))
    }
}
