// radio/arbiter.rs: exclusive ownership of the single half-duplex transceiver
use super::{LinkQuality, Transceiver};
use crate::{config::Config, errors::RadioError};
use chrono::{DateTime, Utc};
use gateway_protocol::MAX_FRAME_LEN;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// Armed for continuous receive; the steady state.
    Receiving,
    /// Held by a transmit in progress.
    Transmitting,
    /// A packet was read out and receive has not been re-armed yet.
    Idle,
    /// Re-arming failed; the receive loop keeps retrying.
    Fault,
}

#[derive(Debug, Clone, Copy)]
pub struct RadioTiming {
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
    pub busy_poll: Duration,
}

impl RadioTiming {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            acquire_timeout: cfg.acquire_timeout(),
            busy_timeout: cfg.busy_timeout(),
            busy_poll: cfg.busy_poll(),
        }
    }
}

impl Default for RadioTiming {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_millis(5000),
            busy_timeout: Duration::from_millis(1000),
            busy_poll: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub bytes: usize,
    /// Time spent waiting for the lock and the busy line.
    pub waited: Duration,
}

#[derive(Debug, Clone)]
pub struct RxFrame {
    pub bytes: Vec<u8>,
    pub quality: LinkQuality,
    pub received_at: DateTime<Utc>,
}

struct Radio {
    device: Box<dyn Transceiver>,
    state: RadioState,
}

impl Radio {
    fn arm(&mut self) -> RadioState {
        self.state = match self.device.start_receive() {
            Ok(()) => RadioState::Receiving,
            Err(e) => {
                warn!(event = "rx_rearm_failed", error = %e);
                RadioState::Fault
            }
        };
        self.state
    }
}

pub struct RadioArbiter {
    radio: Mutex<Radio>,
    /// Serializes transmitters; the receive path never takes it.
    tx_lock: tokio::sync::Mutex<()>,
    timing: RadioTiming,
}

/// Held for the whole of a transmit. Dropping it (normal return, error or
/// cancellation) re-arms receive before the next transmitter gets the lock.
struct TxGuard<'a> {
    arbiter: &'a RadioArbiter,
    _permit: tokio::sync::MutexGuard<'a, ()>,
}

impl Drop for TxGuard<'_> {
    fn drop(&mut self) {
        self.arbiter.radio.lock().arm();
    }
}

impl RadioArbiter {
    /// Arms receive once; a radio that cannot be armed at startup is fatal.
    pub fn new(mut device: Box<dyn Transceiver>, timing: RadioTiming) -> Result<Self, RadioError> {
        device
            .start_receive()
            .map_err(|e| RadioError::Init(e.to_string()))?;
        Ok(Self {
            radio: Mutex::new(Radio { device, state: RadioState::Receiving }),
            tx_lock: tokio::sync::Mutex::new(()),
            timing,
        })
    }

    pub fn state(&self) -> RadioState {
        self.radio.lock().state
    }

    pub fn link_quality(&self) -> LinkQuality {
        self.radio.lock().device.link_quality()
    }

    pub async fn transmit(&self, frame: &[u8]) -> Result<TxReceipt, RadioError> {
        let started = Instant::now();
        let permit = time::timeout(self.timing.acquire_timeout, self.tx_lock.lock())
            .await
            .map_err(|_| RadioError::AcquireTimeout(self.timing.acquire_timeout))?;
        let _guard = TxGuard { arbiter: self, _permit: permit };

        {
            let mut radio = self.radio.lock();
            radio.state = RadioState::Transmitting;
            radio.device.standby()?;
        }
        self.wait_until_free().await?;
        let waited = started.elapsed();

        self.radio.lock().device.transmit(frame)?;
        debug!(event = "radio_tx", bytes = frame.len(), waited_ms = waited.as_millis() as u64);
        Ok(TxReceipt { bytes: frame.len(), waited })
    }

    async fn wait_until_free(&self) -> Result<(), RadioError> {
        let deadline = Instant::now() + self.timing.busy_timeout;
        loop {
            let busy = self.radio.lock().device.is_busy();
            if !busy {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RadioError::BusyTimeout(self.timing.busy_timeout));
            }
            time::sleep(self.timing.busy_poll).await;
        }
    }

    /// Non-blocking poll used by the receive loop. Yields nothing while a
    /// transmit owns the radio.
    pub fn on_receive_ready(&self) -> Option<RxFrame> {
        let mut radio = self.radio.try_lock()?;
        if radio.state != RadioState::Receiving || !radio.device.irq_pending() {
            return None;
        }
        let mut buf = [0u8; MAX_FRAME_LEN];
        match radio.device.read_frame(&mut buf) {
            Ok(n) => {
                radio.state = RadioState::Idle;
                Some(RxFrame {
                    bytes: buf[..n].to_vec(),
                    quality: radio.device.link_quality(),
                    received_at: Utc::now(),
                })
            }
            Err(e) => {
                warn!(event = "rx_read_failed", error = %e);
                radio.arm();
                None
            }
        }
    }

    /// Restores receive after a readout or a failed re-arm. Leaves an
    /// already-receiving or transmitting radio alone.
    pub fn rearm(&self) -> Option<RadioState> {
        let mut radio = self.radio.try_lock()?;
        match radio.state {
            RadioState::Receiving | RadioState::Transmitting => Some(radio.state),
            RadioState::Idle | RadioState::Fault => Some(radio.arm()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{MockTransceiver, scripted::ScriptedRadio};
    use std::sync::Arc;

    fn arbiter(radio: &ScriptedRadio) -> RadioArbiter {
        RadioArbiter::new(Box::new(radio.clone()), RadioTiming::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn successful_transmit_returns_to_receiving() {
        let radio = ScriptedRadio::default();
        let arb = arbiter(&radio);
        let receipt = arb.transmit(&[1, 2, 3]).await.unwrap();
        assert_eq!(receipt.bytes, 3);
        assert_eq!(arb.state(), RadioState::Receiving);
        assert_eq!(radio.sent(), vec![vec![1, 2, 3]]);
        assert!(radio.shared.lock().receiving);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transmit_still_returns_to_receiving() {
        let radio = ScriptedRadio::default();
        radio.shared.lock().fail_tx = true;
        let arb = arbiter(&radio);
        assert!(matches!(arb.transmit(&[9]).await, Err(RadioError::Hardware(_))));
        assert_eq!(arb.state(), RadioState::Receiving);
        assert!(radio.shared.lock().receiving);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_busy_line_times_out() {
        let radio = ScriptedRadio::default();
        radio.shared.lock().busy_polls = u32::MAX;
        let arb = arbiter(&radio);
        let err = arb.transmit(&[1]).await.unwrap_err();
        assert_eq!(err, RadioError::BusyTimeout(Duration::from_millis(1000)));
        assert_eq!(arb.state(), RadioState::Receiving);
        assert!(radio.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn brief_busy_is_waited_out() {
        let radio = ScriptedRadio::default();
        radio.shared.lock().busy_polls = 5;
        let arb = arbiter(&radio);
        let receipt = arb.transmit(&[1]).await.unwrap();
        assert!(receipt.waited >= Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_wait_is_bounded() {
        let radio = ScriptedRadio::default();
        let arb = arbiter(&radio);
        let _held = arb.tx_lock.lock().await;
        let err = arb.transmit(&[1]).await.unwrap_err();
        assert_eq!(err, RadioError::AcquireTimeout(Duration::from_millis(5000)));
        assert_eq!(arb.state(), RadioState::Receiving);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_senders_never_overlap() {
        let radio = ScriptedRadio::default();
        radio.shared.lock().busy_polls = 3;
        let arb = Arc::new(arbiter(&radio));
        let (a, b) = tokio::join!(arb.transmit(&[0xA]), arb.transmit(&[0xB]));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(radio.sent().len(), 2);
        assert_eq!(arb.state(), RadioState::Receiving);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_transmit_rearms_receive() {
        let radio = ScriptedRadio::default();
        radio.shared.lock().busy_polls = u32::MAX;
        let arb = arbiter(&radio);
        let cut = time::timeout(Duration::from_millis(50), arb.transmit(&[1])).await;
        assert!(cut.is_err());
        assert_eq!(arb.state(), RadioState::Receiving);
        assert!(radio.shared.lock().receiving);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_poll_reads_then_goes_idle() {
        let radio = ScriptedRadio::default();
        let arb = arbiter(&radio);
        assert!(arb.on_receive_ready().is_none());
        radio.push_inbound(vec![0xAA, 0x55, 7]);
        let frame = arb.on_receive_ready().unwrap();
        assert_eq!(frame.bytes, vec![0xAA, 0x55, 7]);
        assert_eq!(frame.quality, LinkQuality { rssi: -72, snr: 9 });
        assert_eq!(arb.state(), RadioState::Idle);
        assert_eq!(arb.rearm(), Some(RadioState::Receiving));
    }

    #[test]
    fn rearm_failure_is_a_fault_until_retried() {
        let mut mock = MockTransceiver::new();
        let mut calls = 0;
        mock.expect_start_receive().returning(move || {
            calls += 1;
            if calls == 2 { Err(RadioError::Hardware("spi".into())) } else { Ok(()) }
        });
        mock.expect_irq_pending().return_const(true);
        mock.expect_read_frame().returning(|buf| {
            buf[0] = 1;
            Ok(1)
        });
        mock.expect_link_quality().return_const(LinkQuality::default());

        let arb = RadioArbiter::new(Box::new(mock), RadioTiming::default()).unwrap();
        assert!(arb.on_receive_ready().is_some());
        assert_eq!(arb.rearm(), Some(RadioState::Fault));
        assert!(arb.on_receive_ready().is_none());
        assert_eq!(arb.rearm(), Some(RadioState::Receiving));
    }

    #[test]
    fn init_failure_is_reported() {
        let mut mock = MockTransceiver::new();
        mock.expect_start_receive()
            .returning(|| Err(RadioError::Hardware("no chip".into())));
        assert!(matches!(
            RadioArbiter::new(Box::new(mock), RadioTiming::default()),
            Err(RadioError::Init(_))
        ));
    }
}
