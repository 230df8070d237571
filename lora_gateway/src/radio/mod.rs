// radio/mod.rs: transceiver seam + half-duplex arbitration
pub mod arbiter;

pub use arbiter::{RadioArbiter, RadioState, RadioTiming, RxFrame, TxReceipt};

use crate::errors::RadioError;
use serde::Serialize;

/// Signal quality of the most recent packet seen by the radio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkQuality {
    pub rssi: i16,
    pub snr: i8,
}

/// One physical half-duplex transceiver. Calls are short and synchronous;
/// callers serialize them through [`RadioArbiter`].
#[cfg_attr(test, mockall::automock)]
pub trait Transceiver: Send {
    /// Arm continuous receive with the "packet ready" interrupt enabled.
    fn start_receive(&mut self) -> Result<(), RadioError>;
    /// Leave receive mode without losing configuration.
    fn standby(&mut self) -> Result<(), RadioError>;
    fn is_busy(&self) -> bool;
    /// Latched "packet received" signal.
    fn irq_pending(&self) -> bool;
    /// Copies the pending packet into `buf`, clearing the latch.
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, RadioError>;
    fn link_quality(&self) -> LinkQuality;
    fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError>;
}
