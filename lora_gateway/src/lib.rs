// lib.rs: LoRa gateway radio engine
//
// Receive context: radio::RadioArbiter -> rx::RxLoop -> telemetry hand-off.
// Consumer context: telemetry::Consumer -> FrameSink.
// Both contexts transmit through tx::TxPath, which serializes on the arbiter.

pub mod commands;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod health;
pub mod ids;
pub mod logging;
pub mod net;
pub mod radio;
pub mod registry;
pub mod rx;
pub mod telemetry;
pub mod tx;

pub use gateway::Gateway;
