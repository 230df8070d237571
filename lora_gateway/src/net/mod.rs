// net/mod.rs
pub mod udp;

pub use udp::UdpLink;
