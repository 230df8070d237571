// ids.rs: 64-bit device identifiers as 16 upper-case hex digits
use gateway_protocol::DeviceId;
use std::fmt;

/// Display adapter for log fields: `device = %DeviceHex(id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHex(pub DeviceId);

impl fmt::Display for DeviceHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

pub fn format_id(id: DeviceId) -> String {
    hex::encode_upper(id.to_be_bytes())
}

/// Accepts 1..=16 hex digits with an optional `0x` prefix.
pub fn parse_id(text: &str) -> Option<DeviceId> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() || digits.len() > 16 {
        return None;
    }
    let padded = format!("{digits:0>16}");
    let mut raw = [0u8; 8];
    hex::decode_to_slice(padded, &mut raw).ok()?;
    Some(DeviceId::from_be_bytes(raw))
}

/// serde `with` module storing a [`DeviceId`] as a hex string.
pub mod hex_id {
    use super::{format_id, parse_id};
    use gateway_protocol::DeviceId;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &DeviceId, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_id(*id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DeviceId, D::Error> {
        let text = String::deserialize(d)?;
        parse_id(&text).ok_or_else(|| D::Error::custom(format!("invalid device id {text:?}")))
    }
}
