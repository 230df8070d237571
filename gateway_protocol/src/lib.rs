// lib.rs: LoRa sensor link wire format (header framing + per-type payloads)
//
// Every integer on the wire is little-endian. Frames are decoded field by field
// from byte slices; nothing here is ever reinterpreted in place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================== Common =====================================

pub type DeviceId = u64;

pub const MAGIC: [u8; 2] = [0xAA, 0x55];
pub const PROTOCOL_VERSION: u8 = 1;

/// magic(2) version(1) type(1) device(8) seq(2) len(1) checksum(1)
pub const HEADER_LEN: usize = 16;
pub const MAX_PAYLOAD_LEN: usize = 240;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;
pub const MAX_COMMAND_PARAMS: usize = 238;

pub const READINGS_LEN: usize = 21;
pub const STATUS_LEN: usize = 58;
pub const ACK_LEN: usize = 7;
pub const EVENT_MIN_LEN: usize = 3;
pub const COMMAND_MIN_LEN: usize = 2;

/// Fixed width of the NUL-padded name/location fields in STATUS.
pub const TEXT_FIELD_LEN: usize = 16;

/// Scale factors for fixed-point sensor values.
pub const CENTI: f64 = 100.0;
pub const MILLI: f64 = 1000.0;

/// Parameter block of a COMMAND payload; capacity is the wire limit.
pub type CommandParams = heapless::Vec<u8, MAX_COMMAND_PARAMS>;

// =============================== Errors =====================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("frame too short: {len} bytes, header needs {min}", min = HEADER_LEN)]
    TooShort { len: usize },
    #[error("bad magic {0:02X?}")]
    BadMagic([u8; 2]),
    #[error("header checksum mismatch: computed {computed:#04X}, received {received:#04X}")]
    ChecksumMismatch { computed: u8, received: u8 },
    #[error("unknown message type {0:#04X}")]
    UnknownMessageType(u8),
    #[error("{msg_type:?} payload must be {expected} bytes, got {actual}")]
    PayloadSize { msg_type: MessageType, expected: usize, actual: usize },
    #[error("{msg_type:?} payload needs at least {min} bytes, got {actual}")]
    PayloadTooShort { msg_type: MessageType, min: usize, actual: usize },
    #[error("command parameters too long: {0} bytes (max {max})", max = MAX_COMMAND_PARAMS)]
    ParamsTooLong(usize),
    #[error("truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("payload too large: {0} bytes (max {max})", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge(usize),
}

// =============================== Enums ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageType {
    Readings = 0x10,
    Status = 0x11,
    Event = 0x12,
    Command = 0x20,
    Ack = 0x21,
}

impl MessageType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x10 => Some(Self::Readings),
            0x11 => Some(Self::Status),
            0x12 => Some(Self::Event),
            0x20 => Some(Self::Command),
            0x21 => Some(Self::Ack),
            _ => None,
        }
    }

    /// Sensor-originated reports get a link-layer ACK; commands and ACKs do not.
    pub fn requires_ack(self) -> bool {
        matches!(self, Self::Readings | Self::Status | Self::Event)
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FramingError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(FramingError::UnknownMessageType(code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CommandType {
    Calibrate = 0x01,
    SetBaseline = 0x02,
    ClearBaseline = 0x03,
    Restart = 0x04,
    StatusRequest = 0x05,
    SetSleep = 0x06,
    SetInterval = 0x07,
}

impl CommandType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Calibrate),
            0x02 => Some(Self::SetBaseline),
            0x03 => Some(Self::ClearBaseline),
            0x04 => Some(Self::Restart),
            0x05 => Some(Self::StatusRequest),
            0x06 => Some(Self::SetSleep),
            0x07 => Some(Self::SetInterval),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calibrate => "CALIBRATE",
            Self::SetBaseline => "SET_BASELINE",
            Self::ClearBaseline => "CLEAR_BASELINE",
            Self::Restart => "RESTART",
            Self::StatusRequest => "STATUS",
            Self::SetSleep => "SET_SLEEP",
            Self::SetInterval => "SET_INTERVAL",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    #[default]
    Unknown,
    Bme280,
    Ds18b20,
}

impl SensorKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Bme280,
            2 => Self::Ds18b20,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Bme280 => 1,
            Self::Ds18b20 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Bme280 => "BME280",
            Self::Ds18b20 => "DS18B20",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Startup,
    SensorFault,
    LowBattery,
    Other(u8),
}

impl EventKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Startup,
            0x02 => Self::SensorFault,
            0x03 => Self::LowBattery,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Startup => 0x01,
            Self::SensorFault => 0x02,
            Self::LowBattery => 0x03,
            Self::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Other(u8),
}

impl Severity {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Info,
            1 => Self::Warning,
            2 => Self::Error,
            3 => Self::Critical,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
            Self::Critical => 3,
            Self::Other(code) => code,
        }
    }
}

// ============================ Fixed point ===================================

pub fn from_fixed(raw: impl Into<f64>, scale: f64) -> f64 {
    raw.into() / scale
}

/// `as` saturates, so out-of-range values clamp to the field limits.
pub fn to_fixed_i16(value: f64, scale: f64) -> i16 {
    (value * scale).round() as i16
}

pub fn to_fixed_u16(value: f64, scale: f64) -> u16 {
    (value * scale).round() as u16
}

pub fn to_fixed_u32(value: f64, scale: f64) -> u32 {
    (value * scale).round() as u32
}

// ================================ Header ====================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub version: u8,
    /// Raw type code; the header layer does not validate it.
    pub msg_type: u8,
    pub device_id: DeviceId,
    pub sequence: u16,
    pub payload_len: u8,
    pub checksum: u8,
}

impl PacketHeader {
    pub fn new(msg_type: MessageType, device_id: DeviceId, sequence: u16, payload_len: u8) -> Self {
        let mut header = Self {
            version: PROTOCOL_VERSION,
            msg_type: msg_type.code(),
            device_id,
            sequence,
            payload_len,
            checksum: 0,
        };
        header.checksum = header.to_bytes()[HEADER_LEN - 1];
        header
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(self.msg_type)
    }

    /// Serializes the fields and recomputes the checksum byte.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&MAGIC);
        out[2] = self.version;
        out[3] = self.msg_type;
        out[4..12].copy_from_slice(&self.device_id.to_le_bytes());
        out[12..14].copy_from_slice(&self.sequence.to_le_bytes());
        out[14] = self.payload_len;
        out[15] = header_checksum(&out[..HEADER_LEN - 1]);
        out
    }
}

/// XOR fold over the header bytes. Any single flipped bit is caught, but
/// paired flips in the same bit position cancel out; this is a framing
/// sanity check, not an integrity guarantee.
pub fn header_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

pub fn encode_header(
    device_id: DeviceId,
    msg_type: MessageType,
    sequence: u16,
    payload_len: u8,
) -> [u8; HEADER_LEN] {
    PacketHeader::new(msg_type, device_id, sequence, payload_len).to_bytes()
}

/// Validates length, magic and checksum only. A `payload_len` larger than
/// the bytes on hand is left for the frame layer to reject.
pub fn decode_header(buf: &[u8]) -> Result<PacketHeader, FramingError> {
    if buf.len() < HEADER_LEN {
        return Err(FramingError::TooShort { len: buf.len() });
    }
    let raw = &buf[..HEADER_LEN];
    if raw[0..2] != MAGIC {
        return Err(FramingError::BadMagic([raw[0], raw[1]]));
    }
    let computed = header_checksum(&raw[..HEADER_LEN - 1]);
    let received = raw[HEADER_LEN - 1];
    if computed != received {
        return Err(FramingError::ChecksumMismatch { computed, received });
    }

    let mut r = Reader::new(&raw[2..]);
    Ok(PacketHeader {
        version: r.u8()?,
        msg_type: r.u8()?,
        device_id: u64::from_le_bytes(r.array()?),
        sequence: r.u16()?,
        payload_len: r.u8()?,
        checksum: r.u8()?,
    })
}

// =============================== Payloads ===================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readings {
    /// Sensor-local timestamp (seconds since its own epoch).
    pub timestamp: u32,
    pub temperature_centi: i16,
    pub humidity_centi: u16,
    pub pressure_centi: u32,
    pub altitude_m: i16,
    pub battery_millivolts: u16,
    pub battery_percent: u8,
    pub pressure_change_centi: i16,
    /// 0 falling, 1 steady, 2 rising
    pub pressure_trend: u8,
    pub sensor_kind: SensorKind,
}

impl Readings {
    pub fn temperature_c(&self) -> f64 {
        from_fixed(self.temperature_centi, CENTI)
    }

    pub fn humidity_pct(&self) -> f64 {
        from_fixed(self.humidity_centi, CENTI)
    }

    pub fn pressure_hpa(&self) -> f64 {
        from_fixed(self.pressure_centi, CENTI)
    }

    pub fn pressure_change_hpa(&self) -> f64 {
        from_fixed(self.pressure_change_centi, CENTI)
    }

    pub fn battery_volts(&self) -> f64 {
        from_fixed(self.battery_millivolts, MILLI)
    }

    pub fn trend_label(&self) -> &'static str {
        match self.pressure_trend {
            0 => "falling",
            1 => "steady",
            2 => "rising",
            _ => "unknown",
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, FramingError> {
        Ok(Self {
            timestamp: r.u32()?,
            temperature_centi: r.i16()?,
            humidity_centi: r.u16()?,
            pressure_centi: r.u32()?,
            altitude_m: r.i16()?,
            battery_millivolts: r.u16()?,
            battery_percent: r.u8()?,
            pressure_change_centi: r.i16()?,
            pressure_trend: r.u8()?,
            sensor_kind: SensorKind::from_code(r.u8()?),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.temperature_centi.to_le_bytes());
        out.extend_from_slice(&self.humidity_centi.to_le_bytes());
        out.extend_from_slice(&self.pressure_centi.to_le_bytes());
        out.extend_from_slice(&self.altitude_m.to_le_bytes());
        out.extend_from_slice(&self.battery_millivolts.to_le_bytes());
        out.push(self.battery_percent);
        out.extend_from_slice(&self.pressure_change_centi.to_le_bytes());
        out.push(self.pressure_trend);
        out.push(self.sensor_kind.code());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub uptime_secs: u32,
    pub wake_count: u32,
    pub sensor_healthy: bool,
    pub lora_rssi: i16,
    pub lora_snr: i8,
    pub free_heap_kb: u16,
    pub sensor_failures: u16,
    pub tx_failures: u16,
    pub last_success_tx: u32,
    pub deep_sleep_secs: u16,
    pub sensor_interval_secs: u16,
    pub device_name: Option<String>,
    pub location: Option<String>,
}

impl Status {
    fn decode(r: &mut Reader<'_>) -> Result<Self, FramingError> {
        Ok(Self {
            uptime_secs: r.u32()?,
            wake_count: r.u32()?,
            sensor_healthy: r.u8()? != 0,
            lora_rssi: r.i16()?,
            lora_snr: r.i8()?,
            free_heap_kb: r.u16()?,
            sensor_failures: r.u16()?,
            tx_failures: r.u16()?,
            last_success_tx: r.u32()?,
            deep_sleep_secs: r.u16()?,
            sensor_interval_secs: r.u16()?,
            device_name: read_text(r.take(TEXT_FIELD_LEN)?),
            location: read_text(r.take(TEXT_FIELD_LEN)?),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.uptime_secs.to_le_bytes());
        out.extend_from_slice(&self.wake_count.to_le_bytes());
        out.push(self.sensor_healthy as u8);
        out.extend_from_slice(&self.lora_rssi.to_le_bytes());
        out.push(self.lora_snr as u8);
        out.extend_from_slice(&self.free_heap_kb.to_le_bytes());
        out.extend_from_slice(&self.sensor_failures.to_le_bytes());
        out.extend_from_slice(&self.tx_failures.to_le_bytes());
        out.extend_from_slice(&self.last_success_tx.to_le_bytes());
        out.extend_from_slice(&self.deep_sleep_secs.to_le_bytes());
        out.extend_from_slice(&self.sensor_interval_secs.to_le_bytes());
        write_text(out, self.device_name.as_deref());
        write_text(out, self.location.as_deref());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub severity: Severity,
    pub message: String,
}

impl Event {
    fn decode(r: &mut Reader<'_>) -> Result<Self, FramingError> {
        let kind = EventKind::from_code(r.u8()?);
        let severity = Severity::from_code(r.u8()?);
        let declared = r.u8()? as usize;
        let rest = r.rest();
        let text = &rest[..declared.min(rest.len())];
        Ok(Self {
            kind,
            severity,
            message: String::from_utf8_lossy(text).into_owned(),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let text = truncate_utf8(&self.message, MAX_PAYLOAD_LEN - EVENT_MIN_LEN);
        out.push(self.kind.code());
        out.push(self.severity.code());
        out.push(text.len() as u8);
        out.extend_from_slice(text.as_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Raw command code; see [`CommandType`] for the known ones.
    pub command: u8,
    pub params: CommandParams,
}

impl CommandPayload {
    pub fn new(command: CommandType, params: &[u8]) -> Result<Self, FramingError> {
        let params =
            CommandParams::from_slice(params).map_err(|_| FramingError::ParamsTooLong(params.len()))?;
        Ok(Self { command: command.code(), params })
    }

    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::from_code(self.command)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, FramingError> {
        let command = r.u8()?;
        let len = r.u8()? as usize;
        if len > MAX_COMMAND_PARAMS {
            return Err(FramingError::ParamsTooLong(len));
        }
        // Trailing bytes past `len` are padding from fixed-size senders.
        let params = CommandParams::from_slice(r.take(len)?)
            .map_err(|_| FramingError::ParamsTooLong(len))?;
        Ok(Self { command, params })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.command);
        out.push(self.params.len() as u8);
        out.extend_from_slice(&self.params);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ack_sequence: u16,
    pub success: bool,
    pub error_code: u8,
    pub rssi: i8,
    pub snr: i8,
}

impl Ack {
    /// RSSI is carried in one signed byte; stronger/weaker values saturate.
    pub fn new(ack_sequence: u16, success: bool, rssi: i16, snr: i8) -> Self {
        Self {
            ack_sequence,
            success,
            error_code: 0,
            rssi: rssi.clamp(i8::MIN as i16, i8::MAX as i16) as i8,
            snr,
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, FramingError> {
        let ack = Self {
            ack_sequence: r.u16()?,
            success: r.u8()? != 0,
            error_code: r.u8()?,
            rssi: r.i8()?,
            snr: r.i8()?,
        };
        let _reserved = r.u8()?;
        Ok(ack)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ack_sequence.to_le_bytes());
        out.push(self.success as u8);
        out.push(self.error_code);
        out.push(self.rssi as u8);
        out.push(self.snr as u8);
        out.push(0);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Readings(Readings),
    Status(Status),
    Event(Event),
    Command(CommandPayload),
    Ack(Ack),
}

impl Payload {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Payload::Readings(_) => MessageType::Readings,
            Payload::Status(_) => MessageType::Status,
            Payload::Event(_) => MessageType::Event,
            Payload::Command(_) => MessageType::Command,
            Payload::Ack(_) => MessageType::Ack,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_PAYLOAD_LEN);
        match self {
            Payload::Readings(p) => p.encode(&mut out),
            Payload::Status(p) => p.encode(&mut out),
            Payload::Event(p) => p.encode(&mut out),
            Payload::Command(p) => p.encode(&mut out),
            Payload::Ack(p) => p.encode(&mut out),
        }
        out
    }
}

/// Dispatches on the raw type code. Fixed layouts must match exactly,
/// variable ones must reach their minimum.
pub fn decode_payload(msg_type: u8, bytes: &[u8]) -> Result<Payload, FramingError> {
    let msg_type = MessageType::try_from(msg_type)?;
    let exact = |expected: usize| {
        if bytes.len() == expected {
            Ok(())
        } else {
            Err(FramingError::PayloadSize { msg_type, expected, actual: bytes.len() })
        }
    };
    let at_least = |min: usize| {
        if bytes.len() >= min {
            Ok(())
        } else {
            Err(FramingError::PayloadTooShort { msg_type, min, actual: bytes.len() })
        }
    };

    let mut r = Reader::new(bytes);
    match msg_type {
        MessageType::Readings => {
            exact(READINGS_LEN)?;
            Ok(Payload::Readings(Readings::decode(&mut r)?))
        }
        MessageType::Status => {
            exact(STATUS_LEN)?;
            Ok(Payload::Status(Status::decode(&mut r)?))
        }
        MessageType::Ack => {
            exact(ACK_LEN)?;
            Ok(Payload::Ack(Ack::decode(&mut r)?))
        }
        MessageType::Event => {
            at_least(EVENT_MIN_LEN)?;
            Ok(Payload::Event(Event::decode(&mut r)?))
        }
        MessageType::Command => {
            at_least(COMMAND_MIN_LEN)?;
            Ok(Payload::Command(CommandPayload::decode(&mut r)?))
        }
    }
}

// ================================ Frames ====================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub header: PacketHeader,
    pub payload: Payload,
}

pub fn encode_frame(
    device_id: DeviceId,
    sequence: u16,
    payload: &Payload,
) -> Result<Vec<u8>, FramingError> {
    let body = payload.encode();
    if body.len() > MAX_PAYLOAD_LEN {
        return Err(FramingError::PayloadTooLarge(body.len()));
    }
    let header = encode_header(device_id, payload.msg_type(), sequence, body.len() as u8);
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Header first, then exactly `payload_len` bytes of payload. Bytes past the
/// declared length (radio padding) are ignored.
pub fn decode_frame(buf: &[u8]) -> Result<Frame, FramingError> {
    let header = decode_header(buf)?;
    let end = HEADER_LEN + header.payload_len as usize;
    if buf.len() < end {
        return Err(FramingError::Truncated { needed: end, available: buf.len() });
    }
    let payload = decode_payload(header.msg_type, &buf[HEADER_LEN..end])?;
    Ok(Frame { header, payload })
}

// =============================== Helpers ====================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FramingError> {
        let needed = self.pos + n;
        if needed > self.buf.len() {
            return Err(FramingError::Truncated { needed, available: self.buf.len() });
        }
        let out = &self.buf[self.pos..needed];
        self.pos = needed;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FramingError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn u8(&mut self) -> Result<u8, FramingError> {
        Ok(self.array::<1>()?[0])
    }

    fn i8(&mut self) -> Result<i8, FramingError> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16, FramingError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn i16(&mut self) -> Result<i16, FramingError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, FramingError> {
        Ok(u32::from_le_bytes(self.array()?))
    }
}

fn read_text(raw: &[u8]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..end]).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

fn write_text(out: &mut Vec<u8>, text: Option<&str>) {
    let mut field = [0u8; TEXT_FIELD_LEN];
    if let Some(text) = text {
        let text = truncate_utf8(text, TEXT_FIELD_LEN);
        field[..text.len()].copy_from_slice(text.as_bytes());
    }
    out.extend_from_slice(&field);
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ================================ Tests =====================================
