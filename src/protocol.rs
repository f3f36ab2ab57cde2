use crate::battery::{PopupResponse, ReturnResponse};
use crate::cabinet::{CheckResponse, UploadResponse};
use crate::heartbeat::HealthCheckResponse;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const HEAD: u8 = 0xA8;
/// head, length (2 bytes), cmd
pub const HEADER_LENGTH: usize = 4;
pub const VERIFY_LENGTH: usize = 1;

pub const CMD_CHECK: u8 = 0x10;
pub const CMD_POPUP: u8 = 0x31;
pub const CMD_RETURN: u8 = 0x40;
/// Return command byte used by return-only firmware.
pub const CMD_RETURN_LEGACY: u8 = 0x28;
pub const CMD_HEALTH_CHECK: u8 = 0x7A;

/// How the holes belonging to each control board are delimited in check and
/// upload packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum BoardLayout {
    /// A board owns holes until the next byte is a board address.
    #[default]
    Sentinel,
    /// Every board owns exactly four holes.
    FixedFour,
}

/// What the two-byte `length` field counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum LengthSemantics {
    /// The whole packet, head and verify byte included.
    #[default]
    Total,
    /// Everything except the head byte.
    ExcludingHead,
}

impl LengthSemantics {
    pub fn expected_total(self, length: u16) -> usize {
        match self {
            LengthSemantics::Total => usize::from(length),
            LengthSemantics::ExcludingHead => usize::from(length) + 1,
        }
    }
}

/// Per-firmware protocol choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProtocolConfig {
    pub return_cmd: u8,
    pub board_layout: BoardLayout,
    pub length_semantics: LengthSemantics,
    /// Reject every packet kind whose length field disagrees with the buffer,
    /// not only uploads.
    pub strict_length: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            return_cmd: CMD_RETURN,
            board_layout: BoardLayout::default(),
            length_semantics: LengthSemantics::default(),
            strict_length: false,
        }
    }
}

impl ProtocolConfig {
    pub fn return_only() -> Self {
        Self {
            return_cmd: CMD_RETURN_LEGACY,
            ..Self::default()
        }
    }

    /// True when `return_cmd` is also the check or pop-up command byte. Such
    /// a config never routes a packet to the return parser.
    pub fn return_cmd_collides(&self) -> bool {
        matches!(self.return_cmd, CMD_CHECK | CMD_POPUP)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum PacketKind {
    Check,
    Popup,
    Return,
    Upload,
    HealthCheck,
}

impl PacketKind {
    pub fn tag(&self) -> &'static str {
        match self {
            PacketKind::Check => "check",
            PacketKind::Popup => "popup",
            PacketKind::Return => "return",
            PacketKind::Upload => "upload",
            PacketKind::HealthCheck => "health-check",
        }
    }

    pub fn min_len(&self) -> usize {
        match self {
            // header, one board header, verify
            PacketKind::Check | PacketKind::Upload => {
                HEADER_LENGTH + crate::cabinet::BOARD_HEADER_LENGTH + VERIFY_LENGTH
            }
            PacketKind::Popup => 12,
            PacketKind::Return => 21,
            // header, control index, verify
            PacketKind::HealthCheck => HEADER_LENGTH + 1 + VERIFY_LENGTH,
        }
    }

    fn expected_cmd(&self, config: &ProtocolConfig) -> u8 {
        match self {
            PacketKind::Check | PacketKind::Upload => CMD_CHECK,
            PacketKind::Popup => CMD_POPUP,
            PacketKind::Return => config.return_cmd,
            PacketKind::HealthCheck => CMD_HEALTH_CHECK,
        }
    }

    fn command_is_advisory(&self) -> bool {
        matches!(self, PacketKind::HealthCheck)
    }

    fn length_is_authoritative(&self, config: &ProtocolConfig) -> bool {
        matches!(self, PacketKind::Upload) || config.strict_length
    }
}

/// The fixed four bytes every packet starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Header {
    pub head: u8,
    pub length: u16,
    pub cmd: u8,
}

impl Header {
    // Callers guarantee at least HEADER_LENGTH bytes.
    fn read(buffer: &[u8]) -> Self {
        Self {
            head: buffer[0],
            length: u16::from_be_bytes([buffer[1], buffer[2]]),
            cmd: buffer[3],
        }
    }
}

pub(crate) fn validate_len(buffer: &[u8], min_size: usize) -> Result<()> {
    if buffer.len() < min_size {
        log::warn!(
            "Invalid buffer size - required={} received={}",
            min_size,
            buffer.len()
        );
        return Err(Error::TooShort {
            expected: min_size,
            actual: buffer.len(),
        });
    }
    Ok(())
}

fn validate_head(buffer: &[u8]) -> Result<()> {
    if buffer[0] != HEAD {
        log::warn!(
            "Invalid header - expected={:02X?} received={:02X?}",
            HEAD,
            buffer[0]
        );
        return Err(Error::InvalidHeader(buffer[0]));
    }
    Ok(())
}

fn validate_cmd(header: &Header, kind: PacketKind, config: &ProtocolConfig) -> Result<()> {
    let expected = kind.expected_cmd(config);
    if header.cmd == expected {
        return Ok(());
    }
    if kind.command_is_advisory() {
        log::debug!(
            "Unexpected {} command - expected={:02X?} received={:02X?}, decoding anyway",
            kind.tag(),
            expected,
            header.cmd
        );
        return Ok(());
    }
    log::warn!(
        "Invalid {} command - expected={:02X?} received={:02X?}",
        kind.tag(),
        expected,
        header.cmd
    );
    Err(Error::InvalidCommand {
        expected,
        actual: header.cmd,
    })
}

fn validate_length_field(
    header: &Header,
    buffer_len: usize,
    kind: PacketKind,
    config: &ProtocolConfig,
) -> Result<()> {
    let expected = config.length_semantics.expected_total(header.length);
    if expected == buffer_len {
        return Ok(());
    }
    if !kind.length_is_authoritative(config) {
        log::debug!(
            "Length field of {} packet disagrees - declared={} received={}, decoding anyway",
            kind.tag(),
            expected,
            buffer_len
        );
        return Ok(());
    }
    log::warn!(
        "Invalid {} length - declared={} received={}",
        kind.tag(),
        expected,
        buffer_len
    );
    Err(Error::LengthMismatch {
        expected,
        actual: buffer_len,
    })
}

/// Runs the checks shared by every body parser, in order: minimum length,
/// head sentinel, command byte, length field.
pub(crate) fn decode_header(
    buffer: &[u8],
    kind: PacketKind,
    config: &ProtocolConfig,
) -> Result<Header> {
    validate_len(buffer, kind.min_len())?;
    validate_head(buffer)?;
    let header = Header::read(buffer);
    validate_cmd(&header, kind, config)?;
    validate_length_field(&header, buffer.len(), kind, config)?;
    Ok(header)
}

pub(crate) fn verify_byte(buffer: &[u8]) -> u8 {
    buffer[buffer.len() - 1]
}

/// Four bytes, big-endian, rendered as a decimal string.
pub(crate) fn serial_number(bytes: &[u8]) -> String {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).to_string()
}

/// Byte carrying tenths of a unit.
pub(crate) fn deci(raw: u8) -> f32 {
    raw as f32 / 10.0
}

/// A packet routed by its command byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Check(CheckResponse),
    Popup(PopupResponse),
    Return(ReturnResponse),
}

impl Record {
    pub fn kind(&self) -> PacketKind {
        match self {
            Record::Check(_) => PacketKind::Check,
            Record::Popup(_) => PacketKind::Popup,
            Record::Return(_) => PacketKind::Return,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.kind().tag()
    }
}

/// A packet decoded with an explicitly declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Check(CheckResponse),
    Popup(PopupResponse),
    Return(ReturnResponse),
    Upload(UploadResponse),
    HealthCheck(HealthCheckResponse),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Check(_) => PacketKind::Check,
            Packet::Popup(_) => PacketKind::Popup,
            Packet::Return(_) => PacketKind::Return,
            Packet::Upload(_) => PacketKind::Upload,
            Packet::HealthCheck(_) => PacketKind::HealthCheck,
        }
    }
}

impl From<Record> for Packet {
    fn from(record: Record) -> Self {
        match record {
            Record::Check(check) => Packet::Check(check),
            Record::Popup(popup) => Packet::Popup(popup),
            Record::Return(ret) => Packet::Return(ret),
        }
    }
}

/// Routes `raw` by its command byte using the default [`ProtocolConfig`].
pub fn dispatch(raw: &[u8]) -> Result<Record> {
    dispatch_with(raw, &ProtocolConfig::default())
}

/// Routes `raw` by its command byte. Parser errors are returned unchanged.
pub fn dispatch_with(raw: &[u8], config: &ProtocolConfig) -> Result<Record> {
    validate_len(raw, HEADER_LENGTH)?;
    if raw[3] == config.return_cmd && config.return_cmd_collides() {
        log::warn!(
            "Return command {:02X?} collides with a fixed command, not decoding as return",
            config.return_cmd
        );
    }
    match raw[3] {
        CMD_CHECK => CheckResponse::decode(raw, config).map(Record::Check),
        CMD_POPUP => PopupResponse::decode(raw, config).map(Record::Popup),
        cmd if cmd == config.return_cmd => ReturnResponse::decode(raw, config).map(Record::Return),
        cmd => {
            log::warn!("Unknown command type: {:02X?}", cmd);
            Err(Error::UnknownCommand(cmd))
        }
    }
}

/// Decodes `raw` as the given kind without looking at the command byte first.
pub fn decode_as(kind: PacketKind, raw: &[u8], config: &ProtocolConfig) -> Result<Packet> {
    match kind {
        PacketKind::Check => CheckResponse::decode(raw, config).map(Packet::Check),
        PacketKind::Popup => PopupResponse::decode(raw, config).map(Packet::Popup),
        PacketKind::Return => ReturnResponse::decode(raw, config).map(Packet::Return),
        PacketKind::Upload => UploadResponse::decode(raw, config).map(Packet::Upload),
        PacketKind::HealthCheck => {
            HealthCheckResponse::decode(raw, config).map(Packet::HealthCheck)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn popup(head: u8, cmd: u8) -> Vec<u8> {
        vec![
            head, 0x00, 0x0C, cmd, 0x10, 0x05, 0x8E, 0x17, 0x08, 0x01, 0x00, 0x5A,
        ]
    }

    #[test]
    fn test_length_semantics() {
        assert_eq!(LengthSemantics::Total.expected_total(21), 21);
        assert_eq!(LengthSemantics::ExcludingHead.expected_total(20), 21);
    }

    #[test]
    fn test_serial_and_deci() {
        assert_eq!(serial_number(&[0x05, 0x8E, 0x17, 0x08]), "93198088");
        assert_eq!(serial_number(&[0xFF, 0xFF, 0xFF, 0xFF]), "4294967295");
        assert_eq!(deci(0xF1), 24.1);
        assert_eq!(deci(0), 0.0);
    }

    #[test]
    fn test_dispatch_too_short() {
        for len in 0..HEADER_LENGTH {
            assert_eq!(
                dispatch(&vec![HEAD; len]),
                Err(Error::TooShort {
                    expected: HEADER_LENGTH,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_dispatch_unknown_command() {
        assert_eq!(
            dispatch(&[HEAD, 0x00, 0x04, 0x55]),
            Err(Error::UnknownCommand(0x55))
        );
        // Health-check packets are not routed by command byte.
        assert_eq!(
            dispatch(&[HEAD, 0x00, 0x07, CMD_HEALTH_CHECK, 0x10, b'9', 0x00]),
            Err(Error::UnknownCommand(CMD_HEALTH_CHECK))
        );
    }

    #[test]
    fn test_dispatch_popup() {
        let record = dispatch(&popup(HEAD, CMD_POPUP)).unwrap();
        assert_eq!(record.tag(), "popup");
        assert!(matches!(record, Record::Popup(ref p) if p.powerbank_serial == "93198088"));
    }

    #[test]
    fn test_parser_errors_propagate_unchanged() {
        assert_eq!(
            dispatch(&popup(0xA9, CMD_POPUP)),
            Err(Error::InvalidHeader(0xA9))
        );
        assert_eq!(
            dispatch(&[HEAD, 0x00, 0x05, CMD_POPUP, 0x10]),
            Err(Error::TooShort {
                expected: 12,
                actual: 5
            })
        );
    }

    #[test]
    fn test_return_command_is_configurable() {
        let mut raw = vec![0u8; 21];
        raw[0] = HEAD;
        raw[2] = 21;
        raw[3] = CMD_RETURN_LEGACY;
        assert_eq!(
            dispatch(&raw),
            Err(Error::UnknownCommand(CMD_RETURN_LEGACY))
        );
        let record = dispatch_with(&raw, &ProtocolConfig::return_only()).unwrap();
        assert_eq!(record.kind(), PacketKind::Return);
    }

    #[test]
    fn test_colliding_return_command() {
        assert!(!ProtocolConfig::default().return_cmd_collides());
        assert!(!ProtocolConfig::return_only().return_cmd_collides());
        let config = ProtocolConfig {
            return_cmd: CMD_POPUP,
            ..ProtocolConfig::default()
        };
        assert!(config.return_cmd_collides());
        // The fixed pop-up command keeps its own parser.
        let record = dispatch_with(&popup(HEAD, CMD_POPUP), &config).unwrap();
        assert_eq!(record.kind(), PacketKind::Popup);
        assert!(ProtocolConfig {
            return_cmd: CMD_CHECK,
            ..ProtocolConfig::default()
        }
        .return_cmd_collides());
    }

    #[test]
    fn test_strict_length() {
        let mut raw = popup(HEAD, CMD_POPUP);
        raw[2] = 0x20;
        assert!(dispatch(&raw).is_ok());

        let config = ProtocolConfig {
            strict_length: true,
            ..ProtocolConfig::default()
        };
        assert_eq!(
            dispatch_with(&raw, &config),
            Err(Error::LengthMismatch {
                expected: 0x20,
                actual: 12
            })
        );
    }

    #[test]
    fn test_decode_as_checks_command() {
        assert_eq!(
            decode_as(
                PacketKind::Return,
                &popup(HEAD, CMD_POPUP),
                &ProtocolConfig::default()
            ),
            Err(Error::TooShort {
                expected: 21,
                actual: 12
            })
        );
        let mut raw = popup(HEAD, CMD_POPUP);
        raw[3] = CMD_CHECK;
        assert_eq!(
            decode_as(PacketKind::Popup, &raw, &ProtocolConfig::default()),
            Err(Error::InvalidCommand {
                expected: CMD_POPUP,
                actual: CMD_CHECK
            })
        );
    }
}
