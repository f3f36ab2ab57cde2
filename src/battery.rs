//! Single-battery outcome packets: pop-up (rent) and return.

use crate::protocol::{
    decode_header, deci, serial_number, verify_byte, Header, PacketKind, ProtocolConfig,
};
use crate::status::{self, CodeSpace, StatusTag};
use crate::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const POPUP_SUCCESS: u8 = 0x01;
pub const RETURN_SUCCESS: u8 = 0x01;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PopupResponse {
    pub header: Header,
    pub control_index: u8,
    pub powerbank_serial: String,
    pub state: u8,
    pub solenoid_valve: u8,
    pub verify: u8,
}

impl PopupResponse {
    pub fn decode(buffer: &[u8], config: &ProtocolConfig) -> Result<Self> {
        let header = decode_header(buffer, PacketKind::Popup, config)?;
        Ok(Self {
            header,
            control_index: buffer[4],
            powerbank_serial: serial_number(&buffer[5..9]),
            state: buffer[9],
            solenoid_valve: buffer[10],
            verify: verify_byte(buffer),
        })
    }

    pub fn status_tag(&self) -> StatusTag {
        status::status_tag(CodeSpace::Popup, self.state)
    }

    pub fn description(&self) -> &'static str {
        status::description(CodeSpace::Popup, self.state)
    }

    pub fn is_successful(&self) -> bool {
        self.state == POPUP_SUCCESS
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReturnResponse {
    pub header: Header,
    pub control_index: u8,
    pub hole_index: u8,
    pub state: u8,
    pub reserved: [u8; 2],
    pub area: u8,
    pub powerbank_serial: String,
    /// Percent, 0-255
    pub state_of_charge: u8,
    /// Celsius, 0-100
    pub temperature: u8,
    pub charge_voltage: f32,
    pub charge_current: f32,
    pub soft_version: u8,
    pub hard_version: u8,
    pub verify: u8,
}

impl ReturnResponse {
    pub fn decode(buffer: &[u8], config: &ProtocolConfig) -> Result<Self> {
        let header = decode_header(buffer, PacketKind::Return, config)?;
        Ok(Self {
            header,
            control_index: buffer[4],
            hole_index: buffer[5],
            state: buffer[6],
            reserved: [buffer[7], buffer[8]],
            area: buffer[9],
            powerbank_serial: serial_number(&buffer[10..14]),
            state_of_charge: buffer[14],
            temperature: buffer[15],
            charge_voltage: deci(buffer[16]),
            charge_current: deci(buffer[17]),
            soft_version: buffer[18],
            hard_version: buffer[19],
            verify: verify_byte(buffer),
        })
    }

    pub fn status_tag(&self) -> StatusTag {
        status::status_tag(CodeSpace::Return, self.state)
    }

    pub fn description(&self) -> &'static str {
        status::description(CodeSpace::Return, self.state)
    }

    pub fn is_successful(&self) -> bool {
        self.state == RETURN_SUCCESS
    }

    pub fn area_code(&self) -> char {
        char::from(self.area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CMD_POPUP, CMD_RETURN, CMD_RETURN_LEGACY};
    use crate::Error;

    const POPUP: [u8; 12] = [
        0xA8, 0x00, 0x0C, 0x31, 0x20, 0x05, 0x8D, 0xFC, 0x12, 0x01, 0x01, 0x3C,
    ];

    const RETURN: [u8; 21] = [
        0xA8, 0x00, 0x15, 0x40, 0x10, 0x03, 0x01, 0x00, 0x00, 0x41, 0x05, 0x8D, 0x93, 0xE7, 0x1A,
        0x1C, 0x32, 0x14, 0xCA, 0x02, 0x7F,
    ];

    #[test]
    fn test_popup_decode() {
        let popup = PopupResponse::decode(&POPUP, &ProtocolConfig::default()).unwrap();
        assert_eq!(popup.header.cmd, CMD_POPUP);
        assert_eq!(popup.header.length, 12);
        assert_eq!(popup.control_index, 0x20);
        assert_eq!(popup.powerbank_serial, "93191186");
        assert_eq!(popup.solenoid_valve, 0x01);
        assert_eq!(popup.verify, 0x3C);
        assert!(popup.is_successful());
        assert_eq!(popup.status_tag(), "popup-successful");
        assert_eq!(popup.description(), "Pop-up successful");
    }

    #[test]
    fn test_popup_unmapped_state() {
        let mut raw = POPUP;
        raw[9] = 0x30;
        let popup = PopupResponse::decode(&raw, &ProtocolConfig::default()).unwrap();
        assert!(!popup.is_successful());
        assert_eq!(popup.status_tag(), StatusTag::UNKNOWN);
        assert_eq!(popup.description(), "Unknown error");
    }

    #[test]
    fn test_return_decode() {
        let ret = ReturnResponse::decode(&RETURN, &ProtocolConfig::default()).unwrap();
        assert_eq!(ret.header.cmd, CMD_RETURN);
        assert_eq!(ret.control_index, 0x10);
        assert_eq!(ret.hole_index, 0x03);
        assert_eq!(ret.reserved, [0x00, 0x00]);
        assert_eq!(ret.area_code(), 'A');
        assert_eq!(ret.powerbank_serial, "93164519");
        assert_eq!(ret.state_of_charge, 0x1A);
        assert_eq!(ret.temperature, 0x1C);
        assert_eq!(ret.charge_voltage, 5.0);
        assert_eq!(ret.charge_current, 2.0);
        assert_eq!(ret.soft_version, 0xCA);
        assert_eq!(ret.hard_version, 0x02);
        assert_eq!(ret.verify, 0x7F);
        assert_eq!(ret.status_tag(), "return-successful");
    }

    #[test]
    fn test_return_state_space() {
        let mut raw = RETURN;
        raw[6] = 0x12;
        let ret = ReturnResponse::decode(&raw, &ProtocolConfig::default()).unwrap();
        assert_eq!(
            ret.status_tag(),
            "failed-to-obtain-voltage-temperature-or-other-information"
        );
    }

    #[test]
    fn test_return_legacy_command() {
        let mut raw = RETURN;
        raw[3] = CMD_RETURN_LEGACY;
        assert_eq!(
            ReturnResponse::decode(&raw, &ProtocolConfig::default()),
            Err(Error::InvalidCommand {
                expected: CMD_RETURN,
                actual: CMD_RETURN_LEGACY
            })
        );
        assert!(ReturnResponse::decode(&raw, &ProtocolConfig::return_only()).is_ok());
    }

    #[test]
    fn test_short_buffers_never_panic() {
        for len in 0..RETURN.len() {
            assert_eq!(
                ReturnResponse::decode(&RETURN[..len], &ProtocolConfig::default()),
                Err(Error::TooShort {
                    expected: 21,
                    actual: len
                })
            );
        }
        for len in 0..POPUP.len() {
            assert!(matches!(
                PopupResponse::decode(&POPUP[..len], &ProtocolConfig::default()),
                Err(Error::TooShort { expected: 12, .. })
            ));
        }
    }

    #[test]
    fn test_header_checked_first() {
        let mut raw = RETURN;
        raw[0] = 0x00;
        raw[3] = 0xFF;
        assert_eq!(
            ReturnResponse::decode(&raw, &ProtocolConfig::default()),
            Err(Error::InvalidHeader(0x00))
        );
    }
}
