//! Health-check (heartbeat) packets. The body is the control board index
//! followed by an ASCII signal descriptor running up to the verify byte.

use crate::protocol::{decode_header, verify_byte, Header, PacketKind, ProtocolConfig};
use crate::signal::{parse_signal, SignalInfo, SignalQuality};
use crate::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HealthCheckResponse {
    pub header: Header,
    pub control_index: u8,
    pub signal: String,
    pub verify: u8,
}

impl HealthCheckResponse {
    pub fn decode(buffer: &[u8], config: &ProtocolConfig) -> Result<Self> {
        let header = decode_header(buffer, PacketKind::HealthCheck, config)?;
        let signal = String::from_utf8_lossy(&buffer[5..buffer.len() - 1]).into_owned();
        Ok(Self {
            header,
            control_index: buffer[4],
            signal,
            verify: verify_byte(buffer),
        })
    }

    pub fn signal_info(&self) -> SignalInfo {
        parse_signal(&self.signal)
    }

    pub fn signal_quality(&self) -> SignalQuality {
        self.signal_info().quality()
    }

    pub fn csq_value(&self) -> i32 {
        self.signal_info().csq
    }

    pub fn backup_power_flag(&self) -> i32 {
        self.signal_info().backup_power
    }

    pub fn signal_description(&self) -> &'static str {
        self.signal_info().description()
    }

    pub fn signal_bars(&self) -> u8 {
        self.signal_info().bars()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CMD_HEALTH_CHECK, HEAD};
    use crate::Error;

    fn packet(cmd: u8, signal: &str) -> Vec<u8> {
        let mut raw = vec![HEAD, 0x00, 0x00, cmd, 0x10];
        raw.extend_from_slice(signal.as_bytes());
        raw.push(0x42);
        raw[2] = raw.len() as u8;
        raw
    }

    #[test]
    fn test_decode_descriptor() {
        let raw = packet(CMD_HEALTH_CHECK, "CSQ:26;BP:0");
        let health = HealthCheckResponse::decode(&raw, &ProtocolConfig::default()).unwrap();
        assert_eq!(health.control_index, 0x10);
        assert_eq!(health.signal, "CSQ:26;BP:0");
        assert_eq!(health.verify, 0x42);
        assert_eq!(health.csq_value(), 26);
        assert_eq!(health.backup_power_flag(), 0);
        assert_eq!(health.signal_quality(), SignalQuality::Better);
        assert_eq!(health.signal_bars(), 4);
        assert_eq!(health.signal_description(), "Good signal");
    }

    #[test]
    fn test_command_byte_is_advisory() {
        let raw = packet(0x7B, "99");
        let health = HealthCheckResponse::decode(&raw, &ProtocolConfig::default()).unwrap();
        assert_eq!(health.header.cmd, 0x7B);
        assert_eq!(health.signal_quality(), SignalQuality::NoNetwork);
        assert_eq!(health.backup_power_flag(), -1);
    }

    #[test]
    fn test_empty_signal() {
        let raw = packet(CMD_HEALTH_CHECK, "");
        let health = HealthCheckResponse::decode(&raw, &ProtocolConfig::default()).unwrap();
        assert_eq!(health.signal, "");
        assert_eq!(health.csq_value(), -1);
        assert_eq!(health.signal_bars(), 0);
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            HealthCheckResponse::decode(
                &[HEAD, 0x00, 0x05, CMD_HEALTH_CHECK, 0x10],
                &ProtocolConfig::default()
            ),
            Err(Error::TooShort {
                expected: 6,
                actual: 5
            })
        );
        let mut raw = packet(CMD_HEALTH_CHECK, "CSQ:20");
        raw[0] = 0xA5;
        assert_eq!(
            HealthCheckResponse::decode(&raw, &ProtocolConfig::default()),
            Err(Error::InvalidHeader(0xA5))
        );
    }
}
