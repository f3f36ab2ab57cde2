use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use crate::mqtt;
use powerbank_lib::protocol::{self, BoardLayout, LengthSemantics, PacketKind, ProtocolConfig};
use std::time::Duration;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Layout {
    /// A board owns holes until the next board address
    Sentinel,
    /// Every board owns exactly four holes
    FixedFour,
}

impl From<Layout> for BoardLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Sentinel => BoardLayout::Sentinel,
            Layout::FixedFour => BoardLayout::FixedFour,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Semantics {
    /// The length field counts the whole packet
    Total,
    /// The length field counts everything but the head byte
    ExcludingHead,
}

impl From<Semantics> for LengthSemantics {
    fn from(semantics: Semantics) -> Self {
        match semantics {
            Semantics::Total => LengthSemantics::Total,
            Semantics::ExcludingHead => LengthSemantics::ExcludingHead,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum DecodeKind {
    /// Route by the command byte
    Auto,
    Check,
    Upload,
    Popup,
    Return,
    HealthCheck,
}

impl DecodeKind {
    pub fn packet_kind(self) -> Option<PacketKind> {
        match self {
            DecodeKind::Auto => None,
            DecodeKind::Check => Some(PacketKind::Check),
            DecodeKind::Upload => Some(PacketKind::Upload),
            DecodeKind::Popup => Some(PacketKind::Popup),
            DecodeKind::Return => Some(PacketKind::Return),
            DecodeKind::HealthCheck => Some(PacketKind::HealthCheck),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Request an inventory snapshot
    Check,
    /// Request an upload of every hole
    UploadAll,
    /// Eject the powerbank with the given serial number
    Popup {
        /// Powerbank serial number as printed by the cabinet (e.g. 93198088)
        serial: String,
    },
    /// Request a heartbeat from the device
    HealthCheck,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Decode a single packet given as hex (whitespace is ignored)
    Decode {
        /// Packet bytes, e.g. "A8 00 0C 31 10 05 8E 17 08 01 00 5A"
        hex: String,
        /// Packet kind; "auto" routes check, pop-up and return packets by command byte
        #[arg(long, value_enum, default_value_t = DecodeKind::Auto)]
        kind: DecodeKind,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Subscribe to cabinet reports and heartbeats and print every decoded packet
    Listen {
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Publish a command to a cabinet
    Send {
        /// Device id as used in the MQTT topics
        device: String,
        #[command(subcommand)]
        command: DeviceCommand,
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
        /// How long to wait for the broker to accept the message (e.g. "500ms", "5s")
        #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
        timeout: Duration,
    },
}

const fn about_text() -> &'static str {
    "powerbank cabinet telemetry command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Command byte of return packets (0x40, or 0x28 on return-only firmware)
    #[arg(
        long,
        global = true,
        value_parser = maybe_hex::<u8>,
        default_value_t = protocol::CMD_RETURN
    )]
    pub return_cmd: u8,

    /// How holes are assigned to control boards in check and upload packets
    #[arg(long, global = true, value_enum, default_value_t = Layout::Sentinel)]
    pub board_layout: Layout,

    /// What the two byte length field counts
    #[arg(long, global = true, value_enum, default_value_t = Semantics::Total)]
    pub length_semantics: Semantics,

    /// Reject every packet whose length field disagrees with its size
    #[arg(long, global = true)]
    pub strict_length: bool,
}

impl CliArgs {
    pub fn protocol_config(&self) -> Result<ProtocolConfig> {
        let config = ProtocolConfig {
            return_cmd: self.return_cmd,
            board_layout: self.board_layout.into(),
            length_semantics: self.length_semantics.into(),
            strict_length: self.strict_length,
        };
        if config.return_cmd_collides() {
            bail!(
                "--return-cmd 0x{:02X} is already the check or pop-up command",
                config.return_cmd
            );
        }
        Ok(config)
    }
}

/// Parses packet bytes written as hex, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(
            parse_hex("A8 00 0C\n31").unwrap(),
            vec![0xA8, 0x00, 0x0C, 0x31]
        );
        assert_eq!(parse_hex("0xa8000c").unwrap(), vec![0xA8, 0x00, 0x0C]);
        assert!(parse_hex("A8 0").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_protocol_flags() {
        let args = CliArgs::parse_from([
            "powerbank",
            "decode",
            "a8",
            "--return-cmd",
            "0x28",
            "--board-layout",
            "fixed-four",
            "--length-semantics",
            "excluding-head",
            "--strict-length",
        ]);
        let config = args.protocol_config().unwrap();
        assert_eq!(config.return_cmd, protocol::CMD_RETURN_LEGACY);
        assert_eq!(config.board_layout, BoardLayout::FixedFour);
        assert_eq!(config.length_semantics, LengthSemantics::ExcludingHead);
        assert!(config.strict_length);
    }

    #[test]
    fn test_colliding_return_cmd() {
        for cmd in ["0x10", "0x31", "49"] {
            let args = CliArgs::parse_from(["powerbank", "decode", "a8", "--return-cmd", cmd]);
            let err = args.protocol_config().unwrap_err();
            assert!(err.to_string().contains("--return-cmd"), "{cmd}: {err}");
        }
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["powerbank", "decode", "a8"]);
        assert_eq!(args.protocol_config().unwrap(), ProtocolConfig::default());
        assert_eq!(
            args.command,
            CliCommands::Decode {
                hex: "a8".to_string(),
                kind: DecodeKind::Auto,
                format: OutputFormat::Text
            }
        );
    }

    #[test]
    fn test_send_popup() {
        let args = CliArgs::parse_from(["powerbank", "send", "cab01", "popup", "93198088"]);
        assert_eq!(
            args.command,
            CliCommands::Send {
                device: "cab01".to_string(),
                command: DeviceCommand::Popup {
                    serial: "93198088".to_string()
                },
                config_file: "mqtt.yaml".to_string(),
                timeout: Duration::from_secs(5)
            }
        );
    }
}
