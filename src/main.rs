use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use powerbank_lib::{decode_as, dispatch_with, Packet, ProtocolConfig};
use std::{ops::Deref, panic, time::Duration};

mod commandline;
mod daemon;
mod mqtt;

use commandline::{CliArgs, CliCommands, DecodeKind, DeviceCommand, OutputFormat};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn decode(
    packet_hex: &str,
    kind: DecodeKind,
    format: OutputFormat,
    config: &ProtocolConfig,
) -> Result<()> {
    let raw = commandline::parse_hex(packet_hex)
        .with_context(|| format!("Invalid hex packet {packet_hex:?}"))?;
    let packet = match kind.packet_kind() {
        Some(kind) => decode_as(kind, &raw, config),
        None => dispatch_with(&raw, config).map(Packet::from),
    }
    .with_context(|| format!("Cannot decode packet {}", hex::encode_upper(&raw)))?;
    daemon::Report {
        device: None,
        packet: &packet,
        timestamp: chrono::Utc::now(),
    }
    .print(format)
}

fn send(config_file: &str, device: &str, command: DeviceCommand, timeout: Duration) -> Result<()> {
    let config = mqtt::MqttConfig::load(config_file)
        .with_context(|| format!("Failed to open MQTT config file at '{config_file}'"))?;
    let command = match command {
        DeviceCommand::Check => mqtt::OutboundCommand::Check,
        DeviceCommand::UploadAll => mqtt::OutboundCommand::UploadAll,
        DeviceCommand::Popup { serial } => mqtt::OutboundCommand::PopupSn(serial),
        DeviceCommand::HealthCheck => mqtt::OutboundCommand::HealthCheck,
    };
    let (mut transport, mut connection) =
        mqtt::MqttTransport::new(config).with_context(|| "Failed to create MQTT transport")?;
    transport.send(device, &command)?;
    transport
        .wait_for_publish(&mut connection, timeout)
        .with_context(|| format!("Cannot send {command:?} to {device}"))?;
    info!("Sent {command:?} to {device}");
    transport.disconnect()
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let config = args.protocol_config()?;
    debug!("Protocol config: {config:?}");

    match args.command {
        CliCommands::Decode { hex, kind, format } => decode(&hex, kind, format, &config),
        CliCommands::Listen {
            config_file,
            format,
        } => daemon::run(&config_file, format, config),
        CliCommands::Send {
            device,
            command,
            config_file,
            timeout,
        } => send(&config_file, &device, command, timeout),
    }
}
