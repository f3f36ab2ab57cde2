use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use powerbank_lib::protocol::CMD_CHECK;
use powerbank_lib::{decode_as, dispatch_with, Hole, Packet, PacketKind, ProtocolConfig};
use rumqttc::{Event, Incoming};
use serde_json::json;

use crate::commandline::OutputFormat;
use crate::mqtt::{self, Channel, TransportObserver};

/// A decoded packet together with where and when it was seen.
pub struct Report<'a> {
    pub device: Option<&'a str>,
    pub packet: &'a Packet,
    pub timestamp: DateTime<Utc>,
}

fn hole_status<'h>(holes: impl Iterator<Item = &'h Hole>) -> serde_json::Value {
    holes
        .map(|hole| {
            json!({
                "hole_index": hole.hole_index,
                "tag": hole.status_tag(),
                "description": hole.state_description(),
            })
        })
        .collect()
}

fn hole_lines<'h>(holes: impl Iterator<Item = &'h Hole>) -> Vec<String> {
    holes
        .map(|hole| {
            format!(
                "  hole {}: {} ({}) serial={} soc={}% voltage={:.1}V",
                hole.hole_index,
                hole.status_tag(),
                hole.state_description(),
                hole.powerbank_serial,
                hole.state_of_charge,
                hole.powerbank_voltage
            )
        })
        .collect()
}

impl Report<'_> {
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        let (record, status) = match self.packet {
            Packet::Check(r) => (serde_json::to_value(r)?, hole_status(r.holes())),
            Packet::Upload(r) => (serde_json::to_value(r)?, hole_status(r.holes())),
            Packet::Popup(r) => (
                serde_json::to_value(r)?,
                json!({ "tag": r.status_tag(), "description": r.description() }),
            ),
            Packet::Return(r) => (
                serde_json::to_value(r)?,
                json!({ "tag": r.status_tag(), "description": r.description() }),
            ),
            Packet::HealthCheck(r) => {
                let info = r.signal_info();
                (
                    serde_json::to_value(r)?,
                    json!({
                        "csq": info.csq,
                        "backup_power": info.backup_power,
                        "quality": info.quality(),
                        "bars": info.bars(),
                        "description": info.description(),
                    }),
                )
            }
        };
        Ok(json!({
            "device": self.device,
            "kind": self.packet.kind(),
            "timestamp": self.timestamp.to_rfc3339(),
            "record": record,
            "status": status,
        }))
    }

    pub fn as_text(&self) -> String {
        let mut lines = vec![format!(
            "--- {} from {} at {} ---",
            self.packet.kind().tag(),
            self.device.unwrap_or("-"),
            self.timestamp.to_rfc3339()
        )];
        match self.packet {
            Packet::Check(r) => {
                lines.push(format!("{r:?}"));
                lines.extend(hole_lines(r.holes()));
            }
            Packet::Upload(r) => {
                lines.push(format!("{r:?}"));
                lines.extend(hole_lines(r.holes()));
            }
            Packet::Popup(r) => {
                lines.push(format!("{r:?}"));
                lines.push(format!("status: {} ({})", r.status_tag(), r.description()));
            }
            Packet::Return(r) => {
                lines.push(format!("{r:?}"));
                lines.push(format!("status: {} ({})", r.status_tag(), r.description()));
            }
            Packet::HealthCheck(r) => {
                lines.push(format!("{r:?}"));
                lines.push(format!(
                    "signal: csq={} bars={} {} backup_power={}",
                    r.csq_value(),
                    r.signal_bars(),
                    r.signal_description(),
                    r.backup_power_flag()
                ));
            }
        }
        lines.join("\n")
    }

    pub fn print(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => println!("{}", self.as_text()),
            OutputFormat::Json => {
                let value = self.to_json_value()?;
                println!(
                    "{}",
                    serde_json::to_string(&value)
                        .with_context(|| "Failed to serialize report to JSON")?
                );
            }
        }
        Ok(())
    }
}

/// Decodes a payload received on the given channel.
pub fn decode_report(
    channel: Channel,
    payload: &[u8],
    protocol: &ProtocolConfig,
    update_is_upload: bool,
) -> powerbank_lib::Result<Packet> {
    match channel {
        Channel::Heart => decode_as(PacketKind::HealthCheck, payload, protocol),
        Channel::Update if update_is_upload && payload.get(3) == Some(&CMD_CHECK) => {
            decode_as(PacketKind::Upload, payload, protocol)
        }
        Channel::Update => dispatch_with(payload, protocol).map(Packet::from),
    }
}

fn handle_publish<O: TransportObserver>(
    transport: &mqtt::MqttTransport<O>,
    topic: &str,
    payload: &[u8],
    protocol: &ProtocolConfig,
    format: OutputFormat,
) {
    transport.observer().on_receive(topic, payload);
    let Some((device, channel)) = transport.config().route_topic(topic) else {
        warn!("Ignoring message on unexpected topic {topic}");
        return;
    };
    if channel == Channel::Heart && payload.is_empty() {
        debug!("Ignoring empty health-check request for {device}");
        return;
    }
    match decode_report(
        channel,
        payload,
        protocol,
        transport.config().update_is_upload,
    ) {
        Ok(packet) => {
            let report = Report {
                device: Some(device),
                packet: &packet,
                timestamp: Utc::now(),
            };
            if let Err(e) = report.print(format) {
                error!("Failed to output report from {device}: {e}");
            }
        }
        Err(e) => warn!(
            "Cannot decode packet from {device}: {e} payload={}",
            hex::encode(payload)
        ),
    }
}

pub fn run(config_file: &str, format: OutputFormat, protocol: ProtocolConfig) -> Result<()> {
    let config = mqtt::MqttConfig::load(config_file)
        .with_context(|| format!("Failed to open MQTT config file at '{config_file}'"))?;
    info!(
        "Successfully loaded MQTT config from {config_file}: broker={}:{}",
        config.host, config.port
    );
    info!("Starting listener: format={format:?}, protocol={protocol:?}");
    let reconnect_delay = config.reconnect_delay;
    let (mut transport, mut connection) =
        mqtt::MqttTransport::new(config).with_context(|| "Failed to create MQTT transport")?;

    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("Connected to MQTT broker.");
                transport.subscribe_reports()?;
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                handle_publish(&transport, &publish.topic, &publish.payload, &protocol, format);
            }
            Ok(_) => {} // keepalives etc
            Err(e) => {
                error!("MQTT connection error: {e}");
                info!("Reconnecting in {}", humantime::format_duration(reconnect_delay));
                std::thread::sleep(reconnect_delay);
            }
        }
    }

    info!("MQTT connection closed");
    Ok(())
}
