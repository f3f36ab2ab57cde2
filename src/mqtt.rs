use anyhow::{bail, Context, Result};
use rumqttc::{Client, Connection, Event, Incoming, MqttOptions, Outgoing, QoS};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "MqttConfig::default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "MqttConfig::default_client_id")]
    pub client_id: String,
    #[serde(default = "MqttConfig::default_qos")]
    pub qos: u8,
    #[serde(default = "MqttConfig::default_keep_alive", with = "humantime_serde")]
    pub keep_alive: Duration,
    #[serde(
        default = "MqttConfig::default_reconnect_delay",
        with = "humantime_serde"
    )]
    pub reconnect_delay: Duration,
    #[serde(default = "MqttConfig::default_topic_prefix")]
    pub topic_prefix: String,
    /// Decode unsolicited 0x10 packets on the update topic as uploads.
    #[serde(default)]
    pub update_is_upload: bool,
}

impl MqttConfig {
    fn default_port() -> u16 {
        1883
    }

    fn default_qos() -> u8 {
        0
    }

    fn generate_random_string(len: usize) -> String {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn default_client_id() -> String {
        format!("powerbank-{}", Self::generate_random_string(8))
    }

    fn default_keep_alive() -> Duration {
        Duration::from_secs(60)
    }

    fn default_reconnect_delay() -> Duration {
        Duration::from_secs(5)
    }

    fn default_topic_prefix() -> String {
        "/powerbank".into()
    }

    pub const DEFAULT_CONFIG_FILE: &str = "mqtt.yaml";

    pub fn load(config_file_path: &str) -> Result<Self> {
        log::debug!("Loading config file from {config_file_path:?}");
        let config_file = std::fs::File::open(config_file_path)
            .with_context(|| format!("Cannot open MQTT config file {config_file_path:?}"))?;
        let config: Self = serde_yaml::from_reader(&config_file)
            .with_context(|| format!("Cannot read MQTT config from file: {config_file_path:?}"))?;
        config.quality_of_service()?;
        Ok(config)
    }

    pub fn quality_of_service(&self) -> Result<QoS> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            qos => bail!("Invalid MQTT QoS {qos}, expected 0, 1 or 2"),
        }
    }

    fn prefix(&self) -> &str {
        self.topic_prefix.trim_end_matches('/')
    }

    /// Wildcard topic carrying check, pop-up, return and upload reports.
    pub fn update_filter(&self) -> String {
        format!("{}/+/user/update", self.prefix())
    }

    /// Wildcard topic carrying health-check packets.
    pub fn heart_filter(&self) -> String {
        format!("{}/+/user/heart", self.prefix())
    }

    pub fn command_topic(&self, device: &str) -> String {
        format!("{}/{device}/user/get", self.prefix())
    }

    pub fn heart_topic(&self, device: &str) -> String {
        format!("{}/{device}/user/heart", self.prefix())
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            options.set_credentials(username, password);
        }
        options
    }

    /// Splits an inbound topic under `topic_prefix` into its device id and
    /// channel.
    ///
    /// eg /powerbank/cab01/user/update => ("cab01", Update)
    pub fn route_topic<'t>(&self, topic: &'t str) -> Option<(&'t str, Channel)> {
        let rest = topic.strip_prefix(self.prefix())?.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let device = parts.next().filter(|device| !device.is_empty())?;
        if parts.next()? != "user" {
            return None;
        }
        let channel = match parts.next()? {
            "update" => Channel::Update,
            "heart" => Channel::Heart,
            _ => return None,
        };
        match parts.next() {
            None => Some((device, channel)),
            Some(_) => None,
        }
    }
}

/// Which stream an inbound publish belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Update,
    Heart,
}

/// Control messages sent to a cabinet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", content = "data", rename_all = "snake_case")]
pub enum OutboundCommand {
    Check,
    PopupSn(String),
    UploadAll,
    #[serde(skip)]
    HealthCheck,
}

impl OutboundCommand {
    /// Topic and payload for `device`. Health-check requests go to the heart
    /// topic with an empty payload.
    pub fn message(&self, config: &MqttConfig, device: &str) -> Result<(String, Vec<u8>)> {
        match self {
            OutboundCommand::HealthCheck => Ok((config.heart_topic(device), Vec::new())),
            command => Ok((
                config.command_topic(device),
                serde_json::to_vec(command)
                    .with_context(|| format!("Cannot serialize command {command:?}"))?,
            )),
        }
    }
}

/// Receives raw transport traffic for debugging.
pub trait TransportObserver {
    fn on_receive(&self, topic: &str, payload: &[u8]);
    fn on_publish(&self, topic: &str, payload: &[u8]);
}

/// Forwards transport traffic to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl TransportObserver for LogObserver {
    fn on_receive(&self, topic: &str, payload: &[u8]) {
        log::debug!("RX: topic='{topic}' payload={}", hex::encode(payload));
    }

    fn on_publish(&self, topic: &str, payload: &[u8]) {
        log::debug!("TX: topic='{topic}' payload={}", hex::encode(payload));
    }
}

pub struct MqttTransport<O: TransportObserver = LogObserver> {
    client: Client,
    config: MqttConfig,
    qos: QoS,
    observer: O,
}

impl MqttTransport<LogObserver> {
    pub fn new(config: MqttConfig) -> Result<(Self, Connection)> {
        Self::with_observer(config, LogObserver)
    }
}

impl<O: TransportObserver> MqttTransport<O> {
    pub fn with_observer(config: MqttConfig, observer: O) -> Result<(Self, Connection)> {
        let qos = config.quality_of_service()?;
        log::info!(
            "Connecting to MQTT broker {}:{} with client_id: {}",
            config.host,
            config.port,
            config.client_id
        );
        let (client, connection) = Client::new(config.mqtt_options(), 10);
        Ok((
            Self {
                client,
                config,
                qos,
                observer,
            },
            connection,
        ))
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn subscribe_reports(&mut self) -> Result<()> {
        for filter in [self.config.update_filter(), self.config.heart_filter()] {
            log::info!("Subscribing to {filter}");
            self.client
                .subscribe(&filter, self.qos)
                .with_context(|| format!("Failed to subscribe to MQTT topic: {filter}"))?;
        }
        Ok(())
    }

    pub fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.observer.on_publish(topic, &payload);
        self.client
            .publish(topic, self.qos, false, payload)
            .with_context(|| format!("Failed to publish message to MQTT topic: {topic}"))?;
        Ok(())
    }

    pub fn send(&mut self, device: &str, command: &OutboundCommand) -> Result<()> {
        let (topic, payload) = command.message(&self.config, device)?;
        log::info!("Sending {command:?} to {device} on {topic}");
        self.publish(&topic, payload)
    }

    /// Drives `connection` until the broker has taken the last publish: written
    /// out for QoS 0, acknowledged otherwise.
    pub fn wait_for_publish(&self, connection: &mut Connection, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = match connection.recv_timeout(remaining) {
                Ok(event) => event.with_context(|| "MQTT connection error")?,
                Err(_) => bail!(
                    "Timed out after {} waiting for the MQTT broker",
                    humantime::format_duration(timeout)
                ),
            };
            log::trace!("MQTT event: {event:?}");
            match (self.qos, event) {
                (QoS::AtMostOnce, Event::Outgoing(Outgoing::Publish(_)))
                | (QoS::AtLeastOnce, Event::Incoming(Incoming::PubAck(_)))
                | (QoS::ExactlyOnce, Event::Incoming(Incoming::PubComp(_))) => return Ok(()),
                _ => {}
            }
        }
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.client
            .disconnect()
            .with_context(|| "Failed to disconnect from MQTT broker")?;
        Ok(())
    }
}
