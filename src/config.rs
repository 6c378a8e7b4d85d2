//! Relay configuration from flags and environment

use crate::transport::MqttConfig;
use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use relay_shared::limits;
use std::time::Duration;

/// Keep-alive interval for the broker connection
const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Edge relay between the command ledger and the actuator bus
#[derive(Parser, Debug, Clone)]
#[command(name = "edge-relay", version, about)]
pub struct RelayConfig {
    /// Base URL of the ledger backend
    #[arg(long, env = "LEDGER_URL", value_parser = NonEmptyStringValueParser::new())]
    pub ledger_url: String,

    /// Public API key of the ledger backend
    #[arg(
        long,
        env = "LEDGER_KEY",
        hide_env_values = true,
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub ledger_key: String,

    /// Device account email
    #[arg(long, env = "DEVICE_EMAIL", value_parser = NonEmptyStringValueParser::new())]
    pub device_email: String,

    /// Device account password
    #[arg(
        long,
        env = "DEVICE_PASSWORD",
        hide_env_values = true,
        value_parser = NonEmptyStringValueParser::new()
    )]
    pub device_password: String,

    /// Device whose commands this relay executes
    #[arg(long, env = "DEVICE_ID", value_parser = NonEmptyStringValueParser::new())]
    pub device_id: String,

    /// Site namespace for canonical topics
    #[arg(long, env = "SITE_ID", value_parser = NonEmptyStringValueParser::new())]
    pub site_id: String,

    #[arg(long, env = "MQTT_HOST", value_parser = NonEmptyStringValueParser::new())]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_USERNAME", requires = "mqtt_password")]
    pub mqtt_username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true, requires = "mqtt_username")]
    pub mqtt_password: Option<String>,

    /// Defaults to `edge-relay-<device_id>`
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: Option<String>,

    /// Milliseconds between safety-net polls
    #[arg(
        long,
        env = "POLL_INTERVAL_MS",
        default_value_t = limits::DEFAULT_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_ms: u64,

    /// Ledger table carrying command rows
    #[arg(long, env = "LEDGER_COMMANDS_TABLE", default_value = "device_commands")]
    pub commands_table: String,

    /// Subscribe to the site's topics and log everything seen on the bus
    #[arg(long, env = "DEBUG_ECHO")]
    pub debug_echo: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl RelayConfig {
    pub fn client_id(&self) -> String {
        self.mqtt_client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("edge-relay-{}", self.device_id))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.client_id(),
            credentials: self.mqtt_username.clone().zip(self.mqtt_password.clone()),
            keep_alive: MQTT_KEEP_ALIVE,
            site_id: self.site_id.clone(),
            debug_echo: self.debug_echo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    const REQUIRED: &[&str] = &[
        "edge-relay",
        "--ledger-url",
        "https://ledger.example",
        "--ledger-key",
        "anon",
        "--device-email",
        "relay@example.com",
        "--device-password",
        "pw",
        "--device-id",
        "edge-1",
        "--site-id",
        "gym",
        "--mqtt-host",
        "localhost",
    ];

    fn parse(extra: &[&str]) -> Result<RelayConfig, clap::Error> {
        RelayConfig::try_parse_from(REQUIRED.iter().chain(extra.iter()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.mqtt_port, 1883);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.commands_table, "device_commands");
        assert_eq!(config.client_id(), "edge-relay-edge-1");
        assert!(!config.debug_echo);

        let mqtt = config.mqtt_config();
        assert!(mqtt.credentials.is_none());
        assert_eq!(mqtt.site_id, "gym");
    }

    #[test]
    fn test_mqtt_credentials_pair() {
        let config = parse(&["--mqtt-username", "relay", "--mqtt-password", "secret"]).unwrap();
        assert_eq!(
            config.mqtt_config().credentials,
            Some(("relay".to_string(), "secret".to_string()))
        );

        let err = parse(&["--mqtt-username", "relay"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        assert!(parse(&["--poll-interval-ms", "0"]).is_err());
        assert_eq!(parse(&["--poll-interval-ms", "500"]).unwrap().poll_interval_ms, 500);
    }

    #[test]
    fn test_rejects_empty_device_id() {
        let mut args = REQUIRED.to_vec();
        args[10] = "";
        assert!(RelayConfig::try_parse_from(args).is_err());
    }

    #[test]
    fn test_explicit_client_id() {
        let config = parse(&["--mqtt-client-id", "gym-relay"]).unwrap();
        assert_eq!(config.client_id(), "gym-relay");
    }
}
