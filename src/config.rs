use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VizError, VizResult};
use crate::geometry::CanvasSize;

const SERVER_BASE_URL: &str = "http://localhost:8080";
const GRAPH_PATH: &str = "/graph/";
const SOLUTION_PATH: &str = "/solution/";
const HTTP_TIMEOUT_MS: u64 = 30_000;

const BROKER_URL: &str = "ws://localhost:8080/visualizer";
const SOLUTION_TOPIC: &str = "/topic/solution";
const PUBLISH_DESTINATION: &str = "cities";
const RECONNECT_DELAY_MS: u64 = 5_000;
const HEARTBEAT_OUTGOING_MS: u64 = 4_000;
const HEARTBEAT_INCOMING_MS: u64 = 4_000;
const CONNECT_TIMEOUT_MS: u64 = 10_000;
const PUBLISH_TIMEOUT_MS: u64 = 5_000;
const ALERT_AFTER_FAILURES: u32 = 5;

const CANVAS_WIDTH: u32 = 800;
const CANVAS_HEIGHT: u32 = 600;
const MAX_CITIES: usize = 5_000;

/// How solution requests reach the solver. One mode is used per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Synchronous POST to the solution endpoint.
    Direct,
    /// Publish on the broker, receive the tour on the solution topic.
    Broker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default = "default_delivery")]
    pub delivery: DeliveryMode,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default = "default_max_cities")]
    pub max_cities: usize,
    /// Builtin palette name or path to a palette file.
    #[serde(default)]
    pub palette: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_graph_path")]
    pub graph_path: String,
    #[serde(default = "default_solution_path")]
    pub solution_path: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_destination")]
    pub destination: String,
    /// Fixed pause between connection attempts.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// How often we promise to send heart-beats; 0 disables.
    #[serde(default = "default_heartbeat_outgoing")]
    pub heartbeat_outgoing_ms: u64,
    /// How often we want the broker to send heart-beats; 0 disables.
    #[serde(default = "default_heartbeat_incoming")]
    pub heartbeat_incoming_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
    /// Consecutive failed attempts before the user is told the broker is
    /// unreachable. Reconnecting continues regardless.
    #[serde(default = "default_alert_after_failures")]
    pub alert_after_failures: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_width")]
    pub width: u32,
    #[serde(default = "default_canvas_height")]
    pub height: u32,
}

fn default_delivery() -> DeliveryMode {
    DeliveryMode::Broker
}
fn default_max_cities() -> usize {
    MAX_CITIES
}
fn default_base_url() -> String {
    SERVER_BASE_URL.to_string()
}
fn default_graph_path() -> String {
    GRAPH_PATH.to_string()
}
fn default_solution_path() -> String {
    SOLUTION_PATH.to_string()
}
fn default_http_timeout() -> u64 {
    HTTP_TIMEOUT_MS
}
fn default_broker_url() -> String {
    BROKER_URL.to_string()
}
fn default_topic() -> String {
    SOLUTION_TOPIC.to_string()
}
fn default_destination() -> String {
    PUBLISH_DESTINATION.to_string()
}
fn default_reconnect_delay() -> u64 {
    RECONNECT_DELAY_MS
}
fn default_heartbeat_outgoing() -> u64 {
    HEARTBEAT_OUTGOING_MS
}
fn default_heartbeat_incoming() -> u64 {
    HEARTBEAT_INCOMING_MS
}
fn default_connect_timeout() -> u64 {
    CONNECT_TIMEOUT_MS
}
fn default_publish_timeout() -> u64 {
    PUBLISH_TIMEOUT_MS
}
fn default_alert_after_failures() -> u32 {
    ALERT_AFTER_FAILURES
}
fn default_canvas_width() -> u32 {
    CANVAS_WIDTH
}
fn default_canvas_height() -> u32 {
    CANVAS_HEIGHT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            broker: BrokerConfig::default(),
            delivery: default_delivery(),
            canvas: CanvasConfig::default(),
            max_cities: MAX_CITIES,
            palette: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            graph_path: default_graph_path(),
            solution_path: default_solution_path(),
            timeout_ms: HTTP_TIMEOUT_MS,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            topic: default_topic(),
            destination: default_destination(),
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            heartbeat_outgoing_ms: HEARTBEAT_OUTGOING_MS,
            heartbeat_incoming_ms: HEARTBEAT_INCOMING_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            publish_timeout_ms: PUBLISH_TIMEOUT_MS,
            alert_after_failures: ALERT_AFTER_FAILURES,
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
        }
    }
}

impl CanvasConfig {
    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }
}

impl ServerConfig {
    pub fn graph_url(&self) -> String {
        join_url(&self.base_url, &self.graph_path)
    }

    pub fn solution_url(&self) -> String {
        join_url(&self.base_url, &self.solution_path)
    }
}

impl BrokerConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl Config {
    pub fn from_toml(content: &str) -> VizResult<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| VizError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()
    }

    pub fn from_yaml(content: &str) -> VizResult<Self> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| VizError::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()
    }

    /// Load a config file, trying TOML first and YAML second.
    pub fn load(path: &Path) -> VizResult<Self> {
        if !path.is_file() {
            return Err(VizError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;

        match Self::from_toml(&content) {
            Ok(config) => Ok(config),
            Err(toml_err) => Self::from_yaml(&content).map_err(|yaml_err| {
                VizError::Config(format!(
                    "{} is neither valid TOML ({}) nor YAML ({})",
                    path.display(),
                    toml_err,
                    yaml_err
                ))
            }),
        }
    }

    fn validate(self) -> VizResult<Self> {
        if self.max_cities == 0 {
            return Err(VizError::Config("max_cities must be at least 1".into()));
        }
        if self.broker.reconnect_delay_ms == 0 {
            return Err(VizError::Config(
                "broker.reconnect_delay_ms must be positive".into(),
            ));
        }
        if !self.broker.url.starts_with("ws://") {
            return Err(VizError::Config(format!(
                "broker.url '{}' must be a ws:// URL",
                self.broker.url
            )));
        }
        if !self.broker.topic.starts_with('/') {
            return Err(VizError::Config(format!(
                "broker.topic '{}' must start with '/'",
                self.broker.topic
            )));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_server() {
        let config = Config::default();
        assert_eq!(config.server.graph_url(), "http://localhost:8080/graph/");
        assert_eq!(config.server.solution_url(), "http://localhost:8080/solution/");
        assert_eq!(config.broker.url, "ws://localhost:8080/visualizer");
        assert_eq!(config.broker.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.delivery, DeliveryMode::Broker);
        assert_eq!(config.canvas.size(), CanvasSize::new(800, 600));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
delivery = "direct"

[server]
base_url = "http://solver.internal:9000/"

[broker]
heartbeat_incoming_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(config.delivery, DeliveryMode::Direct);
        assert_eq!(config.server.graph_url(), "http://solver.internal:9000/graph/");
        assert_eq!(config.broker.heartbeat_incoming_ms, 0);
        assert_eq!(config.broker.heartbeat_outgoing_ms, 4_000);
        assert_eq!(config.max_cities, 5_000);
    }

    #[test]
    fn yaml_is_accepted() {
        let config = Config::from_yaml(
            "canvas:\n  width: 1024\n  height: 768\npalette: midnight\n",
        )
        .unwrap();
        assert_eq!(config.canvas.size(), CanvasSize::new(1024, 768));
        assert_eq!(config.palette.as_deref(), Some("midnight"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_toml("max_cities = 0").is_err());
        assert!(Config::from_toml("[broker]\ntopic = \"solution\"").is_err());
        assert!(Config::from_toml("[broker]\nreconnect_delay_ms = 0").is_err());
    }

    #[test]
    fn broker_url_must_be_plain_websocket() {
        let err = Config::from_toml("[broker]\nurl = \"wss://broker.example/visualizer\"")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: broker.url 'wss://broker.example/visualizer' must be a ws:// URL"
        );
        assert!(Config::from_yaml("broker:\n  url: http://localhost:8080/visualizer\n").is_err());
    }
}
