//! Unified configuration for the OTLP ingress bridge.
//!
//! Loaded from, in priority order (highest first):
//! 1. Environment variables (prefix `OTLP_INGRESS_`).
//! 2. A config file named by `OTLP_INGRESS_CONFIG`.
//! 3. `./config.toml` if present.
//! 4. Built-in defaults.

mod env_overrides;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, OsEnv, ENV_PREFIX};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Logical connector name; the stream identity prefix for every
    /// partition/offset key this instance emits.
    #[serde(default = "default_connector_name")]
    pub connector_name: String,

    #[serde(default)]
    pub otlp: OtlpConfig,

    #[serde(default)]
    pub kafka: KafkaConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_connector_name() -> String {
    "otlp-ingress".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connector_name: default_connector_name(),
            otlp: OtlpConfig::default(),
            kafka: KafkaConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpConfig {
    #[serde(default)]
    pub grpc: GrpcConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub message: MessageConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            grpc: GrpcConfig::default(),
            http: HttpConfig::default(),
            bind_address: default_bind_address(),
            tls: TlsConfig::default(),
            message: MessageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_grpc_port")]
    pub port: u16,
}

fn default_grpc_port() -> u16 {
    4317
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_grpc_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Maximum accepted OTLP HTTP body size, in bytes. Not part of the
    /// upstream wire contract's default table, but the donor's own
    /// request-size limit was never configurable either — promoting it to
    /// configuration with the 10 MiB default as its value.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_http_port() -> u16 {
    4318
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_http_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: None,
            key_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormatConfig {
    Json,
    Protobuf,
}

impl std::str::FromStr for MessageFormatConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "protobuf" => Ok(Self::Protobuf),
            other => anyhow::bail!("unsupported otlp.message.format: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    #[serde(default = "default_message_format")]
    pub format: MessageFormatConfig,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_message_format() -> MessageFormatConfig {
    MessageFormatConfig::Json
}

fn default_queue_size() -> usize {
    10_000
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            format: default_message_format(),
            queue_size: default_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_topic_traces")]
    pub topic_traces: String,
    #[serde(default = "default_topic_metrics")]
    pub topic_metrics: String,
    #[serde(default = "default_topic_logs")]
    pub topic_logs: String,
}

fn default_topic_traces() -> String {
    "otlp-traces".to_string()
}
fn default_topic_metrics() -> String {
    "otlp-metrics".to_string()
}
fn default_topic_logs() -> String {
    "otlp-logs".to_string()
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            topic_traces: default_topic_traces(),
            topic_metrics: default_topic_metrics(),
            topic_logs: default_topic_logs(),
        }
    }
}

/// Ambient options for the reference binary (not part of the specified
/// core, but thin glue that parameterizes it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_offset_store_path")]
    pub offset_store_path: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_offset_store_path() -> String {
    "./otlp-ingress-offsets.json".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            offset_store_path: default_offset_store_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources and validate it.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = std::env::var_os(format!("{ENV_PREFIX}CONFIG")) {
            config = Self::from_file(Path::new(&path))?;
        } else if Path::new("./config.toml").exists() {
            config = Self::from_file(Path::new("./config.toml"))?;
        }

        apply_env_overrides(&mut config, &OsEnv)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = RuntimeConfig::default();
        assert!(config.otlp.grpc.enabled);
        assert_eq!(config.otlp.grpc.port, 4317);
        assert!(config.otlp.http.enabled);
        assert_eq!(config.otlp.http.port, 4318);
        assert_eq!(config.otlp.bind_address, "0.0.0.0");
        assert!(!config.otlp.tls.enabled);
        assert_eq!(config.kafka.topic_traces, "otlp-traces");
        assert_eq!(config.kafka.topic_metrics, "otlp-metrics");
        assert_eq!(config.kafka.topic_logs, "otlp-logs");
        assert_eq!(config.otlp.message.format, MessageFormatConfig::Json);
        assert_eq!(config.otlp.message.queue_size, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_toml_overrides() {
        let toml_text = r#"
            connector_name = "my-connector"
            [otlp.grpc]
            port = 14317
            [otlp.message]
            format = "protobuf"
            queue_size = 500
        "#;
        let config: RuntimeConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.connector_name, "my-connector");
        assert_eq!(config.otlp.grpc.port, 14317);
        assert_eq!(config.otlp.message.format, MessageFormatConfig::Protobuf);
        assert_eq!(config.otlp.message.queue_size, 500);
    }
}
