// Environment-variable overrides, highest priority in the load order.

use crate::{MessageFormatConfig, RuntimeConfig};
use anyhow::{Context, Result};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "OTLP_INGRESS_";

/// Abstraction over environment-variable lookups so the override logic is
/// testable without mutating the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct OsEnv;

impl EnvSource for OsEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{ENV_PREFIX}{key}")).ok()
    }
}

pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    if let Some(v) = env.get("CONNECTOR_NAME") {
        config.connector_name = v;
    }
    if let Some(v) = get_bool(env, "OTLP_GRPC_ENABLED")? {
        config.otlp.grpc.enabled = v;
    }
    if let Some(v) = get_u16(env, "OTLP_GRPC_PORT")? {
        config.otlp.grpc.port = v;
    }
    if let Some(v) = get_bool(env, "OTLP_HTTP_ENABLED")? {
        config.otlp.http.enabled = v;
    }
    if let Some(v) = get_u16(env, "OTLP_HTTP_PORT")? {
        config.otlp.http.port = v;
    }
    if let Some(v) = env.get("OTLP_BIND_ADDRESS") {
        config.otlp.bind_address = v;
    }
    if let Some(v) = get_bool(env, "OTLP_TLS_ENABLED")? {
        config.otlp.tls.enabled = v;
    }
    if let Some(v) = env.get("OTLP_TLS_CERT_PATH") {
        config.otlp.tls.cert_path = Some(v);
    }
    if let Some(v) = env.get("OTLP_TLS_KEY_PATH") {
        config.otlp.tls.key_path = Some(v);
    }
    if let Some(v) = env.get("OTLP_MESSAGE_FORMAT") {
        config.otlp.message.format =
            MessageFormatConfig::from_str(&v).context("OTLP_INGRESS_OTLP_MESSAGE_FORMAT")?;
    }
    if let Some(v) = get_usize(env, "OTLP_MESSAGE_QUEUE_SIZE")? {
        config.otlp.message.queue_size = v;
    }
    if let Some(v) = env.get("KAFKA_TOPIC_TRACES") {
        config.kafka.topic_traces = v;
    }
    if let Some(v) = env.get("KAFKA_TOPIC_METRICS") {
        config.kafka.topic_metrics = v;
    }
    if let Some(v) = env.get("KAFKA_TOPIC_LOGS") {
        config.kafka.topic_logs = v;
    }
    if let Some(v) = env.get("LOG_LEVEL") {
        config.server.log_level = v;
    }

    Ok(())
}

fn get_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match env.get(key) {
        Some(v) => Ok(Some(
            v.parse().with_context(|| format!("{ENV_PREFIX}{key} must be true/false"))?,
        )),
        None => Ok(None),
    }
}

fn get_u16<E: EnvSource>(env: &E, key: &str) -> Result<Option<u16>> {
    match env.get(key) {
        Some(v) => Ok(Some(
            v.parse().with_context(|| format!("{ENV_PREFIX}{key} must be a valid port"))?,
        )),
        None => Ok(None),
    }
}

fn get_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match env.get(key) {
        Some(v) => Ok(Some(
            v.parse().with_context(|| format!("{ENV_PREFIX}{key} must be a non-negative integer"))?,
        )),
        None => Ok(None),
    }
}
