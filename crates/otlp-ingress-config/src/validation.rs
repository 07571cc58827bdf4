// Configuration validation: required fields are present, values are
// within the ranges §6 declares.

use crate::RuntimeConfig;
use anyhow::{bail, Result};

pub fn validate(config: &RuntimeConfig) -> Result<()> {
    if !config.otlp.grpc.enabled && !config.otlp.http.enabled {
        bail!("at least one of otlp.grpc.enabled or otlp.http.enabled must be true");
    }

    validate_port(config.otlp.grpc.port, "otlp.grpc.port")?;
    validate_port(config.otlp.http.port, "otlp.http.port")?;

    if config.otlp.tls.enabled {
        if config.otlp.tls.cert_path.as_deref().unwrap_or("").is_empty() {
            bail!("otlp.tls.cert.path is required when otlp.tls.enabled is true");
        }
        if config.otlp.tls.key_path.as_deref().unwrap_or("").is_empty() {
            bail!("otlp.tls.key.path is required when otlp.tls.enabled is true");
        }
    }

    let queue_size = config.otlp.message.queue_size;
    if !(100..=1_000_000).contains(&queue_size) {
        bail!("otlp.message.queue.size must be within [100, 1000000], got {queue_size}");
    }

    if config.otlp.http.max_body_bytes == 0 {
        bail!("otlp.http.max_body_bytes must be greater than 0");
    }

    Ok(())
}

fn validate_port(port: u16, field: &str) -> Result<()> {
    if port == 0 {
        bail!("{field} must be within [1, 65535], got {port}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;

    #[test]
    fn rejects_both_receivers_disabled() {
        let mut config = RuntimeConfig::default();
        config.otlp.grpc.enabled = false;
        config.otlp.http.enabled = false;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_tls_enabled_without_cert_or_key() {
        let mut config = RuntimeConfig::default();
        config.otlp.tls.enabled = true;
        assert!(validate(&config).is_err());
        config.otlp.tls.cert_path = Some("cert.pem".to_string());
        assert!(validate(&config).is_err());
        config.otlp.tls.key_path = Some("key.pem".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_queue_size_out_of_range() {
        let mut config = RuntimeConfig::default();
        config.otlp.message.queue_size = 50;
        assert!(validate(&config).is_err());
        config.otlp.message.queue_size = 2_000_000;
        assert!(validate(&config).is_err());
        config.otlp.message.queue_size = 100;
        assert!(validate(&config).is_ok());
    }
}
