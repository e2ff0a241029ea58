// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, ordered jitter bounds, and key material shape.

use crate::diagnostic::ConfigError;
use crate::model::{MAX_COOLDOWN_HOURS, WaflowConfig};

fn invalid(errors: &mut Vec<ConfigError>, message: String) {
    errors.push(ConfigError::Validation { message });
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &WaflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        invalid(
            &mut errors,
            "storage.database_path must not be empty".to_string(),
        );
    }

    // Broker
    if config.broker.poll_interval_ms == 0 {
        invalid(
            &mut errors,
            "broker.poll_interval_ms must be at least 1".to_string(),
        );
    }
    if config.broker.lease_secs == 0 {
        invalid(&mut errors, "broker.lease_secs must be at least 1".to_string());
    }
    if config.broker.publish_timeout_secs == 0 {
        invalid(
            &mut errors,
            "broker.publish_timeout_secs must be at least 1".to_string(),
        );
    }
    if config.broker.reconnect_base_ms > config.broker.reconnect_cap_ms {
        invalid(
            &mut errors,
            format!(
                "broker.reconnect_base_ms ({}) must not exceed broker.reconnect_cap_ms ({})",
                config.broker.reconnect_base_ms, config.broker.reconnect_cap_ms
            ),
        );
    }

    // Retry
    if config.retry.max_attempts == 0 {
        invalid(&mut errors, "retry.max_attempts must be at least 1".to_string());
    }
    if config.retry.backoff_base_ms > config.retry.backoff_cap_ms {
        invalid(
            &mut errors,
            format!(
                "retry.backoff_base_ms ({}) must not exceed retry.backoff_cap_ms ({})",
                config.retry.backoff_base_ms, config.retry.backoff_cap_ms
            ),
        );
    }
    if !(0.0..=1.0).contains(&config.retry.jitter_ratio) {
        invalid(
            &mut errors,
            format!(
                "retry.jitter_ratio must be between 0.0 and 1.0, got {}",
                config.retry.jitter_ratio
            ),
        );
    }

    // Workers
    if config.worker.outreach_workers == 0 {
        invalid(
            &mut errors,
            "worker.outreach_workers must be at least 1".to_string(),
        );
    }
    if config.worker.summarize_workers == 0 {
        invalid(
            &mut errors,
            "worker.summarize_workers must be at least 1".to_string(),
        );
    }
    if config.worker.handler_timeout_secs == 0 {
        invalid(
            &mut errors,
            "worker.handler_timeout_secs must be at least 1".to_string(),
        );
    }

    // A lease that can expire mid-handler hands the task to a second worker.
    if config.broker.lease_secs <= config.worker.handler_timeout_secs {
        invalid(
            &mut errors,
            format!(
                "broker.lease_secs ({}) must exceed worker.handler_timeout_secs ({})",
                config.broker.lease_secs, config.worker.handler_timeout_secs
            ),
        );
    }

    // Scheduler
    if config.scheduler.tick_interval_secs == 0 {
        invalid(
            &mut errors,
            "scheduler.tick_interval_secs must be at least 1".to_string(),
        );
    }
    if config.scheduler.cooldown_hours == 0 {
        invalid(
            &mut errors,
            "scheduler.cooldown_hours must be at least 1".to_string(),
        );
    }
    if config.scheduler.cooldown_hours > MAX_COOLDOWN_HOURS {
        invalid(
            &mut errors,
            format!(
                "scheduler.cooldown_hours must be at most {MAX_COOLDOWN_HOURS}, got {}",
                config.scheduler.cooldown_hours
            ),
        );
    }
    if config.scheduler.jitter_min_ms > config.scheduler.jitter_max_ms {
        invalid(
            &mut errors,
            format!(
                "scheduler.jitter_min_ms ({}) must not exceed scheduler.jitter_max_ms ({})",
                config.scheduler.jitter_min_ms, config.scheduler.jitter_max_ms
            ),
        );
    }
    if config.scheduler.batch_size == 0 {
        invalid(
            &mut errors,
            "scheduler.batch_size must be at least 1".to_string(),
        );
    }
    if config.scheduler.outreach_template.trim().is_empty() {
        invalid(
            &mut errors,
            "scheduler.outreach_template must not be empty".to_string(),
        );
    }

    // Ingress
    let addr = config.ingress.bind_address.trim();
    if addr.is_empty() {
        invalid(
            &mut errors,
            "ingress.bind_address must not be empty".to_string(),
        );
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            invalid(
                &mut errors,
                format!("ingress.bind_address `{addr}` is not a valid IP address or hostname"),
            );
        }
    }
    if let Some(secret) = &config.ingress.signing_secret
        && secret.len() < 16
    {
        invalid(
            &mut errors,
            "ingress.signing_secret must be at least 16 characters".to_string(),
        );
    }
    if let Some(key) = &config.ingress.encryption_key
        && (key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()))
    {
        invalid(
            &mut errors,
            "ingress.encryption_key must be 64 hex characters (32 bytes)".to_string(),
        );
    }
    if config.ingress.max_body_bytes == 0 {
        invalid(
            &mut errors,
            "ingress.max_body_bytes must be at least 1".to_string(),
        );
    }
    if config.ingress.summarize_every < 1 {
        invalid(
            &mut errors,
            format!(
                "ingress.summarize_every must be at least 1, got {}",
                config.ingress.summarize_every
            ),
        );
    }

    // Providers
    for (name, url) in [
        ("whatsapp.base_url", &config.whatsapp.base_url),
        ("summarizer.base_url", &config.summarizer.base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            invalid(
                &mut errors,
                format!("{name} must start with http:// or https://, got `{url}`"),
            );
        }
    }
    if config.whatsapp.timeout_secs == 0 {
        invalid(
            &mut errors,
            "whatsapp.timeout_secs must be at least 1".to_string(),
        );
    }
    if config.summarizer.timeout_secs == 0 {
        invalid(
            &mut errors,
            "summarizer.timeout_secs must be at least 1".to_string(),
        );
    }
    if config.summarizer.max_input_chars == 0 {
        invalid(
            &mut errors,
            "summarizer.max_input_chars must be at least 1".to_string(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &WaflowConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        let config = WaflowConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = WaflowConfig::default();
        config.storage.database_path = "".to_string();
        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("database_path"));
    }

    #[test]
    fn inverted_jitter_bounds_fail() {
        let mut config = WaflowConfig::default();
        config.scheduler.jitter_min_ms = 500;
        config.scheduler.jitter_max_ms = 100;
        assert!(messages(&config)[0].contains("jitter_min_ms"));
    }

    #[test]
    fn zero_max_attempts_fails() {
        let mut config = WaflowConfig::default();
        config.retry.max_attempts = 0;
        assert!(messages(&config)[0].contains("retry.max_attempts"));
    }

    #[test]
    fn malformed_encryption_key_fails() {
        let mut config = WaflowConfig::default();
        config.ingress.encryption_key = Some("abc".into());
        assert!(messages(&config)[0].contains("encryption_key"));

        config.ingress.encryption_key = Some("ab".repeat(32));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn short_signing_secret_fails() {
        let mut config = WaflowConfig::default();
        config.ingress.signing_secret = Some("short".into());
        assert!(messages(&config)[0].contains("signing_secret"));
    }

    #[test]
    fn lease_must_outlive_handler_timeout() {
        let mut config = WaflowConfig::default();
        config.broker.lease_secs = 10;
        config.worker.handler_timeout_secs = 30;
        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("broker.lease_secs (10)"), "{errors:?}");

        config.broker.lease_secs = 30;
        assert_eq!(messages(&config).len(), 1);

        config.broker.lease_secs = 31;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_cooldown_fails() {
        let mut config = WaflowConfig::default();
        config.scheduler.cooldown_hours = 0;
        assert!(messages(&config)[0].contains("cooldown_hours"));

        config.scheduler.cooldown_hours = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = WaflowConfig::default();
        config.retry.max_attempts = 0;
        config.worker.summarize_workers = 0;
        config.whatsapp.base_url = "ftp://nope".into();
        assert_eq!(messages(&config).len(), 3);
    }
}
