// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Waflow configuration system.

use std::io::Write;

use serial_test::serial;
use waflow_config::diagnostic::ConfigError;
use waflow_config::model::WaflowConfig;
use waflow_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_waflow_config() {
    let toml = r#"
[service]
name = "outreach-eu"
log_level = "debug"

[storage]
database_path = "/tmp/waflow-test.db"
wal_mode = false

[broker]
poll_interval_ms = 100
lease_secs = 60
publish_timeout_secs = 2
publish_retries = 1

[retry]
max_attempts = 3
backoff_base_ms = 100
backoff_cap_ms = 1000
jitter_ratio = 0.0

[worker]
outreach_workers = 8
summarize_workers = 1
handler_timeout_secs = 10

[scheduler]
enabled = false
tick_interval_secs = 300
cooldown_hours = 72
jitter_min_ms = 10
jitter_max_ms = 20
batch_size = 25
outreach_template = "Hello {name}"

[ingress]
bind_address = "0.0.0.0"
port = 9000
signing_secret = "0123456789abcdef"
summarize_every = 10

[whatsapp]
api_key = "d360-key"
base_url = "http://localhost:9999"

[summarizer]
api_key = "sk-ant-123"
model = "claude-sonnet-4-5"
max_input_chars = 1000

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "outreach-eu");
    assert_eq!(config.service.log_level, "debug");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.broker.lease_secs, 60);
    assert_eq!(config.broker.publish_retries, 1);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.jitter_ratio, 0.0);
    assert_eq!(config.worker.outreach_workers, 8);
    assert!(!config.scheduler.enabled);
    assert_eq!(config.scheduler.cooldown_hours, 72);
    assert_eq!(config.scheduler.batch_size, 25);
    assert_eq!(config.scheduler.outreach_template, "Hello {name}");
    assert_eq!(config.ingress.port, 9000);
    assert_eq!(
        config.ingress.signing_secret.as_deref(),
        Some("0123456789abcdef")
    );
    assert_eq!(config.ingress.summarize_every, 10);
    assert_eq!(config.whatsapp.api_key.as_deref(), Some("d360-key"));
    assert_eq!(config.summarizer.model, "claude-sonnet-4-5");
    assert!(!config.prometheus.enabled);
}

/// Sections left out of the file keep their defaults.
#[test]
fn missing_sections_use_defaults() {
    let toml = r#"
[scheduler]
cooldown_hours = 24
"#;
    let config = load_config_from_str(toml).expect("partial TOML should deserialize");
    let defaults = WaflowConfig::default();
    assert_eq!(config.scheduler.cooldown_hours, 24);
    assert_eq!(
        config.scheduler.tick_interval_secs,
        defaults.scheduler.tick_interval_secs
    );
    assert_eq!(config.retry.max_attempts, defaults.retry.max_attempts);
    assert_eq!(config.whatsapp.base_url, "https://waba-sandbox.360dialog.io");
}

/// Unknown keys are rejected with a suggestion and the section's valid keys.
#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[scheduler]
cooldwn_hours = 24
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "cooldwn_hours"
                && suggestion.as_deref() == Some("cooldown_hours")
                && valid_keys.contains("tick_interval_secs")
        })
    });
    assert!(found, "expected UnknownKey for cooldwn_hours, got: {errors:?}");
}

/// Unknown top-level sections are rejected.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[rabbitmq]
url = "amqp://localhost"
"#;
    let err = load_config_from_str(toml).expect_err("should reject unknown section");
    assert!(err.to_string().contains("rabbitmq"));
}

/// A string where a number is expected produces an InvalidType diagnostic.
#[test]
fn invalid_type_is_reported() {
    let toml = r#"
[worker]
outreach_workers = "many"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject invalid type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("outreach_workers"))),
        "got: {errors:?}"
    );
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_runs_after_parse() {
    let toml = r#"
[scheduler]
jitter_min_ms = 900
jitter_max_ms = 100
"#;
    let errors = load_and_validate_str(toml).expect_err("inverted jitter must fail");
    assert!(matches!(&errors[0], ConfigError::Validation { message } if message.contains("jitter")));
}

/// ConfigError renders through miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "cooldwn_hours".to_string(),
        suggestion: Some("cooldown_hours".to_string()),
        valid_keys: "tick_interval_secs, cooldown_hours".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    let help = error.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("perhaps `cooldown_hours`"));

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("cooldwn_hours"));
}

/// `WAFLOW_<SECTION>_<KEY>` overrides file values and keeps underscores in key names.
#[test]
#[serial]
fn env_var_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "[ingress]\nsigning_secret = \"from-file-0123456789\"\nport = 7000"
    )
    .expect("write config");

    // SAFETY: serialized with other env-touching tests.
    unsafe {
        std::env::set_var("WAFLOW_INGRESS_SIGNING_SECRET", "from-env-0123456789");
        std::env::set_var("WAFLOW_SCHEDULER_COOLDOWN_HOURS", "12");
    }
    let result = load_and_validate_path(file.path());
    unsafe {
        std::env::remove_var("WAFLOW_INGRESS_SIGNING_SECRET");
        std::env::remove_var("WAFLOW_SCHEDULER_COOLDOWN_HOURS");
    }

    let config = result.expect("config should load");
    assert_eq!(
        config.ingress.signing_secret.as_deref(),
        Some("from-env-0123456789")
    );
    assert_eq!(config.ingress.port, 7000);
    assert_eq!(config.scheduler.cooldown_hours, 12);
}

/// A missing explicit file is not an error; defaults apply.
#[test]
#[serial]
fn missing_config_file_is_skipped() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = load_and_validate_path(&dir.path().join("absent.toml"))
        .expect("missing file should fall back to defaults");
    assert_eq!(config.service.name, "waflow");
}
