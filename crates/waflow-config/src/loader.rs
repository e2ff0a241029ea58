// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./waflow.toml` > `~/.config/waflow/waflow.toml` > `/etc/waflow/waflow.toml`
//! with environment variable overrides via `WAFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WaflowConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/waflow/waflow.toml";

/// Configuration file in the working directory.
pub const LOCAL_CONFIG_PATH: &str = "waflow.toml";

/// Top-level sections, used to map `WAFLOW_<SECTION>_<KEY>` onto `section.key`.
const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "broker",
    "retry",
    "worker",
    "scheduler",
    "ingress",
    "whatsapp",
    "summarizer",
    "prometheus",
];

/// User XDG configuration file, if a config dir is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("waflow/waflow.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/waflow/waflow.toml` (system-wide)
/// 3. `~/.config/waflow/waflow.toml` (user XDG config)
/// 4. `./waflow.toml` (local directory)
/// 5. `WAFLOW_*` environment variables
pub fn load_config() -> Result<WaflowConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Backs `waflow --config <path>`.
pub fn load_config_from_str(toml_content: &str) -> Result<WaflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WaflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WaflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WaflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WaflowConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `WAFLOW_INGRESS_SIGNING_SECRET` maps to `ingress.signing_secret`, not
/// `ingress.signing.secret`.
fn env_provider() -> Env {
    Env::prefixed("WAFLOW_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config key.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
