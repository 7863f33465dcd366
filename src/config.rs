//! Configuration loading (spec §6, SPEC_FULL §A.1): cli > env > file > default,
//! mirroring the teacher's `SettingValue` precedence but scoped to the
//! handful of fields spec.md actually enumerates. Loading itself is external
//! to the core per spec §1 — the core only ever sees the resolved [`Config`].

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

fn default_buffer_size() -> usize {
    131072
}

fn default_checkpoint_frequency() -> usize {
    default_buffer_size() / 4
}

fn default_port() -> u16 {
    5000
}

fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_legacy_timeout() -> u64 {
    600
}

fn default_reconnect_interval() -> u64 {
    10000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub device: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub relative_time: bool,
    #[serde(default)]
    pub conversion_required: bool,
    #[serde(default)]
    pub real_time: bool,
    pub shdr_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_checkpoint_frequency")]
    pub checkpoint_frequency: usize,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_server_ip")]
    pub server_ip: String,
    #[serde(default = "default_legacy_timeout")]
    pub legacy_timeout: u64,
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,
    #[serde(default)]
    pub suppress_ip_address: bool,
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            checkpoint_frequency: default_checkpoint_frequency(),
            port: default_port(),
            server_ip: default_server_ip(),
            legacy_timeout: default_legacy_timeout(),
            reconnect_interval: default_reconnect_interval(),
            suppress_ip_address: false,
            adapters: Vec::new(),
        }
    }
}

/// Command-line overrides. Only the settings worth overriding at the
/// command line are exposed here; the rest come from the config file.
#[derive(Debug, Parser)]
#[command(version, about = "MTConnect agent")]
pub struct Args {
    /// Override the HTTP listen port
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Override the buffer capacity
    #[arg(long)]
    pub buffer_size: Option<usize>,
    /// Path to a TOML configuration file
    #[arg(long, default_value = "agent.toml")]
    pub config: PathBuf,
    /// Suppress the adapter IP address from the device model
    #[arg(long)]
    pub suppress_ip_address: bool,
}

impl Args {
    /// Merge file < default, then apply env overrides, then cli overrides —
    /// cli wins over env wins over file wins over built-in default.
    pub fn load(&self) -> anyhow::Result<Config> {
        let mut config = match std::fs::read_to_string(&self.config) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(_) => {
                tracing::debug!(path = %self.config.display(), "no config file found, using defaults");
                Config::default()
            }
        };

        if let Ok(port) = std::env::var("MTCONNECT_PORT") {
            config.port = port.parse()?;
        }
        if let Ok(ip) = std::env::var("MTCONNECT_SERVER_IP") {
            config.server_ip = ip;
        }

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if self.suppress_ip_address {
            config.suppress_ip_address = true;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.buffer_size, 131072);
        assert_eq!(config.checkpoint_frequency, config.buffer_size / 4);
        assert_eq!(config.port, 5000);
        assert_eq!(config.legacy_timeout, 600);
        assert_eq!(config.reconnect_interval, 10000);
    }

    #[test]
    fn toml_merges_under_defaults() {
        let toml_str = r#"
            port = 7878
            [[adapters]]
            device = "Mill01"
            host = "localhost"
            port = 7879
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 7878);
        assert_eq!(config.buffer_size, 131072);
        assert_eq!(config.adapters.len(), 1);
        assert_eq!(config.adapters[0].device, "Mill01");
    }
}
