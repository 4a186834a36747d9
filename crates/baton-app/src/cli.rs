//! CLI argument definitions for the baton binary.
//!
//! Uses `clap` with derive macros. Priority resolution:
//! CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::Parser;

use baton_core::BatonConfig;

/// baton - a control-plane bridge driving local speech and audio services.
#[derive(Parser, Debug)]
#[command(name = "baton", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Address the control channel listens on, e.g. 127.0.0.1:9462.
    #[arg(short = 'b', long = "bind")]
    pub bind: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > BATON_CONFIG env var > ~/.baton/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref path) = self.config {
            return path.clone();
        }
        if let Ok(path) = std::env::var("BATON_CONFIG") {
            return PathBuf::from(path);
        }
        default_config_path()
    }

    /// Resolve the control-channel bind address.
    ///
    /// Priority: --bind flag > BATON_BIND env var > config file value.
    pub fn resolve_bind(&self, config: &BatonConfig) -> String {
        if let Some(ref bind) = self.bind {
            return bind.clone();
        }
        if let Ok(bind) = std::env::var("BATON_BIND") {
            return bind;
        }
        config.channel.bind_addr.clone()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config: &BatonConfig) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        config.general.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".baton").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".baton").join("config.toml");
    }
    PathBuf::from("config.toml")
}
