use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BatonError, Result};

/// Top-level configuration for the baton bridge.
///
/// Loaded from `~/.baton/config.toml` by default. Each section corresponds to
/// one subsystem of the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatonConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub grammar: GrammarConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

impl BatonConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BatonConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BatonError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Control-channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Loopback address the bridge listens on for the controller.
    pub bind_addr: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9462".to_string(),
        }
    }
}

/// Audio playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Worker poll interval in milliseconds.
    pub tick_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { tick_ms: 500 }
    }
}

/// Recognition-grammar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// Poll interval, in milliseconds, while waiting for the recognizer to
    /// confirm an asynchronous grammar load.
    pub confirm_poll_ms: u64,
    /// Default token that terminates a dictation session.
    pub end_token: String,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            confirm_poll_ms: 250,
            end_token: "end dictation".to_string(),
        }
    }
}

/// Sound recording settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Worker poll interval in milliseconds.
    pub tick_ms: u64,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Capture channel count.
    pub channels: u16,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

/// Completion-waiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Poll interval, in milliseconds, for idle-query waiters.
    pub poll_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self { poll_ms: 250 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BatonConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.channel.bind_addr, "127.0.0.1:9462");
        assert_eq!(config.playback.tick_ms, 500);
        assert_eq!(config.grammar.confirm_poll_ms, 250);
        assert_eq!(config.grammar.end_token, "end dictation");
        assert_eq!(config.recording.sample_rate, 44_100);
        assert_eq!(config.recording.channels, 1);
        assert_eq!(config.completion.poll_ms, 250);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = BatonConfig::default();
        config.channel.bind_addr = "127.0.0.1:7001".to_string();
        config.playback.tick_ms = 100;
        config.save(&path).unwrap();

        let loaded = BatonConfig::load(&path).unwrap();
        assert_eq!(loaded.channel.bind_addr, "127.0.0.1:7001");
        assert_eq!(loaded.playback.tick_ms, 100);
        assert_eq!(loaded.grammar.end_token, "end dictation");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        assert!(BatonConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let config = BatonConfig::load_or_default(&path);
        assert_eq!(config.channel.bind_addr, "127.0.0.1:9462");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[channel]\nbind_addr = \"127.0.0.1:9999\"\n").unwrap();

        let config = BatonConfig::load(&path).unwrap();
        assert_eq!(config.channel.bind_addr, "127.0.0.1:9999");
        assert_eq!(config.playback.tick_ms, 500);
        assert_eq!(config.completion.poll_ms, 250);
    }

    #[test]
    fn test_malformed_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[channel\nbind_addr = oops").unwrap();
        assert!(BatonConfig::load(&path).is_err());
    }
}
