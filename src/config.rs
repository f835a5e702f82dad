//! Persistent player configuration model and defaults.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{PlayerError, Result};

pub const CONFIG_DIR_NAME: &str = "playctl";
pub const CONFIG_FILE_NAME: &str = "config.toml";

const MIN_STATUS_INTERVAL_MS: u64 = 20;
const MIN_PREROLL_POLL_INTERVAL_MS: u64 = 1;
const MAX_VOLUME: f64 = 10.0;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Playback defaults.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Sink and engine flag overrides.
    pub output: OutputConfig,
    #[serde(default)]
    /// Remote-command listener.
    pub remote: RemoteConfig,
}

/// Playback defaults, overridable from the command line.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub gapless: bool,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default = "default_preroll_poll_interval_ms")]
    pub preroll_poll_interval_ms: u64,
    #[serde(default = "default_preroll_poll_max_attempts")]
    pub preroll_poll_max_attempts: u32,
}

/// Engine output overrides. Empty strings keep the engine's own choice.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub audio_sink: String,
    #[serde(default)]
    pub video_sink: String,
    /// Playbin flags in the engine's serialized form, e.g. `video+audio`.
    #[serde(default)]
    pub flags: String,
}

/// Remote-command bus endpoint.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_remote_interface")]
    pub interface: String,
    #[serde(default = "default_remote_object_path")]
    pub object_path: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            gapless: false,
            shuffle: false,
            volume: default_volume(),
            rate: default_rate(),
            status_interval_ms: default_status_interval_ms(),
            preroll_poll_interval_ms: default_preroll_poll_interval_ms(),
            preroll_poll_max_attempts: default_preroll_poll_max_attempts(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interface: default_remote_interface(),
            object_path: default_remote_object_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f64 {
    1.0
}

fn default_rate() -> f64 {
    1.0
}

fn default_status_interval_ms() -> u64 {
    100
}

fn default_preroll_poll_interval_ms() -> u64 {
    10
}

fn default_preroll_poll_max_attempts() -> u32 {
    500
}

pub fn default_remote_interface() -> String {
    "com.example.MediaPlayer".to_string()
}

pub fn default_remote_object_path() -> String {
    "/com/example/MediaPlayer".to_string()
}

/// Clamps out-of-range values loaded from disk or the command line.
pub fn sanitize_config(config: Config) -> Config {
    let volume = if config.playback.volume.is_finite() {
        config.playback.volume.clamp(0.0, MAX_VOLUME)
    } else {
        default_volume()
    };
    let rate = if config.playback.rate.is_finite() && config.playback.rate != 0.0 {
        config.playback.rate
    } else {
        default_rate()
    };
    let remote = RemoteConfig {
        interface: if config.remote.interface.trim().is_empty() {
            default_remote_interface()
        } else {
            config.remote.interface
        },
        object_path: if config.remote.object_path.starts_with('/') {
            config.remote.object_path
        } else {
            default_remote_object_path()
        },
        ..config.remote
    };

    Config {
        playback: PlaybackConfig {
            volume,
            rate,
            status_interval_ms: config
                .playback
                .status_interval_ms
                .max(MIN_STATUS_INTERVAL_MS),
            preroll_poll_interval_ms: config
                .playback
                .preroll_poll_interval_ms
                .max(MIN_PREROLL_POLL_INTERVAL_MS),
            preroll_poll_max_attempts: config.playback.preroll_poll_max_attempts.max(1),
            ..config.playback
        },
        output: config.output,
        remote,
    }
}

/// `<config_dir>/playctl/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Writes the default config to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string(&sanitize_config(Config::default()))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Parses and sanitizes config text.
pub fn parse_config(text: &str) -> Result<Config> {
    let config = toml::from_str::<Config>(text).map_err(PlayerError::from)?;
    Ok(sanitize_config(config))
}

/// Loads the config at `path`, creating it with defaults when missing.
///
/// Unreadable or unparsable files are reported and replaced by defaults in
/// memory; the file itself is left untouched.
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Err(err) = write_default_config(path) {
            warn!(
                "Failed to write default config {}: {}",
                path.display(),
                err
            );
        }
        return sanitize_config(Config::default());
    }

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("Failed to read config {}: {}", path.display(), err);
            return sanitize_config(Config::default());
        }
    };

    match parse_config(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config {}, using defaults: {}",
                path.display(),
                err
            );
            sanitize_config(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();
        assert!(!config.playback.gapless);
        assert!(!config.playback.shuffle);
        assert_eq!(config.playback.volume, 1.0);
        assert_eq!(config.playback.rate, 1.0);
        assert_eq!(config.playback.status_interval_ms, 100);
        assert_eq!(config.playback.preroll_poll_interval_ms, 10);
        assert_eq!(config.playback.preroll_poll_max_attempts, 500);
        assert!(config.output.audio_sink.is_empty());
        assert!(config.remote.enabled);
        assert_eq!(config.remote.interface, "com.example.MediaPlayer");
        assert_eq!(config.remote.object_path, "/com/example/MediaPlayer");
    }

    #[test]
    fn test_partial_config_fills_missing_fields_with_defaults() {
        let config = parse_config(
            r#"
            [playback]
            gapless = true

            [output]
            audio_sink = "pulsesink"
            "#,
        )
        .expect("partial config should parse");

        assert!(config.playback.gapless);
        assert_eq!(config.playback.status_interval_ms, 100);
        assert_eq!(config.output.audio_sink, "pulsesink");
        assert_eq!(config.remote, RemoteConfig::default());
    }

    #[test]
    fn test_sanitize_config_clamps_volume_and_rejects_zero_rate() {
        let mut config = Config::default();
        config.playback.volume = 25.0;
        config.playback.rate = 0.0;
        config.playback.status_interval_ms = 0;
        config.playback.preroll_poll_max_attempts = 0;
        config.remote.object_path = "relative/path".to_string();

        let sanitized = sanitize_config(config);

        assert_eq!(sanitized.playback.volume, 10.0);
        assert_eq!(sanitized.playback.rate, 1.0);
        assert_eq!(sanitized.playback.status_interval_ms, MIN_STATUS_INTERVAL_MS);
        assert_eq!(sanitized.playback.preroll_poll_max_attempts, 1);
        assert_eq!(sanitized.remote.object_path, "/com/example/MediaPlayer");
    }

    #[test]
    fn test_sanitize_config_keeps_reverse_rate() {
        let mut config = Config::default();
        config.playback.rate = -2.0;
        assert_eq!(sanitize_config(config).playback.rate, -2.0);
    }

    #[test]
    fn test_load_config_creates_missing_file_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = load_config(&path);

        assert_eq!(config, sanitize_config(Config::default()));
        let written = std::fs::read_to_string(&path).expect("default config written");
        assert_eq!(parse_config(&written).expect("written config parses"), config);
    }

    #[test]
    fn test_load_config_falls_back_on_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[playback\nvolume = ").expect("write config");

        let config = load_config(&path);

        assert_eq!(config, sanitize_config(Config::default()));
        assert_eq!(
            std::fs::read_to_string(&path).expect("read config"),
            "[playback\nvolume = "
        );
    }
}
