use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::capture::CaptureConfig;
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bound on one channel request round trip, in milliseconds
    pub request_timeout_ms: u64,
    /// Record inside cross-origin frames
    pub record_cross_origin_frames: bool,
    /// Capture a microphone stream alongside the screen
    pub record_audio: bool,
    /// Milliseconds of media per emitted chunk
    pub media_timeslice_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            record_cross_origin_frames: true,
            record_audio: true,
            media_timeslice_ms: 1_000,
        }
    }
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Request timeout override
    pub request_timeout_ms: Option<u64>,
    /// Capture configuration
    pub capture: Option<TomlCaptureConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlCaptureConfig {
    pub cross_origin_frames: Option<bool>,
    pub audio: Option<bool>,
    pub media_timeslice_ms: Option<u64>,
}

impl Config {
    /// Load configuration from file, merging with defaults
    pub fn load() -> Self {
        let mut config = Config::default();

        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        // Try to load user config
        if config_file.exists() {
            if let Ok(contents) = fs::read_to_string(&config_file) {
                if let Ok(toml_config) = toml::from_str::<TomlConfig>(&contents) {
                    config.merge(toml_config);
                }
            }
        }

        config
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(timeout) = toml_config.request_timeout_ms {
            self.request_timeout_ms = timeout;
        }
        if let Some(capture) = toml_config.capture {
            if let Some(frames) = capture.cross_origin_frames {
                self.record_cross_origin_frames = frames;
            }
            if let Some(audio) = capture.audio {
                self.record_audio = audio;
            }
            if let Some(timeslice) = capture.media_timeslice_ms {
                self.media_timeslice_ms = timeslice;
            }
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        // Write the example config
        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            eprintln!("Failed to write default config: {}", e);
        }
    }

    /// Capture settings in the form the page contexts consume
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            record_cross_origin_frames: self.record_cross_origin_frames,
            record_audio: self.record_audio,
            media_timeslice_ms: self.media_timeslice_ms,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
