mod settings;

pub use settings::{Config, TomlCaptureConfig, TomlConfig, EXAMPLE_CONFIG};
