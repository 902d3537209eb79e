//! Configuration system
//!
//! Configuration structs derive serde and load from TOML or RON depending on the file
//! extension. [`GpuCoreConfig`] carries the values the render core needs at context
//! creation, most importantly the number of frames in flight.

pub use serde::{Deserialize, Serialize};

/// Upper bound on frames in flight; slot arrays are sized from it
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let is_toml = path.ends_with(".toml");
        if !is_toml && !path.ends_with(".ron") {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        }

        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        if is_toml {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Render core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuCoreConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Frames the CPU may record ahead of the GPU; slot count of every frame-buffered resource
    pub frames_in_flight: usize,
    /// Whether to enable validation layers (`None` = debug builds only)
    pub enable_validation: Option<bool>,
}

impl Default for GpuCoreConfig {
    fn default() -> Self {
        Self {
            application_name: "frame_forge".to_string(),
            frames_in_flight: 2,
            enable_validation: None,
        }
    }
}

impl Config for GpuCoreConfig {}

impl GpuCoreConfig {
    /// Create a configuration with defaults and the given application name
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Set frames in flight
    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Force validation on or off
    #[must_use]
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = Some(enable);
        self
    }

    /// Resolved validation flag
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid {
                field: "frames_in_flight",
                reason: format!(
                    "{} is outside 1..={}",
                    self.frames_in_flight, MAX_FRAMES_IN_FLIGHT
                ),
            });
        }
        Ok(())
    }
}
