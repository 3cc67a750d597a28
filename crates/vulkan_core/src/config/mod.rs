//! Configuration system
//!
//! Backend tunables loaded from `.toml` or `.ron` files.

use ash::vk;
pub use serde::{Deserialize, Serialize};

use crate::vulkan::state::timer_query::{DEFAULT_TIMER_QUERY_CAPACITY, MAX_TIMER_QUERY_CAPACITY};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
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

    /// A value was parsed but is not usable
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Name of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Depth formats the platform layer may pick from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthFormat {
    /// 32-bit float depth
    D32Sfloat,
    /// 24-bit depth packed into 32 bits
    X8D24UnormPack32,
    /// 24-bit depth with 8-bit stencil
    D24UnormS8Uint,
    /// 32-bit float depth with 8-bit stencil
    D32SfloatS8Uint,
    /// 16-bit normalized depth
    D16Unorm,
}

impl DepthFormat {
    /// The matching Vulkan format
    pub const fn to_vk(self) -> vk::Format {
        match self {
            Self::D32Sfloat => vk::Format::D32_SFLOAT,
            Self::X8D24UnormPack32 => vk::Format::X8_D24_UNORM_PACK32,
            Self::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Self::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
            Self::D16Unorm => vk::Format::D16_UNORM,
        }
    }
}

/// Settings consumed by device setup and the timer query pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Number of timestamp slots in the timer query pool (two per query)
    pub timer_query_capacity: u32,
    /// Depth formats in order of preference; the first supported one wins
    pub depth_formats: Vec<DepthFormat>,
    /// Report debug marker and debug utils support when the driver has them
    pub enable_debug_markers: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timer_query_capacity: DEFAULT_TIMER_QUERY_CAPACITY,
            depth_formats: vec![DepthFormat::D32Sfloat, DepthFormat::X8D24UnormPack32],
            enable_debug_markers: cfg!(debug_assertions),
        }
    }
}

impl Config for BackendConfig {}

impl BackendConfig {
    /// Check that the loaded values can be used to set up a device
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.timer_query_capacity;
        if capacity < 2 || capacity > MAX_TIMER_QUERY_CAPACITY || capacity % 2 != 0 {
            return Err(ConfigError::Invalid {
                field: "timer_query_capacity",
                reason: format!(
                    "{capacity} must be an even number between 2 and {MAX_TIMER_QUERY_CAPACITY}"
                ),
            });
        }

        if self.depth_formats.is_empty() {
            return Err(ConfigError::Invalid {
                field: "depth_formats",
                reason: "at least one candidate is required".to_string(),
            });
        }

        Ok(())
    }

    /// Vulkan formats for the depth candidates, in preference order
    pub fn depth_format_candidates(&self) -> Vec<vk::Format> {
        self.depth_formats.iter().map(|format| format.to_vk()).collect()
    }
}
