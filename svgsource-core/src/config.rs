//! Configuration - Validation Toggles, Presets and Retriever Settings

use serde::{Deserialize, Serialize};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MIN_DIMENSION: f64 = 0.0;
pub const DEFAULT_MAX_DIMENSION: f64 = 10_000.0;
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown validation preset: {0}")]
    UnknownPreset(String),
}

/// Which validation rules run, and the accepted width/height range.
///
/// A config whose `min_dimension` exceeds `max_dimension` is accepted as-is;
/// the dimensions rule then rejects every width or height it finds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    #[serde(default)]
    pub structure: bool,
    #[serde(default)]
    pub view_box: bool,
    #[serde(default)]
    pub dimensions: bool,
    #[serde(default)]
    pub attributes: bool,
    #[serde(default)]
    pub elements: bool,
    #[serde(default = "default_min_dimension")]
    pub min_dimension: f64,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: f64,
}

fn default_min_dimension() -> f64 { DEFAULT_MIN_DIMENSION }
fn default_max_dimension() -> f64 { DEFAULT_MAX_DIMENSION }

impl ValidationConfig {
    pub const NONE: Self = Self::with_toggles(false, false, false, false, false);
    pub const BASIC: Self = Self::with_toggles(true, false, false, false, false);
    pub const STRICT: Self = Self::with_toggles(true, true, true, true, true);

    const fn with_toggles(
        structure: bool,
        view_box: bool,
        dimensions: bool,
        attributes: bool,
        elements: bool,
    ) -> Self {
        Self {
            structure,
            view_box,
            dimensions,
            attributes,
            elements,
            min_dimension: DEFAULT_MIN_DIMENSION,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_dimension_range(mut self, min: f64, max: f64) -> Self {
        self.min_dimension = min;
        self.max_dimension = max;
        self
    }

    /// Closed-range membership. Always false when the bounds are inverted or NaN.
    pub fn dimension_in_range(&self, value: f64) -> bool {
        self.min_dimension <= self.max_dimension
            && value >= self.min_dimension
            && value <= self.max_dimension
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self::NONE
    }
}

// Bounds compare bitwise so that Eq and Hash agree.
impl PartialEq for ValidationConfig {
    fn eq(&self, other: &Self) -> bool {
        self.structure == other.structure
            && self.view_box == other.view_box
            && self.dimensions == other.dimensions
            && self.attributes == other.attributes
            && self.elements == other.elements
            && self.min_dimension.to_bits() == other.min_dimension.to_bits()
            && self.max_dimension.to_bits() == other.max_dimension.to_bits()
    }
}

impl Eq for ValidationConfig {}

impl Hash for ValidationConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.structure.hash(state);
        self.view_box.hash(state);
        self.dimensions.hash(state);
        self.attributes.hash(state);
        self.elements.hash(state);
        self.min_dimension.to_bits().hash(state);
        self.max_dimension.to_bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPreset {
    None,
    Basic,
    Strict,
}

impl ValidationPreset {
    pub fn config(self) -> ValidationConfig {
        match self {
            ValidationPreset::None => ValidationConfig::NONE,
            ValidationPreset::Basic => ValidationConfig::BASIC,
            ValidationPreset::Strict => ValidationConfig::STRICT,
        }
    }
}

impl FromStr for ValidationPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ValidationPreset::None),
            "basic" => Ok(ValidationPreset::Basic),
            "strict" => Ok(ValidationPreset::Strict),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Settings for the default retrieval collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieverConfig {
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
    /// Directory that asset keys resolve against
    #[serde(default)]
    pub asset_root: Option<PathBuf>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_network_timeout_secs() -> u64 { DEFAULT_NETWORK_TIMEOUT_SECS }
fn default_user_agent() -> String { format!("svgsource/{}", crate::ENGINE_VERSION) }

impl RetrieverConfig {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            network_timeout_secs: default_network_timeout_secs(),
            asset_root: None,
            user_agent: default_user_agent(),
        }
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_presets() {
        let none = ValidationConfig::NONE;
        assert!(!none.structure && !none.view_box && !none.dimensions && !none.attributes && !none.elements);

        let basic = ValidationConfig::BASIC;
        assert!(basic.structure);
        assert!(!basic.view_box && !basic.dimensions && !basic.attributes && !basic.elements);

        let strict = ValidationConfig::STRICT;
        assert!(strict.structure && strict.view_box && strict.dimensions && strict.attributes && strict.elements);
        assert_eq!(strict.min_dimension, 0.0);
        assert_eq!(strict.max_dimension, 10_000.0);
    }

    #[test]
    fn test_inverted_bounds_never_in_range() {
        let config = ValidationConfig::STRICT.with_dimension_range(50.0, 10.0);
        assert!(!config.dimension_in_range(20.0));
        assert!(!config.dimension_in_range(50.0));
        assert!(ValidationConfig::STRICT.dimension_in_range(10_000.0));
        assert!(!ValidationConfig::STRICT.dimension_in_range(f64::NAN));
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("Strict".parse::<ValidationPreset>().unwrap(), ValidationPreset::Strict);
        assert_eq!(" none ".parse::<ValidationPreset>().unwrap(), ValidationPreset::None);
        assert!("paranoid".parse::<ValidationPreset>().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ValidationConfig = serde_json::from_str(r#"{"structure": true, "viewBox": true}"#).unwrap();
        assert!(config.structure);
        assert!(config.view_box);
        assert!(!config.elements);
        assert_eq!(config.max_dimension, DEFAULT_MAX_DIMENSION);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"networkTimeoutSecs": 3, "assetRoot": "/srv/assets"}}"#).unwrap();

        let config = RetrieverConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.network_timeout(), Duration::from_secs(3));
        assert_eq!(config.asset_root, Some(PathBuf::from("/srv/assets")));
        assert!(config.user_agent.starts_with("svgsource/"));
    }

    #[test]
    fn test_load_from_file_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = ValidationConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }
}
