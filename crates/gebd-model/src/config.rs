//! Root configuration for the boundary detector.
//!
//! # Loading Configuration
//!
//! ```rust,ignore
//! use gebd_model::BoundaryConfig;
//!
//! let config = BoundaryConfig::from_file("gebd.toml")?.with_env_overrides();
//! config.validate()?;
//! ```
//!
//! # TOML Structure
//!
//! ```toml
//! [model]
//! dim = 256
//! group = 4
//! window_half_size = 8
//! gop_size = 4
//! similarity = "cosine"
//!
//! [training]
//! sigma = 1.0
//! learning_rate = 1e-4
//!
//! [device]
//! prefer_cuda = false
//! ```
//!
//! Invalid values are rejected by `validate()`; nothing is silently clamped.

use std::env;
use std::path::Path;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::{BoundaryError, BoundaryResult};

// ============================================================================
// SIMILARITY FUNCTION
// ============================================================================

/// Pairwise similarity used inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityFunction {
    Cosine,
}

impl SimilarityFunction {
    /// Resolve a configured name.
    ///
    /// Only `"cosine"` has an implementation; every other name fails with
    /// [`BoundaryError::NotImplemented`].
    pub fn parse(name: &str) -> BoundaryResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            other => Err(BoundaryError::NotImplemented {
                feature: format!("similarity function '{}'", other),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
        }
    }
}

// ============================================================================
// MODEL CONFIG
// ============================================================================

/// Architecture hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Channel width shared by the propagated maps, the temporal encoder and
    /// the classifier.
    #[serde(default = "default_dim")]
    pub dim: usize,

    /// Number of channel groups for grouped similarity. Must divide `dim`.
    #[serde(default = "default_group")]
    pub group: usize,

    /// Context radius `k` of the sliding-window aggregator.
    #[serde(default = "default_window_half_size")]
    pub window_half_size: usize,

    /// Frames per group of pictures.
    #[serde(default = "default_gop_size")]
    pub gop_size: usize,

    /// Similarity function name (only "cosine" is implemented).
    #[serde(default = "default_similarity")]
    pub similarity: String,

    /// Kernel size of the convolutions applied to similarity maps (odd).
    #[serde(default = "default_fcn_kernel")]
    pub fcn_kernel: usize,

    /// Stacked GRU layers in the window encoder.
    #[serde(default = "default_gru_layers")]
    pub gru_layers: usize,

    /// Motion-vector channels per frame in the backbone input.
    #[serde(default = "default_mv_channels")]
    pub mv_channels: usize,

    /// Residual channels per frame in the backbone input.
    #[serde(default = "default_residual_channels")]
    pub residual_channels: usize,

    /// Width of the backbone stem (channels of the secondary feature map).
    #[serde(default = "default_stem_channels")]
    pub stem_channels: usize,
}

fn default_dim() -> usize {
    256
}

fn default_group() -> usize {
    4
}

fn default_window_half_size() -> usize {
    8
}

fn default_gop_size() -> usize {
    4
}

fn default_similarity() -> String {
    "cosine".to_string()
}

fn default_fcn_kernel() -> usize {
    5
}

fn default_gru_layers() -> usize {
    2
}

fn default_mv_channels() -> usize {
    4
}

fn default_residual_channels() -> usize {
    3
}

fn default_stem_channels() -> usize {
    64
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dim: default_dim(),
            group: default_group(),
            window_half_size: default_window_half_size(),
            gop_size: default_gop_size(),
            similarity: default_similarity(),
            fcn_kernel: default_fcn_kernel(),
            gru_layers: default_gru_layers(),
            mv_channels: default_mv_channels(),
            residual_channels: default_residual_channels(),
            stem_channels: default_stem_channels(),
        }
    }
}

impl ModelConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// - `ConfigError` for zero sizes, a `group` that does not divide `dim`,
    ///   or an even `fcn_kernel`
    /// - `NotImplemented` for an unknown similarity function
    pub fn validate(&self) -> BoundaryResult<()> {
        if self.dim == 0 {
            return Err(config_error("dim must be > 0"));
        }
        if self.group == 0 || self.dim % self.group != 0 {
            return Err(config_error(format!(
                "group ({}) must be > 0 and divide dim ({})",
                self.group, self.dim
            )));
        }
        if self.window_half_size == 0 {
            return Err(config_error("window_half_size must be > 0"));
        }
        if self.gop_size == 0 {
            return Err(config_error("gop_size must be > 0"));
        }
        if self.fcn_kernel == 0 || self.fcn_kernel % 2 == 0 {
            return Err(config_error(format!(
                "fcn_kernel must be odd for same padding, got {}",
                self.fcn_kernel
            )));
        }
        if self.gru_layers == 0 {
            return Err(config_error("gru_layers must be > 0"));
        }
        if self.mv_channels + self.residual_channels == 0 {
            return Err(config_error("backbone input needs at least one channel"));
        }
        if self.stem_channels == 0 {
            return Err(config_error("stem_channels must be > 0"));
        }
        SimilarityFunction::parse(&self.similarity)?;
        Ok(())
    }

    /// Backbone input channels (motion vectors + residuals).
    pub fn input_channels(&self) -> usize {
        self.mv_channels + self.residual_channels
    }

    /// Parsed similarity function.
    pub fn similarity_function(&self) -> BoundaryResult<SimilarityFunction> {
        SimilarityFunction::parse(&self.similarity)
    }
}

// ============================================================================
// TRAINING CONFIG
// ============================================================================

/// Training-time settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Standard deviation of the Gaussian used to smooth boundary labels.
    #[serde(default = "default_sigma")]
    pub sigma: f32,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
}

fn default_sigma() -> f32 {
    1.0
}

fn default_learning_rate() -> f64 {
    1e-4
}

fn default_weight_decay() -> f64 {
    1e-4
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            sigma: default_sigma(),
            learning_rate: default_learning_rate(),
            weight_decay: default_weight_decay(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> BoundaryResult<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(config_error(format!("sigma must be > 0, got {}", self.sigma)));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(config_error(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(config_error(format!(
                "weight_decay must be >= 0, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

// ============================================================================
// DEVICE CONFIG
// ============================================================================

/// Compute device selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Use CUDA when the crate was built with the `cuda` feature and a device
    /// is present.
    #[serde(default)]
    pub prefer_cuda: bool,

    #[serde(default)]
    pub cuda_ordinal: usize,
}

impl DeviceConfig {
    /// Resolve the configured device.
    pub fn device(&self) -> BoundaryResult<Device> {
        if self.prefer_cuda {
            Ok(Device::cuda_if_available(self.cuda_ordinal)?)
        } else {
            Ok(Device::Cpu)
        }
    }
}

// ============================================================================
// ROOT CONFIG
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

impl BoundaryConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// `ConfigError` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> BoundaryResult<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| BoundaryError::ConfigError {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        toml::from_str(&contents).map_err(|e| BoundaryError::ConfigError {
            message: format!("Failed to parse TOML in '{}': {}", path.display(), e),
        })
    }

    /// Validate every section, returning the first error found.
    pub fn validate(&self) -> BoundaryResult<()> {
        self.model.validate().map_err(|e| match e {
            BoundaryError::NotImplemented { .. } => e,
            other => config_error(format!("[model] {}", other)),
        })?;
        self.training
            .validate()
            .map_err(|e| config_error(format!("[training] {}", e)))?;
        Ok(())
    }

    /// Apply `GEBD_*` environment variable overrides.
    ///
    /// Unparseable values are ignored so that `validate()` still sees the
    /// file or default value.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse::<usize>("GEBD_DIM") {
            self.model.dim = v;
        }
        if let Some(v) = env_parse::<usize>("GEBD_GROUP") {
            self.model.group = v;
        }
        if let Some(v) = env_parse::<usize>("GEBD_WINDOW_HALF_SIZE") {
            self.model.window_half_size = v;
        }
        if let Some(v) = env_parse::<usize>("GEBD_GOP_SIZE") {
            self.model.gop_size = v;
        }
        if let Ok(v) = env::var("GEBD_SIMILARITY") {
            self.model.similarity = v;
        }
        if let Some(v) = env_parse::<f32>("GEBD_SIGMA") {
            self.training.sigma = v;
        }
        if let Some(v) = env_parse::<f64>("GEBD_LEARNING_RATE") {
            self.training.learning_rate = v;
        }
        if let Some(v) = env_parse::<bool>("GEBD_PREFER_CUDA") {
            self.device.prefer_cuda = v;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn config_error(message: impl Into<String>) -> BoundaryError {
    BoundaryError::ConfigError {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BoundaryConfig::default();
        config.validate().unwrap();
        assert_eq!(config.model.dim, 256);
        assert_eq!(config.model.group, 4);
        assert_eq!(config.model.window_half_size, 8);
        assert_eq!(config.model.gop_size, 4);
        assert_eq!(config.model.input_channels(), 7);
        assert_eq!(config.training.sigma, 1.0);
    }

    #[test]
    fn test_group_must_divide_dim() {
        let mut config = BoundaryConfig::default();
        config.model.dim = 10;
        config.model.group = 4;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BoundaryError::ConfigError { .. }));
        assert!(err.to_string().contains("[model]"));
    }

    #[test]
    fn test_even_fcn_kernel_rejected() {
        let mut config = ModelConfig::default();
        config.fcn_kernel = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_similarity_is_not_implemented() {
        let mut config = BoundaryConfig::default();
        config.model.similarity = "euclidean".to_string();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, BoundaryError::NotImplemented { .. }),
            "expected NotImplemented, got {:?}",
            err
        );
    }

    #[test]
    fn test_similarity_parse_case_insensitive() {
        assert_eq!(
            SimilarityFunction::parse("Cosine").unwrap(),
            SimilarityFunction::Cosine
        );
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[model]\ndim = 32\nwindow_half_size = 4\n\n[training]\nsigma = 2.0"
        )
        .unwrap();

        let config = BoundaryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model.dim, 32);
        assert_eq!(config.model.window_half_size, 4);
        assert_eq!(config.model.group, 4);
        assert_eq!(config.training.sigma, 2.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_missing() {
        let err = BoundaryConfig::from_file("/nonexistent/gebd.toml").unwrap_err();
        assert!(matches!(err, BoundaryError::ConfigError { .. }));
    }

    #[test]
    fn test_from_file_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model\ndim = ").unwrap();
        let err = BoundaryConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn test_negative_sigma_rejected() {
        let mut config = BoundaryConfig::default();
        config.training.sigma = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[training]"));
    }

    #[test]
    fn test_cpu_device_by_default() {
        let device = DeviceConfig::default().device().unwrap();
        assert!(device.is_cpu());
    }
}
