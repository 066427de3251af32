//! Configuration options for the volume pass.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables of the volume compositing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumePassOptions {
    /// Number of samples per transfer function row in the lookup tables.
    pub row_length: u32,

    /// Accumulated alpha above which a ray stops marching.
    pub opacity_saturation: f32,

    /// Fraction of the camera clipping range the camera may drift from the
    /// stabilized center before the center is moved.
    pub recenter_threshold: f64,
}

impl Default for VolumePassOptions {
    fn default() -> Self {
        Self {
            row_length: 1024,
            opacity_saturation: 0.98,
            recenter_threshold: 0.2,
        }
    }
}

impl VolumePassOptions {
    /// Parses options from a JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the options as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Loads volume pass options from a JSON file.
pub fn load_options(path: impl AsRef<Path>) -> Result<VolumePassOptions> {
    let text = std::fs::read_to_string(path)?;
    let options = VolumePassOptions::from_json(&text)?;
    log::debug!("loaded volume pass options: {options:?}");
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = VolumePassOptions::default();
        assert_eq!(options.row_length, 1024);
        assert!((options.opacity_saturation - 0.98).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let options = VolumePassOptions::from_json(r#"{ "row_length": 256 }"#).unwrap();
        assert_eq!(options.row_length, 256);
        assert!((options.opacity_saturation - 0.98).abs() < f32::EPSILON);
    }

    #[test]
    fn test_json_round_trip() {
        let options = VolumePassOptions {
            row_length: 64,
            opacity_saturation: 0.9,
            recenter_threshold: 0.5,
        };
        let parsed = VolumePassOptions::from_json(&options.to_json().unwrap()).unwrap();
        assert_eq!(parsed, options);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_options("/nonexistent/volscope-options.json").unwrap_err();
        assert!(matches!(err, crate::CoreError::IoError(_)));
    }
}
