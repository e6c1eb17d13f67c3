use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::errors::{DomainError, DomainResult};

/// Dónde están los pesos en local y de dónde bajarlos si faltan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSource {
    pub local_path: PathBuf,
    pub remote_url: String,
}

/// Lado del letterbox cuadrado al que se redimensiona el frame antes de inferir.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum InputResolution {
    R320,
    R640,
    R1280,
    R1920,
}

impl InputResolution {
    pub const ALL: [InputResolution; 4] = [
        InputResolution::R320,
        InputResolution::R640,
        InputResolution::R1280,
        InputResolution::R1920,
    ];

    pub fn pixels(self) -> u32 {
        match self {
            InputResolution::R320 => 320,
            InputResolution::R640 => 640,
            InputResolution::R1280 => 1280,
            InputResolution::R1920 => 1920,
        }
    }
}

impl TryFrom<u32> for InputResolution {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        InputResolution::ALL
            .into_iter()
            .find(|r| r.pixels() == value)
            .ok_or_else(|| format!("unsupported input resolution {value} (expected 320, 640, 1280 or 1920)"))
    }
}

impl From<InputResolution> for u32 {
    fn from(r: InputResolution) -> Self {
        r.pixels()
    }
}

impl fmt::Display for InputResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pixels())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParameters {
    pub confidence_threshold: f32, // 0..1
    pub input_resolution: InputResolution,
    pub overlap_threshold: f32, // 0..1, IoU for NMS
    pub max_detections: usize,
}

impl Default for InferenceParameters {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.15,
            input_resolution: InputResolution::R1280,
            overlap_threshold: 0.45,
            max_detections: 100,
        }
    }
}

impl InferenceParameters {
    pub const MAX_DETECTIONS_LIMIT: usize = 1000;

    pub fn validate(&self) -> DomainResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DomainError::InvalidInput(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(DomainError::InvalidInput(format!(
                "overlap_threshold must be within [0, 1], got {}",
                self.overlap_threshold
            )));
        }
        if self.max_detections == 0 || self.max_detections > Self::MAX_DETECTIONS_LIMIT {
            return Err(DomainError::InvalidInput(format!(
                "max_detections must be within [1, {}], got {}",
                Self::MAX_DETECTIONS_LIMIT,
                self.max_detections
            )));
        }
        Ok(())
    }

    /// Aplica una actualización parcial y valida el resultado. Si la validación
    /// falla, `self` queda intacto.
    pub fn patched(&self, patch: &ParametersPatch) -> DomainResult<Self> {
        let next = Self {
            confidence_threshold: patch.confidence_threshold.unwrap_or(self.confidence_threshold),
            input_resolution: patch.input_resolution.unwrap_or(self.input_resolution),
            overlap_threshold: patch.overlap_threshold.unwrap_or(self.overlap_threshold),
            max_detections: patch.max_detections.unwrap_or(self.max_detections),
        };
        next.validate()?;
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParametersPatch {
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
    #[serde(default)]
    pub input_resolution: Option<InputResolution>,
    #[serde(default)]
    pub overlap_threshold: Option<f32>,
    #[serde(default)]
    pub max_detections: Option<usize>,
}
