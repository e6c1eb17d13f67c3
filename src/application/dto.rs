use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::application::session_service::ImageResult;
use crate::domain::{
    detection::DetectionRecord,
    model::{InferenceParameters, InputResolution, ParametersPatch},
    session::{Mode, SessionEvent},
    stream::DetectionSummary,
};

/// Interacciones que envía el navegador. Las subidas van por sus propias rutas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    SelectMode { mode: Mode },
    UpdateParameters(ParametersPatch),
    ToggleWebcam {
        running: bool,
        #[serde(default)]
        camera_index: Option<u32>,
    },
}

impl From<UiEvent> for SessionEvent {
    fn from(e: UiEvent) -> Self {
        match e {
            UiEvent::SelectMode { mode } => SessionEvent::SelectMode(mode),
            UiEvent::UpdateParameters(patch) => SessionEvent::UpdateParameters(patch),
            UiEvent::ToggleWebcam { running, camera_index } => {
                SessionEvent::ToggleWebcam { running, camera_index }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDetectionResponse {
    pub width: u32,
    pub height: u32,
    /// Frame anotado, JPEG, canales en orden RGB.
    pub annotated_jpeg_base64: String,
    pub detections: Vec<DetectionRecord>,
    pub summary: DetectionSummary,
}

impl From<ImageResult> for ImageDetectionResponse {
    fn from(r: ImageResult) -> Self {
        let (width, height) = r.output.annotated.dimensions();
        Self {
            width,
            height,
            annotated_jpeg_base64: BASE64_STANDARD.encode(&r.annotated_jpeg),
            detections: r.output.records,
            summary: r.summary,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SliderRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigResponse {
    pub defaults: InferenceParameters,
    pub resolution_options: Vec<u32>,
    pub confidence_threshold: SliderRange,
    pub overlap_threshold: SliderRange,
    pub max_detections: SliderRange,
    pub modes: Vec<ModeOption>,
    pub model: ModelInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeOption {
    pub mode: Mode,
    pub label: &'static str,
}

impl ConfigResponse {
    pub fn new(model: ModelInfo) -> Self {
        Self {
            defaults: InferenceParameters::default(),
            resolution_options: InputResolution::ALL.iter().map(|r| r.pixels()).collect(),
            confidence_threshold: SliderRange { min: 0.0, max: 1.0, step: 0.05 },
            overlap_threshold: SliderRange { min: 0.0, max: 1.0, step: 0.05 },
            max_detections: SliderRange { min: 10.0, max: 300.0, step: 10.0 },
            modes: [Mode::Image, Mode::Webcam, Mode::VideoFile]
                .into_iter()
                .map(|mode| ModeOption { mode, label: mode.label() })
                .collect(),
            model,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoUploadQuery {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
