use serde::{Deserialize, Serialize};

use super::detection::{DetectionRecord, HelmetCategory};
use super::session::Mode;

/// Recuentos de un frame, derivados de las categorías tipadas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total: usize,
    pub with_helmet: usize,
    pub without_helmet: usize,
}

pub fn summarize_detections(detections: &[DetectionRecord]) -> DetectionSummary {
    detections.iter().fold(
        DetectionSummary { total: detections.len(), ..Default::default() },
        |mut acc, det| {
            match det.category {
                HelmetCategory::HelmetPresent => acc.with_helmet += 1,
                HelmetCategory::HelmetAbsent => acc.without_helmet += 1,
                HelmetCategory::Other => {}
            }
            acc
        },
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub mode: Mode,
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub infer_ms: f32,
    pub fps_est: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Lo que publican los bucles a los navegadores conectados.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Frame { meta: FrameMeta, jpeg: Vec<u8> },
    Status { level: StatusLevel, message: String },
}

impl StreamEvent {
    pub fn info(message: impl Into<String>) -> Self {
        StreamEvent::Status { level: StatusLevel::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        StreamEvent::Status { level: StatusLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Status { level: StatusLevel::Error, message: message.into() }
    }
}

/// Mensaje JSON de texto que precede al frame binario JPEG en el websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsMessage {
    Frame { meta: FrameMeta },
    Status { level: StatusLevel, message: String },
}
