// src/domain/camera.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraId { pub path: String }

impl CameraId {
    /// Nodo V4L2 para un índice numérico, p. ej. `/dev/video0`.
    pub fn from_index(index: u32) -> Self {
        Self { path: format!("/dev/video{}", index) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub index: u32,
    pub id: CameraId,
    pub name: String,
    pub card: String,
}
