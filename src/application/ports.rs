use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{
    camera::{CameraId, CameraInfo},
    detection::DetectionRecord,
    errors::DomainResult,
    model::{InferenceParameters, ModelSource},
    stream::StreamEvent,
};

/// Garantiza que los pesos existan en local, descargándolos si hace falta.
#[async_trait]
pub trait ModelSourcePort: Send + Sync {
    async fn ensure_local(&self, source: &ModelSource) -> DomainResult<PathBuf>;
}

/// Convierte un fichero de pesos en un detector listo.
pub trait ModelLoaderPort: Send + Sync {
    fn load(&self, path: &Path) -> DomainResult<Arc<dyn DetectorPort>>;
}

/// El modelo como caja negra: el filtrado por confianza y la supresión de
/// solapes ocurren tras esta llamada. Bloqueante.
pub trait DetectorPort: Send + Sync {
    fn detect(&self, frame: &RgbImage, params: &InferenceParameters) -> DomainResult<Vec<DetectionRecord>>;
    fn class_names(&self) -> Vec<String>;
}

pub trait FrameAnnotatorPort: Send + Sync {
    /// Devuelve una copia de `frame` (RGB, mismo tamaño) con cajas y etiquetas.
    fn annotate(&self, frame: &RgbImage, detections: &[DetectionRecord]) -> RgbImage;
}

/// Productor secuencial de frames. `Ok(None)` significa sin datos: fin del
/// stream para ficheros, lectura fallida para cámaras. Se abre y se consume en
/// el mismo hilo, así que no exige `Send`.
pub trait FrameSource {
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>>;
}

pub trait CameraOpenerPort: Send + Sync {
    fn open_camera(&self, camera: &CameraId) -> DomainResult<Box<dyn FrameSource>>;
}

pub trait VideoOpenerPort: Send + Sync {
    fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSource>>;
}

#[async_trait]
pub trait CameraCatalogPort: Send + Sync {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>>;
}

pub trait FrameSink: Send + Sync {
    fn publish(&self, event: StreamEvent);
}
