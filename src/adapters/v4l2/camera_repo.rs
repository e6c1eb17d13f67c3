use async_trait::async_trait;

use crate::application::ports::CameraCatalogPort;
use crate::domain::camera::CameraInfo;
use crate::domain::errors::DomainResult;

pub struct V4l2CameraCatalog;

impl V4l2CameraCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl Default for V4l2CameraCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraCatalogPort for V4l2CameraCatalog {
    #[cfg(feature = "webcam")]
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        use crate::domain::camera::CameraId;
        use v4l::video::Capture;
        use v4l::Device;

        let mut out = Vec::new();
        for node in v4l::context::enum_devices() {
            let path = node.path().to_string_lossy().to_string();
            let Ok(dev) = Device::with_path(&path) else { continue };
            let Ok(caps) = dev.query_caps() else { continue };
            // Los nodos de metadatos comparten nombre pero no capturan.
            if dev.enum_formats().map(|f| f.is_empty()).unwrap_or(true) {
                continue;
            }
            out.push(CameraInfo {
                index: node.index() as u32,
                id: CameraId { path },
                name: node.name().unwrap_or_else(|| "Unknown".to_string()),
                card: caps.card,
            });
        }
        out.sort_by_key(|c| c.index);
        Ok(out)
    }

    #[cfg(not(feature = "webcam"))]
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        Ok(Vec::new())
    }
}
