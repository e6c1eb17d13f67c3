use image::RgbImage;

use crate::application::ports::{CameraOpenerPort, FrameSource};
use crate::domain::camera::CameraId;
use crate::domain::errors::{DomainError, DomainResult};

/// Formato de captura pedido. El driver puede ajustarlo al modo soportado más
/// cercano.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { width: 640, height: 480, fps: 30 }
    }
}

#[cfg(feature = "webcam")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use image::{ImageFormat, RgbImage};
    use tracing::{info, warn};
    use v4l::buffer::Type;
    use v4l::format::FourCC;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::Device;

    use super::{yuyv_to_rgb, CaptureConfig};
    use crate::application::ports::FrameSource;
    use crate::domain::camera::CameraId;
    use crate::domain::errors::{DomainError, DomainResult};

    const MJPG: &[u8; 4] = b"MJPG";
    const YUYV: &[u8; 4] = b"YUYV";
    // Un buffer MJPG corrupto se salta; tantos seguidos es un stream muerto.
    const MAX_BAD_BUFFERS: usize = 5;

    /// Adaptador para la captura MMAP de un nodo V4L2. Al soltarlo se para el
    /// streaming y se cierra el dispositivo.
    pub struct V4l2Capture {
        // Va primero: los buffers se liberan antes de cerrar el dispositivo.
        stream: Stream<'static>,
        _device: Device,
        fourcc: FourCC,
        width: u32,
        height: u32,
    }

    impl V4l2Capture {
        pub fn open(camera: &CameraId, cfg: &CaptureConfig) -> Result<Self> {
            let dev = Device::with_path(&camera.path).with_context(|| format!("cannot open {}", camera.path))?;

            let mut fmt = dev.format().context("cannot query format")?;
            fmt.width = cfg.width;
            fmt.height = cfg.height;
            fmt.fourcc = FourCC::new(MJPG);
            let mut actual = dev.set_format(&fmt).context("cannot set format")?;
            if actual.fourcc != FourCC::new(MJPG) {
                fmt.fourcc = FourCC::new(YUYV);
                actual = dev.set_format(&fmt).context("cannot set format")?;
            }
            if actual.fourcc != FourCC::new(MJPG) && actual.fourcc != FourCC::new(YUYV) {
                return Err(anyhow!("camera offers neither MJPG nor YUYV (got {})", actual.fourcc));
            }

            if let Ok(mut params) = dev.params() {
                params.interval.numerator = 1;
                params.interval.denominator = cfg.fps;
                let _ = dev.set_params(&params);
            }

            let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("cannot start MMAP stream")?;

            info!(
                "📷 Cámara {} abierta: {}x{} [{}]",
                camera.path, actual.width, actual.height, actual.fourcc
            );

            Ok(Self {
                stream,
                _device: dev,
                fourcc: actual.fourcc,
                width: actual.width,
                height: actual.height,
            })
        }

        fn read(&mut self) -> Result<Option<RgbImage>> {
            for _ in 0..MAX_BAD_BUFFERS {
                let (buf, meta) = self.stream.next().context("dequeue failed")?;
                let used = (meta.bytesused as usize).min(buf.len());
                let data = &buf[..used];
                if data.is_empty() {
                    return Ok(None);
                }

                if self.fourcc == FourCC::new(YUYV) {
                    return Ok(Some(yuyv_to_rgb(data, self.width, self.height)));
                }
                match image::load_from_memory_with_format(data, ImageFormat::Jpeg) {
                    Ok(img) => return Ok(Some(img.to_rgb8())),
                    Err(e) => warn!("Descartando buffer MJPG corrupto: {}", e),
                }
            }
            Err(anyhow!("camera keeps delivering corrupt frames"))
        }
    }

    impl FrameSource for V4l2Capture {
        fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
            self.read().map_err(|e| DomainError::DeviceUnavailable(format!("{e:#}")))
        }
    }
}

#[cfg(feature = "webcam")]
pub use device::V4l2Capture;

/// Abre cámaras para el bucle de webcam.
#[derive(Debug, Clone, Default)]
pub struct V4l2CameraOpener {
    config: CaptureConfig,
}

impl V4l2CameraOpener {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl CameraOpenerPort for V4l2CameraOpener {
    #[cfg(feature = "webcam")]
    fn open_camera(&self, camera: &CameraId) -> DomainResult<Box<dyn FrameSource>> {
        let capture = V4l2Capture::open(camera, &self.config)
            .map_err(|e| DomainError::DeviceUnavailable(format!("{e:#}")))?;
        Ok(Box::new(capture))
    }

    #[cfg(not(feature = "webcam"))]
    fn open_camera(&self, camera: &CameraId) -> DomainResult<Box<dyn FrameSource>> {
        let _ = &self.config;
        Err(DomainError::DeviceUnavailable(format!(
            "{}: built without webcam support (enable the `webcam` feature)",
            camera.path
        )))
    }
}

/// YUYV (YUV 4:2:2) a RGB, BT.601. Cada grupo de 4 bytes `[Y0, U, Y1, V]`
/// lleva dos píxeles.
#[cfg_attr(not(feature = "webcam"), allow(dead_code))]
pub(crate) fn yuyv_to_rgb(yuyv: &[u8], w: u32, h: u32) -> RgbImage {
    let mut out = RgbImage::new(w, h);
    if w == 0 {
        return out;
    }

    let convert = |y: f32, u: f32, v: f32| {
        image::Rgb([
            (y + 1.402 * v).clamp(0.0, 255.0) as u8,
            (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8,
            (y + 1.772 * u).clamp(0.0, 255.0) as u8,
        ])
    };

    for (i, chunk) in yuyv.chunks_exact(4).enumerate() {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;

        let idx = i as u32 * 2;
        let (x, y) = (idx % w, idx / w);
        if y >= h {
            break;
        }
        out.put_pixel(x, y, convert(chunk[0] as f32, u, v));
        if x + 1 < w {
            out.put_pixel(x + 1, y, convert(chunk[2] as f32, u, v));
        }
    }
    out
}
