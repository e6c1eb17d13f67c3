use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::application::ports::{FrameSink, FrameSource};
use crate::application::services::DetectionService;
use crate::domain::{
    errors::{DomainError, DomainResult},
    frame::encode_jpeg,
    model::InferenceParameters,
    session::{LoopOutcome, Mode},
    stream::{FrameMeta, StreamEvent},
};

pub const STREAM_JPEG_QUALITY: u8 = 80;

/// Lee frames de una fuente, detecta en cada uno y publica el frame anotado.
/// Los registros por frame se descartan; solo se muestra la imagen.
pub struct FrameLoop<'a> {
    pub detection: &'a DetectionService,
    pub sink: &'a dyn FrameSink,
    pub running: &'a AtomicBool,
    /// Se lee en cada frame: un cambio de parámetros aplica al siguiente.
    pub params: &'a (dyn Fn() -> InferenceParameters + Sync),
}

impl FrameLoop<'_> {
    /// Corre hasta que se desactiva, termina el stream o falla una lectura.
    ///
    /// Una lectura sin datos termina un vídeo con normalidad, pero en una cámara
    /// es un fallo del dispositivo (también en la primera lectura).
    pub fn run(&self, source: &mut dyn FrameSource, mode: Mode) -> DomainResult<LoopOutcome> {
        let mut frames: u64 = 0;
        let mut fps_est: f32 = 0.0;
        let mut last_t = Instant::now();

        info!("Bucle de frames iniciado ({})", mode.label());

        loop {
            if !self.running.load(Ordering::Acquire) {
                info!("Bucle de frames detenido tras {} frames", frames);
                return Ok(LoopOutcome::Stopped { frames });
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) if mode == Mode::VideoFile => {
                    info!("Fin del vídeo tras {} frames", frames);
                    return Ok(LoopOutcome::EndOfStream { frames });
                }
                Ok(None) => {
                    let msg = if frames == 0 {
                        "could not read a frame from the camera"
                    } else {
                        "camera stopped delivering frames"
                    };
                    return Err(DomainError::DeviceUnavailable(msg.into()));
                }
                Err(e) => return Err(e),
            };

            let (width, height) = frame.dimensions();
            let params = (self.params)();
            let t_infer_start = Instant::now();

            let output = match self.detection.detect(frame, &params) {
                Ok(output) => output,
                Err(e) => {
                    warn!("Se salta el frame {}: {}", frames, e);
                    self.sink.publish(StreamEvent::warning(format!("frame skipped: {e}")));
                    continue;
                }
            };
            let infer_ms = t_infer_start.elapsed().as_secs_f32() * 1000.0;

            let dt = last_t.elapsed().as_secs_f32().max(0.001);
            last_t = Instant::now();
            fps_est = 0.9 * fps_est + 0.1 * (1.0 / dt);

            let jpeg = match encode_jpeg(&output.annotated, STREAM_JPEG_QUALITY) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!("Se salta el frame {}: {}", frames, e);
                    continue;
                }
            };

            let meta = FrameMeta { mode, frame_index: frames, width, height, infer_ms, fps_est };
            self.sink.publish(StreamEvent::Frame { meta, jpeg });
            frames += 1;

            if frames % 100 == 0 {
                debug!(frames, fps_est, "progreso del bucle");
            }
        }
    }
}
