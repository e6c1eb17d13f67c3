use parking_lot::RwLock;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::frame_loop::FrameLoop;
use crate::application::ports::{CameraOpenerPort, FrameSink, FrameSource, VideoOpenerPort};
use crate::application::services::{DetectionService, DetectionOutput};
use crate::domain::{
    camera::CameraId,
    errors::{DomainError, DomainResult},
    frame::{decode_image, encode_jpeg},
    model::InferenceParameters,
    session::{ImageReport, LoopOutcome, Mode, SessionEvent, SessionState, SessionView},
    stream::{DetectionSummary, StreamEvent},
};

const IMAGE_JPEG_QUALITY: u8 = 90;

/// Publica la salida del bucle a todos los websockets conectados.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<StreamEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }
}

impl FrameSink for BroadcastSink {
    fn publish(&self, event: StreamEvent) {
        if self.tx.receiver_count() > 0 {
            let _ = self.tx.send(event);
        }
    }
}

/// Imagen anotada más todo lo que necesita el panel de estadísticas.
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub output: DetectionOutput,
    pub annotated_jpeg: Vec<u8>,
    pub summary: DetectionSummary,
}

struct ActiveLoop {
    mode: Mode,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

type SourceOpener = Box<dyn FnOnce() -> DomainResult<Box<dyn FrameSource>> + Send>;

/// Orquesta los tres modos de entrada de la única sesión interactiva.
pub struct SessionService {
    state: Arc<RwLock<SessionState>>,
    detection: Arc<DetectionService>,
    camera: Arc<dyn CameraOpenerPort>,
    video: Arc<dyn VideoOpenerPort>,
    sink: BroadcastSink,
    active: Mutex<Option<ActiveLoop>>,
}

impl SessionService {
    pub fn new(
        initial: SessionState,
        detection: Arc<DetectionService>,
        camera: Arc<dyn CameraOpenerPort>,
        video: Arc<dyn VideoOpenerPort>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial)),
            detection,
            camera,
            video,
            sink: BroadcastSink::new(16),
            active: Mutex::new(None),
        }
    }

    pub fn view(&self) -> SessionView {
        self.state.read().view()
    }

    pub fn params(&self) -> InferenceParameters {
        self.state.read().params.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sink.subscribe()
    }

    /// Aplica un evento de la UI y arranca o para los bucles en consecuencia.
    pub async fn dispatch(&self, event: SessionEvent) -> DomainResult<SessionView> {
        let mut active = self.active.lock().await;

        match event {
            SessionEvent::SelectMode(mode) => {
                if mode != self.state.read().mode {
                    stop_loop(&mut active).await;
                }
                self.state.write().apply(SessionEvent::SelectMode(mode))?;
            }
            SessionEvent::ToggleWebcam { running, camera_index } => {
                if self.state.read().mode != Mode::Webcam {
                    return Err(DomainError::InvalidInput(format!(
                        "webcam toggle is only available in {} mode",
                        Mode::Webcam.label()
                    )));
                }
                stop_loop(&mut active).await;
                self.state.write().apply(SessionEvent::ToggleWebcam { running, camera_index })?;

                if running {
                    let camera = CameraId::from_index(self.state.read().camera_index);
                    info!("📷 Iniciando webcam {}", camera.path);
                    let opener = self.camera.clone();
                    *active = Some(self.spawn_loop(
                        Mode::Webcam,
                        Box::new(move || opener.open_camera(&camera)),
                        None,
                    ));
                }
            }
            other => {
                self.state.write().apply(other)?;
            }
        }

        Ok(self.view())
    }

    /// Modo imagen: una detección sobre la imagen subida.
    pub async fn detect_image(&self, bytes: Vec<u8>) -> DomainResult<ImageResult> {
        if self.state.read().mode != Mode::Image {
            return Err(DomainError::InvalidInput(format!(
                "image uploads are only accepted in {} mode",
                Mode::Image.label()
            )));
        }

        let params = self.params();
        let detection = self.detection.clone();
        let result = tokio::task::spawn_blocking(move || -> DomainResult<ImageResult> {
            let img = decode_image(&bytes)?;
            let output = detection.detect(img, &params)?;
            let annotated_jpeg = encode_jpeg(&output.annotated, IMAGE_JPEG_QUALITY)?;
            let summary = output.summary();
            Ok(ImageResult { output, annotated_jpeg, summary })
        })
        .await
        .map_err(|e| DomainError::OperationFailed(format!("detection task failed: {e}")))?;

        match result {
            Ok(result) => {
                let (width, height) = result.output.annotated.dimensions();
                self.state.write().apply(SessionEvent::ImageProcessed(ImageReport {
                    width,
                    height,
                    summary: result.summary,
                }))?;
                info!(
                    "🖼️ Imagen procesada: {} detecciones ({} con casco, {} sin casco)",
                    result.summary.total, result.summary.with_helmet, result.summary.without_helmet
                );
                Ok(result)
            }
            Err(e) => {
                warn!("Falló la detección en imagen: {}", e);
                self.state.write().apply(SessionEvent::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Modo vídeo: vuelca la subida a un fichero temporal y la pasa por el
    /// detector. Una subida nueva reemplaza a la que está en curso.
    pub async fn start_video(&self, name: String, bytes: Vec<u8>) -> DomainResult<SessionView> {
        if self.state.read().mode != Mode::VideoFile {
            return Err(DomainError::InvalidInput(format!(
                "video uploads are only accepted in {} mode",
                Mode::VideoFile.label()
            )));
        }
        if bytes.is_empty() {
            return Err(DomainError::InvalidInput("empty upload".into()));
        }

        let mut active = self.active.lock().await;
        stop_loop(&mut active).await;

        let temp = spool_upload(&name, &bytes)?;
        info!("🎞️ Vídeo '{}' volcado a {} ({} bytes)", name, temp.path().display(), bytes.len());

        self.state.write().apply(SessionEvent::VideoStarted { name })?;

        let opener = self.video.clone();
        let path = temp.path().to_path_buf();
        *active = Some(self.spawn_loop(
            Mode::VideoFile,
            Box::new(move || opener.open_video(&path)),
            Some(temp),
        ));

        Ok(self.view())
    }

    /// Espera a que el bucle actual (si lo hay) termine por sí solo.
    #[cfg(test)]
    pub async fn wait_idle(&self) {
        let current = self.active.lock().await.take();
        if let Some(current) = current {
            if let Err(e) = current.handle.await {
                warn!("La tarea del bucle terminó de forma anómala: {}", e);
            }
        }
    }

    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        stop_loop(&mut active).await;
    }

    fn spawn_loop(&self, mode: Mode, open: SourceOpener, temp: Option<tempfile::NamedTempFile>) -> ActiveLoop {
        let running = Arc::new(AtomicBool::new(true));

        let handle = tokio::task::spawn_blocking({
            let running = running.clone();
            let state = self.state.clone();
            let detection = self.detection.clone();
            let sink = self.sink.clone();

            move || {
                let result = match open() {
                    Ok(mut source) => {
                        let params = || state.read().params.clone();
                        let frame_loop = FrameLoop {
                            detection: &detection,
                            sink: &sink,
                            running: &running,
                            params: &params,
                        };
                        let result = frame_loop.run(source.as_mut(), mode);
                        // Liberar el dispositivo antes de que nadie pueda reabrirlo.
                        drop(source);
                        result
                    }
                    Err(e) => Err(e),
                };
                drop(temp);

                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Falló el bucle {}: {}", mode.label(), e);
                        LoopOutcome::Failed { message: e.to_string() }
                    }
                };

                sink.publish(match &outcome {
                    LoopOutcome::Stopped { frames } => {
                        StreamEvent::info(format!("{} stopped after {} frames", mode.label(), frames))
                    }
                    LoopOutcome::EndOfStream { frames } => {
                        StreamEvent::info(format!("Video finished after {} frames", frames))
                    }
                    LoopOutcome::Failed { message } => StreamEvent::error(match mode {
                        Mode::Webcam => format!("Could not access webcam: {message}"),
                        _ => message.clone(),
                    }),
                });

                if let Err(e) = state.write().apply(SessionEvent::LoopFinished { mode, outcome }) {
                    warn!("No se pudo registrar el resultado del bucle: {}", e);
                }
            }
        });

        ActiveLoop { mode, running, handle }
    }
}

async fn stop_loop(active: &mut Option<ActiveLoop>) {
    if let Some(current) = active.take() {
        info!("Deteniendo el bucle {}", current.mode.label());
        current.running.store(false, Ordering::Release);
        if let Err(e) = current.handle.await {
            warn!("La tarea del bucle terminó de forma anómala: {}", e);
        }
    }
}

fn spool_upload(name: &str, bytes: &[u8]) -> DomainResult<tempfile::NamedTempFile> {
    let suffix = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    let mut temp = tempfile::Builder::new()
        .prefix("helmet-watch-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| DomainError::OperationFailed(format!("could not create temp file: {e}")))?;
    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .map_err(|e| DomainError::OperationFailed(format!("could not write temp file: {e}")))?;
    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{CopyAnnotator, FixedDetector, ScriptedSource, Step};
    use image::RgbImage;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Atada a su hilo, como un lector de FFmpeg.
    struct Endless {
        _thread_bound: Rc<()>,
    }

    impl FrameSource for Endless {
        fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(Some(RgbImage::new(8, 8)))
        }
    }

    enum CameraScript {
        NoFirstFrame,
        Endless,
        Missing,
    }

    struct FakeCamera {
        script: CameraScript,
        dropped: Arc<AtomicUsize>,
    }

    impl CameraOpenerPort for FakeCamera {
        fn open_camera(&self, camera: &CameraId) -> DomainResult<Box<dyn FrameSource>> {
            match self.script {
                CameraScript::NoFirstFrame => {
                    let mut src = ScriptedSource::new(vec![Step::NoData]);
                    src.dropped = self.dropped.clone();
                    Ok(Box::new(src))
                }
                CameraScript::Endless => Ok(Box::new(Endless { _thread_bound: Rc::new(()) })),
                CameraScript::Missing => Err(DomainError::DeviceUnavailable(format!("{} not found", camera.path))),
            }
        }
    }

    #[derive(Default)]
    struct FakeVideo {
        opened: parking_lot::Mutex<Option<PathBuf>>,
        corrupt: bool,
    }

    impl VideoOpenerPort for FakeVideo {
        fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSource>> {
            assert!(path.exists(), "upload should be spooled before opening");
            *self.opened.lock() = Some(path.to_path_buf());
            if self.corrupt {
                return Ok(Box::new(ScriptedSource::new(vec![
                    Step::Frame(RgbImage::new(8, 8)),
                    Step::Fail("video decode failed: Invalid data found when processing input"),
                ])));
            }
            Ok(Box::new(ScriptedSource::frames(3, 8, 8)))
        }
    }

    fn service(script: CameraScript, video: Arc<FakeVideo>) -> (SessionService, Arc<AtomicUsize>) {
        let dropped = Arc::new(AtomicUsize::new(0));
        let detection = Arc::new(DetectionService::new(
            Arc::new(FixedDetector::with_classes(&[("with_helmet", 0.9), ("without_helmet", 0.8)])),
            Arc::new(CopyAnnotator),
        ));
        let svc = SessionService::new(
            SessionState::new(InferenceParameters::default(), 0),
            detection,
            Arc::new(FakeCamera { script, dropped: dropped.clone() }),
            video,
        );
        (svc, dropped)
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, image::Rgb([10, 200, 30]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn image_mode_returns_counts_and_updates_view() {
        let (svc, _) = service(CameraScript::Missing, Arc::default());
        let result = svc.detect_image(png(20, 10)).await.unwrap();
        assert_eq!(result.summary, DetectionSummary { total: 2, with_helmet: 1, without_helmet: 1 });
        assert_eq!(result.output.annotated.dimensions(), (20, 10));
        assert!(!result.annotated_jpeg.is_empty());

        let view = svc.view();
        assert!(view.show_statistics);
        assert_eq!(view.image.unwrap().summary.total, 2);
    }

    #[tokio::test]
    async fn image_upload_rejected_outside_image_mode() {
        let (svc, _) = service(CameraScript::Missing, Arc::default());
        svc.dispatch(SessionEvent::SelectMode(Mode::VideoFile)).await.unwrap();
        assert!(matches!(svc.detect_image(png(4, 4)).await, Err(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn undecodable_image_is_reported() {
        let (svc, _) = service(CameraScript::Missing, Arc::default());
        assert!(svc.detect_image(b"garbage".to_vec()).await.is_err());
        assert!(svc.view().last_error.is_some());
    }

    #[tokio::test]
    async fn webcam_without_frames_stops_with_error() {
        let (svc, dropped) = service(CameraScript::NoFirstFrame, Arc::default());
        let mut rx = svc.subscribe();

        svc.dispatch(SessionEvent::SelectMode(Mode::Webcam)).await.unwrap();
        let view = svc
            .dispatch(SessionEvent::ToggleWebcam { running: true, camera_index: None })
            .await
            .unwrap();
        assert!(view.webcam.running);

        svc.wait_idle().await;
        let view = svc.view();
        assert!(!view.webcam.running);
        assert!(view.last_error.unwrap().contains("could not read a frame"));
        assert_eq!(dropped.load(Ordering::SeqCst), 1);

        match rx.recv().await.unwrap() {
            StreamEvent::Status { message, .. } => assert!(message.starts_with("Could not access webcam")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_camera_is_reported() {
        let (svc, _) = service(CameraScript::Missing, Arc::default());
        svc.dispatch(SessionEvent::SelectMode(Mode::Webcam)).await.unwrap();
        svc.dispatch(SessionEvent::ToggleWebcam { running: true, camera_index: Some(7) })
            .await
            .unwrap();
        svc.wait_idle().await;
        assert!(svc.view().last_error.unwrap().contains("/dev/video7"));
    }

    #[tokio::test]
    async fn webcam_toggle_off_stops_the_loop() {
        let (svc, _) = service(CameraScript::Endless, Arc::default());
        svc.dispatch(SessionEvent::SelectMode(Mode::Webcam)).await.unwrap();
        svc.dispatch(SessionEvent::ToggleWebcam { running: true, camera_index: None })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let view = svc
            .dispatch(SessionEvent::ToggleWebcam { running: false, camera_index: None })
            .await
            .unwrap();
        assert!(!view.webcam.running);
        assert!(view.last_error.is_none());
    }

    #[tokio::test]
    async fn mode_change_stops_the_webcam() {
        let (svc, _) = service(CameraScript::Endless, Arc::default());
        svc.dispatch(SessionEvent::SelectMode(Mode::Webcam)).await.unwrap();
        svc.dispatch(SessionEvent::ToggleWebcam { running: true, camera_index: None })
            .await
            .unwrap();
        let view = svc.dispatch(SessionEvent::SelectMode(Mode::Image)).await.unwrap();
        assert_eq!(view.mode, Mode::Image);
        assert!(!svc.state.read().webcam_running);
        assert!(svc.active.lock().await.is_none());
    }

    #[tokio::test]
    async fn video_plays_to_end_and_removes_temp_file() {
        let video = Arc::new(FakeVideo::default());
        let (svc, _) = service(CameraScript::Missing, video.clone());
        svc.dispatch(SessionEvent::SelectMode(Mode::VideoFile)).await.unwrap();

        let view = svc.start_video("clip.MP4".into(), vec![1, 2, 3]).await.unwrap();
        assert!(view.video.as_ref().unwrap().running);

        svc.wait_idle().await;
        let report = svc.view().video.unwrap();
        assert!(!report.running);
        assert_eq!(report.outcome, Some(LoopOutcome::EndOfStream { frames: 3 }));

        let spooled = video.opened.lock().clone().unwrap();
        assert_eq!(spooled.extension().and_then(|e| e.to_str()), Some("mp4"));
        assert!(!spooled.exists());
    }

    #[tokio::test]
    async fn corrupt_video_ends_as_failure_not_end_of_stream() {
        let video = Arc::new(FakeVideo { corrupt: true, ..Default::default() });
        let (svc, _) = service(CameraScript::Missing, video);
        let mut rx = svc.subscribe();
        svc.dispatch(SessionEvent::SelectMode(Mode::VideoFile)).await.unwrap();
        svc.start_video("broken.mp4".into(), vec![1, 2, 3]).await.unwrap();

        svc.wait_idle().await;
        let report = svc.view().video.unwrap();
        assert!(matches!(report.outcome, Some(LoopOutcome::Failed { ref message }) if message.contains("decode failed")));
        assert!(svc.view().last_error.is_some());

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StreamEvent::Status { message, .. } = event {
                statuses.push(message);
            }
        }
        assert!(statuses.iter().all(|m| !m.starts_with("Video finished")));
        assert!(statuses.iter().any(|m| m.contains("decode failed")));
    }

    #[tokio::test]
    async fn video_rejected_outside_video_mode_or_empty() {
        let (svc, _) = service(CameraScript::Missing, Arc::default());
        assert!(svc.start_video("a.mp4".into(), vec![1]).await.is_err());
        svc.dispatch(SessionEvent::SelectMode(Mode::VideoFile)).await.unwrap();
        assert!(matches!(
            svc.start_video("a.mp4".into(), vec![]).await,
            Err(DomainError::InvalidInput(_))
        ));
    }
}
