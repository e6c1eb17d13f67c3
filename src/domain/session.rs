//! Estado explícito de la UI por sesión.
//!
//! El navegador nunca tiene el estado de referencia: cada interacción se
//! convierte en un [`SessionEvent`] aplicado aquí, y la página se redibuja a
//! partir de [`SessionState::view`].

use serde::{Deserialize, Serialize};

use super::errors::{DomainError, DomainResult};
use super::model::{InferenceParameters, InputResolution, ParametersPatch};
use super::stream::DetectionSummary;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Image,
    Webcam,
    VideoFile,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Image => "Image Upload",
            Mode::Webcam => "Live Webcam",
            Mode::VideoFile => "Video File",
        }
    }
}

/// Cómo terminó un bucle de webcam o de vídeo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopOutcome {
    Stopped { frames: u64 },
    EndOfStream { frames: u64 },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReport {
    pub width: u32,
    pub height: u32,
    pub summary: DetectionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    pub name: String,
    pub running: bool,
    pub outcome: Option<LoopOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SelectMode(Mode),
    UpdateParameters(ParametersPatch),
    ToggleWebcam { running: bool, camera_index: Option<u32> },
    ImageProcessed(ImageReport),
    VideoStarted { name: String },
    LoopFinished { mode: Mode, outcome: LoopOutcome },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub mode: Mode,
    pub params: InferenceParameters,
    pub camera_index: u32,
    pub webcam_running: bool,
    pub last_image: Option<ImageReport>,
    pub video: Option<VideoReport>,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn new(params: InferenceParameters, camera_index: u32) -> Self {
        Self {
            mode: Mode::default(),
            params,
            camera_index,
            webcam_running: false,
            last_image: None,
            video: None,
            last_error: None,
        }
    }

    /// Aplica un evento de la UI o de un bucle. Un evento rechazado no cambia el estado.
    pub fn apply(&mut self, event: SessionEvent) -> DomainResult<()> {
        match event {
            SessionEvent::SelectMode(mode) => {
                if mode != self.mode {
                    self.mode = mode;
                    self.webcam_running = false;
                    if let Some(video) = self.video.as_mut() {
                        video.running = false;
                    }
                    self.last_error = None;
                }
            }
            SessionEvent::UpdateParameters(patch) => {
                self.params = self.params.patched(&patch)?;
            }
            SessionEvent::ToggleWebcam { running, camera_index } => {
                if self.mode != Mode::Webcam {
                    return Err(DomainError::InvalidInput(format!(
                        "webcam toggle is only available in {} mode",
                        Mode::Webcam.label()
                    )));
                }
                if let Some(idx) = camera_index {
                    self.camera_index = idx;
                }
                self.webcam_running = running;
                if running {
                    self.last_error = None;
                }
            }
            SessionEvent::ImageProcessed(report) => {
                self.last_image = Some(report);
                self.last_error = None;
            }
            SessionEvent::VideoStarted { name } => {
                if self.mode != Mode::VideoFile {
                    return Err(DomainError::InvalidInput(format!(
                        "video uploads are only accepted in {} mode",
                        Mode::VideoFile.label()
                    )));
                }
                self.video = Some(VideoReport { name, running: true, outcome: None });
                self.last_error = None;
            }
            SessionEvent::LoopFinished { mode, outcome } => {
                if let LoopOutcome::Failed { message } = &outcome {
                    self.last_error = Some(message.clone());
                }
                match mode {
                    Mode::Webcam => self.webcam_running = false,
                    Mode::VideoFile => {
                        if let Some(video) = self.video.as_mut() {
                            video.running = false;
                            video.outcome = Some(outcome);
                        }
                    }
                    Mode::Image => {}
                }
            }
            SessionEvent::Failed(message) => {
                self.last_error = Some(message);
            }
        }
        Ok(())
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            mode: self.mode,
            mode_label: self.mode.label(),
            params: self.params.clone(),
            resolution_options: InputResolution::ALL.iter().map(|r| r.pixels()).collect(),
            webcam: WebcamView {
                running: self.webcam_running,
                camera_index: self.camera_index,
            },
            image: match self.mode {
                Mode::Image => self.last_image.clone(),
                _ => None,
            },
            video: match self.mode {
                Mode::VideoFile => self.video.clone(),
                _ => None,
            },
            show_statistics: self.mode == Mode::Image && self.last_image.is_some(),
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebcamView {
    pub running: bool,
    pub camera_index: u32,
}

/// Todo lo que necesita la página para dibujarse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub mode: Mode,
    pub mode_label: &'static str,
    pub params: InferenceParameters,
    pub resolution_options: Vec<u32>,
    pub webcam: WebcamView,
    pub image: Option<ImageReport>,
    pub video: Option<VideoReport>,
    pub show_statistics: bool,
    pub last_error: Option<String>,
}
