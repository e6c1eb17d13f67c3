//! Dobles de prueba para los puertos de aplicación.

use image::RgbImage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::application::ports::{DetectorPort, FrameAnnotatorPort, FrameSink, FrameSource};
use crate::domain::{
    detection::{BoundingBox, DetectionRecord},
    errors::{DomainError, DomainResult},
    model::InferenceParameters,
    stream::StreamEvent,
};

/// Devuelve los mismos registros en cada frame e ignora los parámetros: los
/// límites los tienen que imponer los servicios.
pub struct FixedDetector {
    records: Vec<(String, f32)>,
    fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl FixedDetector {
    pub fn with_classes(records: &[(&str, f32)]) -> Self {
        Self {
            records: records.iter().map(|(c, s)| (c.to_string(), *s)).collect(),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unfiltered(scores: &[f32]) -> Self {
        let classes = ["with_helmet", "without_helmet"];
        let records: Vec<(&str, f32)> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| (classes[i % 2], *s))
            .collect();
        Self::with_classes(&records)
    }

    pub fn failing() -> Self {
        Self { records: Vec::new(), fail: true, calls: Arc::new(AtomicUsize::new(0)) }
    }
}

impl DetectorPort for FixedDetector {
    fn detect(&self, frame: &RgbImage, _params: &InferenceParameters) -> DomainResult<Vec<DetectionRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DomainError::Inference("scripted failure".into()));
        }
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(self
            .records
            .iter()
            .enumerate()
            .map(|(i, (class, score))| {
                let x = (i as f32 * 3.0).min(w - 1.0);
                DetectionRecord::new(
                    class.clone(),
                    *score,
                    BoundingBox { x_min: x, y_min: 0.0, x_max: (x + 4.0).min(w), y_max: (4.0f32).min(h) },
                )
            })
            .collect())
    }

    fn class_names(&self) -> Vec<String> {
        vec!["with_helmet".into(), "without_helmet".into()]
    }
}

pub struct CopyAnnotator;

impl FrameAnnotatorPort for CopyAnnotator {
    fn annotate(&self, frame: &RgbImage, _detections: &[DetectionRecord]) -> RgbImage {
        frame.clone()
    }
}

pub enum Step {
    Frame(RgbImage),
    NoData,
    Fail(&'static str),
}

/// Reproduce un guion fijo de lecturas; agotado, devuelve sin datos.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    pub reads: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            reads: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn frames(n: usize, w: u32, h: u32) -> Self {
        Self::new((0..n).map(|_| Step::Frame(RgbImage::new(w, h))).collect())
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> DomainResult<Option<RgbImage>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Frame(img)) => Ok(Some(img)),
            Some(Step::NoData) | None => Ok(None),
            Some(Step::Fail(msg)) => Err(DomainError::DeviceUnavailable(msg.into())),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<StreamEvent>>,
}

impl CollectingSink {
    pub fn frame_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, StreamEvent::Frame { .. }))
            .count()
    }

    pub fn status_messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Status { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl FrameSink for CollectingSink {
    fn publish(&self, event: StreamEvent) {
        self.events.lock().push(event);
    }
}
