use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ndarray::{ArrayViewD, Axis, Ix2, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::onnx::postprocess::{
    decode_predictions, effective_input_size, letterbox, non_max_suppression, orient_predictions,
    parse_class_names, to_nchw,
};
use crate::application::ports::{DetectorPort, ModelLoaderPort};
use crate::domain::detection::DetectionRecord;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::InferenceParameters;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub intra_threads: usize,
    /// Sustituye los nombres de clase de los metadatos del modelo.
    pub class_names: Option<Vec<String>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { intra_threads: 4, class_names: None }
    }
}

pub struct OnnxYoloEngine {
    // `Session::run` necesita acceso exclusivo.
    session: Mutex<Session>,
    class_names: Vec<String>,
    fixed_input: Option<u32>,
    warned_fixed_input: AtomicBool,
}

impl OnnxYoloEngine {
    pub fn load(path: &Path, options: &EngineOptions) -> DomainResult<Self> {
        let session = build_session(path, options.intra_threads)
            .map_err(|e| DomainError::ModelLoad(format!("{}: {e:#}", path.display())))?;

        // Los exports de forma estática solo aceptan su propio tamaño.
        let fixed_input = session.inputs.first().and_then(|input| match &input.input_type {
            ValueType::Tensor { shape, .. } if shape.len() == 4 && shape[2] > 0 && shape[2] == shape[3] => {
                Some(shape[2] as u32)
            }
            _ => None,
        });

        let metadata_names = session
            .metadata()
            .ok()
            .and_then(|m| m.custom("names").ok().flatten())
            .and_then(|raw| parse_class_names(&raw));

        let class_names = match (&options.class_names, metadata_names) {
            (Some(names), _) if !names.is_empty() => names.clone(),
            (_, Some(names)) => names,
            _ => {
                warn!("El modelo no trae nombres de clase en sus metadatos; se usan etiquetas numéricas");
                Vec::new()
            }
        };

        if let Some(size) = fixed_input {
            info!("El modelo espera una entrada fija de {}x{}", size, size);
        }

        Ok(Self {
            session: Mutex::new(session),
            class_names,
            fixed_input,
            warned_fixed_input: AtomicBool::new(false),
        })
    }

    fn input_size(&self, params: &InferenceParameters) -> u32 {
        let requested = params.input_resolution.pixels();
        let size = effective_input_size(self.fixed_input, requested);
        if size != requested && !self.warned_fixed_input.swap(true, Ordering::Relaxed) {
            warn!(
                "Resolución pedida {} pero el modelo se exportó para {}; se usa {}",
                requested, size, size
            );
        }
        size
    }

    fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    pub fn infer(&self, rgb: &RgbImage, params: &InferenceParameters) -> Result<Vec<DetectionRecord>> {
        let imgsz = self.input_size(params);
        let (canvas, lb) = letterbox(rgb, imgsz);

        let (data, _) = to_nchw(&canvas).into_raw_vec_and_offset();
        let input_tensor = Tensor::from_array(([1usize, 3, imgsz as usize, imgsz as usize], data))
            .context("failed to build input tensor")?;

        let candidates = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![input_tensor]).context("forward pass failed")?;
            let (shape_out, data_out) = outputs[0]
                .try_extract_tensor::<f32>()
                .context("unexpected output tensor type")?;

            let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
            if dims.len() != 3 {
                return Err(anyhow!("expected a [1, 4+nc, N] output, got {:?}", dims));
            }
            let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
            let view = array_view.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;

            decode_predictions(orient_predictions(view), &lb, params.confidence_threshold)
        };

        let kept = non_max_suppression(candidates, params.overlap_threshold, params.max_detections);

        Ok(kept
            .into_iter()
            .map(|c| DetectionRecord::new(self.class_name(c.class_id), c.score, c.bbox))
            .collect())
    }
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session> {
    let mut builder = Session::builder()?.with_intra_threads(intra_threads.max(1))?;

    // CUDA es opcional: se registra si está disponible; si no, CPU.
    let cuda = CUDAExecutionProvider::default().build();
    if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
        builder = builder_with_cuda;
    }

    let model_bytes = fs::read(path).context("could not read weights file")?;
    if model_bytes.is_empty() {
        return Err(anyhow!("weights file is empty"));
    }
    let session = builder
        .commit_from_memory(&model_bytes)
        .context("unrecognized or corrupt ONNX model")?;
    Ok(session)
}

impl DetectorPort for OnnxYoloEngine {
    fn detect(&self, frame: &RgbImage, params: &InferenceParameters) -> DomainResult<Vec<DetectionRecord>> {
        self.infer(frame, params)
            .map_err(|e| DomainError::Inference(format!("{e:#}")))
    }

    fn class_names(&self) -> Vec<String> {
        self.class_names.clone()
    }
}

pub struct OnnxModelLoader {
    options: EngineOptions,
}

impl OnnxModelLoader {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }
}

impl ModelLoaderPort for OnnxModelLoader {
    fn load(&self, path: &Path) -> DomainResult<Arc<dyn DetectorPort>> {
        let engine = OnnxYoloEngine::load(path, &self.options)?;
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_weights_are_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        fs::write(&path, b"this is not a protobuf model").unwrap();

        let res = OnnxYoloEngine::load(&path, &EngineOptions::default());
        assert!(matches!(res, Err(DomainError::ModelLoad(_))));
    }

    #[test]
    fn empty_weights_are_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.onnx");
        fs::write(&path, b"").unwrap();

        let loader = OnnxModelLoader::new(EngineOptions::default());
        assert!(matches!(loader.load(&path), Err(DomainError::ModelLoad(_))));
    }
}
