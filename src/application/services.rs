use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    application::ports::{DetectorPort, FrameAnnotatorPort, ModelLoaderPort, ModelSourcePort},
    domain::{
        detection::DetectionRecord,
        errors::DomainResult,
        frame::FrameInput,
        model::{InferenceParameters, ModelSource},
        stream::{summarize_detections, DetectionSummary},
    },
};

/// Pesos cargados en memoria, listos para inferencia. Se construye una vez al
/// arrancar y se pasa a los servicios que lo necesitan.
#[derive(Clone)]
pub struct LoadedModel {
    pub path: PathBuf,
    pub detector: Arc<dyn DetectorPort>,
}

impl LoadedModel {
    pub fn class_names(&self) -> Vec<String> {
        self.detector.class_names()
    }
}

/// Localiza o descarga, y después carga. Manda el fichero local; la URL remota
/// es solo el plan B.
#[derive(Clone)]
pub struct ModelBootstrapService {
    source: Arc<dyn ModelSourcePort>,
    loader: Arc<dyn ModelLoaderPort>,
}

impl ModelBootstrapService {
    pub fn new(source: Arc<dyn ModelSourcePort>, loader: Arc<dyn ModelLoaderPort>) -> Self {
        Self { source, loader }
    }

    pub async fn ensure_model_available(&self, source: &ModelSource) -> DomainResult<LoadedModel> {
        let path = self.source.ensure_local(source).await?;

        let loader = self.loader.clone();
        let load_path = path.clone();
        let detector = tokio::task::spawn_blocking(move || loader.load(&load_path))
            .await
            .map_err(|e| crate::domain::errors::DomainError::ModelLoad(format!("loader task failed: {e}")))??;

        info!("✅ Modelo cargado desde {}", path.display());
        info!("   Clases: {}", detector.class_names().join(", "));
        Ok(LoadedModel { path, detector })
    }
}

/// Resultado de una llamada a `detect`. `annotated` es RGB, del mismo tamaño que la entrada.
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    pub annotated: RgbImage,
    pub records: Vec<DetectionRecord>,
}

impl DetectionOutput {
    pub fn summary(&self) -> DetectionSummary {
        summarize_detections(&self.records)
    }
}

/// Entra un frame, sale el frame anotado y sus detecciones. Sin estado entre llamadas.
#[derive(Clone)]
pub struct DetectionService {
    detector: Arc<dyn DetectorPort>,
    annotator: Arc<dyn FrameAnnotatorPort>,
}

impl DetectionService {
    pub fn new(detector: Arc<dyn DetectorPort>, annotator: Arc<dyn FrameAnnotatorPort>) -> Self {
        Self { detector, annotator }
    }

    pub fn detect(&self, frame: impl Into<FrameInput>, params: &InferenceParameters) -> DomainResult<DetectionOutput> {
        params.validate()?;
        let rgb = frame.into().into_rgb()?;

        let mut records = self.detector.detect(&rgb, params)?;

        // El detector ya filtra; esto protege los invariantes de los registros.
        let before = records.len();
        records.retain(|r| r.confidence >= params.confidence_threshold);
        records.truncate(params.max_detections);
        if records.len() != before {
            warn!(
                "el detector devolvió {} registros fuera de los límites pedidos, se conservan {}",
                before,
                records.len()
            );
        }

        let annotated = self.annotator.annotate(&rgb, &records);
        debug!(detections = records.len(), "frame procesado");

        Ok(DetectionOutput { annotated, records })
    }
}
