mod adapters;
mod application;
mod config;
mod domain;

use clap::Parser;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{
    http::{router, state::HttpState},
    onnx::{
        model_source::HttpModelSource,
        yolo_engine::{EngineOptions, OnnxModelLoader},
    },
    render::annotate::{load_font, BoxAnnotator},
    v4l2::{camera_repo::V4l2CameraCatalog, capture::{CaptureConfig, V4l2CameraOpener}},
    video::ffmpeg_reader::FfmpegVideoOpener,
};
use crate::application::{
    dto::{ConfigResponse, ModelInfo},
    services::{DetectionService, ModelBootstrapService},
    session_service::SessionService,
};
use crate::config::AppConfig;
use crate::domain::{
    errors::DomainError,
    model::{InferenceParameters, ModelSource},
    session::SessionState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logs (RUST_LOG manda; info por defecto)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 2. Configuración
    let cfg = AppConfig::parse();

    // 3. Modelo: primero el fichero local, si no, descarga
    info!("🔧 Preparando modelo {}", cfg.model_path.display());
    let bootstrap = ModelBootstrapService::new(
        Arc::new(HttpModelSource::new()),
        Arc::new(OnnxModelLoader::new(EngineOptions {
            intra_threads: cfg.intra_threads,
            class_names: cfg.class_names.clone(),
        })),
    );
    let source = ModelSource { local_path: cfg.model_path.clone(), remote_url: cfg.model_url.clone() };
    let model = match bootstrap.ensure_model_available(&source).await {
        Ok(model) => model,
        Err(e) => {
            error!("❌ {}", e);
            if let DomainError::ModelLoad(_) = e {
                error!(
                    "   Sustituye {} por un export ONNX de YOLOv8, o bórralo para descargarlo de nuevo",
                    cfg.model_path.display()
                );
            }
            return Err(e.into());
        }
    };

    // 4. Casos de uso
    let annotator = Arc::new(BoxAnnotator::new(load_font(cfg.font.as_deref())));
    let detection = Arc::new(DetectionService::new(model.detector.clone(), annotator));
    let session = Arc::new(SessionService::new(
        SessionState::new(InferenceParameters::default(), cfg.camera_index),
        detection,
        Arc::new(V4l2CameraOpener::new(CaptureConfig {
            width: cfg.capture_width,
            height: cfg.capture_height,
            fps: cfg.capture_fps,
        })),
        Arc::new(FfmpegVideoOpener),
    ));

    // 5. API HTTP y UI estática
    let state = HttpState {
        session: session.clone(),
        cameras: Arc::new(V4l2CameraCatalog::new()),
        config: Arc::new(ConfigResponse::new(ModelInfo {
            path: model.path.display().to_string(),
            classes: model.class_names(),
        })),
    };
    if !cfg.static_dir.is_dir() {
        warn!("No se encuentra el directorio estático {}; solo se sirve la API", cfg.static_dir.display());
    }
    let app = router(state, cfg.max_upload_bytes()).fallback_service(ServeDir::new(&cfg.static_dir));

    // 6. Servir
    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    info!("🚀 Servidor de detección de cascos iniciado en http://{}", cfg.bind);
    info!("📂 Sirviendo archivos estáticos desde {}", cfg.static_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("No se pudo escuchar la señal de parada: {}", e);
            }
            info!("🛑 Apagando servidor");
            // Liberar la cámara antes de que se cierren las conexiones abiertas.
            session.shutdown().await;
        })
        .await?;

    Ok(())
}
