use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Export YOLOv8 publicado para detección de cascos. Usa `--model-url` para
/// apuntar a pesos propios.
pub const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/sharathhhhh/safetyHelmet-detection-yolov8/resolve/main/best.onnx";

#[derive(Debug, Clone, Parser)]
#[command(name = "helmet-watch", version, about = "Flag people without safety helmets in images, webcam and video")]
pub struct AppConfig {
    /// Pesos ONNX locales. Si existen se usan tal cual.
    #[arg(long, env = "HELMET_MODEL_PATH", default_value = "models/helmet-yolov8.onnx")]
    pub model_path: PathBuf,

    /// De dónde descargar los pesos cuando `model_path` no existe.
    #[arg(long, env = "HELMET_MODEL_URL", default_value = DEFAULT_MODEL_URL)]
    pub model_url: String,

    #[arg(long, env = "HELMET_BIND", default_value = "127.0.0.1:8090")]
    pub bind: SocketAddr,

    /// Directorio con la UI del navegador.
    #[arg(long, env = "HELMET_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Fuente TrueType para las etiquetas. Por defecto, una fuente común del sistema.
    #[arg(long, env = "HELMET_FONT")]
    pub font: Option<PathBuf>,

    /// Nombres de clase separados por comas; sustituyen a los metadatos del modelo.
    #[arg(long, env = "HELMET_CLASS_NAMES", value_delimiter = ',')]
    pub class_names: Option<Vec<String>>,

    #[arg(long, env = "HELMET_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Límite de subida para imágenes y vídeos.
    #[arg(long, env = "HELMET_MAX_UPLOAD_MB", default_value_t = 256)]
    pub max_upload_mb: usize,

    /// Índice inicial de cámara V4L2 (`/dev/videoN`).
    #[arg(long, env = "HELMET_CAMERA_INDEX", default_value_t = 0)]
    pub camera_index: u32,

    /// Formato de captura pedido a la webcam; el driver puede ajustarlo.
    #[arg(long, env = "HELMET_CAPTURE_WIDTH", default_value_t = 640)]
    pub capture_width: u32,

    #[arg(long, env = "HELMET_CAPTURE_HEIGHT", default_value_t = 480)]
    pub capture_height: u32,

    #[arg(long, env = "HELMET_CAPTURE_FPS", default_value_t = 30)]
    pub capture_fps: u32,
}

impl AppConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
