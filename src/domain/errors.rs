use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// No hay pesos en disco y la descarga no funcionó.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// Pesos presentes pero no cargables (corruptos o formato no soportado).
    #[error("model could not be loaded: {0}")]
    ModelLoad(String),
    /// Frame inválido o fallo en la inferencia. Recuperable frame a frame.
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
