use std::sync::Arc;

use crate::application::dto::ConfigResponse;
use crate::application::ports::CameraCatalogPort;
use crate::application::session_service::SessionService;

/// Estado compartido de los handlers de axum: los casos de uso de la sesión y
/// la configuración calculada al arrancar.
#[derive(Clone)]
pub struct HttpState {
    pub session: Arc<SessionService>,
    pub cameras: Arc<dyn CameraCatalogPort>,
    pub config: Arc<ConfigResponse>,
}
