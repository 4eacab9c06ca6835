use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{config::AppConfig, llm::LlmManager, vector_store::DirectoryStore};

/// Estado compartido de la aplicación.
///
/// El almacén va tras un `RwLock`: escritor único (ingestas) y lectores
/// concurrentes (consultas) contra el último estado confirmado.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: LlmManager,
    pub store: Arc<RwLock<DirectoryStore>>,
}
