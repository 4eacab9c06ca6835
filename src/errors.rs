//! Taxonomía de errores de la tubería RAG.
//!
//! Cada fallo de un colaborador externo (parser, embeddings, LLM, almacén)
//! se envuelve con la etapa en la que ocurrió y la causa original se
//! conserva íntegra. No hay reintentos automáticos: el llamador decide.

use std::fmt;

use thiserror::Error;

/// Etapas de la tubería. Una consulta recorre
/// `Received → Embedding → Retrieving → Assembling → Synthesizing → Completed`;
/// la ingesta usa `Loading`, `Embedding` y `Persisting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Embedding,
    Retrieving,
    Assembling,
    Synthesizing,
    Completed,
    Loading,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "Received",
            Stage::Embedding => "Embedding",
            Stage::Retrieving => "Retrieving",
            Stage::Assembling => "Assembling",
            Stage::Synthesizing => "Synthesizing",
            Stage::Completed => "Completed",
            Stage::Loading => "Loading",
            Stage::Persisting => "Persisting",
        };
        f.write_str(name)
    }
}

/// Error de la tubería, visible para el llamador HTTP.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Entrada del llamador inválida (consulta vacía, subida malformada).
    #[error("entrada inválida: {0}")]
    InvalidInput(String),

    /// Un colaborador externo falló o agotó su tiempo en una etapa concreta.
    #[error("fallo upstream en la etapa {stage}: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// Recurso inexistente (fichero fuente o directorio del almacén).
    #[error("no encontrado: {0}")]
    NotFound(String),

    /// La ingesta falló con parte de los chunks ya persistidos.
    /// No hay rollback: los contadores describen el estado real del almacén.
    #[error(
        "ingesta parcial de '{source_id}': {persisted} de {total} chunks persistidos ({cause})"
    )]
    PartialIngestion {
        source_id: String,
        persisted: usize,
        total: usize,
        cause: String,
    },
}

impl PipelineError {
    /// Envuelve un error de colaborador con su etapa.
    pub fn upstream(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            stage,
            source: source.into(),
        }
    }

    /// Etapa en la que falló la operación, si aplica.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Upstream { stage, .. } => Some(*stage),
            Self::InvalidInput(_) => Some(Stage::Received),
            _ => None,
        }
    }
}
