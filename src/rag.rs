//! Orquestador de consultas RAG: una pasada por consulta a través de
//! `Received → Embedding → Retrieving → Assembling → Synthesizing →
//! Completed`. Cualquier etapa puede fallar y el error sube de inmediato
//! con el nombre de la etapa; no hay reintentos.

use tracing::info;

use crate::errors::{PipelineError, Stage};
use crate::llm::LanguageBackend;
use crate::models::{RagAnswer, RetrievalHit, SourceChunk};
use crate::vector_store::VectorIndex;

/// Plantilla fija del prompt. Instruye al modelo para reconocer cuando el
/// contexto no alcanza y para responder en markdown.
const PROMPT_TEMPLATE: &str = "\
Eres un asistente técnico experto en buscar información en documentos.
Responde usando únicamente el contexto proporcionado. Si el contexto no
contiene la respuesta, dilo explícitamente. Formatea la respuesta en markdown.

Contexto:
{context}

Pregunta:
{question}

Respuesta:";

/// Separador entre fragmentos de contexto dentro del prompt.
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Ejecuta una consulta RAG completa contra el almacén y el backend dados.
pub async fn answer_query<L, S>(
    llm: &L,
    store: &S,
    question: &str,
    k: usize,
    threshold: f64,
) -> Result<RagAnswer, PipelineError>
where
    L: LanguageBackend,
    S: VectorIndex + ?Sized,
{
    // Received: la consulta debe traer texto.
    if question.trim().is_empty() {
        return Err(PipelineError::InvalidInput(
            "la consulta está vacía".to_string(),
        ));
    }

    // Embedding de la consulta.
    let mut vectors = llm
        .embed_batch(&[question.to_string()])
        .await
        .map_err(|e| PipelineError::upstream(Stage::Embedding, e))?;
    let query_vector = vectors
        .pop()
        .ok_or_else(|| PipelineError::upstream(Stage::Embedding, anyhow::anyhow!("el backend no devolvió ningún vector")))?;

    // Retrieving: top-k por encima del umbral, en orden descendente.
    let hits = store
        .query(&query_vector, k, threshold)
        .map_err(|e| PipelineError::upstream(Stage::Retrieving, e))?;
    info!(
        "Consulta con {} resultados por encima del umbral {threshold}.",
        hits.len()
    );

    // Assembling: contexto + plantilla. Un almacén vacío no es un error:
    // el modelo recibe un contexto vacío y debe decir que no sabe.
    let prompt = assemble_prompt(question, &hits);

    // Synthesizing.
    let answer = llm
        .complete(&prompt)
        .await
        .map_err(|e| PipelineError::upstream(Stage::Synthesizing, e))?;

    let sources: Vec<SourceChunk> = hits
        .into_iter()
        .map(|hit| SourceChunk {
            source: hit.record.source,
            page_content: hit.record.text,
        })
        .collect();
    info!(
        "Consulta en estado {} con {} fuentes.",
        Stage::Completed,
        sources.len()
    );

    Ok(RagAnswer { answer, sources })
}

/// Concatena los fragmentos recuperados (ya ordenados por similitud
/// descendente) y los inserta junto a la pregunta en la plantilla fija.
fn assemble_prompt(question: &str, hits: &[RetrievalHit]) -> String {
    let context = if hits.is_empty() {
        "(sin contexto disponible)".to_string()
    } else {
        hits.iter()
            .map(|hit| hit.record.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    };

    PROMPT_TEMPLATE
        .replace("{context}", &context)
        .replace("{question}", question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::models::IndexedRecord;
    use crate::vector_store::{DirectoryStore, VectorIndex};

    /// Backend de pruebas que captura el último prompt sintetizado.
    struct StubBackend {
        embed_fails: bool,
        complete_fails: bool,
        last_prompt: Mutex<Option<String>>,
    }

    impl StubBackend {
        fn new() -> Self {
            Self {
                embed_fails: false,
                complete_fails: false,
                last_prompt: Mutex::new(None),
            }
        }

        fn with_embed_failure() -> Self {
            Self { embed_fails: true, ..Self::new() }
        }

        fn with_complete_failure() -> Self {
            Self { complete_fails: true, ..Self::new() }
        }
    }

    #[async_trait]
    impl LanguageBackend for StubBackend {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
            if self.embed_fails {
                return Err(anyhow!("timeout generando embeddings"));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            if self.complete_fails {
                return Err(anyhow!("el modelo no responde"));
            }
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok("No dispongo de información suficiente.".to_string())
        }
    }

    fn record(id: &str, text: &str, embedding: Vec<f64>) -> IndexedRecord {
        IndexedRecord {
            id: id.to_string(),
            source: "doc.pdf".to_string(),
            page: 1,
            text: text.to_string(),
            embedding,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn empty_question_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::new();

        let err = answer_query(&backend, &store, "   ", 20, 0.1)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn empty_store_completes_with_empty_sources() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::new();

        let answer = answer_query(&backend, &store, "¿qué dice el manual?", 20, 0.1)
            .await
            .unwrap();
        assert!(answer.sources.is_empty());
        assert!(!answer.answer.is_empty());

        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("(sin contexto disponible)"));
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_with_its_stage() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::with_embed_failure();

        let err = answer_query(&backend, &store, "pregunta", 20, 0.1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Upstream { stage: Stage::Embedding, .. }
        ));
    }

    #[tokio::test]
    async fn synthesis_failure_surfaces_with_its_stage() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::with_complete_failure();

        let err = answer_query(&backend, &store, "pregunta", 20, 0.1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Upstream { stage: Stage::Synthesizing, .. }
        ));
    }

    #[tokio::test]
    async fn context_is_assembled_in_descending_score_order() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();
        store
            .add(&[
                record("lejos", "fragmento lejano", vec![0.1, 1.0]),
                record("cerca", "fragmento cercano", vec![1.0, 0.0]),
                record("medio", "fragmento medio", vec![1.0, 0.6]),
            ])
            .unwrap();
        let backend = StubBackend::new();

        let answer = answer_query(&backend, &store, "pregunta", 20, 0.05)
            .await
            .unwrap();
        assert_eq!(answer.sources.len(), 3);
        assert_eq!(answer.sources[0].page_content, "fragmento cercano");

        let prompt = backend.last_prompt.lock().unwrap().clone().unwrap();
        let near = prompt.find("fragmento cercano").unwrap();
        let mid = prompt.find("fragmento medio").unwrap();
        let far = prompt.find("fragmento lejano").unwrap();
        assert!(near < mid && mid < far);
        assert!(prompt.contains("pregunta"));
        assert!(prompt.contains("markdown"));
    }

    #[tokio::test]
    async fn identical_queries_return_identical_results() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();
        store
            .add(&[
                record("a", "texto a", vec![1.0, 0.1]),
                record("b", "texto b", vec![0.3, 1.0]),
            ])
            .unwrap();
        let backend = StubBackend::new();

        let first = answer_query(&backend, &store, "pregunta", 20, 0.0)
            .await
            .unwrap();
        let second = answer_query(&backend, &store, "pregunta", 20, 0.0)
            .await
            .unwrap();
        let ids = |a: &RagAnswer| {
            a.sources
                .iter()
                .map(|s| s.page_content.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }
}
