//! Ingesta de un documento en el almacén vectorial: páginas → chunks →
//! embeddings por lotes → persistencia. La tubería es lineal y síncrona;
//! un fallo a mitad deja el almacén parcialmente poblado y se comunica
//! como tal, sin rollback.

use anyhow::Error as AnyError;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker;
use crate::errors::{PipelineError, Stage};
use crate::llm::LanguageBackend;
use crate::models::{Chunk, DocumentPage, IndexedRecord};
use crate::vector_store::VectorIndex;

/// Tamaño del lote enviado al modelo de embeddings en cada llamada.
const EMBED_BATCH: usize = 32;

/// Parámetros de troceado de una ingesta.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub size: usize,
    pub overlap: usize,
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub source: String,
    pub pages: usize,
    pub chunks: usize,
}

impl std::fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: '{}' con {} páginas ingerido en {} chunks.",
            self.source, self.pages, self.chunks
        )
    }
}

/// Ingiere las páginas de un documento: trocea, genera embeddings por
/// lotes y persiste cada lote en el almacén.
///
/// Si un lote falla después de haber persistido otros, devuelve
/// `PartialIngestion` con los contadores reales; si no se había
/// persistido nada, el fallo sube como `Upstream` de su etapa.
pub async fn ingest_pages<L, S>(
    llm: &L,
    store: &mut S,
    source: &str,
    pages: &[DocumentPage],
    opts: ChunkingOptions,
) -> Result<IngestionReport, PipelineError>
where
    L: LanguageBackend,
    S: VectorIndex + ?Sized,
{
    let chunks = chunker::split_pages(source, pages, opts.size, opts.overlap);
    if chunks.is_empty() {
        return Err(PipelineError::InvalidInput(format!(
            "el documento '{source}' no contiene texto útil"
        )));
    }

    let total = chunks.len();
    let mut persisted = 0;

    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let vectors = llm
            .embed_batch(&texts)
            .await
            .map_err(|e| stage_failure(source, persisted, total, Stage::Embedding, e))?;

        let records: Vec<IndexedRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, embedding)| to_record(chunk, embedding))
            .collect();

        store
            .add(&records)
            .map_err(|e| stage_failure(source, persisted, total, Stage::Persisting, e))?;

        persisted += batch.len();
    }

    let report = IngestionReport {
        source: source.to_string(),
        pages: pages.len(),
        chunks: persisted,
    };
    info!("{report}");
    Ok(report)
}

fn to_record(chunk: &Chunk, embedding: Vec<f64>) -> IndexedRecord {
    IndexedRecord {
        id: Uuid::new_v4().to_string(),
        source: chunk.source.clone(),
        page: chunk.page,
        text: chunk.text.clone(),
        embedding,
        created_at: Utc::now().to_rfc3339(),
    }
}

fn stage_failure(
    source: &str,
    persisted: usize,
    total: usize,
    stage: Stage,
    cause: AnyError,
) -> PipelineError {
    if persisted > 0 {
        warn!(
            "Ingesta parcial de '{source}': {persisted}/{total} chunks persistidos antes de fallar en {stage}: {cause}"
        );
        PipelineError::PartialIngestion {
            source_id: source.to_string(),
            persisted,
            total,
            cause: format!("{stage}: {cause}"),
        }
    } else {
        PipelineError::upstream(stage, cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use crate::vector_store::DirectoryStore;

    /// Backend de pruebas: embeddings deterministas por longitud de texto,
    /// con fallo opcional a partir de una llamada dada.
    struct StubBackend {
        calls: AtomicUsize,
        fail_from_call: Option<usize>,
    }

    impl StubBackend {
        fn ok() -> Self {
            Self { calls: AtomicUsize::new(0), fail_from_call: None }
        }

        fn failing_from(call: usize) -> Self {
            Self { calls: AtomicUsize::new(0), fail_from_call: Some(call) }
        }
    }

    #[async_trait]
    impl LanguageBackend for StubBackend {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(fail_from) = self.fail_from_call {
                if call >= fail_from {
                    return Err(anyhow!("embedding service unavailable"));
                }
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f64, 1.0])
                .collect())
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("respuesta".to_string())
        }
    }

    fn opts() -> ChunkingOptions {
        ChunkingOptions { size: 1024, overlap: 80 }
    }

    fn page(number: usize, len: usize) -> DocumentPage {
        DocumentPage {
            number,
            text: (0..len).map(|i| char::from(b'a' + (i % 23) as u8)).collect(),
        }
    }

    #[tokio::test]
    async fn one_page_of_1024_chars_yields_one_record() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::ok();

        let report =
            ingest_pages(&backend, &mut store, "uno.pdf", &[page(1, 1024)], opts())
                .await
                .unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn two_thousand_chars_yield_two_records() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::ok();

        let report =
            ingest_pages(&backend, &mut store, "dos.pdf", &[page(1, 2000)], opts())
                .await
                .unwrap();

        assert_eq!(report.chunks, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn empty_document_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::ok();

        let pages = vec![DocumentPage { number: 1, text: "  \n".to_string() }];
        let err = ingest_pages(&backend, &mut store, "vacio.pdf", &pages, opts())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn failure_before_any_persist_is_upstream() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();
        let backend = StubBackend::failing_from(0);

        let err = ingest_pages(&backend, &mut store, "doc.pdf", &[page(1, 1024)], opts())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Upstream { stage: Stage::Embedding, .. }
        ));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn mid_stream_failure_reports_partial_counts() {
        let dir = TempDir::new().unwrap();
        let mut store = DirectoryStore::open(dir.path()).unwrap();
        // Falla en la segunda llamada: el primer lote ya está persistido.
        let backend = StubBackend::failing_from(1);

        // 40 páginas cortas → 40 chunks → dos lotes de embeddings.
        let pages: Vec<DocumentPage> = (1..=40).map(|n| page(n, 100)).collect();
        let err = ingest_pages(&backend, &mut store, "grande.pdf", &pages, opts())
            .await
            .unwrap_err();

        match err {
            PipelineError::PartialIngestion { persisted, total, source_id, .. } => {
                assert_eq!(source_id, "grande.pdf");
                assert_eq!(persisted, 32);
                assert_eq!(total, 40);
            }
            other => panic!("se esperaba PartialIngestion, llegó {other:?}"),
        }
        // Lo persistido se queda: no hay rollback.
        assert_eq!(store.len(), 32);
    }
}
