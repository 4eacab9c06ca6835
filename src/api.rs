//! Superficie HTTP del servicio: subida de PDFs, consulta RAG y llamada
//! directa al modelo.

use std::path::Path;

use axum::{
    extract::{Json, Multipart, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::AppState,
    errors::{PipelineError, Stage},
    ingest::{self, ChunkingOptions},
    llm::LanguageBackend,
    loader, rag,
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct QueryPayload {
    text: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    status: String,
    filename: String,
    content_type: String,
    doc_len: usize,
    chunks: usize,
}

#[derive(Serialize)]
pub struct AiResponse {
    llm_response: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/pdf_post", post(pdf_post_handler))
        .route("/query_pdf", post(query_pdf_handler))
        .route("/ai", post(ai_handler))
        .with_state(app_state)
}

// --- Handlers ---

/// Subida multipart de un PDF: guarda el fichero tal cual en `PDF_DIR` y
/// lo pasa por la tubería de ingesta bajo el lock de escritura.
#[axum::debug_handler]
async fn pdf_post_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        to_response(PipelineError::InvalidInput(format!(
            "subida multipart malformada: {e}"
        )))
    })? {
        let Some(raw_name) = field.file_name().map(ToOwned::to_owned) else {
            continue;
        };
        let content_type = field
            .content_type()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| {
                mime_guess::from_path(&raw_name)
                    .first_or_octet_stream()
                    .to_string()
            });
        let bytes = field.bytes().await.map_err(|e| {
            to_response(PipelineError::InvalidInput(format!(
                "no se pudo leer el fichero subido: {e}"
            )))
        })?;
        upload = Some((raw_name, content_type, bytes.to_vec()));
        break;
    }

    let Some((raw_name, content_type, bytes)) = upload else {
        return Err(to_response(PipelineError::InvalidInput(
            "la subida no contiene ningún fichero".to_string(),
        )));
    };

    // Solo el nombre base: una ruta relativa en el nombre no debe escapar
    // del directorio de PDFs.
    let filename = Path::new(&raw_name)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            to_response(PipelineError::InvalidInput(
                "el fichero subido no tiene nombre".to_string(),
            ))
        })?;

    let save_path = state.config.pdf_dir.join(&filename);
    tokio::fs::write(&save_path, &bytes).await.map_err(|e| {
        to_response(PipelineError::upstream(Stage::Loading, anyhow::Error::new(e)))
    })?;
    info!("PDF guardado en {}", save_path.display());

    // El parser de PDF es síncrono y pesado: fuera del executor async.
    let pages = tokio::task::spawn_blocking(move || loader::load_pdf_pages(&save_path))
        .await
        .map_err(|e| {
            to_response(PipelineError::upstream(Stage::Loading, anyhow::Error::new(e)))
        })?
        .map_err(to_response)?;
    info!("'{filename}' extraído con {} páginas.", pages.len());

    let opts = ChunkingOptions {
        size: state.config.chunk_size,
        overlap: state.config.chunk_overlap,
    };
    let mut store = state.store.write().await;
    let report = ingest::ingest_pages(&state.llm_manager, &mut *store, &filename, &pages, opts)
        .await
        .map_err(to_response)?;

    Ok(Json(UploadResponse {
        status: "Successfully Uploaded".to_string(),
        filename,
        content_type,
        doc_len: report.pages,
        chunks: report.chunks,
    }))
}

/// Consulta RAG: embeddings de la pregunta, recuperación top-k y síntesis.
#[axum::debug_handler]
async fn query_pdf_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<crate::models::RagAnswer>, ApiError> {
    let store = state.store.read().await;
    let answer = rag::answer_query(
        &state.llm_manager,
        &*store,
        &payload.text,
        state.config.retrieval_k,
        state.config.score_threshold,
    )
    .await
    .map_err(to_response)?;

    Ok(Json(answer))
}

/// Llamada directa al modelo de chat, sin recuperación.
#[axum::debug_handler]
async fn ai_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<AiResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(to_response(PipelineError::InvalidInput(
            "la consulta está vacía".to_string(),
        )));
    }

    let llm_response = state
        .llm_manager
        .complete(&payload.text)
        .await
        .map_err(|e| to_response(PipelineError::upstream(Stage::Synthesizing, e)))?;

    Ok(Json(AiResponse { llm_response }))
}

/// Mapea los errores de la tubería a respuestas HTTP con el mensaje de
/// etapa y causa intactos.
fn to_response(err: PipelineError) -> ApiError {
    let status = match &err {
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::PartialIngestion { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    match err.stage() {
        Some(stage) => error!("Error en la petición (etapa {stage}): {err}"),
        None => error!("Error en la petición: {err}"),
    }
    (status, Json(json!({ "error": err.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_expected_status_codes() {
        let (status, _) =
            to_response(PipelineError::InvalidInput("vacío".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = to_response(PipelineError::NotFound("x".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = to_response(PipelineError::upstream(
            Stage::Embedding,
            anyhow::anyhow!("timeout"),
        ));
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = to_response(PipelineError::PartialIngestion {
            source_id: "doc.pdf".to_string(),
            persisted: 3,
            total: 10,
            cause: "Embedding: timeout".to_string(),
        });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body.0["error"].as_str().unwrap();
        assert!(message.contains("3 de 10"));
    }
}
