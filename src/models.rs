//! Modelos de dominio de la tubería RAG (páginas, chunks y registros
//! indexados del almacén vectorial).

use serde::{Deserialize, Serialize};

/// Una página de texto extraída de un documento fuente.
/// El número de página es 1-based y estable para trazabilidad.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub number: usize,
    pub text: String,
}

/// Trozo de texto derivado de una página, unidad de embedding y
/// recuperación. Los offsets son en caracteres dentro de la página.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub source: String,
    pub page: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Registro persistido en el almacén vectorial: chunk + vector + metadatos.
/// Se serializa como una línea JSON del log en disco.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub source: String,
    pub page: usize,
    pub text: String,
    pub embedding: Vec<f64>,
    pub created_at: String,
}

/// Resultado de recuperación: registro con su similitud coseno.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub score: f64,
    pub record: IndexedRecord,
}

/// Fragmento fuente devuelto junto a la respuesta generada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceChunk {
    pub source: String,
    pub page_content: String,
}

/// Respuesta final de una consulta RAG.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceChunk>,
}
