//! Carga de documentos fuente: convierte un PDF en una secuencia ordenada
//! de páginas de texto con numeración 1-based.

use std::path::Path;

use crate::errors::{PipelineError, Stage};
use crate::models::DocumentPage;

/// Extrae el texto de un PDF página a página.
///
/// - Fichero inexistente → `NotFound`.
/// - Fallo del parser → `Upstream` con etapa `Loading`.
pub fn load_pdf_pages(path: &Path) -> Result<Vec<DocumentPage>, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::NotFound(format!(
            "el fichero no existe: {}",
            path.display()
        )));
    }

    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| PipelineError::upstream(Stage::Loading, e))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(idx, text)| DocumentPage {
            number: idx + 1,
            text,
        })
        .collect())
}
