//! Troceado de páginas en ventanas deslizantes de tamaño fijo con
//! solapamiento constante. No hay conciencia semántica: es un corte por
//! número de caracteres, nunca dentro de un carácter multibyte.

use crate::models::{Chunk, DocumentPage};

/// Divide el texto de una página en ventanas de `size` caracteres con
/// `overlap` caracteres compartidos entre ventanas consecutivas
/// (`overlap < size`, validado en la configuración).
///
/// Reglas:
/// - Una página más corta que `size` produce exactamente un chunk.
/// - Todos los chunks menos el último miden exactamente `size`.
/// - Si lo que queda por cubrir en un arranque de ventana cabe en
///   `size + overlap`, se emite como chunk final: así una cola menor o
///   igual al solapamiento no genera una ventana extra.
/// - Concatenar el chunk 0 y cada chunk posterior sin sus `overlap`
///   caracteres iniciales reconstruye la página exacta.
///
/// Devuelve tuplas `(inicio, fin, texto)` con offsets en caracteres.
pub fn split_page(text: &str, size: usize, overlap: usize) -> Vec<(usize, usize, String)> {
    debug_assert!(overlap < size);

    // Tabla de offsets de byte por carácter para cortar sin romper UTF-8.
    let mut byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    byte_offsets.push(text.len());
    let char_count = byte_offsets.len() - 1;

    let mut chunks = Vec::new();
    if char_count == 0 {
        return chunks;
    }

    let step = size - overlap;
    let mut start = 0;
    loop {
        let remaining = char_count - start;
        if remaining <= size + overlap {
            let slice = &text[byte_offsets[start]..byte_offsets[char_count]];
            chunks.push((start, char_count, slice.to_string()));
            break;
        }
        let end = start + size;
        let slice = &text[byte_offsets[start]..byte_offsets[end]];
        chunks.push((start, end, slice.to_string()));
        start += step;
    }

    chunks
}

/// Trocea las páginas de un documento en orden, conservando la
/// trazabilidad (fuente, página, rango de offsets). Las páginas en blanco
/// no producen chunks.
pub fn split_pages(
    source: &str,
    pages: &[DocumentPage],
    size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let mut out = Vec::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        for (start, end, text) in split_page(&page.text, size, overlap) {
            out.push(Chunk {
                source: source.to_string(),
                page: page.number,
                start,
                end,
                text,
            });
        }
    }
    out
}
