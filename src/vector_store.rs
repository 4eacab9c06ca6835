//! Almacén vectorial respaldado por un directorio en disco.
//!
//! El índice es un log append-only (`records.jsonl`, un `IndexedRecord`
//! serializado por línea) que se reconstruye íntegro al abrir el almacén.
//! `add` persiste (escritura + fsync) antes de devolver el control: un
//! registro confirmado sobrevive a una caída del proceso. No existen
//! operaciones de actualización ni borrado.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::models::{IndexedRecord, RetrievalHit};

const LOG_FILE: &str = "records.jsonl";

/// Capacidades del almacén vectorial: añadir, consultar y recargar.
/// Única implementación de primera clase: [`DirectoryStore`].
pub trait VectorIndex: Send + Sync {
    /// Persiste los registros antes de devolver y los incorpora al índice.
    fn add(&mut self, records: &[IndexedRecord]) -> Result<()>;

    /// Devuelve hasta `k` registros con similitud coseno >= `threshold`,
    /// orden descendente por similitud; a igual similitud gana el
    /// registro insertado antes. Un almacén vacío o sin resultados por
    /// encima del umbral devuelve una secuencia vacía, nunca un error.
    fn query(&self, vector: &[f64], k: usize, threshold: f64) -> Result<Vec<RetrievalHit>>;

    /// Vuelve a leer el log desde disco.
    fn reload(&mut self) -> Result<()>;

    /// Número de registros indexados.
    fn len(&self) -> usize;
}

/// Índice vectorial en memoria respaldado por un log JSONL en un directorio.
pub struct DirectoryStore {
    dir: PathBuf,
    records: Vec<IndexedRecord>,
    dimension: Option<usize>,
}

impl DirectoryStore {
    /// Abre el almacén, creando el directorio si no existe y
    /// reconstruyendo el índice desde el log persistido.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("no se pudo crear el directorio {}", dir.display()))?;

        let mut store = Self {
            dir: dir.to_path_buf(),
            records: Vec::new(),
            dimension: None,
        };
        store.load_log()?;
        info!(
            "Almacén vectorial abierto en {} con {} registros.",
            dir.display(),
            store.records.len()
        );
        Ok(store)
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    fn load_log(&mut self) -> Result<()> {
        self.records.clear();
        self.dimension = None;

        let path = self.log_path();
        if !path.exists() {
            return Ok(());
        }

        let file = File::open(&path)
            .with_context(|| format!("no se pudo abrir el log {}", path.display()))?;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: IndexedRecord = serde_json::from_str(&line).with_context(|| {
                format!("línea {} corrupta en {}", line_no + 1, path.display())
            })?;
            self.check_dimension(&record)?;
            self.records.push(record);
        }
        Ok(())
    }

    /// La dimensión del primer registro fija la del almacén completo.
    fn check_dimension(&mut self, record: &IndexedRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(anyhow!("el registro '{}' trae un vector vacío", record.id));
        }
        match self.dimension {
            None => {
                self.dimension = Some(record.embedding.len());
                Ok(())
            }
            Some(dim) if dim == record.embedding.len() => Ok(()),
            Some(dim) => Err(anyhow!(
                "dimensión inconsistente en '{}': {} (el almacén usa {dim})",
                record.id,
                record.embedding.len()
            )),
        }
    }
}

impl VectorIndex for DirectoryStore {
    fn add(&mut self, records: &[IndexedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        // Validar todo el lote antes de escribir nada.
        let prev_dimension = self.dimension;
        for record in records {
            if let Err(e) = self.check_dimension(record) {
                self.dimension = prev_dimension;
                return Err(e);
            }
        }

        let path = self.log_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("no se pudo abrir el log {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        // Persistencia antes de devolver: fsync del log.
        writer.get_ref().sync_all()?;

        self.records.extend_from_slice(records);
        Ok(())
    }

    fn query(&self, vector: &[f64], k: usize, threshold: f64) -> Result<Vec<RetrievalHit>> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.dimension {
            if vector.len() != dim {
                return Err(anyhow!(
                    "dimensión de consulta {} incompatible con el almacén ({dim})",
                    vector.len()
                ));
            }
        }

        let mut hits: Vec<RetrievalHit> = self
            .records
            .iter()
            .map(|record| RetrievalHit {
                score: cosine_similarity(vector, &record.embedding),
                record: record.clone(),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        // sort_by es estable: a igual score se conserva el orden de inserción.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn reload(&mut self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(anyhow!(
                "el directorio del almacén ya no existe: {}",
                self.dir.display()
            ));
        }
        self.load_log()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
