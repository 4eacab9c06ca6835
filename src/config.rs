//! Carga y gestión de configuración de la aplicación (servidor + LLM + tubería).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    /// Directorio del índice vectorial persistido.
    pub store_dir: PathBuf,
    /// Directorio donde se guardan los PDF subidos tal cual.
    pub pdf_dir: PathBuf,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    /// Tiempo máximo por llamada al modelo (embeddings y síntesis).
    pub llm_timeout: Duration,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    pub score_threshold: f64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());

        let store_dir = PathBuf::from(env::var("STORE_DIR").unwrap_or_else(|_| "db".to_string()));
        let pdf_dir =
            PathBuf::from(env::var("PDF_DIR").unwrap_or_else(|_| "pdf_drive".to_string()));

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let timeout_secs = parse_var::<u64>("LLM_TIMEOUT_SECS", 60)?;
        let chunk_size = parse_var::<usize>("CHUNK_SIZE", 1024)?;
        let chunk_overlap = parse_var::<usize>("CHUNK_OVERLAP", 80)?;
        let retrieval_k = parse_var::<usize>("RETRIEVAL_K", 20)?;
        let score_threshold = parse_var::<f64>("SCORE_THRESHOLD", 0.1)?;

        if chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({chunk_overlap}) debe ser menor que CHUNK_SIZE ({chunk_size})"
            ));
        }
        if !(-1.0..=1.0).contains(&score_threshold) {
            return Err(anyhow!(
                "SCORE_THRESHOLD ({score_threshold}) debe estar en [-1, 1]"
            ));
        }

        Ok(Self {
            server_addr,
            store_dir,
            pdf_dir,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            llm_timeout: Duration::from_secs(timeout_secs),
            chunk_size,
            chunk_overlap,
            retrieval_k,
            score_threshold,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow!("Valor inválido para {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}
