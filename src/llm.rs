//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.
//!
//! Toda invocación al modelo (embeddings y síntesis) está acotada por el
//! timeout configurado: ninguna llamada puede bloquear indefinidamente.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts

use crate::config::{AppConfig, LlmProvider};

/// Interfaz del backend de lenguaje consumida por la tubería: embeddings
/// por lotes y síntesis de texto. Contrato de `embed_batch`:
/// - El lote completo viaja en una sola llamada al modelo.
/// - Un texto vacío o solo espacios se rechaza con error; los llamadores
///   filtran esos chunks antes de llegar aquí.
/// - Devuelve exactamente un vector por texto, todos de la misma dimensión.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
    pub timeout: Duration,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            timeout: cfg.llm_timeout,
        })
    }

    async fn embed_with_openai(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();

        // Modelo de embeddings: config o default
        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };
        let embedding_model = client.embedding_model(model_name);

        let embeddings = tokio::time::timeout(
            self.timeout,
            embedding_model.embed_texts(texts.to_vec()),
        )
        .await
        .context("timeout generando embeddings")??;

        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    async fn complete_with_openai(&self, prompt: &str) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client.agent(model_name).build();

        let answer = tokio::time::timeout(self.timeout, agent.prompt(prompt))
            .await
            .context("timeout esperando la respuesta del modelo")??;
        Ok(answer)
    }
}

#[async_trait]
impl LanguageBackend for LlmManager {
    /// Calcula embeddings para un lote de textos en una sola llamada.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(idx) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(anyhow!(
                "el texto {idx} del lote está vacío; no se puede generar su embedding"
            ));
        }

        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }

    /// Envía un prompt ya ensamblado al modelo de chat y devuelve el texto.
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(prompt).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}
