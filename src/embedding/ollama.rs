//! Ollama 로컬 임베딩
//!
//! `POST {base_url}/api/embeddings` 에 `{model, prompt}`를 텍스트마다 보냅니다.
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingSettings;
use crate::error::{Error, Result};

use super::{check_count, ensure_non_empty, http_client, send, Embedder};

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

fn parse_ollama_response(body: &str) -> Result<Vec<f32>> {
    let response: OllamaResponse =
        serde_json::from_str(body).map_err(|e| Error::EmbeddingProvider {
            message: format!("Malformed Ollama response: {}", e),
            status: None,
            body: Some(body.chars().take(500).collect()),
        })?;
    Ok(response.embedding)
}

/// Ollama 임베딩 구현체
#[derive(Debug)]
pub struct OllamaEmbedding {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedding {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        Ok(Self {
            model: settings.model().to_string(),
            url: format!("{}/api/embeddings", settings.base_url().trim_end_matches('/')),
            client: http_client(settings.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        ensure_non_empty(&[text.to_string()])?;

        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };
        let body = send(self.client.post(&self.url).json(&request)).await?;
        let embedding = parse_ollama_response(&body)?;

        check_count(1, std::slice::from_ref(&embedding))?;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // 배치 API가 없으므로 순차 처리
        ensure_non_empty(texts)?;
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ollama_response() {
        let v = parse_ollama_response(r#"{"embedding":[0.5,-0.5]}"#).unwrap();
        assert_eq!(v, vec![0.5, -0.5]);
    }

    #[test]
    fn test_parse_ollama_missing_field() {
        assert!(matches!(
            parse_ollama_response(r#"{"error":"model not found"}"#),
            Err(Error::EmbeddingProvider { .. })
        ));
    }

    #[test]
    fn test_defaults_point_at_local_ollama() {
        let settings = EmbeddingSettings {
            provider: crate::config::EmbeddingProviderKind::Ollama,
            ..Default::default()
        };
        let embedder = OllamaEmbedding::new(&settings).unwrap();
        assert_eq!(embedder.url, "http://localhost:11434/api/embeddings");
        assert_eq!(embedder.model, "nomic-embed-text");
    }

    #[test]
    fn test_request_shape() {
        let json = serde_json::to_value(OllamaRequest {
            model: "nomic-embed-text",
            prompt: "hello",
        })
        .unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["prompt"], "hello");
    }
}
