//! OpenAI 호환 / Azure OpenAI 임베딩
//!
//! 두 프로바이더 모두 `{"data": [{"embedding": [...], "index": n}]}` 응답을 돌려주므로
//! 파싱은 공유합니다. 엔드포인트와 인증 헤더만 다릅니다.
//! ref: https://platform.openai.com/docs/api-reference/embeddings

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingSettings;
use crate::error::{Error, Result};

use super::{check_count, ensure_non_empty, http_client, required, send, Embedder};

/// 요청 본문
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
}

/// 응답
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// 응답 파싱 (index가 있으면 그 순서로 정렬)
fn parse_embeddings_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbeddingsResponse = serde_json::from_str(body).map_err(|e| {
        Error::EmbeddingProvider {
            message: format!("Malformed embeddings response: {}", e),
            status: None,
            body: Some(body.chars().take(500).collect()),
        }
    })?;

    if response.data.iter().all(|d| d.index.is_some()) {
        response.data.sort_by_key(|d| d.index);
    }

    let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
    check_count(expected, &vectors)?;
    Ok(vectors)
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI 호환 임베딩 (`POST {base_url}/v1/embeddings`)
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OpenAiEmbedding {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = required(&settings.api_key, "OPENAI_API_KEY")?.to_string();
        Ok(Self {
            api_key,
            model: settings.model().to_string(),
            url: format!("{}/v1/embeddings", settings.base_url().trim_end_matches('/')),
            client: http_client(settings.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::provider("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        ensure_non_empty(texts)?;

        let request = EmbeddingsRequest {
            model: Some(&self.model),
            input: texts,
        };

        let body = send(
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;

        parse_embeddings_response(&body, texts.len())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Azure OpenAI
// ============================================================================

/// Azure OpenAI 임베딩
///
/// `POST {endpoint}/openai/deployments/{deployment}/embeddings?api-version=...`,
/// 인증은 `api-key` 헤더입니다.
#[derive(Debug)]
pub struct AzureOpenAiEmbedding {
    api_key: String,
    url: String,
    client: reqwest::Client,
}

impl AzureOpenAiEmbedding {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let endpoint = required(&settings.azure_endpoint, "AZURE_OPENAI_ENDPOINT")?;
        let deployment = required(
            &settings.azure_deployment,
            "AZURE_OPENAI_EMBEDDING_DEPLOYMENT",
        )?;
        let api_key = required(&settings.api_key, "AZURE_OPENAI_API_KEY")?.to_string();

        Ok(Self {
            api_key,
            url: azure_url(endpoint, deployment, &settings.azure_api_version),
            client: http_client(settings.timeout_secs)?,
        })
    }
}

fn azure_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/embeddings?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

#[async_trait]
impl Embedder for AzureOpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::provider("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        ensure_non_empty(texts)?;

        // 배포 이름이 모델을 결정하므로 model 필드는 보내지 않음
        let request = EmbeddingsRequest {
            model: None,
            input: texts,
        };

        let body = send(
            self.client
                .post(&self.url)
                .header("api-key", &self.api_key)
                .json(&request),
        )
        .await?;

        parse_embeddings_response(&body, texts.len())
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

// ============================================================================
// Tests
// ============================================================================
