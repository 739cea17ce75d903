//! 임베딩 모듈 - 텍스트 벡터화 프로바이더
//!
//! 텍스트를 벡터로 변환하는 `Embedder` 트레이트와 구현체입니다.
//! 프로바이더 선택은 [`create_embedder`]에서만 일어나고, 인덱서는 트레이트만 봅니다.
//!
//! - OpenAI 호환 (`/v1/embeddings`)
//! - Azure OpenAI 배포
//! - 로컬 Ollama (`/api/embeddings`)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&settings.embedding)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod ollama;
mod openai;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{EmbeddingProviderKind, EmbeddingSettings};
use crate::error::{Error, Result};

pub use ollama::OllamaEmbedding;
pub use openai::{AzureOpenAiEmbedding, OpenAiEmbedding};

// ============================================================================
// Embedder Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 빈 텍스트는 거부하며 영벡터로 대체하지 않습니다. 재시도도 하지 않습니다.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 입력과 같은 순서, 같은 개수의 벡터를 반환합니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    let embedder: Box<dyn Embedder> = match settings.provider {
        EmbeddingProviderKind::OpenAi => Box::new(OpenAiEmbedding::new(settings)?),
        EmbeddingProviderKind::Azure => Box::new(AzureOpenAiEmbedding::new(settings)?),
        EmbeddingProviderKind::Ollama => Box::new(OllamaEmbedding::new(settings)?),
    };

    tracing::info!(
        "Using {} embedding (model: {})",
        embedder.name(),
        settings.model()
    );
    Ok(embedder)
}

// ============================================================================
// Shared helpers
// ============================================================================

/// 타임아웃이 설정된 HTTP 클라이언트
fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::provider(format!("Failed to create HTTP client: {}", e)))
}

/// 빈 텍스트 거부
fn ensure_non_empty(texts: &[String]) -> Result<()> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(i) => Err(Error::provider(format!(
            "Cannot embed empty text (input #{})",
            i
        ))),
        None => Ok(()),
    }
}

/// 입력/출력 개수 확인
fn check_count(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::provider(format!(
            "Expected {} embeddings, provider returned {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(i) = vectors.iter().position(|v| v.is_empty()) {
        return Err(Error::provider(format!("Empty embedding at position {}", i)));
    }
    Ok(())
}

/// 요청 전송 + 응답 본문 읽기 (non-2xx는 상태/본문을 담은 에러)
async fn send(request: reqwest::RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::provider(format!("Failed to send embedding request: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::provider(format!("Failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(Error::EmbeddingProvider {
            message: "Embedding request failed".to_string(),
            status: Some(status.as_u16()),
            body: Some(body),
        });
    }
    Ok(body)
}

/// 필수 설정값 확인
fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::InvalidConfiguration(format!("{} is not set", what)))
}

// ============================================================================
// Tests
// ============================================================================
