//! 에러 타입
//!
//! 파이프라인 전 구간에서 공유하는 에러 분류입니다.
//! 라이브러리 코드는 `Result<T>`를 반환하고, CLI 경계에서 anyhow로 감쌉니다.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// 잘못된 설정값 (청커 파라미터, 타임아웃 등)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// 임베딩 프로바이더 실패 (전송, non-2xx, 응답 형식)
    #[error("Embedding provider error: {message}{}", format_status(.status, .body))]
    EmbeddingProvider {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Dimension mismatch: collection has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 상태 코드 없는 프로바이더 에러
    pub fn provider(message: impl Into<String>) -> Self {
        Self::EmbeddingProvider {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// 저장소 에러 (원인 메시지 포함)
    pub fn store(context: &str, err: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(format!("{}: {}", context, err))
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_status(status: &Option<u16>, body: &Option<String>) -> String {
    match (status, body) {
        (Some(code), Some(body)) => format!(" (status {}): {}", code, body),
        (Some(code), None) => format!(" (status {})", code),
        (None, Some(body)) => format!(": {}", body),
        (None, None) => String::new(),
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
