//! 설정 모듈
//!
//! 프로세스 시작 시 한 번 생성해 각 컴포넌트 생성자에 전달하는 설정 구조체입니다.
//! TOML 파일(선택) → 환경변수 순으로 적용합니다.
//!
//! 저장 위치 기본값: ~/.kb-pipeline/

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 기본 경로 (~/.kb-pipeline/)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kb-pipeline")
}

// ============================================================================
// Settings
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 업로드/정규화/제안/리뷰 파일 루트
    pub data_dir: PathBuf,
    /// 마크다운 지식베이스 루트
    pub kb_dir: PathBuf,
    /// HTML 출력 디렉토리
    pub kb_html_dir: PathBuf,
    pub vector: VectorSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            vector: VectorSettings::with_dir(data_dir.join("vectorstore")),
            data_dir,
            kb_dir: PathBuf::from("knowledge_base/raw"),
            kb_html_dir: PathBuf::from("knowledge_base/html"),
            chunking: ChunkingSettings::default(),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

/// 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// LanceDB (디스크 영속)
    Lance,
    /// 프로세스 메모리 (테스트/드라이런)
    Memory,
}

/// 거리 함수
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    L2,
    Cosine,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub backend: VectorBackend,
    /// 영속 디렉토리
    pub dir: PathBuf,
    /// 컬렉션(테이블) 이름
    pub collection: String,
    pub distance: DistanceMetric,
}

impl VectorSettings {
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            backend: VectorBackend::Lance,
            dir,
            collection: "kb_chunks".to_string(),
            distance: DistanceMetric::L2,
        }
    }
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self::with_dir(default_data_dir().join("vectorstore"))
    }
}

/// 청킹 설정 (컬렉션 기본값)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chars: 2400,
            overlap_chars: 200,
        }
    }
}

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI 호환 엔드포인트 (/v1/embeddings)
    OpenAi,
    /// Azure OpenAI 배포
    Azure,
    /// 로컬 Ollama
    Ollama,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure" => Ok(Self::Azure),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::InvalidConfiguration(format!(
                "Unknown embedding provider: {:?}. Expected openai, azure or ollama",
                other
            ))),
        }
    }
}

impl EmbeddingProviderKind {
    /// 프로바이더 기본 모델
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Azure => "text-embedding-3-small",
            Self::Ollama => "nomic-embed-text",
        }
    }

    /// 프로바이더 기본 베이스 URL (Azure는 endpoint를 사용)
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Azure => "https://api.openai.com",
            Self::Ollama => "http://localhost:11434",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    /// 비어 있으면 프로바이더 기본 모델
    pub model: Option<String>,
    /// OpenAI 호환 / Ollama 베이스 URL (비어 있으면 프로바이더 기본값)
    pub base_url: Option<String>,
    /// API 키 (보통 환경변수에서)
    pub api_key: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: String,
    /// 호출당 타임아웃 (초)
    pub timeout_secs: u64,
    /// 한 번의 프로바이더 호출에 담을 텍스트 수
    pub batch_size: usize,
}

impl EmbeddingSettings {
    /// 적용할 모델 이름
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// 적용할 베이스 URL
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            model: None,
            base_url: None,
            api_key: None,
            azure_endpoint: None,
            azure_deployment: None,
            azure_api_version: "2024-10-01-preview".to_string(),
            timeout_secs: 60,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// 재인덱싱 시 줄어든 문서의 남은 청크 삭제
    pub prune_orphans: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            prune_orphans: true,
        }
    }
}

impl Settings {
    /// 설정 로드
    ///
    /// `path`가 주어지면 TOML 파일을 읽고, 이후 환경변수를 덮어씁니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// TOML 파일에서 읽기
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut settings: Settings =
            toml::from_str(raw).map_err(|e| Error::Serialization(e.to_string()))?;

        // vector.dir를 지정하지 않았으면 data_dir 기준으로 재계산
        if !raw_has_key(raw, "vector", "dir") {
            settings.vector.dir = settings.data_dir.join("vectorstore");
        }
        Ok(settings)
    }

    /// 환경변수 적용
    ///
    /// 조회 함수를 주입받아 테스트에서 프로세스 환경을 건드리지 않습니다.
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("KB_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
            if get("KB_VECTOR_DIR").is_none() {
                self.vector.dir = self.data_dir.join("vectorstore");
            }
        }
        if let Some(v) = get("KB_DIR") {
            self.kb_dir = PathBuf::from(v);
        }
        if let Some(v) = get("KB_HTML_DIR") {
            self.kb_html_dir = PathBuf::from(v);
        }
        if let Some(v) = get("KB_VECTOR_BACKEND") {
            self.vector.backend = match v.to_lowercase().as_str() {
                "lance" | "lancedb" => VectorBackend::Lance,
                "memory" => VectorBackend::Memory,
                other => {
                    return Err(Error::InvalidConfiguration(format!(
                        "Unknown vector backend: {:?}",
                        other
                    )))
                }
            };
        }
        if let Some(v) = get("KB_VECTOR_DIR") {
            self.vector.dir = PathBuf::from(v);
        }
        if let Some(v) = get("KB_VECTOR_COLLECTION") {
            self.vector.collection = v;
        }
        if let Some(v) = get("KB_EMBEDDING_PROVIDER") {
            self.embedding.provider = v.parse()?;
        }
        let model = get("KB_EMBEDDING_MODEL");
        let base_url = get("KB_EMBEDDING_BASE_URL");

        match self.embedding.provider {
            EmbeddingProviderKind::OpenAi => {
                if let Some(v) = get("OPENAI_API_KEY") {
                    self.embedding.api_key = Some(v);
                }
            }
            EmbeddingProviderKind::Azure => {
                if let Some(v) = get("AZURE_OPENAI_API_KEY") {
                    self.embedding.api_key = Some(v);
                }
            }
            EmbeddingProviderKind::Ollama => {
                if let Some(v) = get("OLLAMA_EMBED_MODEL") {
                    self.embedding.model = Some(v);
                }
                if let Some(v) = get("OLLAMA_BASE_URL") {
                    self.embedding.base_url = Some(v);
                }
            }
        }
        // 공통 변수가 프로바이더 전용 변수보다 우선
        if model.is_some() {
            self.embedding.model = model;
        }
        if base_url.is_some() {
            self.embedding.base_url = base_url;
        }
        if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
            self.embedding.azure_endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_EMBEDDING_DEPLOYMENT") {
            self.embedding.azure_deployment = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_API_VERSION") {
            self.embedding.azure_api_version = v;
        }

        Ok(())
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 {
            return Err(Error::InvalidConfiguration(
                "chunking.max_chars must be > 0".to_string(),
            ));
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return Err(Error::InvalidConfiguration(format!(
                "chunking.overlap_chars ({}) must be < max_chars ({})",
                self.chunking.overlap_chars, self.chunking.max_chars
            )));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "embedding.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "embedding.batch_size must be > 0".to_string(),
            ));
        }
        if self.vector.collection.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "vector.collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn normalized_dir(&self) -> PathBuf {
        self.data_dir.join("normalized")
    }

    pub fn suggestions_dir(&self) -> PathBuf {
        self.data_dir.join("suggestions")
    }

    pub fn reviews_dir(&self) -> PathBuf {
        self.data_dir.join("reviews")
    }
}

/// `[table]` 안에 `key`가 명시되어 있는지 확인
fn raw_has_key(raw: &str, table: &str, key: &str) -> bool {
    raw.parse::<toml::Table>()
        .ok()
        .and_then(|t| t.get(table).and_then(|v| v.as_table()).map(|t| t.contains_key(key)))
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
