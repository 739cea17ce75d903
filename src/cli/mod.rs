//! CLI 모듈
//!
//! kb-pipeline CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::Settings;
use crate::embedding::create_embedder;
use crate::html;
use crate::knowledge::{open_vector_store, KnowledgeBaseIndexer, VectorStore};
use crate::pipeline::{self, list_normalized};
use crate::suggestion::{self, ReviewDecision, REVIEW_SUFFIX};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "kb-pipeline")]
#[command(
    version,
    about = "문서 수집 → 지식베이스 인덱싱/검색 → 수정 제안 리뷰 파이프라인",
    long_about = None
)]
pub struct Cli {
    /// 설정 파일 (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 입력 폴더의 .txt/.md/.pdf 파일을 uploads로 복사
    Ingest {
        /// 입력 폴더 (재귀)
        input_dir: PathBuf,
    },

    /// uploads 파일을 정규화 텍스트로 변환
    Normalize,

    /// 마크다운 지식베이스를 벡터 저장소에 인덱싱
    IndexKb {
        /// 지식베이스 루트 (기본: 설정의 kb_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// 지식베이스 시맨틱 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 (1-20)
        #[arg(short = 'k', long = "top-k", default_value = "5",
              value_parser = clap::value_parser!(u16).range(1..=20))]
        top_k: u16,
    },

    /// 지식베이스를 정적 HTML로 빌드
    BuildHtml {
        /// 지식베이스 루트 (기본: 설정의 kb_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 출력 디렉토리 (기본: 설정의 kb_html_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// 정규화된 업로드로 수정 제안 생성
    Suggest {
        /// 대상 문서 (kb_dir 기준 상대 경로)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// 제안 승인/거절 기록
    Review {
        /// 제안 ID
        suggestion_id: String,

        /// 승인
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,

        /// 거절
        #[arg(long)]
        reject: bool,

        /// 리뷰어 이름
        #[arg(long)]
        reviewer: Option<String>,

        /// 메모
        #[arg(long)]
        notes: Option<String>,
    },

    /// 승인된 제안을 지식베이스에 적용
    Apply,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest { input_dir } => cmd_ingest(&settings, &input_dir).await,
        Commands::Normalize => cmd_normalize(&settings).await,
        Commands::IndexKb { dir } => cmd_index_kb(&settings, dir).await,
        Commands::Search { query, top_k } => cmd_search(&settings, &query, top_k as usize).await,
        Commands::BuildHtml { dir, out } => cmd_build_html(&settings, dir, out),
        Commands::Suggest { target } => cmd_suggest(&settings, target.as_deref()),
        Commands::Review {
            suggestion_id,
            approve,
            reject: _,
            reviewer,
            notes,
        } => {
            let decision = if approve {
                ReviewDecision::Approved
            } else {
                ReviewDecision::Rejected
            };
            cmd_review(&settings, &suggestion_id, decision, reviewer, notes)
        }
        Commands::Apply => cmd_apply(&settings),
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 입력 수집 명령어 (ingest)
async fn cmd_ingest(settings: &Settings, input_dir: &Path) -> Result<()> {
    println!("[*] 입력 수집 중: {}", input_dir.display());

    let uploaded = pipeline::ingest_inputs(settings, input_dir)
        .await
        .context("입력 수집 실패")?;

    if uploaded.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    println!(
        "[OK] {} 파일을 {}에 업로드했습니다",
        uploaded.len(),
        settings.uploads_dir().display()
    );
    Ok(())
}

/// 정규화 명령어 (normalize)
async fn cmd_normalize(settings: &Settings) -> Result<()> {
    let outputs = pipeline::normalize_uploads(settings)
        .await
        .context("정규화 실패")?;

    println!(
        "[OK] {} 파일을 {}에 정규화했습니다",
        outputs.len(),
        settings.normalized_dir().display()
    );
    Ok(())
}

/// 설정에 맞는 인덱서 구성
async fn build_indexer(settings: &Settings) -> Result<KnowledgeBaseIndexer> {
    let embedder = create_embedder(&settings.embedding).context("임베딩 프로바이더 생성 실패")?;
    let store = open_vector_store(&settings.vector)
        .await
        .context("벡터 저장소 열기 실패")?;

    let indexer =
        KnowledgeBaseIndexer::from_settings(settings, Arc::from(embedder), Arc::from(store))
            .context("인덱서 생성 실패")?;
    Ok(indexer)
}

/// 지식베이스 인덱싱 명령어 (index-kb)
async fn cmd_index_kb(settings: &Settings, dir: Option<PathBuf>) -> Result<()> {
    let root = dir.unwrap_or_else(|| settings.kb_dir.clone());
    println!("[*] 지식베이스 인덱싱 중: {}", root.display());

    let indexer = build_indexer(settings).await?;
    let report = indexer
        .index_directory(&root)
        .await
        .context("인덱싱 실패")?;

    println!(
        "[OK] {} 파일, {} 청크를 인덱싱했습니다 ({})",
        report.files_processed,
        report.chunks_written,
        indexer.store().name()
    );
    if report.orphans_pruned > 0 {
        println!("     이전 청크 {} 개 정리됨", report.orphans_pruned);
    }
    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(settings: &Settings, query: &str, top_k: usize) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", query);

    let indexer = build_indexer(settings).await?;
    let results = indexer.search(query, top_k).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [거리: {:.4}] {} #{}",
            i + 1,
            result.distance,
            result.metadata.source_path,
            result.metadata.chunk_index
        );
        println!("   제목: {}", result.metadata.title);
        if !result.metadata.tags.is_empty() {
            println!("   태그: {}", result.metadata.tags.join(", "));
        }
        println!("   내용: {}", truncate_text(&result.text, 200));
        println!();
    }

    Ok(())
}

/// 제안 생성 명령어 (suggest)
fn cmd_suggest(settings: &Settings, target: Option<&str>) -> Result<()> {
    let (suggestion, path) =
        suggestion::generate_suggestion(settings, target).context("제안 생성 실패")?;

    println!("[OK] 제안 생성됨: {}", suggestion.suggestion_id);
    println!("     대상: {}", suggestion.target_path);
    println!("     인용: {} 건", suggestion.citations.len());
    println!("     파일: {}", path.display());
    Ok(())
}

/// 리뷰 명령어 (review)
fn cmd_review(
    settings: &Settings,
    suggestion_id: &str,
    decision: ReviewDecision,
    reviewer: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let (_, path) = suggestion::review_suggestion(settings, suggestion_id, decision, reviewer, notes)
        .context("리뷰 기록 실패")?;

    println!("[OK] 제안 {} → {}", suggestion_id, decision);
    println!("     파일: {}", path.display());
    Ok(())
}

/// HTML 빌드 명령어 (build-html)
fn cmd_build_html(settings: &Settings, dir: Option<PathBuf>, out: Option<PathBuf>) -> Result<()> {
    let root = dir.unwrap_or_else(|| settings.kb_dir.clone());
    let out = out.unwrap_or_else(|| settings.kb_html_dir.clone());
    println!("[*] HTML 빌드 중: {} -> {}", root.display(), out.display());

    let outputs = html::build_html(&root, &out).context("HTML 빌드 실패")?;

    // 마지막은 목차
    println!(
        "[OK] {} 페이지와 목차를 생성했습니다: {}",
        outputs.len().saturating_sub(1),
        out.join(html::INDEX_FILE).display()
    );
    Ok(())
}

/// 적용 명령어 (apply)
fn cmd_apply(settings: &Settings) -> Result<()> {
    let changed = suggestion::apply_approved(settings).context("제안 적용 실패")?;

    if changed.is_empty() {
        println!("[!] 새로 적용할 승인 제안이 없습니다.");
        return Ok(());
    }

    println!("[OK] {} 파일에 적용했습니다:", changed.len());
    for path in changed {
        println!("     {}", path.display());
    }
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("kb-pipeline v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());
    println!("[*] 지식베이스: {}", settings.kb_dir.display());
    println!("[*] HTML 출력: {}", settings.kb_html_dir.display());

    // 워크플로 파일 수
    let uploads = count_files(&settings.uploads_dir());
    let normalized = list_normalized(settings).map(|v| v.len()).unwrap_or(0);
    let suggestions = suggestion::list_suggestions(settings)
        .map(|v| v.len())
        .unwrap_or(0);
    let reviews = crate::pipeline::list_with_suffix(&settings.reviews_dir(), REVIEW_SUFFIX)
        .map(|v| v.len())
        .unwrap_or(0);
    println!(
        "[OK] 업로드 {}, 정규화 {}, 제안 {}, 리뷰 {}",
        uploads, normalized, suggestions, reviews
    );

    match FileCollector::new(CollectorConfig::knowledge_base()).collect_directory(&settings.kb_dir) {
        Ok(files) => println!("[OK] 지식베이스 문서: {} 건", files.len()),
        Err(e) => println!("[!] 지식베이스 확인 실패: {}", e),
    }

    // 임베딩 설정
    let key_state = match (&settings.embedding.provider, &settings.embedding.api_key) {
        (crate::config::EmbeddingProviderKind::Ollama, _) => "불필요",
        (_, Some(_)) => "설정됨",
        (_, None) => "미설정",
    };
    println!(
        "[*] 임베딩: {:?} / {} (API 키: {})",
        settings.embedding.provider,
        settings.embedding.model(),
        key_state
    );

    // 벡터 저장소 상태
    match open_vector_store(&settings.vector).await {
        Ok(store) => print_store_stats(store.as_ref(), &settings.vector.collection).await,
        Err(e) => println!("[!] 벡터 저장소 열기 실패: {}", e),
    }

    Ok(())
}

async fn print_store_stats(store: &dyn VectorStore, collection: &str) {
    match (store.count().await, store.dimension().await) {
        (Ok(count), Ok(dimension)) => {
            let dim = dimension
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[OK] 벡터 인덱스 [{}] '{}': {} 청크 (차원: {})",
                store.name(),
                collection,
                count,
                dim
            );
        }
        (Err(e), _) | (_, Err(e)) => {
            println!("[!] 벡터 통계 조회 실패: {}", e);
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .count()
        })
        .unwrap_or(0)
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
