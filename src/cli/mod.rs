//! CLI 모듈
//!
//! pdf-rag CLI 명령어 정의 및 구현
//!
//! - `index <path>`: PDF 파일/폴더 인덱싱
//! - `query`: 단일 질문(-q) 또는 대화형 모드(-i)

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::error::{ErrorCategory, RagError};
use crate::factory::missing_credentials;
use crate::knowledge::RetrievedChunk;
use crate::rag::{GenerationEvent, RagPipeline};

/// 대화형 모드 종료 명령
const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(version, about = "PDF 문서 기반 질의응답 (RAG)", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: config/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF 파일 또는 폴더를 인덱싱
    Index {
        /// PDF 파일 또는 PDF가 들어있는 폴더
        path: PathBuf,
    },

    /// 인덱싱된 문서에 질문
    Query {
        /// 질문
        #[arg(short, long)]
        question: Option<String>,

        /// 대화형 모드 (exit / quit 로 종료)
        #[arg(short, long)]
        interactive: bool,

        /// 답변 근거 출처 표시
        #[arg(short = 's', long)]
        show_sources: bool,

        /// 답변을 생성되는 대로 출력
        #[arg(long)]
        stream: bool,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Index { path } => cmd_index(config, &path).await,
        Commands::Query {
            question,
            interactive,
            show_sources,
            stream,
        } => {
            let options = AnswerOptions {
                show_sources,
                stream,
            };
            if interactive {
                cmd_interactive(config, options).await
            } else if let Some(question) = question {
                cmd_query(config, &question, options).await
            } else {
                bail!("질문(-q) 또는 대화형 모드(-i)를 지정해야 합니다");
            }
        }
    }
}

/// 설정 로드
///
/// `--config`를 주지 않았고 기본 경로에 파일이 없으면 기본값을 사용합니다.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).map_err(with_hint),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Config::load(default).map_err(with_hint)
            } else {
                tracing::warn!(
                    "{} not found, using built-in defaults",
                    DEFAULT_CONFIG_PATH
                );
                Ok(Config::default())
            }
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct AnswerOptions {
    show_sources: bool,
    stream: bool,
}

/// 인덱싱
async fn cmd_index(config: Config, path: &Path) -> Result<()> {
    let mut pipeline = RagPipeline::from_config(config).map_err(with_hint)?;

    // Ctrl+C 시 배치 사이에서 중단 (기존 인덱스 유지)
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n[!] 취소 요청됨, 현재 배치 후 중단합니다...");
                cancel.cancel();
            }
        })
    };

    println!("[*] 인덱싱 중: {}", path.display());
    let result = pipeline.index_documents_with_cancel(path, &cancel).await;
    watcher.abort();

    let summary = result.map_err(with_hint)?;

    println!(
        "[OK] 인덱싱 완료: {} 페이지, {} 청크 (컬렉션: {})",
        summary.pages, summary.chunks, summary.collection
    );
    if !summary.skipped.is_empty() {
        println!("[!] 건너뛴 파일 {} 개:", summary.skipped.len());
        for file in &summary.skipped {
            println!("    {} ({})", file.path.display(), file.reason);
        }
    }

    Ok(())
}

/// 단일 질문
async fn cmd_query(config: Config, question: &str, options: AnswerOptions) -> Result<()> {
    let mut pipeline = open_pipeline(config).await?;
    answer(&mut pipeline, question, options).await
}

/// 대화형 모드
async fn cmd_interactive(config: Config, options: AnswerOptions) -> Result<()> {
    match missing_credentials(&config) {
        Ok(missing) => {
            for provider in missing {
                println!(
                    "[!] API 키 미설정: {} (질문 시 실패합니다)",
                    provider.env_vars().join(" 또는 ")
                );
            }
        }
        Err(e) => return Err(with_hint(e)),
    }

    let mut pipeline = open_pipeline(config).await?;

    println!("[OK] 준비 완료. 질문을 입력하세요 (종료: exit / quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n질문> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        // 질문별 오류는 출력만 하고 계속
        if let Err(e) = answer(&mut pipeline, question, options).await {
            eprintln!("[ERROR] {:#}", e);
        }
    }

    println!("종료합니다.");
    Ok(())
}

/// 설정으로 파이프라인을 만들고 저장된 인덱스 로드
async fn open_pipeline(config: Config) -> Result<RagPipeline> {
    let mut pipeline = RagPipeline::from_config(config).map_err(with_hint)?;
    pipeline.load_vectorstore().await.map_err(with_hint)?;
    Ok(pipeline)
}

/// 질문 하나에 답하고 출력
async fn answer(pipeline: &mut RagPipeline, question: &str, options: AnswerOptions) -> Result<()> {
    if options.stream {
        let mut result = pipeline.query_stream(question).await.map_err(with_hint)?;

        print!("\n답변: ");
        std::io::stdout().flush()?;

        while let Some(event) = result.events.next().await {
            match event.map_err(with_hint)? {
                GenerationEvent::Delta(text) => {
                    print!("{}", text);
                    std::io::stdout().flush()?;
                }
                GenerationEvent::Done {
                    model, duration, ..
                } => {
                    println!();
                    tracing::debug!("Generated by {} in {:.2?}", model, duration);
                }
            }
        }

        if options.show_sources {
            print_sources(&result.sources);
        }
    } else {
        let response = pipeline.query(question).await.map_err(with_hint)?;

        println!("\n답변: {}", response.answer);
        if options.show_sources {
            print_sources(&response.sources);
        }
    }

    Ok(())
}

fn print_sources(sources: &[RetrievedChunk]) {
    if sources.is_empty() {
        println!("\n[!] 출처 없음");
        return;
    }

    println!("\n출처:");
    for (i, source) in sources.iter().enumerate() {
        println!("{}", format_source(i + 1, source));
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `[i] 파일 (Page n)` 형식
fn format_source(rank: usize, source: &RetrievedChunk) -> String {
    format!(
        "[{}] {} (Page {})",
        rank, source.metadata.document.source, source.metadata.document.page
    )
}

/// 에러 분류별 조치 안내
fn category_hint(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Configuration => "설정 오류: --config 파일의 type과 값을 확인하세요",
        ErrorCategory::Input => "입력 오류: 경로가 존재하는 PDF 파일 또는 폴더인지 확인하세요",
        ErrorCategory::Backend => "백엔드 오류: API 키와 네트워크 연결을 확인한 뒤 다시 시도하세요",
        ErrorCategory::State => "상태 오류: 먼저 `pdf-rag index <경로>`로 인덱스를 만드세요",
    }
}

/// 에러별 조치 안내 (분류 안내보다 구체적인 경우 우선)
fn error_hint(err: &RagError) -> &'static str {
    match err {
        RagError::IndexLocked(_) => {
            "잠금 오류: 다른 인덱싱 작업이 끝날 때까지 기다린 뒤 다시 시도하세요"
        }
        RagError::Cancelled => {
            "취소됨: 기존 인덱스는 그대로입니다. 다시 만들려면 `pdf-rag index <경로>`를 다시 실행하세요"
        }
        RagError::CorruptIndex(_) => {
            "인덱스 손상: `pdf-rag index <경로>`로 인덱스를 다시 만드세요"
        }
        _ => category_hint(err.category()),
    }
}

/// 라이브러리 에러에 조치 안내를 붙임
fn with_hint(err: RagError) -> anyhow::Error {
    let hint = error_hint(&err);
    anyhow::Error::new(err).context(hint)
}

// ============================================================================
// Tests
// ============================================================================
