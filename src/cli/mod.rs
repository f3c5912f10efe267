//! CLI 모듈
//!
//! basfakta CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::autotest::{self, AnswerBackend, HttpBackend, LocalBackend};
use crate::interpret::{create_interpreter, has_api_key, QueryInterpreter};
use crate::knowledge::{default_knowledge_dir, KnowledgeBase, KnowledgeLoader, LoadStats};
use crate::retrieval::{AnswerEngine, EngineConfig, RankingStrategy};
use crate::server::{self, AppState};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "basfakta")]
#[command(version, about = "트래픽스콜라 지식베이스 질의응답 엔진", long_about = None)]
pub struct Cli {
    /// 지식 디렉터리 (basfakta_*.json, 지점 JSON, synonyms.json)
    #[arg(long, global = true, env = "BASFAKTA_KNOWLEDGE_DIR")]
    pub knowledge_dir: Option<PathBuf>,

    /// 랭킹 전략 (keyword | fuzzy)
    #[arg(long, global = true, default_value = "keyword")]
    pub strategy: RankingStrategy,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문에 답변
    Ask {
        /// 질문 텍스트
        question: String,

        /// 해석 과정과 상위 후보 출력
        #[arg(long)]
        explain: bool,

        /// Gemini 해석기를 먼저 시도
        #[arg(long)]
        ai: bool,
    },

    /// 섹션 목록
    Sections {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// HTTP 서버 실행
    Serve {
        /// 포트
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Gemini 해석기 사용
        #[arg(long)]
        ai: bool,
    },

    /// 상태 확인
    Status,

    /// 회귀 테스트 스위트 실행
    Autotest {
        /// 스위트 파일
        #[arg(long, default_value = "test-suite.json")]
        suite: PathBuf,

        /// 실행 중인 서버의 /ask URL (생략 시 프로세스 내 실행)
        #[arg(long)]
        url: Option<String>,

        /// 결과 로그 파일
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let dir = cli.knowledge_dir.unwrap_or_else(default_knowledge_dir);
    let config = EngineConfig::for_strategy(cli.strategy);

    match cli.command {
        Commands::Ask {
            question,
            explain,
            ai,
        } => cmd_ask(&dir, config, &question, explain, ai).await,
        Commands::Sections { limit } => cmd_sections(&dir, config, limit),
        Commands::Serve { port, ai } => cmd_serve(dir, config, port, ai).await,
        Commands::Status => cmd_status(&dir, config),
        Commands::Autotest { suite, url, log } => {
            cmd_autotest(&dir, config, &suite, url, log.as_deref()).await
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
async fn cmd_ask(
    dir: &Path,
    config: EngineConfig,
    question: &str,
    explain: bool,
    ai: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("질문이 비어 있습니다");
    }

    let (kb, _) = load_knowledge(dir)?;
    let engine = AnswerEngine::new(&kb, config);

    if explain {
        let explanation = engine.explain(question, 5);
        let query = &explanation.query;

        println!("[*] 용어: {}", query.terms.join(", "));
        println!(
            "[*] 도시: {}",
            if query.cities.is_empty() {
                "-".to_string()
            } else {
                query.cities.join(", ")
            }
        );
        println!(
            "[*] 주제 단서: {}",
            if query.topics.is_empty() {
                "-".to_string()
            } else {
                query.topics.join(", ")
            }
        );
        println!(
            "[*] 후보: {} 건 ({})",
            explanation.total_candidates, explanation.ranker
        );
        for (i, candidate) in explanation.candidates.iter().enumerate() {
            println!(
                "  {}. [점수: {:.2}] {}",
                i + 1,
                candidate.score,
                candidate.section_key
            );
            println!("     {}", truncate_text(&candidate.content, 100));
        }
        println!();
    }

    let interpreter = if ai { interpreter_or_warn() } else { None };
    let answer = engine
        .answer_with(question, interpreter.as_deref())
        .await;

    println!("{}", answer.text);

    if explain {
        println!();
        println!(
            "[OK] 방식: {} | 컨텍스트: {}",
            answer.method,
            answer.context.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// 섹션 목록 명령어 (sections)
fn cmd_sections(dir: &Path, config: EngineConfig, limit: usize) -> Result<()> {
    let (kb, _) = load_knowledge(dir)?;
    let engine = AnswerEngine::new(&kb, config);
    let index = engine.index();

    let keys = index.section_keys();
    if keys.is_empty() {
        println!("[!] 인덱싱된 섹션이 없습니다.");
        return Ok(());
    }

    println!("[OK] 섹션 ({} 건):\n", keys.len());

    for key in keys.iter().take(limit) {
        let preview = index
            .section(key)
            .map(|s| truncate_text(&s.text, 60))
            .unwrap_or_default();
        println!("  {}", key);
        if !preview.is_empty() {
            println!("      {}", preview);
        }
    }

    if keys.len() > limit {
        println!("\n  ... 외 {} 건", keys.len() - limit);
    }

    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(dir: PathBuf, config: EngineConfig, port: u16, ai: bool) -> Result<()> {
    let (kb, stats) = load_knowledge(&dir)?;
    let engine = AnswerEngine::new(&kb, config);
    let index = engine.index().stats();

    println!(
        "[OK] 지식베이스 로드: 주제 {} / 지점 {} / 유닛 {}",
        stats.topics, stats.offices, index.units
    );

    let interpreter = if ai { interpreter_or_warn() } else { None };
    if let Some(ref i) = interpreter {
        println!("[OK] 해석기: {}", i.name());
    }

    println!("[*] http://0.0.0.0:{} 에서 대기 중 (POST /ask)", port);

    server::serve(AppState::new(engine, dir, interpreter), port).await
}

/// 상태 명령어 (status)
fn cmd_status(dir: &Path, config: EngineConfig) -> Result<()> {
    println!("basfakta v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 지식 디렉터리: {}", dir.display());
    println!("[*] 랭킹 전략: {}", config.ranking.strategy);

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (--ai 사용 불가)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match KnowledgeLoader::with_defaults().load_dir(dir) {
        Ok((kb, load)) => {
            let engine = AnswerEngine::new(&kb, config);
            let index = engine.index();
            let stats = index.stats();
            let text_bytes: usize = index.sections().values().map(|s| s.text.len()).sum();

            println!(
                "[OK] 파일: 주제 {} / 지점 {} / 동의어 {} (건너뜀 {})",
                load.topics, load.offices, load.synonym_files, load.skipped
            );
            println!(
                "[OK] 인덱스: 유닛 {} / 섹션 {} / 도시 {} / 주제 단서 {}",
                stats.units, stats.sections, stats.cities, stats.topic_cues
            );
            println!("     섹션 텍스트: {}", format_bytes(text_bytes));
        }
        Err(e) => {
            println!("[!] 지식베이스 로드 실패: {:#}", e);
        }
    }

    Ok(())
}

/// 회귀 테스트 명령어 (autotest)
async fn cmd_autotest(
    dir: &Path,
    config: EngineConfig,
    suite: &Path,
    url: Option<String>,
    log: Option<&Path>,
) -> Result<()> {
    let cases = autotest::load_suite(suite)?;
    if cases.is_empty() {
        println!("[!] 테스트 케이스가 없습니다.");
        return Ok(());
    }

    let report = match url {
        Some(url) => {
            let backend = HttpBackend::new(url)?;
            autotest::run_suite(&backend as &dyn AnswerBackend, &cases).await
        }
        None => {
            let (kb, _) = load_knowledge(dir)?;
            let engine = AnswerEngine::new(&kb, config);
            let backend = LocalBackend::new(&engine);
            autotest::run_suite(&backend as &dyn AnswerBackend, &cases).await
        }
    };

    if let Some(path) = log {
        let mut contents = report.lines.join("\n");
        contents.push('\n');
        std::fs::write(path, contents)
            .with_context(|| format!("로그 파일 쓰기 실패: {}", path.display()))?;
        println!("[OK] 로그 저장: {}", path.display());
    }

    if !report.all_passed() {
        bail!(
            "{} / {} 테스트 실패",
            report.total - report.passed,
            report.total
        );
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_knowledge(dir: &Path) -> Result<(KnowledgeBase, LoadStats)> {
    KnowledgeLoader::with_defaults()
        .load_dir(dir)
        .with_context(|| format!("지식베이스 로드 실패: {}", dir.display()))
}

fn interpreter_or_warn() -> Option<std::sync::Arc<dyn QueryInterpreter>> {
    let interpreter = create_interpreter();
    if interpreter.is_none() {
        println!("[!] API 키가 없어 결정적 파이프라인만 사용합니다.");
    }
    interpreter
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

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("Ålderskrav", 20), "Ålderskrav");
        assert_eq!(truncate_text("Du måste vara minst 15 år", 8), "Du måste...");
        assert_eq!(truncate_text("Giltighet\n5 år", 20), "Giltighet 5 år");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::try_parse_from([
            "basfakta",
            "--strategy",
            "fuzzy",
            "ask",
            "Vad kostar AM-kurset?",
            "--explain",
        ])
        .unwrap();
        assert_eq!(cli.strategy, RankingStrategy::Fuzzy);
        match cli.command {
            Commands::Ask {
                question, explain, ai,
            } => {
                assert_eq!(question, "Vad kostar AM-kurset?");
                assert!(explain);
                assert!(!ai);
            }
            _ => panic!("expected ask"),
        }

        let cli = Cli::try_parse_from(["basfakta", "autotest", "--url", "http://localhost:3000/ask"])
            .unwrap();
        match cli.command {
            Commands::Autotest { suite, url, log } => {
                assert_eq!(suite, PathBuf::from("test-suite.json"));
                assert_eq!(url.as_deref(), Some("http://localhost:3000/ask"));
                assert!(log.is_none());
            }
            _ => panic!("expected autotest"),
        }

        assert!(Cli::try_parse_from(["basfakta", "--strategy", "vector", "status"]).is_err());
    }

    #[tokio::test]
    async fn test_autotest_writes_log_and_fails_on_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let kb_dir = dir.path().join("kb");
        std::fs::create_dir(&kb_dir).unwrap();
        for (name, value) in crate::knowledge::fixtures::topic_documents() {
            std::fs::write(kb_dir.join(format!("basfakta_{}.json", name)), value.to_string())
                .unwrap();
        }

        let suite = dir.path().join("suite.json");
        std::fs::write(
            &suite,
            r#"[{"expert": "am_kurs", "question": "Hur gammal måste man vara för AM?", "expected_keywords": ["15 år"]},
                {"expert": "x", "question": "xyzzy", "expected_keywords": ["finns inte"]}]"#,
        )
        .unwrap();
        let log = dir.path().join("out.log");

        let result = cmd_autotest(&kb_dir, EngineConfig::default(), &suite, None, Some(&log)).await;
        assert!(result.is_err());

        let written = std::fs::read_to_string(&log).unwrap();
        assert!(written.contains("[PASS]"));
        assert!(written.contains("[FAIL]"));
        assert!(written.contains("Resultat: 1 / 2 godkända tester."));
    }
}
