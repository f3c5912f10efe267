//! 회귀 테스트 스위트 실행기
//!
//! `test-suite.json`의 질문을 엔진(프로세스 내) 또는 실행 중인 서버(HTTP)에 보내고,
//! 답변에 기대 키워드가 모두 들어 있는지 검사합니다.
//! 숫자 표기 차이("4 995" vs "4995")를 흡수하도록 공백, 쉼표, 마침표를 제거해 비교합니다.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::retrieval::AnswerEngine;

/// 원격 실행 시 케이스 간 딜레이
const REMOTE_DELAY_MS: u64 = 100;

// ============================================================================
// Types
// ============================================================================

/// 테스트 케이스
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// 주제 레이블 (보고용)
    #[serde(default)]
    pub expert: String,
    pub question: String,
    #[serde(default)]
    pub expected_keywords: Vec<String>,
}

/// 키워드 검사 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordCheck {
    pub pass: bool,
    pub missing: Vec<String>,
}

/// 백엔드 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 답변 텍스트
    Answer(String),
    /// 서버가 2xx가 아닌 상태로 응답
    Status(u16),
}

/// 케이스 결과
#[derive(Debug, Clone)]
pub enum CaseOutcome {
    Pass,
    Fail { answer: String, missing: Vec<String> },
    /// 비정상 HTTP 상태 (실패로 집계)
    Rejected(u16),
    /// 전송 오류
    Error(String),
}

/// 스위트 결과
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub lines: Vec<String>,
    pub passed: usize,
    pub total: usize,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        println!("{}", line);
        self.lines.push(line);
    }
}

// ============================================================================
// AnswerBackend Trait
// ============================================================================

/// 질문을 보내고 답변을 받는 백엔드
///
/// `Err`는 서버에 닿지 못한 경우에만 사용합니다.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn ask(&self, question: &str) -> Result<Reply>;

    /// 케이스 간 대기 시간
    fn pacing(&self) -> Duration {
        Duration::ZERO
    }

    fn name(&self) -> String;
}

/// 프로세스 내 엔진 백엔드
pub struct LocalBackend<'a> {
    engine: &'a AnswerEngine,
}

impl<'a> LocalBackend<'a> {
    pub fn new(engine: &'a AnswerEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl AnswerBackend for LocalBackend<'_> {
    async fn ask(&self, question: &str) -> Result<Reply> {
        Ok(Reply::Answer(self.engine.answer(question).text))
    }

    fn name(&self) -> String {
        "local".to_string()
    }
}

/// HTTP 서버 백엔드 (`POST {url}`)
pub struct HttpBackend {
    url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RemoteAnswer {
    #[serde(default)]
    answer: String,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl AnswerBackend for HttpBackend {
    async fn ask(&self, question: &str) -> Result<Reply> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "question": question }))
            .send()
            .await
            .with_context(|| format!("Kunde inte ansluta till servern: {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("Server rejected question with status {}", status);
            return Ok(Reply::Status(status.as_u16()));
        }

        let body: RemoteAnswer = response
            .json()
            .await
            .context("Failed to parse server response")?;
        Ok(Reply::Answer(body.answer))
    }

    fn pacing(&self) -> Duration {
        Duration::from_millis(REMOTE_DELAY_MS)
    }

    fn name(&self) -> String {
        self.url.clone()
    }
}

// ============================================================================
// Suite
// ============================================================================

/// 스위트 파일 로드
pub fn load_suite(path: &Path) -> Result<Vec<TestCase>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Kunde inte läsa {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid test suite: {}", path.display()))
}

/// 답변에 기대 키워드가 모두 있는지 검사
pub fn check_keywords(answer: &str, keywords: &[String]) -> KeywordCheck {
    let normalized = normalize_for_check(answer);
    let missing: Vec<String> = keywords
        .iter()
        .filter(|kw| !normalized.contains(&normalize_for_check(kw)))
        .cloned()
        .collect();

    KeywordCheck {
        pass: missing.is_empty(),
        missing,
    }
}

fn normalize_for_check(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '.'))
        .collect()
}

/// 단일 케이스 실행
pub async fn run_case(backend: &dyn AnswerBackend, case: &TestCase) -> CaseOutcome {
    match backend.ask(&case.question).await {
        Ok(Reply::Status(status)) => CaseOutcome::Rejected(status),
        Ok(Reply::Answer(answer)) => {
            let check = check_keywords(&answer, &case.expected_keywords);
            if check.pass {
                CaseOutcome::Pass
            } else {
                CaseOutcome::Fail {
                    answer,
                    missing: check.missing,
                }
            }
        }
        Err(e) => CaseOutcome::Error(format!("{:#}", e)),
    }
}

/// 스위트 전체 실행
pub async fn run_suite(backend: &dyn AnswerBackend, cases: &[TestCase]) -> SuiteReport {
    let mut report = SuiteReport {
        total: cases.len(),
        ..SuiteReport::default()
    };
    report.log(format!(
        "--- STARTAR AUTOMATISK TEST-SVIT ({}) [{}] ---",
        backend.name(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    for (i, case) in cases.iter().enumerate() {
        report.log(format!(
            "\n--- Testar ({}/{}) - Expert: {} ---",
            i + 1,
            cases.len(),
            case.expert
        ));
        report.log(format!("Fråga: \"{}\"", case.question));

        match run_case(backend, case).await {
            CaseOutcome::Pass => {
                report.passed += 1;
                report.log("  [PASS]");
            }
            CaseOutcome::Fail { answer, missing } => {
                report.log("  [FAIL]");
                report.log(format!("    --> Fick svar: \"{}\"", flatten(&answer)));
                report.log(format!("    --> Saknade nyckelord: [{}]", missing.join(", ")));
            }
            CaseOutcome::Rejected(status) => {
                report.log("  [FAIL]");
                report.log(format!("    --> Servern svarade med status {}", status));
            }
            CaseOutcome::Error(message) => {
                report.log("  [ERROR]");
                report.log(format!("    --> {}", message));
            }
        }

        let pacing = backend.pacing();
        if !pacing.is_zero() && i + 1 < cases.len() {
            tokio::time::sleep(pacing).await;
        }
    }

    report.log("\n--- TESTER AVSLUTADE ---");
    report.log(format!(
        "Resultat: {} / {} godkända tester.",
        report.passed, report.total
    ));

    tracing::info!("Test suite finished: {}/{} passed", report.passed, report.total);
    report
}

fn flatten(text: &str) -> String {
    if text.trim().is_empty() {
        return "Inget svar".to_string();
    }
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::fixtures;
    use crate::retrieval::EngineConfig;
    use tempfile::TempDir;

    fn case(question: &str, keywords: &[&str]) -> TestCase {
        TestCase {
            expert: "test".to_string(),
            question: question.to_string(),
            expected_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    async fn spawn(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/ask", addr)
    }

    #[test]
    fn test_check_keywords_normalizes_numbers() {
        let answer = "Priset är 4 995 kr hos Trafikskola Malmö City.";
        let keywords = vec!["4995".to_string(), "malmö city".to_string(), "1.800".to_string()];
        let check = check_keywords(answer, &keywords);
        assert!(!check.pass);
        assert_eq!(check.missing, vec!["1.800"]);

        assert!(check_keywords(answer, &["4,995".to_string()]).pass);
        assert!(check_keywords(answer, &[]).pass);
    }

    #[test]
    fn test_load_suite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test-suite.json");
        std::fs::write(
            &path,
            r#"[{"expert": "am_kurs", "question": "Vad kostar AM?", "expected_keywords": ["4995"]},
                {"question": "Hej"}]"#,
        )
        .unwrap();

        let suite = load_suite(&path).unwrap();
        assert_eq!(suite.len(), 2);
        assert_eq!(suite[0].expected_keywords, vec!["4995"]);
        assert!(suite[1].expected_keywords.is_empty());

        assert!(load_suite(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn test_run_suite_locally() {
        let engine = AnswerEngine::new(&fixtures::knowledge_base(), EngineConfig::default());
        let backend = LocalBackend::new(&engine);
        let cases = vec![
            case("Vad kostar AM-kurset i Malmö?", &["Trafikskola Malmö City", "4995"]),
            case("Hur länge är en introduktionskurs giltig?", &["5 år"]),
            case("xyzzy plugh", &["4995"]),
        ];

        let report = run_suite(&backend, &cases).await;
        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 2);
        assert!(!report.all_passed());
        assert!(report.lines.iter().any(|l| l.contains("Saknade nyckelord: [4995]")));
        assert_eq!(
            report.lines.last().map(String::as_str),
            Some("Resultat: 2 / 3 godkända tester.")
        );
    }

    #[tokio::test]
    async fn test_http_status_is_a_failed_case() {
        let router = axum::Router::new().route(
            "/ask",
            axum::routing::post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let backend = HttpBackend::new(spawn(router).await).unwrap();

        match run_case(&backend, &case("Hej", &[])).await {
            CaseOutcome::Rejected(status) => assert_eq!(status, 500),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let report = run_suite(&backend, &[case("Hej", &["hej"])]).await;
        assert_eq!(report.passed, 0);
        assert!(report.lines.iter().any(|l| l == "  [FAIL]"));
        assert!(report.lines.iter().any(|l| l.contains("Servern svarade med status 500")));
        assert!(!report.lines.iter().any(|l| l.contains("[ERROR]")));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(format!("http://{}/ask", addr)).unwrap();
        match run_case(&backend, &case("Hej", &[])).await {
            CaseOutcome::Error(message) => assert!(message.contains("Kunde inte ansluta")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_suite_against_server() {
        let engine = AnswerEngine::new(&fixtures::knowledge_base(), EngineConfig::default());
        let state = crate::server::AppState::new(engine, std::path::PathBuf::from("."), None);
        let backend = HttpBackend::new(spawn(crate::server::build_router(state)).await).unwrap();

        let cases = vec![
            case("Vad kostar AM-kurset i Malmö?", &["4995"]),
            case("  ", &["Frågan var tom"]),
        ];
        let report = run_suite(&backend, &cases).await;
        assert_eq!(report.passed, 1);
        assert!(report.lines.iter().any(|l| l.contains("Servern svarade med status 400")));
    }
}
