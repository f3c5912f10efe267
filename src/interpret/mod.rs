//! 해석기 모듈 - Gemini API를 통한 질의 의도 해석
//!
//! 결정적 파이프라인 앞에 끼울 수 있는 선택적 프런트엔드입니다.
//! 질문과 섹션 카탈로그를 보내고 `{ "section", "city" }` JSON을 받습니다.
//! 어떤 오류든 호출 측(엔진)이 결정적 파이프라인으로 대체합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let interpreter = GeminiInterpreter::from_env()?;
//! let answer = engine.answer_with("Vad kostar AM?", Some(&interpreter)).await;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::knowledge::SearchIndex;

// ============================================================================
// Errors
// ============================================================================

/// 해석기 오류
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable")]
    MissingKey,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Rate limit exceeded (429) after {0} retries")]
    RateLimited(u32),

    #[error("Gemini API error ({status}): {message}")]
    Api { status: String, message: String },

    #[error("Failed to parse interpreter response: {0}")]
    Parse(String),

    #[error("Interpreter chose unknown section '{0}'")]
    UnknownSection(String),
}

// ============================================================================
// Types
// ============================================================================

/// 해석된 질의 의도
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// 섹션 키 (카탈로그의 키 중 하나)
    #[serde(default)]
    pub section: Option<String>,
    /// 질문이 가리키는 도시
    #[serde(default)]
    pub city: Option<String>,
}

impl QueryIntent {
    /// 빈 문자열을 `None`으로
    fn normalized(self) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            section: clean(self.section),
            city: clean(self.city),
        }
    }
}

/// 카탈로그 항목
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub key: String,
    pub preview: String,
}

/// 해석기에 보내는 섹션/도시 목록
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterpretCatalog {
    pub sections: Vec<CatalogEntry>,
    pub cities: Vec<String>,
}

/// 카탈로그 미리보기 길이 (문자 수)
const PREVIEW_CHARS: usize = 120;

impl InterpretCatalog {
    /// 인덱스에서 카탈로그 생성 (섹션 키 정렬 순)
    pub fn from_index(index: &SearchIndex) -> Self {
        let sections = index
            .section_keys()
            .into_iter()
            .filter_map(|key| index.section(key))
            .map(|section| CatalogEntry {
                key: section.key.clone(),
                preview: section
                    .text
                    .replace('\n', " ")
                    .chars()
                    .take(PREVIEW_CHARS)
                    .collect(),
            })
            .collect();

        let mut cities: Vec<String> = Vec::new();
        for office in index.offices() {
            let city = office.city.trim().to_string();
            if !city.is_empty() && !cities.contains(&city) {
                cities.push(city);
            }
        }

        Self { sections, cities }
    }

    /// 프롬프트 생성
    pub fn prompt(&self, question: &str) -> String {
        let mut prompt = String::from(
            "Du är en assistent för en trafikskola. Välj den sektion som bäst besvarar frågan.\n\
             Svara med JSON: {\"section\": <sektionsnyckel eller null>, \"city\": <stad eller null>}.\n\
             Använd endast nycklar och städer från listorna nedan.\n\nSektioner:\n",
        );
        for entry in &self.sections {
            prompt.push_str(&format!("- {} :: {}\n", entry.key, entry.preview));
        }
        prompt.push_str("\nStäder: ");
        prompt.push_str(&self.cities.join(", "));
        prompt.push_str(&format!("\n\nFråga: {}", question));
        prompt
    }
}

// ============================================================================
// QueryInterpreter Trait
// ============================================================================

/// 질의 해석기 트레이트
#[async_trait]
pub trait QueryInterpreter: Send + Sync {
    /// 질문을 섹션/도시 의도로 해석
    async fn interpret(
        &self,
        question: &str,
        catalog: &InterpretCatalog,
    ) -> Result<QueryIntent, InterpretError>;

    /// 해석기 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Interpreter
// ============================================================================

/// Gemini generateContent 엔드포인트 (모델 이름 치환)
/// source: https://ai.google.dev/api/generate-content
const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent";

/// 기본 모델
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// 분당 요청 한도 (Gemini 무료 티어)
const REQUESTS_PER_MINUTE: u32 = 60;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Google Gemini 해석기
#[derive(Debug)]
pub struct GeminiInterpreter {
    api_key: String,
    model: String,
    client: reqwest::Client,
    pacer: Mutex<RequestPacer>,
}

/// 요청 간격 조절기
///
/// 호출마다 다음 전송 시각을 하나씩 예약합니다. 간격이 `60s / 한도`이므로
/// 어느 1분 구간에서도 한도를 넘지 않습니다.
#[derive(Debug)]
struct RequestPacer {
    interval: Duration,
    next_slot: Option<Instant>,
}

impl RequestPacer {
    fn per_minute(requests: u32) -> Self {
        Self {
            interval: Duration::from_secs(60) / requests.max(1),
            next_slot: None,
        }
    }

    /// 슬롯을 예약하고 `now`부터 기다려야 할 시간을 반환
    fn reserve(&mut self, now: Instant) -> Duration {
        let slot = match self.next_slot {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_slot = Some(slot + self.interval);
        slot - now
    }
}

impl GeminiInterpreter {
    /// 새 Gemini 해석기 생성
    pub fn new(api_key: String) -> Result<Self, InterpretError> {
        Self::with_model(api_key, DEFAULT_MODEL)
    }

    /// 모델을 지정하여 생성
    pub fn with_model(api_key: String, model: &str) -> Result<Self, InterpretError> {
        if api_key.trim().is_empty() {
            return Err(InterpretError::MissingKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InterpretError::Http(format!("Failed to create HTTP client: {}", e)))?;

        let pacer = Mutex::new(RequestPacer::per_minute(REQUESTS_PER_MINUTE));

        Ok(Self {
            api_key,
            model: model.to_string(),
            client,
            pacer,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env() -> Result<Self, InterpretError> {
        Self::new(get_api_key()?)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        GEMINI_GENERATE_URL.replace("{model}", &self.model)
    }
}

/// generateContent 요청 본문
/// source: https://ai.google.dev/api/generate-content
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: String,
    response_schema: serde_json::Value,
}

/// generateContent 응답
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: Option<Content>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

fn intent_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "section": { "type": "STRING", "nullable": true },
            "city": { "type": "STRING", "nullable": true }
        }
    })
}

/// 응답 본문에서 의도 추출
fn parse_intent(body: &str) -> Result<QueryIntent, InterpretError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| InterpretError::Parse(e.to_string()))?;

    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .map(|p| p.text)
        .find(|t| !t.trim().is_empty())
        .ok_or_else(|| InterpretError::Parse("empty response".to_string()))?;

    let text = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let intent: QueryIntent =
        serde_json::from_str(text).map_err(|e| InterpretError::Parse(e.to_string()))?;
    Ok(intent.normalized())
}

#[async_trait]
impl QueryInterpreter for GeminiInterpreter {
    async fn interpret(
        &self,
        question: &str,
        catalog: &InterpretCatalog,
    ) -> Result<QueryIntent, InterpretError> {
        if question.trim().is_empty() {
            return Ok(QueryIntent::default());
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: catalog.prompt(question),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json".to_string(),
                response_schema: intent_schema(),
            },
        };
        let url = self.endpoint();

        let mut last_error: Option<InterpretError> = None;

        // 재시도 루프 (429/전송 오류 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            // 락은 예약에만 잡고 대기는 락 밖에서
            let wait = self.pacer.lock().await.reserve(Instant::now());
            if !wait.is_zero() {
                tracing::debug!("Pacing Gemini request, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(InterpretError::Http(e.to_string()));
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| InterpretError::Http(format!("Failed to read response body: {}", e)))?;

            if status.is_success() {
                let intent = parse_intent(&body)?;
                tracing::debug!("Gemini intent: {:?}", intent);
                return Ok(intent);
            }

            if status.as_u16() == 429 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(InterpretError::RateLimited(MAX_RETRIES));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                // 다른 에러 - 즉시 실패
                return Err(match serde_json::from_str::<GeminiError>(&body) {
                    Ok(error) => InterpretError::Api {
                        status: error.error.status,
                        message: error.error.message,
                    },
                    Err(_) => InterpretError::Api {
                        status: status.to_string(),
                        message: body,
                    },
                });
            }
        }

        Err(last_error.unwrap_or(InterpretError::RateLimited(MAX_RETRIES)))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String, InterpretError> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }
    Err(InterpretError::MissingKey)
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Factory Function
// ============================================================================

/// 해석기 생성 (Gemini API)
///
/// 키가 없으면 경고 후 `None`을 반환하며, 엔진은 결정적 파이프라인만 사용합니다.
pub fn create_interpreter() -> Option<Arc<dyn QueryInterpreter>> {
    match GeminiInterpreter::from_env() {
        Ok(interpreter) => {
            tracing::info!("Using Gemini interpreter ({})", interpreter.model());
            Some(Arc::new(interpreter))
        }
        Err(e) => {
            tracing::warn!("Interpreter disabled: {}", e);
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::fixtures;

    #[test]
    fn test_parse_intent() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "{\"section\": \"am_kurs > AM-kurs\", \"city\": \"Malmö\"}" }]
                }
            }]
        })
        .to_string();
        let intent = parse_intent(&body).unwrap();
        assert_eq!(intent.section.as_deref(), Some("am_kurs > AM-kurs"));
        assert_eq!(intent.city.as_deref(), Some("Malmö"));
    }

    #[test]
    fn test_parse_intent_normalizes_empty_and_fenced() {
        let body = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n{\"section\": \"  \", \"city\": null}\n```" }] }
            }]
        })
        .to_string();
        assert_eq!(parse_intent(&body).unwrap(), QueryIntent::default());
    }

    #[test]
    fn test_parse_intent_errors() {
        assert!(matches!(parse_intent("not json"), Err(InterpretError::Parse(_))));
        assert!(matches!(
            parse_intent(r#"{"candidates": []}"#),
            Err(InterpretError::Parse(_))
        ));
        let body = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "Jag vet inte" }] } }]
        })
        .to_string();
        assert!(matches!(parse_intent(&body), Err(InterpretError::Parse(_))));
    }

    #[test]
    fn test_catalog_from_index() {
        let index = fixtures::index();
        let catalog = InterpretCatalog::from_index(&index);

        assert_eq!(catalog.sections.len(), index.sections().len());
        assert_eq!(catalog.cities, vec!["Malmö", "Lund"]);
        assert!(catalog.sections.iter().all(|e| e.preview.chars().count() <= PREVIEW_CHARS));

        let prompt = catalog.prompt("Vad kostar AM?");
        assert!(prompt.contains("am_kurs > AM-kurs"));
        assert!(prompt.ends_with("Fråga: Vad kostar AM?"));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(matches!(
            GeminiInterpreter::new("  ".to_string()),
            Err(InterpretError::MissingKey)
        ));
        let interpreter = GeminiInterpreter::new("fake_key".to_string()).unwrap();
        assert_eq!(interpreter.name(), DEFAULT_MODEL);
        assert!(interpreter.endpoint().ends_with("gemini-2.0-flash:generateContent"));
    }

    #[test]
    fn test_error_messages() {
        let err = InterpretError::Api {
            status: "INVALID_ARGUMENT".to_string(),
            message: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "Gemini API error (INVALID_ARGUMENT): bad");
        assert_eq!(
            InterpretError::UnknownSection("x".to_string()).to_string(),
            "Interpreter chose unknown section 'x'"
        );
    }

    #[test]
    fn test_pacer_spaces_requests() {
        let mut pacer = RequestPacer::per_minute(60);
        let start = Instant::now();

        assert_eq!(pacer.reserve(start), Duration::ZERO);
        // 같은 시각의 연속 호출은 한 간격씩 밀림
        assert_eq!(pacer.reserve(start), Duration::from_secs(1));
        assert_eq!(pacer.reserve(start), Duration::from_secs(2));
        // 예약된 슬롯이 모두 지나면 즉시
        assert_eq!(pacer.reserve(start + Duration::from_secs(10)), Duration::ZERO);
        assert_eq!(
            pacer.reserve(start + Duration::from_millis(10_500)),
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn test_blank_question_needs_no_request() {
        let interpreter = GeminiInterpreter::new("fake_key".to_string()).unwrap();
        let intent = interpreter
            .interpret("   ", &InterpretCatalog::default())
            .await
            .unwrap();
        assert_eq!(intent, QueryIntent::default());
    }
}
