//! HTTP 서버 - 질의응답 API
//!
//! - `POST /ask`: `{"question": "..."}` → `{"answer", "context", "method"}`
//! - `GET /health`: 인덱스 통계
//! - `POST /reload`: 지식 디렉터리를 다시 읽어 인덱스를 원자적으로 교체

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::interpret::QueryInterpreter;
use crate::knowledge::{IndexStats, KnowledgeLoader, LoadStats, LoaderConfig};
use crate::retrieval::{AnswerEngine, AnswerMethod};

/// 빈 질문에 대한 답변
pub const EMPTY_QUESTION_ANSWER: &str = "Frågan var tom.";

// ============================================================================
// State
// ============================================================================

/// 공유 애플리케이션 상태
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: AnswerEngine,
    knowledge_dir: PathBuf,
    loader_config: LoaderConfig,
    interpreter: Option<Arc<dyn QueryInterpreter>>,
    /// 동시 리로드 직렬화
    reload_lock: Mutex<()>,
}

impl AppState {
    pub fn new(
        engine: AnswerEngine,
        knowledge_dir: PathBuf,
        interpreter: Option<Arc<dyn QueryInterpreter>>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                knowledge_dir,
                loader_config: LoaderConfig::default(),
                interpreter,
                reload_lock: Mutex::new(()),
            }),
        }
    }

    pub fn engine(&self) -> &AnswerEngine {
        &self.inner.engine
    }

    pub fn knowledge_dir(&self) -> &PathBuf {
        &self.inner.knowledge_dir
    }

    fn interpreter(&self) -> Option<&dyn QueryInterpreter> {
        self.inner.interpreter.as_deref()
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<AnswerMethod>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub knowledge_dir: String,
    pub interpreter: Option<String>,
    pub index: IndexStats,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub load: LoadStats,
    pub index: IndexStats,
}

// ============================================================================
// Router
// ============================================================================

/// 라우터 생성
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .route("/reload", post(reload))
        .with_state(state)
        // Middleware layers (order matters - applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// 서버 시작
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /ask
pub async fn ask(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Response {
    let question = request.question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(AskResponse {
                answer: EMPTY_QUESTION_ANSWER.to_string(),
                context: None,
                method: None,
            }),
        )
            .into_response();
    }

    tracing::info!("Question: \"{}\"", question);

    let answer = state
        .engine()
        .answer_with(question, state.interpreter())
        .await;

    tracing::debug!("Answer ({}):\n{}", answer.method, answer.text);

    Json(AskResponse {
        answer: answer.text,
        context: answer.context,
        method: Some(answer.method),
    })
    .into_response()
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        knowledge_dir: state.knowledge_dir().display().to_string(),
        interpreter: state.interpreter().map(|i| i.name().to_string()),
        index: state.engine().index().stats(),
    })
}

/// POST /reload
///
/// 로드에 실패하면 500과 오류 메시지를 반환하고 기존 인덱스를 유지합니다.
pub async fn reload(State(state): State<AppState>) -> Response {
    let _guard = state.inner.reload_lock.lock().await;

    let dir = state.knowledge_dir().clone();
    let config = state.inner.loader_config.clone();
    let loaded = tokio::task::spawn_blocking(move || KnowledgeLoader::new(config).load_dir(&dir))
        .await
        .context("Reload task panicked")
        .and_then(|result| result);

    match loaded {
        Ok((kb, load)) => {
            let index = state.engine().reload(&kb);
            tracing::info!("Reloaded knowledge base ({} units)", index.units);
            Json(ReloadResponse {
                status: "reloaded",
                load,
                index,
            })
            .into_response()
        }
        Err(e) => {
            tracing::warn!("Reload failed, keeping current index: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("{:#}", e) })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{fixtures, KnowledgeBase};
    use crate::retrieval::EngineConfig;
    use tempfile::TempDir;

    fn state_with(kb: &KnowledgeBase, dir: PathBuf) -> AppState {
        AppState::new(AnswerEngine::new(kb, EngineConfig::default().plain()), dir, None)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn write_fixture_dir(dir: &std::path::Path) {
        for (name, value) in fixtures::topic_documents() {
            std::fs::write(
                dir.join(format!("basfakta_{}.json", name)),
                value.to_string(),
            )
            .unwrap();
        }
        for (name, value) in fixtures::office_documents() {
            std::fs::write(dir.join(format!("{}.json", name)), value.to_string()).unwrap();
        }
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question() {
        let state = state_with(&fixtures::knowledge_base(), PathBuf::from("."));
        let response = ask(
            State(state),
            Json(AskRequest {
                question: "   ".to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["answer"], EMPTY_QUESTION_ANSWER);
    }

    #[tokio::test]
    async fn test_ask_returns_answer() {
        let state = state_with(&fixtures::knowledge_base(), PathBuf::from("."));
        let response = ask(
            State(state),
            Json(AskRequest {
                question: "Vad kostar AM-kurset i Malmö?".to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["answer"].as_str().unwrap().contains("4995"));
        assert_eq!(body["context"], "am_kurs > AM-kurs");
        assert_eq!(body["method"], "keyword");
    }

    #[tokio::test]
    async fn test_health_reports_stats() {
        let state = state_with(&fixtures::knowledge_base(), PathBuf::from("kb"));
        let Json(health) = health(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.index.documents, 4);
        assert_eq!(health.knowledge_dir, "kb");
        assert!(health.interpreter.is_none());
    }

    #[tokio::test]
    async fn test_reload_swaps_and_keeps_index_on_failure() {
        let dir = TempDir::new().unwrap();
        write_fixture_dir(dir.path());
        let state = state_with(&KnowledgeBase::default(), dir.path().to_path_buf());
        assert!(state.engine().index().units().is_empty());

        let response = reload(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["load"]["topics"], 4);
        let units = state.engine().index().units().len();
        assert!(units > 0);

        // 디렉터리가 사라지면 500, 기존 인덱스 유지
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(!path.exists());
        let response = reload(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("not found"));
        assert_eq!(state.engine().index().units().len(), units);
    }
}
