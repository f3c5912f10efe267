//! basfakta - 트래픽스콜라 지식베이스 질의응답 엔진
//!
//! 계층형 JSON 지식베이스를 검색 유닛으로 평탄화하고,
//! 질의에서 도시/주제를 해석한 뒤 결정적 키워드(또는 퍼지) 랭킹으로
//! 가장 관련 있는 섹션을 골라 가격 정보와 함께 답변을 조립합니다.

pub mod autotest;
pub mod cli;
pub mod interpret;
pub mod knowledge;
pub mod retrieval;
pub mod server;

// Re-exports
pub use interpret::{
    create_interpreter, get_api_key, has_api_key, GeminiInterpreter, InterpretError,
    QueryInterpreter, QueryIntent,
};
pub use knowledge::{
    default_knowledge_dir, IndexConfig, IndexStats, KnowledgeBase, KnowledgeLoader, SearchIndex,
    SearchUnit, Section,
};
pub use retrieval::{
    Answer, AnswerEngine, AnswerMethod, EngineConfig, Explanation, Query, RankingConfig,
    RankingStrategy,
};
pub use server::{build_router, AppState};
