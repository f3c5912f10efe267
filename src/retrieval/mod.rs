//! Retrieval 모듈 - 결정적 질의응답 파이프라인
//!
//! - Resolver: 질의 용어, 도시(지점), 주제 단서 추출
//! - Ranker: 키워드 가중치 또는 퍼지 유사도로 유닛 스코어링
//! - Composer: 섹션 텍스트 + 가격 병합 + 템플릿
//! - Engine: 위 단계를 연결하고 인덱스 핸들을 소유

mod composer;
mod engine;
mod fuzzy;
mod ranker;
pub(crate) mod resolver;
pub(crate) mod text;

// Re-exports
pub use composer::{
    greeting_for_hour, price_lines, AnswerComposer, ComposeConfig, Selection, CLOSINGS,
    FALLBACK_ANSWER,
};
pub use engine::{Answer, AnswerEngine, AnswerMethod, EngineConfig, Explanation, ScoredUnit};
pub use fuzzy::{levenshtein, similarity, FuzzyRanker};
pub use ranker::{create_ranker, Candidate, KeywordRanker, Ranker, RankingConfig, RankingStrategy};
pub use resolver::{
    build_cue_table, default_topic_cues, resolve_cities, resolve_topics, EntityResolver, Query,
    ResolverConfig, TopicCue, DEFAULT_TOPIC_CUES,
};
pub use text::{fold_diacritics, normalize_phrase, query_terms, tokenize};
