//! Knowledge 모듈 - 지식베이스 로드와 검색 인덱스
//!
//! - Document: 태그드 enum 지식 트리 + 지점/가격표
//! - Loader: 지식 디렉터리(JSON) 로드
//! - Indexer: 트리를 검색 유닛과 섹션으로 평탄화
//! - Index: 불변 인덱스 + 원자적 교체 핸들

mod document;
mod index;
mod indexer;
mod loader;
mod splitter;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-exports
pub use document::{
    Fields, KnowledgeBase, KnowledgeDocument, KnowledgeNode, Office, Price, PriceEntry,
};
pub use index::{IndexHandle, IndexStats, SearchIndex};
pub use indexer::{
    ContextPath, IndexConfig, Indexer, SearchUnit, Section, KEYWORDS_KEY, SERVICE_KEY, TITLE_KEY,
};
pub use loader::{
    default_knowledge_dir, get_data_dir, KnowledgeFile, KnowledgeLoader, LoadStats, LoaderConfig,
    KNOWLEDGE_DIR_ENV,
};
pub use splitter::{default_splitter, SentenceSplitter, Splitter};
