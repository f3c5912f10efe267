//! Search Index - 불변 인덱스와 원자적 교체 핸들
//!
//! 인덱스는 시작 시(또는 명시적 리로드 시) 한 번 만들어지고 이후 읽기 전용입니다.
//! 리로드는 새 인덱스를 완전히 만든 뒤 포인터만 교체하므로, 요청 처리 중에는
//! 요청 시작 시점에 얻은 `Arc`를 계속 사용합니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::document::{KnowledgeBase, Office};
use super::indexer::{IndexConfig, Indexer, SearchUnit, Section};
use crate::retrieval::resolver::{build_cue_table, TopicCue};
use crate::retrieval::text::fold_diacritics;

// ============================================================================
// Types
// ============================================================================

/// 인덱스 통계
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub units: usize,
    pub sections: usize,
    pub offices: usize,
    pub cities: usize,
    pub topic_cues: usize,
    pub built_at: DateTime<Utc>,
}

/// 검색 인덱스
#[derive(Debug)]
pub struct SearchIndex {
    units: Vec<SearchUnit>,
    sections: HashMap<String, Section>,
    offices: Vec<Office>,
    topic_cues: Vec<TopicCue>,
    topics: BTreeSet<String>,
    /// 주제별 첫 섹션 키 (인덱싱 순서)
    topic_roots: HashMap<String, String>,
    /// 소문자화 + 발음 기호 제거된 도시 이름
    city_terms: BTreeSet<String>,
    built_at: DateTime<Utc>,
}

impl SearchIndex {
    /// 지식베이스로 인덱스 생성
    pub fn build(kb: &KnowledgeBase, config: &IndexConfig) -> Self {
        let indexer = Indexer::new(config.clone());
        let (units, sections) = indexer.build(&kb.documents);

        let topics: BTreeSet<String> = kb.documents.iter().map(|d| d.name.clone()).collect();
        let topic_cues = build_cue_table(&config.topic_cues, &kb.topic_synonyms, &topics);

        let mut topic_roots = HashMap::new();
        for unit in &units {
            topic_roots
                .entry(unit.topic.clone())
                .or_insert_with(|| unit.section_key.clone());
        }

        let city_terms = kb
            .offices
            .iter()
            .map(|o| fold_diacritics(o.city.trim()))
            .filter(|c| !c.is_empty())
            .collect();

        let index = Self {
            units,
            sections,
            offices: kb.offices.clone(),
            topic_cues,
            topics,
            topic_roots,
            city_terms,
            built_at: Utc::now(),
        };

        tracing::info!(
            "Built search index: {} documents, {} units, {} sections, {} offices",
            index.topics.len(),
            index.units.len(),
            index.sections.len(),
            index.offices.len()
        );

        index
    }

    /// 빈 인덱스 (모든 질의가 폴백)
    pub fn empty() -> Self {
        Self::build(&KnowledgeBase::default(), &IndexConfig::default())
    }

    pub fn units(&self) -> &[SearchUnit] {
        &self.units
    }

    pub fn sections(&self) -> &HashMap<String, Section> {
        &self.sections
    }

    /// 섹션 키로 조회 (O(1))
    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.get(key)
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    pub fn topic_cues(&self) -> &[TopicCue] {
        &self.topic_cues
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn city_terms(&self) -> &BTreeSet<String> {
        &self.city_terms
    }

    /// 주제의 첫 섹션 (주제만 식별된 질의용)
    pub fn first_section_of(&self, topic: &str) -> Option<&Section> {
        self.topic_roots
            .get(topic)
            .and_then(|key| self.sections.get(key))
    }

    /// 섹션 키를 정렬된 순서로 반환
    pub fn section_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.sections.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.topics.len(),
            units: self.units.len(),
            sections: self.sections.len(),
            offices: self.offices.len(),
            cities: self.city_terms.len(),
            topic_cues: self.topic_cues.len(),
            built_at: self.built_at,
        }
    }
}

// ============================================================================
// IndexHandle
// ============================================================================

/// 원자적으로 교체 가능한 인덱스 핸들
pub struct IndexHandle {
    current: ArcSwap<SearchIndex>,
}

impl IndexHandle {
    pub fn new(index: SearchIndex) -> Self {
        Self {
            current: ArcSwap::from_pointee(index),
        }
    }

    /// 현재 인덱스 스냅샷
    pub fn load(&self) -> Arc<SearchIndex> {
        self.current.load_full()
    }

    /// 새 인덱스로 교체하고 이전 인덱스 반환
    pub fn replace(&self, index: SearchIndex) -> Arc<SearchIndex> {
        let previous = self.current.swap(Arc::new(index));
        tracing::info!(
            "Swapped search index ({} -> {} units)",
            previous.units.len(),
            self.current.load().units.len()
        );
        previous
    }
}

// ============================================================================
// Tests
// ============================================================================
