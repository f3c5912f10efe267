//! Answer Engine - 해석 → 랭킹 → 컨텍스트 선택 → 답변 조립
//!
//! 인덱스 핸들을 소유하며, 각 질의는 시작 시점의 인덱스 스냅샷으로
//! 독립적으로 처리됩니다. 선택적 해석기(생성형 API)가 실패하거나 없으면
//! 결정적 파이프라인으로 처리합니다.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::interpret::{InterpretCatalog, InterpretError, QueryInterpreter, QueryIntent};
use crate::knowledge::{IndexConfig, IndexHandle, IndexStats, KnowledgeBase, SearchIndex};

use super::composer::{AnswerComposer, ComposeConfig, Selection};
use super::ranker::{create_ranker, Candidate, Ranker, RankingConfig, RankingStrategy};
use super::resolver::{resolve_cities, EntityResolver, Query, ResolverConfig};

// ============================================================================
// Configuration
// ============================================================================

/// 엔진 전체 설정
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub index: IndexConfig,
    pub resolver: ResolverConfig,
    pub ranking: RankingConfig,
    pub compose: ComposeConfig,
}

impl EngineConfig {
    /// 랭킹 전략 프리셋
    ///
    /// 퍼지 전략은 문장 분할 없이 필드 전체를 비교합니다.
    pub fn for_strategy(strategy: RankingStrategy) -> Self {
        match strategy {
            RankingStrategy::Keyword => Self::default(),
            RankingStrategy::Fuzzy => Self {
                index: IndexConfig::unsplit(),
                ranking: RankingConfig::fuzzy(),
                ..Self::default()
            },
        }
    }

    /// 인사말/맺음말 없이
    pub fn plain(mut self) -> Self {
        self.compose = ComposeConfig::plain();
        self
    }
}

// ============================================================================
// Types
// ============================================================================

/// 답변 결정 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMethod {
    /// 키워드 랭킹
    Keyword,
    /// 퍼지 랭킹
    Fuzzy,
    /// 해석기 결정
    Interpreted,
    /// 단서 표로 찾은 주제의 첫 섹션
    TopicOnly,
    /// 도시의 지점 목록
    CityOnly,
    /// 고정 답변
    Fallback,
}

impl fmt::Display for AnswerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Keyword => "keyword",
            Self::Fuzzy => "fuzzy",
            Self::Interpreted => "interpreted",
            Self::TopicOnly => "topic_only",
            Self::CityOnly => "city_only",
            Self::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// 최종 답변
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// 선택된 섹션 키
    pub context: Option<String>,
    /// 대상 도시
    pub city: Option<String>,
    pub method: AnswerMethod,
    /// 승리 후보 점수 (랭킹으로 결정된 경우)
    pub score: Option<f32>,
}

/// 설명용 후보 요약
#[derive(Debug, Clone, Serialize)]
pub struct ScoredUnit {
    pub section_key: String,
    pub topic: String,
    pub content: String,
    pub score: f32,
}

/// 질의 처리 과정 설명 (--explain)
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub query: Query,
    pub ranker: String,
    pub total_candidates: usize,
    pub candidates: Vec<ScoredUnit>,
    pub answer: Answer,
}

/// 컨텍스트 선택 결과
struct Decision<'a> {
    selection: Selection<'a>,
    method: AnswerMethod,
    score: Option<f32>,
}

// ============================================================================
// AnswerEngine
// ============================================================================

/// 질의응답 엔진
pub struct AnswerEngine {
    handle: IndexHandle,
    config: EngineConfig,
    resolver: EntityResolver,
    ranker: Box<dyn Ranker>,
    composer: AnswerComposer,
}

impl AnswerEngine {
    /// 지식베이스로 엔진 생성
    pub fn new(kb: &KnowledgeBase, config: EngineConfig) -> Self {
        let index = SearchIndex::build(kb, &config.index);
        Self::with_index(index, config)
    }

    /// 미리 만든 인덱스로 엔진 생성
    pub fn with_index(index: SearchIndex, config: EngineConfig) -> Self {
        let ranker = create_ranker(&config.ranking);
        tracing::info!("Answer engine ready (ranker: {})", ranker.name());

        Self {
            handle: IndexHandle::new(index),
            resolver: EntityResolver::new(config.resolver.clone()),
            composer: AnswerComposer::new(config.compose.clone()),
            ranker,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 현재 인덱스 스냅샷
    pub fn index(&self) -> Arc<SearchIndex> {
        self.handle.load()
    }

    /// 새 지식베이스로 인덱스를 다시 만들어 원자적으로 교체
    ///
    /// 진행 중인 요청은 이전 스냅샷으로 끝까지 처리됩니다.
    pub fn reload(&self, kb: &KnowledgeBase) -> IndexStats {
        let index = SearchIndex::build(kb, &self.config.index);
        let stats = index.stats();
        self.handle.replace(index);
        stats
    }

    /// 결정적 파이프라인으로 답변
    pub fn answer(&self, question: &str) -> Answer {
        let index = self.handle.load();
        let query = self.resolver.resolve(question, &index);
        let candidates = self.ranker.rank(&query.terms, &index);
        self.finish(&query, &candidates, &index)
    }

    /// 해석기를 먼저 시도하고, 실패하면 결정적 파이프라인으로 답변
    pub async fn answer_with(
        &self,
        question: &str,
        interpreter: Option<&dyn QueryInterpreter>,
    ) -> Answer {
        let Some(interpreter) = interpreter else {
            return self.answer(question);
        };

        let index = self.handle.load();
        let catalog = InterpretCatalog::from_index(&index);

        let result = match interpreter.interpret(question, &catalog).await {
            Ok(intent) => self.answer_intent(question, &intent, &index),
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(answer)) => answer,
            Ok(None) => {
                tracing::debug!(
                    "Interpreter '{}' found no section, using deterministic pipeline",
                    interpreter.name()
                );
                self.answer(question)
            }
            Err(e) => {
                tracing::warn!(
                    "Interpreter '{}' failed, using deterministic pipeline: {}",
                    interpreter.name(),
                    e
                );
                self.answer(question)
            }
        }
    }

    /// 질의 처리 과정 설명
    pub fn explain(&self, question: &str, top_k: usize) -> Explanation {
        let index = self.handle.load();
        let query = self.resolver.resolve(question, &index);
        let candidates = self.ranker.rank(&query.terms, &index);
        let answer = self.finish(&query, &candidates, &index);

        Explanation {
            ranker: self.ranker.name().to_string(),
            total_candidates: candidates.len(),
            candidates: candidates
                .iter()
                .take(top_k)
                .map(|c| ScoredUnit {
                    section_key: c.unit.section_key.clone(),
                    topic: c.unit.topic.clone(),
                    content: c.unit.content.clone(),
                    score: c.score,
                })
                .collect(),
            query,
            answer,
        }
    }

    fn finish(&self, query: &Query, candidates: &[Candidate<'_>], index: &SearchIndex) -> Answer {
        let decision = self.select(query, candidates, index);
        let context = match &decision.selection {
            Selection::Section(section) => Some(section.key.clone()),
            _ => None,
        };
        let text = self.composer.compose(&decision.selection, query);

        tracing::debug!(
            "Answered via {} (context: {:?}, score: {:?})",
            decision.method,
            context,
            decision.score
        );

        Answer {
            text,
            context,
            city: query.target_city.clone(),
            method: decision.method,
            score: decision.score,
        }
    }

    /// 컨텍스트 선택
    ///
    /// 최고점 동점 후보가 여러 주제에 걸쳐 있으면 단서 표 주제 순서로 결정하고,
    /// 그래도 정해지지 않으면 인덱싱 순서상 첫 후보를 택합니다.
    fn select<'a>(
        &self,
        query: &Query,
        candidates: &[Candidate<'a>],
        index: &'a SearchIndex,
    ) -> Decision<'a> {
        if let Some(top) = candidates.first() {
            let tied: Vec<&Candidate<'a>> = candidates
                .iter()
                .take_while(|c| c.score == top.score)
                .collect();

            let spans_topics = tied.iter().any(|c| c.unit.topic != top.unit.topic);
            let winner = if spans_topics {
                query
                    .topics
                    .iter()
                    .find_map(|topic| tied.iter().copied().find(|c| &c.unit.topic == topic))
                    .unwrap_or(top)
            } else {
                top
            };

            if spans_topics {
                tracing::debug!(
                    "Top score {} shared by {} candidates, chose topic '{}'",
                    top.score,
                    tied.len(),
                    winner.unit.topic
                );
            }

            let method = match self.config.ranking.strategy {
                RankingStrategy::Keyword => AnswerMethod::Keyword,
                RankingStrategy::Fuzzy => AnswerMethod::Fuzzy,
            };

            return match index.section(&winner.unit.section_key) {
                Some(section) => Decision {
                    selection: Selection::Section(section),
                    method,
                    score: Some(winner.score),
                },
                None => {
                    tracing::warn!("Missing section '{}'", winner.unit.section_key);
                    Decision {
                        selection: Selection::Fallback,
                        method: AnswerMethod::Fallback,
                        score: None,
                    }
                }
            };
        }

        if let Some(topic) = query.topics.first() {
            let selection = match index.first_section_of(topic) {
                Some(section) => Selection::Section(section),
                None => Selection::TopicOnly(topic.clone()),
            };
            return Decision {
                selection,
                method: AnswerMethod::TopicOnly,
                score: None,
            };
        }

        if query.target_city.is_some() {
            return Decision {
                selection: Selection::CityOnly,
                method: AnswerMethod::CityOnly,
                score: None,
            };
        }

        Decision {
            selection: Selection::Fallback,
            method: AnswerMethod::Fallback,
            score: None,
        }
    }

    /// 해석기 결과로 답변 (섹션이 없으면 `None`)
    fn answer_intent(
        &self,
        question: &str,
        intent: &QueryIntent,
        index: &SearchIndex,
    ) -> Result<Option<Answer>, InterpretError> {
        let Some(key) = intent.section.as_deref() else {
            return Ok(None);
        };
        let section = index
            .section(key)
            .ok_or_else(|| InterpretError::UnknownSection(key.to_string()))?;

        let mut query = self.resolver.resolve(question, index);
        if let Some(city) = intent.city.as_deref() {
            let (cities, offices) = resolve_cities(city, index.offices());
            if let Some(first) = cities.into_iter().next() {
                query.target_city = Some(first);
                query.offices = offices;
            }
        }

        let text = self.composer.compose(&Selection::Section(section), &query);
        Ok(Some(Answer {
            text,
            context: Some(section.key.clone()),
            city: query.target_city,
            method: AnswerMethod::Interpreted,
            score: None,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
