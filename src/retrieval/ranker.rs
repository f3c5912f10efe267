//! Relevance Ranker - 검색 유닛 스코어링
//!
//! 두 전략은 배포 단위로 상호 배타적입니다.
//! - Keyword: 유닛이 상속한 키워드 집합과 질의 용어의 정확 일치 (기본값)
//! - Fuzzy: 유닛 본문 토큰과의 정규화 Levenshtein 유사도
//!
//! 어느 쪽이든 정렬은 점수 내림차순, 동점은 인덱싱 순서이므로 결정적입니다.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::knowledge::{SearchIndex, SearchUnit};

use super::fuzzy::FuzzyRanker;
use super::text::fold_diacritics;

/// 기본 고가치 용어 (가격, 나이, 유효기간, 기간, 포함 내역, 취소)
const DEFAULT_HIGH_VALUE_TERMS: &[&str] = &[
    "pris", "priset", "priser", "kostar", "kostnad", "kosta", "ålder", "gammal", "giltig",
    "giltighet", "länge", "ingår", "avboka", "avbokning",
];

// ============================================================================
// Types
// ============================================================================

/// 스코어링된 후보
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub unit: &'a SearchUnit,
    pub score: f32,
}

/// 랭킹 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingStrategy {
    #[default]
    Keyword,
    Fuzzy,
}

impl FromStr for RankingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" | "keywords" => Ok(Self::Keyword),
            "fuzzy" => Ok(Self::Fuzzy),
            other => Err(format!(
                "Unknown ranking strategy '{}' (expected keyword or fuzzy)",
                other
            )),
        }
    }
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => f.write_str("keyword"),
            Self::Fuzzy => f.write_str("fuzzy"),
        }
    }
}

/// 랭킹 설정
#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub strategy: RankingStrategy,
    /// 고가치 용어 가중치
    pub high_value_weight: f32,
    /// 일반 용어 가중치
    pub base_weight: f32,
    /// 서로 다른 용어가 2개 이상 일치할 때 용어당 보너스
    pub multi_match_bonus: f32,
    /// 퍼지 유사도 임계값 (0.0 ~ 1.0)
    pub fuzzy_threshold: f32,
    /// 도메인 고가치 용어 (도시 이름은 인덱스에서 자동 추가)
    pub high_value_terms: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            strategy: RankingStrategy::Keyword,
            high_value_weight: 5.0,
            base_weight: 2.0,
            multi_match_bonus: 3.0,
            fuzzy_threshold: 0.8,
            high_value_terms: DEFAULT_HIGH_VALUE_TERMS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl RankingConfig {
    /// 퍼지 전략 프리셋
    pub fn fuzzy() -> Self {
        Self {
            strategy: RankingStrategy::Fuzzy,
            ..Self::default()
        }
    }

    /// 모든 용어를 같은 가중치로 (단조성 검증용)
    pub fn uniform() -> Self {
        Self {
            high_value_weight: 2.0,
            ..Self::default()
        }
    }
}

// ============================================================================
// Ranker Trait
// ============================================================================

/// 랭커 트레이트
pub trait Ranker: Send + Sync {
    /// 모든 유닛을 질의 용어로 스코어링
    ///
    /// 점수 0인 유닛은 제외되며, 결과는 정렬되어 있습니다.
    fn rank<'a>(&self, terms: &[String], index: &'a SearchIndex) -> Vec<Candidate<'a>>;

    /// 랭커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// KeywordRanker
// ============================================================================

/// 키워드 랭커
pub struct KeywordRanker {
    high_value_weight: f32,
    base_weight: f32,
    multi_match_bonus: f32,
    high_value_terms: HashSet<String>,
}

impl KeywordRanker {
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            high_value_weight: config.high_value_weight,
            base_weight: config.base_weight,
            multi_match_bonus: config.multi_match_bonus,
            high_value_terms: config
                .high_value_terms
                .iter()
                .map(|t| fold_diacritics(t.trim()))
                .collect(),
        }
    }

    fn weight(&self, term: &str, index: &SearchIndex) -> f32 {
        let folded = fold_diacritics(term);
        if self.high_value_terms.contains(&folded) || index.city_terms().contains(&folded) {
            self.high_value_weight
        } else {
            self.base_weight
        }
    }

    /// 단일 유닛 점수
    pub fn score(&self, terms: &[String], unit: &SearchUnit, index: &SearchIndex) -> f32 {
        let mut score = 0.0;
        let mut matched = 0usize;

        for term in terms {
            if unit.keywords.contains(term) {
                score += self.weight(term, index);
                matched += 1;
            }
        }

        if matched > 1 {
            score += self.multi_match_bonus * matched as f32;
        }
        score
    }
}

impl Ranker for KeywordRanker {
    fn rank<'a>(&self, terms: &[String], index: &'a SearchIndex) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> = index
            .units()
            .iter()
            .filter(|unit| !unit.keywords.is_empty())
            .filter_map(|unit| {
                let score = self.score(terms, unit, index);
                (score > 0.0).then_some(Candidate { unit, score })
            })
            .collect();

        sort_candidates(&mut candidates);
        tracing::debug!(
            "Keyword ranking: {} candidates for {} terms",
            candidates.len(),
            terms.len()
        );
        candidates
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 점수 내림차순, 동점은 인덱싱 순서
pub(crate) fn sort_candidates(candidates: &mut [Candidate<'_>]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.unit.ordinal.cmp(&b.unit.ordinal))
    });
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정된 전략의 랭커 생성
pub fn create_ranker(config: &RankingConfig) -> Box<dyn Ranker> {
    match config.strategy {
        RankingStrategy::Keyword => Box::new(KeywordRanker::new(config)),
        RankingStrategy::Fuzzy => Box::new(FuzzyRanker::new(config.fuzzy_threshold)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{fixtures, IndexConfig, KnowledgeBase, KnowledgeDocument};
    use crate::retrieval::text::query_terms;
    use serde_json::json;

    fn terms(q: &str) -> Vec<String> {
        query_terms(q, 3)
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("keyword".parse::<RankingStrategy>(), Ok(RankingStrategy::Keyword));
        assert_eq!(" Fuzzy ".parse::<RankingStrategy>(), Ok(RankingStrategy::Fuzzy));
        assert!("semantic".parse::<RankingStrategy>().is_err());
        assert_eq!(RankingStrategy::Fuzzy.to_string(), "fuzzy");
    }

    #[test]
    fn test_keyword_match_is_verbatim() {
        let kb = KnowledgeBase {
            documents: vec![KnowledgeDocument::from_json(
                "halkbana",
                json!({ "keywords": ["malmö", "halka"], "info": "Halkbanan ligger utanför stan." }),
            )
            .unwrap()],
            ..KnowledgeBase::default()
        };
        let index = SearchIndex::build(&kb, &IndexConfig::default());
        let ranker = KeywordRanker::new(&RankingConfig::default());
        let unit = &index.units()[0];

        assert_eq!(ranker.score(&terms("halka i Malmö"), unit, &index), 2.0 + 2.0 + 3.0 * 2.0);
        // 악센트가 빠진 용어는 키워드와 일치하지 않음
        assert_eq!(ranker.score(&terms("halka i Malmo"), unit, &index), 2.0);
    }

    #[test]
    fn test_price_question_scores_root_section() {
        let index = fixtures::index();
        let ranker = KeywordRanker::new(&RankingConfig::default());
        let candidates = ranker.rank(&terms("Vad kostar AM-kurset i Malmö?"), &index);

        let top = &candidates[0];
        assert_eq!(top.unit.section_key, "am_kurs > AM-kurs");
        // kostar(5) + kurset(2) + 보너스 3*2
        assert_eq!(top.score, 13.0);
    }

    #[test]
    fn test_city_terms_are_high_value() {
        let kb = KnowledgeBase {
            documents: vec![KnowledgeDocument::from_json(
                "t",
                json!({ "keywords": ["lund", "kurs"], "text": "x" }),
            )
            .unwrap()],
            offices: fixtures::knowledge_base().offices,
            topic_synonyms: vec![],
        };
        let index = SearchIndex::build(&kb, &IndexConfig::default());
        let ranker = KeywordRanker::new(&RankingConfig::default());

        let city = ranker.rank(&terms("lund"), &index);
        let plain = ranker.rank(&terms("kurs"), &index);
        assert_eq!(city[0].score, 5.0);
        assert_eq!(plain[0].score, 2.0);
    }

    #[test]
    fn test_no_match_is_empty() {
        let index = fixtures::index();
        let ranker = KeywordRanker::new(&RankingConfig::default());
        assert!(ranker.rank(&terms("xyzzy plugh"), &index).is_empty());
        assert!(ranker.rank(&[], &index).is_empty());
    }

    #[test]
    fn test_ranking_is_deterministic_with_tie_order() {
        let index = fixtures::index();
        let ranker = KeywordRanker::new(&RankingConfig::default());
        let q = terms("Hur fungerar en intensivkurs?");

        let first: Vec<usize> = ranker.rank(&q, &index).iter().map(|c| c.unit.ordinal).collect();
        let second: Vec<usize> = ranker.rank(&q, &index).iter().map(|c| c.unit.ordinal).collect();
        assert_eq!(first, second);

        let candidates = ranker.rank(&q, &index);
        assert_eq!(candidates[0].score, candidates[1].score);
        assert!(candidates[0].unit.ordinal < candidates[1].unit.ordinal);
        assert_eq!(candidates[0].unit.topic, "intensivkurs_bil");
    }

    #[test]
    fn test_superset_never_scores_lower() {
        let index = fixtures::index();
        let ranker = KeywordRanker::new(&RankingConfig::uniform());
        let unit = index
            .units()
            .iter()
            .find(|u| u.section_key == "introduktionskurs > Introduktionskurs > Giltighet")
            .unwrap();

        let subsets = [
            terms("giltig"),
            terms("giltig länge"),
            terms("giltig länge introduktionskurs"),
            terms("giltig länge introduktionskurs giltighet"),
        ];
        let scores: Vec<f32> = subsets.iter().map(|t| ranker.score(t, unit, &index)).collect();
        for pair in scores.windows(2) {
            assert!(pair[1] >= pair[0], "{:?}", scores);
        }
    }

    #[test]
    fn test_create_ranker() {
        assert_eq!(create_ranker(&RankingConfig::default()).name(), "keyword");
        assert_eq!(create_ranker(&RankingConfig::fuzzy()).name(), "fuzzy");
    }
}
