//! Fuzzy Ranker - 정규화 Levenshtein 유사도 기반 스코어링
//!
//! 키워드 가중치 없이 유닛 본문과 질의 용어를 직접 비교합니다.
//! 철자 오류("kostarr", "introduktionkurs")에 관대하지만 숫자/가격 유닛은 건너뜁니다.

use crate::knowledge::SearchIndex;

use super::ranker::{sort_candidates, Candidate, Ranker};
use super::text::tokenize;

/// 퍼지 랭커
pub struct FuzzyRanker {
    threshold: f32,
}

impl FuzzyRanker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// 용어별 최고 유사도 중 임계값 이상인 것의 합
    pub fn score(&self, terms: &[String], content: &str) -> f32 {
        let tokens = tokenize(content);
        if tokens.is_empty() {
            return 0.0;
        }

        terms
            .iter()
            .map(|term| {
                tokens
                    .iter()
                    .map(|token| similarity(term, token))
                    .fold(0.0_f32, f32::max)
            })
            .filter(|&best| best >= self.threshold)
            .sum()
    }
}

impl Ranker for FuzzyRanker {
    fn rank<'a>(&self, terms: &[String], index: &'a SearchIndex) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> = index
            .units()
            .iter()
            .filter(|unit| !unit.numeric)
            .filter_map(|unit| {
                let score = self.score(terms, &unit.content);
                (score > 0.0).then_some(Candidate { unit, score })
            })
            .collect();

        sort_candidates(&mut candidates);
        tracing::debug!(
            "Fuzzy ranking: {} candidates (threshold {})",
            candidates.len(),
            self.threshold
        );
        candidates
    }

    fn name(&self) -> &'static str {
        "fuzzy"
    }
}

/// 정규화 유사도: 1 - 거리 / 긴 쪽 길이 (문자 단위)
pub fn similarity(a: &str, b: &str) -> f32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f32 / max_len as f32
}

/// 문자 단위 Levenshtein 거리 (두 행 DP)
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// ============================================================================
// Tests
// ============================================================================
