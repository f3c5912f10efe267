//! EntityResolver - 질의에서 용어, 도시(지점), 주제 추출
//!
//! 도시를 찾지 못하거나 주제를 찾지 못하는 것은 오류가 아닙니다.
//! 빈 목록을 반환하고 키워드 랭킹에 전적으로 맡깁니다.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::knowledge::{Office, SearchIndex};

use super::text::{contains_phrase, fold_diacritics, normalize_phrase, query_terms};

/// 정적 주제 단서 표 (짧은 자유 텍스트 단서 → 주제 식별자)
///
/// 키워드 스코어링으로 주제가 정해지지 않았을 때만 참조됩니다.
pub const DEFAULT_TOPIC_CUES: &[(&str, &[&str])] = &[
    ("am_kurs", &["am", "am-kurs", "am-kort", "moped", "moppe", "eu-moped"]),
    (
        "introduktionskurs",
        &["introduktionskurs", "handledarkurs", "handledarutbildning"],
    ),
    (
        "intensivkurs_mc",
        &["mc", "motorcykel", "motorcyklar", "intensivkurs mc", "intensivvecka mc"],
    ),
    ("intensivkurs_bil", &["bil", "personbil", "intensivkurs bil"]),
];

// ============================================================================
// Types
// ============================================================================

/// 주제 단서 (정규화된 구문 → 주제)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicCue {
    pub cue: String,
    pub topic: String,
}

/// 해석된 질의
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    /// 원본 질의
    pub raw_text: String,
    /// 정규화된 용어 (최소 길이 필터, 첫 등장 순서)
    pub terms: Vec<String>,
    /// 감지된 모든 도시 (지점 목록 순서)
    pub cities: Vec<String>,
    /// 대상 도시 (처음 감지된 도시)
    pub target_city: Option<String>,
    /// 대상 도시의 지점들
    pub offices: Vec<Office>,
    /// 단서 표로 찾은 주제 (단서 표 순서)
    pub topics: Vec<String>,
}

/// 해석기 설정
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// 최소 용어 길이 (문자 수)
    pub min_term_len: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { min_term_len: 3 }
    }
}

// ============================================================================
// EntityResolver
// ============================================================================

/// 엔티티 해석기
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// 인덱스의 지점 목록과 단서 표로 질의 해석
    pub fn resolve(&self, text: &str, index: &SearchIndex) -> Query {
        let terms = query_terms(text, self.config.min_term_len);
        let (cities, offices) = resolve_cities(text, index.offices());
        let topics = resolve_topics(text, index.topic_cues());

        if cities.len() > 1 {
            tracing::warn!(
                "Ambiguous city reference {:?}, using first match '{}'",
                cities,
                cities[0]
            );
        }

        tracing::debug!(
            "Resolved query: terms={:?} cities={:?} topics={:?}",
            terms,
            cities,
            topics
        );

        Query {
            raw_text: text.to_string(),
            terms,
            target_city: cities.first().cloned(),
            cities,
            offices,
            topics,
        }
    }
}

/// 질의에서 도시 감지
///
/// 도시 이름과 질의를 모두 소문자화 + 발음 기호 제거 후 포함 여부를 검사합니다.
/// 여러 도시가 감지되면 지점 목록 순서상 첫 도시만 대상으로 삼습니다
/// (단일 도시 질의를 가정한 단순화).
///
/// # Returns
/// (감지된 모든 도시, 대상 도시의 지점들)
pub fn resolve_cities(text: &str, offices: &[Office]) -> (Vec<String>, Vec<Office>) {
    let folded_query = fold_diacritics(text);
    let mut seen = HashSet::new();
    let mut cities = Vec::new();
    let mut target: Option<String> = None;

    for office in offices {
        let folded_city = fold_diacritics(office.city.trim());
        if folded_city.is_empty() || !folded_query.contains(&folded_city) {
            continue;
        }
        if seen.insert(folded_city.clone()) {
            cities.push(office.city.trim().to_string());
            if target.is_none() {
                target = Some(folded_city);
            }
        }
    }

    let offices = match target {
        Some(target) => offices
            .iter()
            .filter(|o| fold_diacritics(o.city.trim()) == target)
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    (cities, offices)
}

/// 단서 표로 주제 감지 (토큰 경계 매칭, 긴 단서 우선)
pub fn resolve_topics(text: &str, cues: &[TopicCue]) -> Vec<String> {
    let normalized = normalize_phrase(text);
    let mut topics: Vec<String> = Vec::new();

    for cue in cues {
        if contains_phrase(&normalized, &cue.cue) && !topics.contains(&cue.topic) {
            topics.push(cue.topic.clone());
        }
    }

    topics
}

/// 단서 표 생성
///
/// 기본 단서 + 지식베이스 동의어 + 주제 이름 자체(`_` → 공백)를 정규화하고,
/// 인덱스에 존재하는 주제만 남긴 뒤 긴 단서부터 정렬합니다.
pub fn build_cue_table(
    defaults: &[(String, Vec<String>)],
    synonyms: &[(String, Vec<String>)],
    known_topics: &BTreeSet<String>,
) -> Vec<TopicCue> {
    let mut table: Vec<TopicCue> = Vec::new();

    let mut push = |topic: &str, cue: &str| {
        let cue = normalize_phrase(cue);
        if cue.is_empty() || !known_topics.contains(topic) {
            return;
        }
        let entry = TopicCue {
            cue,
            topic: topic.to_string(),
        };
        if !table.contains(&entry) {
            table.push(entry);
        }
    };

    for (topic, cues) in defaults.iter().chain(synonyms.iter()) {
        push(topic, &topic.replace('_', " "));
        for cue in cues {
            push(topic, cue);
        }
    }

    // 단서 목록이 없는 주제도 이름으로 찾을 수 있게
    for topic in known_topics {
        push(topic, &topic.replace('_', " "));
    }

    // 안정 정렬: 같은 길이는 입력 순서 유지
    table.sort_by(|a, b| b.cue.chars().count().cmp(&a.cue.chars().count()));
    table
}

/// 기본 단서 표를 소유 형태로 변환
pub fn default_topic_cues() -> Vec<(String, Vec<String>)> {
    DEFAULT_TOPIC_CUES
        .iter()
        .map(|(topic, cues)| {
            (
                topic.to_string(),
                cues.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn office(city: &str, name: &str) -> Office {
        Office {
            city: city.to_string(),
            name: name.to_string(),
            prices: vec![],
        }
    }

    fn topics(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_resolve_single_city() {
        let offices = vec![
            office("Malmö", "Malmö City"),
            office("Lund", "Lund Centrum"),
            office("Malmö", "Malmö Hyllie"),
        ];
        let (cities, found) = resolve_cities("Vad kostar AM-kurset i Malmö?", &offices);
        assert_eq!(cities, vec!["Malmö"]);
        let names: Vec<&str> = found.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Malmö City", "Malmö Hyllie"]);
    }

    #[test]
    fn test_city_resolution_ignores_accents() {
        let offices = vec![office("Malmö", "Malmö City"), office("Lund", "Lund Centrum")];
        let (_, with_accent) = resolve_cities("pris i Malmö", &offices);
        let (_, without_accent) = resolve_cities("pris i malmo", &offices);
        let (_, upper) = resolve_cities("PRIS I MALMÖ", &offices);
        assert_eq!(with_accent, without_accent);
        assert_eq!(with_accent, upper);
        assert_eq!(with_accent.len(), 1);
    }

    #[test]
    fn test_multiple_cities_first_in_office_order_wins() {
        let offices = vec![office("Lund", "Lund Centrum"), office("Malmö", "Malmö City")];
        let (cities, found) = resolve_cities("Malmö eller Lund?", &offices);
        assert_eq!(cities, vec!["Lund", "Malmö"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].city, "Lund");
    }

    #[test]
    fn test_no_city_is_empty() {
        let offices = vec![office("Lund", "Lund Centrum")];
        let (cities, found) = resolve_cities("Hur gammal måste jag vara?", &offices);
        assert!(cities.is_empty());
        assert!(found.is_empty());
    }

    #[test]
    fn test_build_cue_table_filters_and_sorts() {
        let defaults = default_topic_cues();
        let synonyms = vec![(
            "am_kurs".to_string(),
            vec!["Moppekörkort".to_string(), "moped".to_string()],
        )];
        let table = build_cue_table(&defaults, &synonyms, &topics(&["am_kurs", "intensivkurs_mc"]));

        assert!(table.iter().all(|c| c.topic == "am_kurs" || c.topic == "intensivkurs_mc"));
        assert!(table.iter().any(|c| c.cue == "moppekorkort"));
        assert!(table.iter().any(|c| c.cue == "am kurs"));
        // 중복 제거
        assert_eq!(table.iter().filter(|c| c.cue == "moped").count(), 1);
        // 긴 단서 우선
        let lengths: Vec<usize> = table.iter().map(|c| c.cue.chars().count()).collect();
        let mut sorted = lengths.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(lengths, sorted);
    }

    #[test]
    fn test_topic_name_is_cue_without_synonyms() {
        let table = build_cue_table(&default_topic_cues(), &[], &topics(&["am_kurs", "b_kurs"]));
        assert!(table.iter().any(|c| c.cue == "b kurs" && c.topic == "b_kurs"));
        assert_eq!(resolve_topics("Berätta om B kurs", &table), vec!["b_kurs"]);
        assert!(resolve_topics("Berätta om B-kursen", &table).is_empty());
    }

    #[test]
    fn test_resolve_topics_by_cue() {
        let table = build_cue_table(
            &default_topic_cues(),
            &[],
            &topics(&["am_kurs", "intensivkurs_mc", "intensivkurs_bil"]),
        );
        assert_eq!(resolve_topics("Vad kostar AM-kurset?", &table), vec!["am_kurs"]);
        assert_eq!(
            resolve_topics("Intensivkurs på motorcykel", &table),
            vec!["intensivkurs_mc"]
        );
        assert!(resolve_topics("Vilket program passar mig?", &table).is_empty());
        assert!(resolve_topics("xyzzy plugh", &table).is_empty());
    }

    #[test]
    fn test_resolver_with_index() {
        let index = crate::knowledge::fixtures::index();
        let resolver = EntityResolver::default();
        let query = resolver.resolve("Vad kostar AM-kurset i Malmo?", &index);

        assert_eq!(query.terms, vec!["vad", "kostar", "kurset", "malmo"]);
        assert_eq!(query.target_city.as_deref(), Some("Malmö"));
        assert!(!query.offices.is_empty());
        assert_eq!(query.topics, vec!["am_kurs"]);
    }
}
