//! Indexer - 지식 트리를 검색 유닛으로 평탄화
//!
//! 중첩된 주제 문서를 깊이 우선으로 순회하며 각 문자열을 독립적으로 검색 가능한
//! `SearchUnit`으로 만듭니다. 유닛은 조상 섹션의 제목 경로(컨텍스트)와 키워드를
//! 상속하므로, 한 문장만 매칭되어도 그 문장이 속한 섹션 전체를 찾아갈 수 있습니다.
//!
//! - `title`: 이 하위 트리에 한해 컨텍스트 경로에 추가 (형제로 새지 않음)
//! - `keywords`: 상속된 키워드를 대체 (병합하지 않음)
//! - `service`: 지점 가격표에서 찾을 서비스 이름 (상속)

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::document::{Fields, KnowledgeDocument, KnowledgeNode};
use crate::retrieval::resolver::default_topic_cues;
use super::splitter::{default_splitter, Splitter};

/// 섹션 제목 키
pub const TITLE_KEY: &str = "title";
/// 섹션 키워드 키
pub const KEYWORDS_KEY: &str = "keywords";
/// 가격 서비스 키
pub const SERVICE_KEY: &str = "service";

/// 컨텍스트 경로 구분자
const PATH_SEPARATOR: &str = " > ";

// ============================================================================
// Index Configuration
// ============================================================================

/// 인덱싱 설정
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// 이 길이(문자 수)를 넘는 문자열은 문장 단위로 분할
    pub sentence_split_threshold: usize,
    /// 유닛이 되지 않는 구조용 키
    pub reserved_keys: Vec<String>,
    /// 키 이름에 포함되면 가격성 필드로 취급 (분할/퍼지 매칭 제외)
    pub price_like_keys: Vec<String>,
    /// 기본 주제 단서 (주제 → 단서 목록), 지식베이스 동의어로 확장됨
    pub topic_cues: Vec<(String, Vec<String>)>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            sentence_split_threshold: 100,
            reserved_keys: vec![
                TITLE_KEY.to_string(),
                KEYWORDS_KEY.to_string(),
                SERVICE_KEY.to_string(),
            ],
            price_like_keys: ["price", "pris", "kostnad", "cost"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            topic_cues: default_topic_cues(),
        }
    }
}

impl IndexConfig {
    /// 문장 분할 없이 필드 전체를 하나의 유닛으로 (퍼지 랭킹용)
    pub fn unsplit() -> Self {
        Self {
            sentence_split_threshold: usize::MAX,
            ..Self::default()
        }
    }

    fn is_reserved(&self, key: &str) -> bool {
        self.reserved_keys.iter().any(|k| k == key)
    }

    fn is_price_like(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.price_like_keys.iter().any(|k| key.contains(k.as_str()))
    }
}

// ============================================================================
// Types
// ============================================================================

/// 컨텍스트 경로 (문서 이름 + 조상 섹션 제목)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ContextPath(Vec<String>);

impl ContextPath {
    /// 문서 루트 경로
    pub fn root(document: &str) -> Self {
        Self(vec![document.to_string()])
    }

    /// 하위 섹션 경로
    pub fn child(&self, label: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(label.to_string());
        Self(segments)
    }

    /// 경로 구성 요소
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// 섹션 고유 키 (구성 요소를 " > "로 연결)
    pub fn key(&self) -> String {
        self.0.join(PATH_SEPARATOR)
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// 검색 유닛 - 가장 작은 검색 단위
#[derive(Debug, Clone, Serialize)]
pub struct SearchUnit {
    /// 문장, 리스트 항목, 또는 단일 사실
    pub content: String,
    /// 소속 섹션 경로
    pub context: ContextPath,
    /// 소속 섹션 키 (`context.key()` 캐시)
    pub section_key: String,
    /// 가장 가까운 조상에서 상속된 키워드 (소문자)
    pub keywords: Arc<BTreeSet<String>>,
    /// 주제 (문서 이름)
    pub topic: String,
    /// 원본 필드 경로 (진단용)
    pub field: String,
    /// 가격성/숫자 콘텐츠 여부
    pub numeric: bool,
    /// 인덱싱 순서 (동점 처리 기준)
    pub ordinal: usize,
}

/// 섹션 - 같은 컨텍스트 경로를 공유하는 필드들의 재구성 텍스트
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub key: String,
    pub context: ContextPath,
    pub topic: String,
    /// 상속된 가격 서비스 이름
    pub service: Option<String>,
    /// 원본 순서대로 이어붙인 텍스트 (하위 섹션 제외)
    pub text: String,
}

/// 순회 중 상속되는 상태
#[derive(Clone)]
struct Scope {
    context: ContextPath,
    keywords: Arc<BTreeSet<String>>,
    service: Option<String>,
    field_path: String,
}

// ============================================================================
// Indexer
// ============================================================================

/// 지식 트리 인덱서
pub struct Indexer {
    config: IndexConfig,
    splitter: Box<dyn Splitter>,
}

impl Indexer {
    /// 설정으로 생성 (기본 문장 분할기)
    pub fn new(config: IndexConfig) -> Self {
        Self::with_splitter(config, default_splitter())
    }

    /// 분할기를 지정하여 생성
    pub fn with_splitter(config: IndexConfig, splitter: Box<dyn Splitter>) -> Self {
        Self { config, splitter }
    }

    /// 문서 목록을 유닛과 섹션 맵으로 변환
    ///
    /// 입력을 변경하지 않으며, 어떤 하위 트리 때문에도 중단하지 않습니다.
    pub fn build(
        &self,
        documents: &[KnowledgeDocument],
    ) -> (Vec<SearchUnit>, HashMap<String, Section>) {
        let mut units = Vec::new();
        let mut sections = HashMap::new();

        for doc in documents {
            let root = Scope {
                context: ContextPath::root(&doc.name),
                keywords: Arc::new(BTreeSet::new()),
                service: None,
                field_path: String::new(),
            };
            let scope = self.enter(&doc.fields, &root, None);
            let before = units.len();
            self.visit(&doc.name, &doc.fields, &scope, &mut units, &mut sections);

            tracing::debug!(
                "Indexed document '{}' ({} units)",
                doc.name,
                units.len() - before
            );
        }

        (units, sections)
    }

    /// 객체 노드 진입: 제목/키워드/서비스 상속 계산
    ///
    /// `key`가 `None`이면 문서 루트입니다. 제목이 없는 하위 객체는 필드 키를
    /// 경로 레이블로 사용합니다.
    fn enter(&self, fields: &Fields, parent: &Scope, key: Option<&str>) -> Scope {
        let title = scalar_field(fields, TITLE_KEY).map(str::trim).filter(|t| !t.is_empty());

        let context = match (title, key) {
            (Some(title), _) => parent.context.child(title),
            (None, Some(key)) => parent.context.child(key),
            (None, None) => parent.context.clone(),
        };

        let keywords = match field(fields, KEYWORDS_KEY) {
            Some(KnowledgeNode::StringList(items)) => {
                Arc::new(normalize_keywords(items.iter().map(String::as_str)))
            }
            Some(KnowledgeNode::Scalar(s)) => Arc::new(normalize_keywords(s.split(','))),
            _ => Arc::clone(&parent.keywords),
        };

        let service = scalar_field(fields, SERVICE_KEY)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| parent.service.clone());

        let field_path = match key {
            Some(key) if parent.field_path.is_empty() => key.to_string(),
            Some(key) => format!("{}.{}", parent.field_path, key),
            None => String::new(),
        };

        Scope {
            context,
            keywords,
            service,
            field_path,
        }
    }

    fn visit(
        &self,
        topic: &str,
        fields: &Fields,
        scope: &Scope,
        units: &mut Vec<SearchUnit>,
        sections: &mut HashMap<String, Section>,
    ) {
        let section_key = scope.context.key();
        let mut own_text: Vec<String> = Vec::new();

        for (key, node) in fields {
            if self.config.is_reserved(key) {
                continue;
            }

            let field_path = if scope.field_path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", scope.field_path, key)
            };

            match node {
                KnowledgeNode::Scalar(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let price_like = self.config.is_price_like(key);
                    let pieces = if !price_like
                        && text.chars().count() > self.config.sentence_split_threshold
                    {
                        self.splitter.split(text)
                    } else {
                        vec![text.to_string()]
                    };

                    for piece in pieces {
                        let numeric = price_like || is_numeric_content(&piece);
                        push_unit(units, piece, scope, &section_key, topic, &field_path, numeric);
                    }
                    own_text.push(text.to_string());
                }
                KnowledgeNode::StringList(items) => {
                    for item in items {
                        let item = item.trim();
                        if item.is_empty() {
                            continue;
                        }
                        let numeric = self.config.is_price_like(key) || is_numeric_content(item);
                        push_unit(
                            units,
                            item.to_string(),
                            scope,
                            &section_key,
                            topic,
                            &field_path,
                            numeric,
                        );
                        own_text.push(format!("• {}", item));
                    }
                }
                KnowledgeNode::Object(child) => {
                    let child_scope = self.enter(child, scope, Some(key.as_str()));
                    self.visit(topic, child, &child_scope, units, sections);
                }
            }
        }

        if own_text.is_empty() {
            return;
        }

        if sections.contains_key(&section_key) {
            tracing::debug!(
                "Section '{}' already defined, keeping first definition",
                section_key
            );
            return;
        }

        sections.insert(
            section_key.clone(),
            Section {
                key: section_key,
                context: scope.context.clone(),
                topic: topic.to_string(),
                service: scope.service.clone(),
                text: own_text.join("\n"),
            },
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn push_unit(
    units: &mut Vec<SearchUnit>,
    content: String,
    scope: &Scope,
    section_key: &str,
    topic: &str,
    field_path: &str,
    numeric: bool,
) {
    let ordinal = units.len();
    units.push(SearchUnit {
        content,
        context: scope.context.clone(),
        section_key: section_key.to_string(),
        keywords: Arc::clone(&scope.keywords),
        topic: topic.to_string(),
        field: field_path.to_string(),
        numeric,
        ordinal,
    });
}

fn field<'a>(fields: &'a Fields, key: &str) -> Option<&'a KnowledgeNode> {
    fields.iter().find(|(k, _)| k == key).map(|(_, node)| node)
}

fn scalar_field<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    match field(fields, key) {
        Some(KnowledgeNode::Scalar(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn normalize_keywords<'a, I>(items: I) -> BTreeSet<String>
where
    I: Iterator<Item = &'a str>,
{
    items
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// 숫자/가격 표기만으로 이루어진 콘텐츠인지 ("4 995 kr", "1995:-")
fn is_numeric_content(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    let body = lower
        .trim_end_matches(":-")
        .trim_end_matches("kr")
        .trim_end_matches("sek")
        .trim();

    body.chars().any(|c| c.is_ascii_digit())
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '.' | ',' | '-'))
}

// ============================================================================
// Tests
// ============================================================================
