//! Knowledge Document - 지식 트리 데이터 모델
//!
//! 주제 문서(basfakta_*.json)는 문자열, 문자열 배열, 하위 객체로 이루어진
//! 임의 깊이의 트리입니다. 런타임 타입 검사 대신 태그드 enum으로 표현해
//! 순회가 컴파일 타임에 완전하게 검사되도록 합니다.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Knowledge Tree
// ============================================================================

/// 객체 노드의 필드 목록 (원본 순서 유지)
pub type Fields = Vec<(String, KnowledgeNode)>;

/// 지식 트리 노드
#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeNode {
    /// 단일 문자열 (숫자/불리언은 텍스트로 변환됨)
    Scalar(String),
    /// 문자열 배열
    StringList(Vec<String>),
    /// 하위 객체
    Object(Fields),
}

impl KnowledgeNode {
    /// JSON 값을 노드로 변환
    ///
    /// 형태가 맞지 않는 값(null, 문자열이 아닌 원소가 섞인 배열 등)은
    /// `None`을 반환하며 호출 측에서 해당 필드를 건너뜁니다.
    /// 손으로 작성된 지식베이스이므로 불규칙성은 예상된 상황입니다.
    pub fn from_json(path: &str, value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Scalar(s)),
            Value::Number(n) => Some(Self::Scalar(n.to_string())),
            Value::Bool(b) => Some(Self::Scalar(b.to_string())),
            Value::Array(items) => {
                let mut strings = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => strings.push(s),
                        other => {
                            tracing::warn!(
                                "Skipping malformed array field '{}': non-string element ({})",
                                path,
                                json_kind(&other)
                            );
                            return None;
                        }
                    }
                }
                Some(Self::StringList(strings))
            }
            Value::Object(map) => Some(Self::Object(fields_from_map(path, map))),
            Value::Null => {
                tracing::debug!("Skipping null field '{}'", path);
                None
            }
        }
    }

    /// 객체 노드라면 필드 목록 반환
    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }
}

fn fields_from_map(path: &str, map: serde_json::Map<String, Value>) -> Fields {
    map.into_iter()
        .filter_map(|(key, value)| {
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", path, key)
            };
            KnowledgeNode::from_json(&child_path, value).map(|node| (key, node))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Documents
// ============================================================================

/// 이름이 붙은 주제 문서
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeDocument {
    /// 주제 식별자 (파일명 `basfakta_<name>.json`의 `<name>`)
    pub name: String,
    /// 루트 객체의 필드
    pub fields: Fields,
}

impl KnowledgeDocument {
    /// JSON 값에서 문서 생성
    ///
    /// 루트가 객체가 아니면 문서 전체를 건너뜁니다.
    pub fn from_json(name: impl Into<String>, value: Value) -> Option<Self> {
        let name = name.into();
        match value {
            Value::Object(map) => {
                let fields = fields_from_map("", map);
                Some(Self { name, fields })
            }
            other => {
                tracing::warn!(
                    "Skipping document '{}': root is {}, expected object",
                    name,
                    json_kind(&other)
                );
                None
            }
        }
    }
}

/// 가격 표기
///
/// 손으로 작성한 지점 파일은 `4995`, `"1 800"`, `4995.0`처럼 표기가 제각각이라
/// 숫자든 문자열이든 적힌 그대로 보관하고 출력합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Price(String);

impl Price {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u32> for Price {
    fn from(amount: u32) -> Self {
        Self(amount.to_string())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => Ok(Self(n.to_string())),
            Value::String(s) if !s.trim().is_empty() => Ok(Self(s.trim().to_string())),
            other => Err(de::Error::custom(format!(
                "price must be a number or text, got {}",
                json_kind(&other)
            ))),
        }
    }
}

/// 지점 가격표 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    #[serde(alias = "serviceName")]
    pub service_name: String,
    pub price: Price,
}

/// 지점 (도시 + 이름 + 가격표)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub city: String,
    pub name: String,
    /// 잘못된 항목은 그 항목만 건너뜀
    #[serde(default, deserialize_with = "lenient_prices")]
    pub prices: Vec<PriceEntry>,
}

fn lenient_prices<'de, D>(deserializer: D) -> Result<Vec<PriceEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();

    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<PriceEntry>(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping price entry: {}", e);
                None
            }
        })
        .collect())
}

/// 로드된 지식베이스 전체
///
/// 로더가 한 번 만들고 인덱서가 읽기 전용으로 소비합니다.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    /// 주제 문서 (이름순 정렬)
    pub documents: Vec<KnowledgeDocument>,
    /// 지점 목록 (로드 순서 = 도시 해석 순서)
    pub offices: Vec<Office>,
    /// 주제별 추가 단서 (basfakta_keywords.json)
    pub topic_synonyms: Vec<(String, Vec<String>)>,
}

impl KnowledgeBase {
    /// 문서를 이름순으로 정렬 (인덱싱 순서 결정성 보장)
    pub fn sort_documents(&mut self) {
        self.documents.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

// ============================================================================
// Tests
// ============================================================================
