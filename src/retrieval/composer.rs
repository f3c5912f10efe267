//! Answer Composer - 선택된 섹션으로 최종 답변 조립
//!
//! 섹션 텍스트에 지점 가격 정보를 병합하고, 인사말과 맺음말로 감쌉니다.
//! 인사말/맺음말은 순수 템플릿이며 `ComposeConfig::plain()`으로 끌 수 있습니다.

use chrono::{Local, Timelike};
use rand::seq::SliceRandom;

use crate::knowledge::{Office, Section};

use super::resolver::Query;
use super::text::fold_diacritics;

/// 후보가 없을 때의 고정 답변
pub const FALLBACK_ANSWER: &str =
    "Jag är inte säker på att jag förstår. Kan du försöka omformulera frågan?";

/// 맺음말 후보
pub const CLOSINGS: &[&str] = &[
    "Hoppas detta var till hjälp! Ha en fortsatt fin dag!",
    "Hör av dig igen om du har fler frågor!",
    "Jag hoppas det besvarade din fråga! Med vänliga hälsningar,",
];

// ============================================================================
// Types
// ============================================================================

/// 답변 조립 설정
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// 시간대별 인사말 추가
    pub greeting: bool,
    /// 무작위 맺음말 추가
    pub closing: bool,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            greeting: true,
            closing: true,
        }
    }
}

impl ComposeConfig {
    /// 템플릿 없이 본문만
    pub fn plain() -> Self {
        Self {
            greeting: false,
            closing: false,
        }
    }
}

/// 컨텍스트 선택 결과
#[derive(Debug, Clone)]
pub enum Selection<'a> {
    /// 승리한 섹션
    Section(&'a Section),
    /// 주제는 알지만 섹션이 없음
    TopicOnly(String),
    /// 도시만 식별됨
    CityOnly,
    /// 아무것도 찾지 못함
    Fallback,
}

// ============================================================================
// AnswerComposer
// ============================================================================

/// 답변 조립기
#[derive(Debug, Clone, Default)]
pub struct AnswerComposer {
    config: ComposeConfig,
}

impl AnswerComposer {
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    /// 현재 시각 기준으로 답변 조립
    pub fn compose(&self, selection: &Selection<'_>, query: &Query) -> String {
        self.compose_at(selection, query, Local::now().hour())
    }

    /// 지정한 시(0-23) 기준으로 답변 조립
    pub fn compose_at(&self, selection: &Selection<'_>, query: &Query, hour: u32) -> String {
        let body = match selection {
            Selection::Fallback => return FALLBACK_ANSWER.to_string(),
            Selection::Section(section) => section_body(section, query),
            Selection::TopicOnly(topic) => format!(
                "Jag förstår att du frågar om {}, men jag har tyvärr ingen specifik information om det. Kan du omformulera din fråga?",
                topic.replace('_', " ")
            ),
            Selection::CityOnly => match query.target_city.as_deref() {
                Some(city) => office_list(city, &query.offices),
                None => return FALLBACK_ANSWER.to_string(),
            },
        };

        let mut parts = Vec::with_capacity(3);
        if self.config.greeting {
            parts.push(greeting_for_hour(hour).to_string());
        }
        parts.push(body);
        if self.config.closing {
            parts.push(random_closing().to_string());
        }
        parts.join("\n\n")
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 시간대별 인사말
pub fn greeting_for_hour(hour: u32) -> &'static str {
    match hour {
        6..=9 => "God morgon!",
        10..=11 => "God förmiddag!",
        12..=17 => "God eftermiddag!",
        _ => "God kväll!",
    }
}

fn random_closing() -> &'static str {
    CLOSINGS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(CLOSINGS[0])
}

/// 섹션 본문 + 도시 표기 + 가격 병합
fn section_body(section: &Section, query: &Query) -> String {
    let mut body = section.text.clone();

    let (Some(city), Some(service)) = (query.target_city.as_deref(), section.service.as_deref())
    else {
        return body;
    };

    if !fold_diacritics(&section.text).contains(&fold_diacritics(city)) {
        body.push_str(&format!("\n(Gäller {}.)", city));
    }

    let lines = price_lines(service, &query.offices);
    if lines.is_empty() {
        body.push_str(&format!(
            "\n\n(Vi hittade inget pris för {} i {}.)",
            service, city
        ));
    } else {
        body.push_str(&format!("\n\nPriser i {}:\n{}", city, lines.join("\n")));
    }

    body
}

/// 서비스 이름을 포함하는 가격 항목 (지점 순서, 가격표 순서)
pub fn price_lines(service: &str, offices: &[Office]) -> Vec<String> {
    let target = fold_diacritics(service.trim());
    if target.is_empty() {
        return Vec::new();
    }

    offices
        .iter()
        .flat_map(|office| {
            office
                .prices
                .iter()
                .filter(|p| fold_diacritics(&p.service_name).contains(&target))
                .map(move |p| format!("• {} ({}): {} kr", office.name, p.service_name, p.price))
        })
        .collect()
}

fn office_list(city: &str, offices: &[Office]) -> String {
    let mut text = format!("I {} finns följande kontor:", city);
    for office in offices {
        text.push_str(&format!("\n• {}", office.name));
    }
    text
}

// ============================================================================
// Tests
// ============================================================================
