//! Sentence Splitting Module
//!
//! 긴 문자열 필드를 문장 단위 검색 유닛으로 나눕니다.
//! 약어(t.ex., bl.a. 등)에서 잘못 분할되지 않도록 보호합니다.

use std::collections::HashSet;

// ============================================================================
// Splitter Trait
// ============================================================================

/// 텍스트 분할 전략 트레이트
pub trait Splitter: Send + Sync {
    /// 텍스트를 문장으로 분할
    fn split(&self, text: &str) -> Vec<String>;

    /// 분할기 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SentenceSplitter
// ============================================================================

/// 기본 약어 목록 (스웨덴어 + 영어)
const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "t.ex", "bl.a", "ca", "kl", "st", "dvs", "d.v.s", "m.m", "s.k", "inkl", "exkl", "jfr",
    "nr", "resp", "tel", "p.g.a", "pga", "fr.o.m", "t.o.m", "e.g", "i.e", "mr", "dr", "etc",
];

/// 문장 경계 분할기
///
/// `.`, `!`, `?` 뒤에 공백이 오면 문장 경계로 봅니다. 단, 다음 경우는 제외:
/// - 구두점 앞 단어가 알려진 약어
/// - 구두점 앞 단어 내부에 점이 있음 (t.ex. 같은 머리글자)
/// - 다음 문장의 첫 글자가 소문자
pub struct SentenceSplitter {
    abbreviations: HashSet<String>,
}

impl SentenceSplitter {
    /// 약어 목록으로 생성
    pub fn new<I, S>(abbreviations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            abbreviations: abbreviations
                .into_iter()
                .map(|a| a.as_ref().trim_end_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// 기본 약어 목록으로 생성
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_ABBREVIATIONS.iter().copied())
    }

    /// 마침표 앞 단어가 약어인지 확인
    fn ends_with_abbreviation(&self, before: &str) -> bool {
        let word = before
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();

        if word.is_empty() {
            return false;
        }

        self.abbreviations.contains(&word) || word.contains('.')
    }
}

impl Splitter for SentenceSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut sentences = Vec::new();
        let mut start = 0;

        for (i, &(pos, c)) in chars.iter().enumerate() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }

            // 구두점 직후는 공백이어야 함
            match chars.get(i + 1) {
                Some(&(_, next)) if next.is_whitespace() => {}
                _ => continue,
            }

            if c == '.' && self.ends_with_abbreviation(&text[start..pos]) {
                continue;
            }

            // 다음 문장이 소문자로 시작하면 경계가 아님
            let following = chars[i + 1..]
                .iter()
                .map(|&(_, ch)| ch)
                .find(|ch| !ch.is_whitespace());
            match following {
                Some(ch) if !ch.is_lowercase() => {}
                _ => continue,
            }

            let end = pos + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
        }

        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }

        sentences
    }

    fn name(&self) -> &'static str {
        "SentenceSplitter"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 분할기 생성
pub fn default_splitter() -> Box<dyn Splitter> {
    Box::new(SentenceSplitter::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
