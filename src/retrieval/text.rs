//! 텍스트 정규화 유틸리티
//!
//! 질의와 지식베이스 양쪽에서 같은 규칙을 쓰도록 토큰화, 소문자화,
//! 발음 구별 기호 제거를 한 곳에 모아둡니다.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// 단어 토큰 패턴 (로캘 문자 포함 글자, 숫자, 밑줄)
fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]+").expect("Invalid token regex"))
}

/// 소문자 토큰 목록 (중복 포함, 원본 순서)
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 질의 용어 추출
///
/// 최소 길이 미만 토큰은 버리고, 처음 등장한 순서를 유지하며 중복을 제거합니다.
/// 순서는 랭킹 동점 처리의 결정성에 영향을 줍니다.
pub fn query_terms(text: &str, min_len: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() >= min_len)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// 소문자화 후 발음 구별 기호 제거 (Malmö → malmo)
pub fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        match c {
            'å' | 'ä' | 'á' | 'à' | 'â' | 'ã' => out.push('a'),
            'ö' | 'ø' | 'ó' | 'ò' | 'ô' | 'õ' => out.push('o'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'ü' | 'ú' | 'ù' | 'û' => out.push('u'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'ç' => out.push('c'),
            'ñ' => out.push('n'),
            'æ' => out.push_str("ae"),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}

/// 구문 정규화: 발음 기호 제거 + 토큰을 공백 하나로 연결
///
/// "AM-kurs" 와 "am kurs" 가 같은 형태가 됩니다.
pub fn normalize_phrase(text: &str) -> String {
    tokenize(&fold_diacritics(text)).join(" ")
}

/// 정규화된 구문이 정규화된 문장 안에 토큰 경계로 포함되는지 확인
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    format!(" {} ", haystack).contains(&format!(" {} ", phrase))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Vad kostar AM-kurset i Malmö?"),
            vec!["vad", "kostar", "am", "kurset", "i", "malmö"]
        );
        assert_eq!(tokenize("snake_case 42st"), vec!["snake_case", "42st"]);
    }

    #[test]
    fn test_query_terms_filters_and_dedups() {
        let terms = query_terms("Vad kostar AM-kurset i Malmö? Vad kostar det?", 3);
        assert_eq!(terms, vec!["vad", "kostar", "kurset", "malmö", "det"]);
    }

    #[test]
    fn test_query_terms_counts_chars_not_bytes() {
        // "åå" 는 4바이트지만 2글자
        assert!(query_terms("åå", 3).is_empty());
        assert_eq!(query_terms("öga", 3), vec!["öga"]);
    }

    #[test]
    fn test_fold_diacritics() {
        assert_eq!(fold_diacritics("Malmö"), "malmo");
        assert_eq!(fold_diacritics("Ängelholm"), "angelholm");
        assert_eq!(fold_diacritics("Kävlinge Café"), "kavlinge cafe");
        assert_eq!(fold_diacritics("malmo"), "malmo");
    }

    #[test]
    fn test_normalize_phrase() {
        assert_eq!(normalize_phrase("AM-kurs"), "am kurs");
        assert_eq!(normalize_phrase("  Intensivvecka   MC "), "intensivvecka mc");
    }

    #[test]
    fn test_contains_phrase_respects_token_boundaries() {
        let q = normalize_phrase("Vad kostar AM-kurset i Malmö?");
        assert!(contains_phrase(&q, "am"));
        assert!(!contains_phrase(&q, "kurs"));
        assert!(!contains_phrase(&normalize_phrase("Vilket program?"), "am"));
        assert!(!contains_phrase(&q, ""));
    }
}
