//! 지식베이스 로더
//!
//! 지식 디렉터리의 JSON 파일을 읽어 `KnowledgeBase`를 만듭니다.
//! .gitignore 패턴을 존중하고, 파일 이름으로 종류를 구분합니다.
//!
//! - `basfakta_keywords.json`: 주제별 추가 단서
//! - `basfakta_<topic>.json`: 주제 문서
//! - 그 외 `*.json`: 지점 (도시, 이름, 가격표)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::Serialize;
use serde_json::Value;

use super::document::{KnowledgeBase, KnowledgeDocument, Office};

/// 주제 문서 파일 접두사
const TOPIC_PREFIX: &str = "basfakta_";
/// 동의어 파일 이름 줄기
const SYNONYM_STEM: &str = "basfakta_keywords";
/// 지식 디렉터리 환경 변수
pub const KNOWLEDGE_DIR_ENV: &str = "BASFAKTA_KNOWLEDGE_DIR";

// ============================================================================
// File Kinds
// ============================================================================

/// 지식 파일 종류
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeFile {
    /// 주제 문서 (주제 이름)
    Topic(String),
    /// 주제 동의어 표
    Synonyms,
    /// 지점 문서
    Office,
}

impl KnowledgeFile {
    /// 파일 경로로 종류 결정 (`.json`이 아니면 `None`)
    pub fn from_path(path: &Path) -> Option<Self> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            return None;
        }

        let stem = path.file_stem()?.to_str()?;
        if stem == SYNONYM_STEM {
            return Some(Self::Synonyms);
        }
        match stem.strip_prefix(TOPIC_PREFIX) {
            Some(topic) if !topic.is_empty() => Some(Self::Topic(topic.to_string())),
            _ => Some(Self::Office),
        }
    }
}

// ============================================================================
// Loader
// ============================================================================

/// 로더 설정
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// 로드 통계
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadStats {
    pub topics: usize,
    pub offices: usize,
    pub synonym_files: usize,
    pub skipped: usize,
}

/// 지식베이스 로더
pub struct KnowledgeLoader {
    config: LoaderConfig,
}

impl KnowledgeLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 로더 생성
    pub fn with_defaults() -> Self {
        Self::new(LoaderConfig::default())
    }

    /// 디렉터리 재귀 로드
    ///
    /// 읽을 수 없거나 파싱할 수 없는 파일은 경고 후 건너뜁니다.
    /// 디렉터리 자체가 없으면 오류입니다.
    pub fn load_dir(&self, path: &Path) -> Result<(KnowledgeBase, LoadStats)> {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !abs_path.exists() {
            anyhow::bail!("Knowledge directory not found: {:?}", abs_path);
        }

        if !abs_path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", abs_path);
        }

        let mut files = self.collect_files(&abs_path);
        files.sort();

        let mut kb = KnowledgeBase::default();
        let mut stats = LoadStats::default();

        for file in files {
            let Some(kind) = KnowledgeFile::from_path(&file) else {
                continue;
            };

            let value = match read_json(&file) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {:#}", file, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            match kind {
                KnowledgeFile::Topic(topic) => match KnowledgeDocument::from_json(topic, value) {
                    Some(doc) => {
                        kb.documents.push(doc);
                        stats.topics += 1;
                    }
                    None => stats.skipped += 1,
                },
                KnowledgeFile::Synonyms => match parse_synonyms(value) {
                    Some(synonyms) => {
                        kb.topic_synonyms.extend(synonyms);
                        stats.synonym_files += 1;
                    }
                    None => {
                        tracing::warn!("Skipping {:?}: synonym file must be an object", file);
                        stats.skipped += 1;
                    }
                },
                KnowledgeFile::Office => match serde_json::from_value::<Office>(value) {
                    Ok(office) => {
                        kb.offices.push(office);
                        stats.offices += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping office file {:?}: {}", file, e);
                        stats.skipped += 1;
                    }
                },
            }
        }

        kb.sort_documents();

        tracing::info!(
            "Loaded knowledge base from {:?}: {} topics, {} offices, {} skipped",
            abs_path,
            stats.topics,
            stats.offices,
            stats.skipped
        );

        Ok((kb, stats))
    }

    /// ignore 크레이트로 .gitignore 지원하며 JSON 파일 수집
    fn collect_files(&self, root: &Path) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(root)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            if KnowledgeFile::from_path(entry.path()).is_none() {
                continue;
            }

            if self.config.max_file_size > 0 {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if size > self.config.max_file_size {
                    tracing::debug!("Skipping large file: {:?} ({} bytes)", entry.path(), size);
                    continue;
                }
            }

            files.push(entry.path().to_path_buf());
        }
        files
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON: {:?}", path))
}

/// `{ "<topic>": ["cue", ...] }` 파싱 (문자열이 아닌 단서는 무시)
fn parse_synonyms(value: Value) -> Option<Vec<(String, Vec<String>)>> {
    let Value::Object(map) = value else {
        return None;
    };

    let synonyms = map
        .into_iter()
        .filter_map(|(topic, cues)| match cues {
            Value::Array(items) => Some((
                topic,
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            )),
            Value::String(s) => Some((topic, vec![s])),
            _ => {
                tracing::warn!("Ignoring synonyms for '{}': expected list of strings", topic);
                None
            }
        })
        .collect();

    Some(synonyms)
}

/// 데이터 디렉터리 경로
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".basfakta")
}

/// 기본 지식 디렉터리
///
/// `$BASFAKTA_KNOWLEDGE_DIR` > `./knowledge` (존재 시) > 데이터 디렉터리
pub fn default_knowledge_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(KNOWLEDGE_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    let local = PathBuf::from("knowledge");
    if local.is_dir() {
        return local;
    }

    get_data_dir().join("knowledge")
}

// ============================================================================
// Tests
// ============================================================================
