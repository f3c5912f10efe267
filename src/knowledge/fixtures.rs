//! 테스트용 지식베이스 픽스처

use serde_json::{json, Value};

use super::document::{KnowledgeBase, KnowledgeDocument, Office};
use super::index::SearchIndex;
use super::indexer::IndexConfig;

/// 주제 문서 (이름, JSON)
pub fn topic_documents() -> Vec<(&'static str, Value)> {
    vec![
        (
            "am_kurs",
            json!({
                "title": "AM-kurs",
                "service": "AM-kurs",
                "keywords": ["am-kurs", "moped", "moppe", "kurset", "kostar", "pris"],
                "description": "AM-kursen ger dig behörighet att köra EU-moped klass I.",
                "age": {
                    "title": "Ålderskrav",
                    "keywords": ["ålder", "gammal", "måste"],
                    "text": "Du måste vara minst 15 år för att ta AM-körkort."
                },
                "inclusions": {
                    "title": "Detta ingår",
                    "keywords": ["ingår", "innehåller"],
                    "items": ["Teorilektioner", "Körlektioner på bana", "Skyddsutrustning"]
                }
            }),
        ),
        (
            "introduktionskurs",
            json!({
                "title": "Introduktionskurs",
                "service": "Introduktionskurs",
                "keywords": ["introduktionskurs", "handledarkurs", "handledare"],
                "description": "Introduktionskursen är obligatorisk för dig som ska övningsköra privat.",
                "validity": {
                    "title": "Giltighet",
                    "keywords": ["introduktionskurs", "giltig", "giltighet", "länge"],
                    "text": "En handledarutbildning är giltig i 5 år från det datum den genomfördes."
                }
            }),
        ),
        (
            "intensivkurs_bil",
            json!({
                "title": "Intensivkurs bil",
                "service": "Intensivkurs bil",
                "keywords": ["intensivkurs", "intensivvecka", "fungerar"],
                "text": "Under en intensivvecka för bil kör du varje dag med samma lärare."
            }),
        ),
        (
            "intensivkurs_mc",
            json!({
                "title": "Intensivkurs MC",
                "service": "Intensivkurs MC",
                "keywords": ["intensivkurs", "intensivvecka", "fungerar"],
                "text": "Under intensivkursen för MC övar du både på bana och i trafik."
            }),
        ),
    ]
}

/// 지점 문서 (파일 이름 줄기, JSON)
pub fn office_documents() -> Vec<(&'static str, Value)> {
    vec![
        (
            "malmo_city",
            json!({
                "city": "Malmö",
                "name": "Trafikskola Malmö City",
                "prices": [
                    { "service_name": "AM-kurs", "price": 4995 },
                    { "service_name": "Riskettan", "price": 1800 }
                ]
            }),
        ),
        (
            "malmo_hyllie",
            json!({
                "city": "Malmö",
                "name": "Trafikskola Malmö Hyllie",
                "prices": [{ "service_name": "AM-kurs", "price": 5200 }]
            }),
        ),
        (
            "lund",
            json!({
                "city": "Lund",
                "name": "Trafikskola Lund",
                "prices": [
                    { "service_name": "AM-kurs", "price": 4500 },
                    { "service_name": "Introduktionskurs", "price": 700 }
                ]
            }),
        ),
    ]
}

/// 주제 동의어 (basfakta_keywords.json 내용)
pub fn synonyms() -> Value {
    json!({ "am_kurs": ["moppekörkort", "moped"] })
}

pub fn knowledge_base() -> KnowledgeBase {
    let mut kb = KnowledgeBase {
        documents: topic_documents()
            .into_iter()
            .filter_map(|(name, value)| KnowledgeDocument::from_json(name, value))
            .collect(),
        offices: office_documents()
            .into_iter()
            .map(|(_, value)| serde_json::from_value::<Office>(value).unwrap())
            .collect(),
        topic_synonyms: vec![(
            "am_kurs".to_string(),
            vec!["moppekörkort".to_string(), "moped".to_string()],
        )],
    };
    kb.sort_documents();
    kb
}

pub fn index() -> SearchIndex {
    SearchIndex::build(&knowledge_base(), &IndexConfig::default())
}
