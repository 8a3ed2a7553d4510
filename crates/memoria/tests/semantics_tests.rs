//! End-to-end tests for the deep-tier document semantics
//!
//! Profiles and knowledge triples round-trip through a real backend (the
//! in-memory reference), including the non-ASCII payloads the system is
//! expected to carry.

use memoria::object_store::{MemoryStore, ObjectStore, knowledge_key, profile_key};
use memoria::retrieval::retrieve_relevant_knowledge;
use memoria::semantics::{
    KnowledgeTriple, Profile, load_knowledge_triples, load_user_profile, parse_triples,
    save_knowledge_triples, save_user_profile,
};
use serde_json::{Value, json};

fn triple(s: &str, p: &str, o: &str) -> KnowledgeTriple {
    KnowledgeTriple::new(s, p, o)
}

mod knowledge_tests {
    use super::*;

    #[tokio::test]
    async fn save_then_retrieve_by_keyword() {
        // Scenario A: keyword lookup over a freshly saved collection
        let store = MemoryStore::new();
        let triples = vec![
            triple("用户", "使用", "BOS"),
            triple("用户", "部署", "AI服务"),
            triple("项目", "使用", "PostgreSQL"),
        ];
        save_knowledge_triples(&store, "u1", &triples).await.unwrap();

        let results = retrieve_relevant_knowledge(&store, "u1", "BOS", 5)
            .await
            .unwrap();
        assert_eq!(results, vec![triple("用户", "使用", "BOS")]);
    }

    #[tokio::test]
    async fn retrieval_respects_top_k_bound() {
        // Scenario B: three matches, bounded to two
        let store = MemoryStore::new();
        let triples = vec![
            triple("用户", "使用", "BOS"),
            triple("项目", "使用", "PostgreSQL"),
            triple("团队", "使用", "MinIO"),
        ];
        save_knowledge_triples(&store, "u1", &triples).await.unwrap();

        let results = retrieve_relevant_knowledge(&store, "u1", "使用", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(result.text().contains("使用"));
        }
    }

    #[tokio::test]
    async fn load_for_unknown_user_is_empty_not_error() {
        let store = MemoryStore::new();
        let triples = load_knowledge_triples(&store, "nobody").await.unwrap();
        assert!(triples.is_empty());
    }

    #[tokio::test]
    async fn save_overwrites_whole_collection() {
        let store = MemoryStore::new();
        save_knowledge_triples(&store, "u1", &[triple("a", "b", "c")])
            .await
            .unwrap();
        save_knowledge_triples(&store, "u1", &[triple("x", "y", "z")])
            .await
            .unwrap();

        let loaded = load_knowledge_triples(&store, "u1").await.unwrap();
        assert_eq!(loaded, vec![triple("x", "y", "z")]);
    }

    #[tokio::test]
    async fn stored_under_canonical_key_with_content_type() {
        let store = MemoryStore::new();
        save_knowledge_triples(&store, "u1", &[triple("a", "b", "c")])
            .await
            .unwrap();

        let raw = store.get(&knowledge_key("u1")).await.unwrap();
        assert!(raw.is_some(), "payload must live under knowledge/u1.jsonl");
    }

    #[test]
    fn blank_lines_do_not_change_the_decode() {
        let with_blanks = "[\"a\",\"b\",\"c\"]\n\n\n[\"d\",\"e\",\"f\"]\n   \n";
        let without_blanks = "[\"a\",\"b\",\"c\"]\n[\"d\",\"e\",\"f\"]";
        assert_eq!(
            parse_triples(with_blanks.as_bytes()).unwrap(),
            parse_triples(without_blanks.as_bytes()).unwrap()
        );
    }

    #[test]
    fn short_lines_are_dropped_silently() {
        let payload = "[\"only\",\"two\"]\n[\"a\",\"b\",\"c\"]\n[]";
        let decoded = parse_triples(payload.as_bytes()).unwrap();
        assert_eq!(decoded, vec![triple("a", "b", "c")]);
    }
}

mod profile_tests {
    use super::*;

    #[tokio::test]
    async fn non_ascii_profile_round_trips() {
        // Scenario C: traits survive storage with non-ASCII integrity
        let store = MemoryStore::new();
        let mut profile = Profile::new();
        profile.insert(
            "traits".to_string(),
            json!({ "communication_style": "简洁" }),
        );
        save_user_profile(&store, "u1", &profile).await.unwrap();

        let loaded = load_user_profile(&store, "u1").await.unwrap().unwrap();
        let traits = loaded.get("traits").and_then(Value::as_object).unwrap();
        assert_eq!(
            traits.get("communication_style").and_then(Value::as_str),
            Some("简洁")
        );
    }

    #[tokio::test]
    async fn missing_profile_is_none_not_error() {
        let store = MemoryStore::new();
        assert!(load_user_profile(&store, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_is_full_overwrite() {
        let store = MemoryStore::new();

        let mut first = Profile::new();
        first.insert("traits".to_string(), json!({ "emotional_tone": "warm" }));
        first.insert("legacy".to_string(), json!(true));
        save_user_profile(&store, "u1", &first).await.unwrap();

        let mut second = Profile::new();
        second.insert("traits".to_string(), json!({ "decision_making": "fast" }));
        save_user_profile(&store, "u1", &second).await.unwrap();

        let loaded = load_user_profile(&store, "u1").await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(loaded.get("legacy").is_none(), "no partial patch semantics");
    }

    #[tokio::test]
    async fn raw_payload_keeps_non_ascii_unescaped() {
        let store = MemoryStore::new();
        let mut profile = Profile::new();
        profile.insert("traits".to_string(), json!({ "preferred_topics": ["部署"] }));
        save_user_profile(&store, "u1", &profile).await.unwrap();

        let raw = store.get(&profile_key("u1")).await.unwrap().unwrap();
        let text = std::str::from_utf8(&raw).unwrap();
        assert!(text.contains("部署"), "expected literal non-ASCII: {text}");
        assert!(!text.contains("\\u"), "expected no escape sequences: {text}");
    }

    #[tokio::test]
    async fn corrupt_profile_surfaces_decode_error() {
        let store = MemoryStore::new();
        store
            .put(&profile_key("u1"), bytes::Bytes::from_static(b"{broken"), None)
            .await
            .unwrap();

        let result = load_user_profile(&store, "u1").await;
        assert!(matches!(result, Err(memoria::MemoriaError::Decode(_))));
    }
}
