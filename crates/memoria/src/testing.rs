//! Test utilities for memoria - shared fixtures
//!
//! Used by the integration tests under `tests/`; handy for downstream crates
//! exercising the storage abstraction without cloud credentials.

use crate::object_store::MemoryStore;
use crate::semantics::{KnowledgeTriple, save_knowledge_triples};

/// A small multilingual triple set covering the common matching cases.
pub fn sample_triples() -> Vec<KnowledgeTriple> {
    vec![
        KnowledgeTriple::new("用户", "使用", "BOS"),
        KnowledgeTriple::new("用户", "部署", "AI服务"),
        KnowledgeTriple::new("项目", "使用", "PostgreSQL"),
    ]
}

/// An in-memory store pre-seeded with [`sample_triples`] for `user_id`.
pub async fn seeded_store(user_id: &str) -> MemoryStore {
    let store = MemoryStore::new();
    save_knowledge_triples(&store, user_id, &sample_triples())
        .await
        .expect("in-memory save cannot fail");
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_store_holds_sample_triples() {
        let store = seeded_store("u1").await;
        let loaded = crate::semantics::load_knowledge_triples(&store, "u1")
            .await
            .unwrap();
        assert_eq!(loaded, sample_triples());
    }
}
