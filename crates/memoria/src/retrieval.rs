//! Keyword retrieval over stored knowledge triples
//!
//! This is intentionally a baseline correctness-first retrieval: load the
//! user's triples through the storage abstraction and filter by
//! case-insensitive substring match. Semantic ranking belongs to a vector
//! query against the hot-tier embedding column, outside this crate.

use crate::error::Result;
use crate::object_store::ObjectStore;
use crate::semantics::{KnowledgeTriple, load_knowledge_triples};

/// Retrieve up to `top_k` triples relevant to `query` for a user.
///
/// An empty or whitespace-only query returns the first `top_k` triples in
/// stored order (a deterministic insertion-order fallback, not a ranking).
/// Otherwise the trimmed query is matched case-insensitively as a substring
/// of each triple's space-joined `subject predicate object` text; matches
/// keep their original order. A user with no stored triples yields an empty
/// result for any query.
pub async fn retrieve_relevant_knowledge(
    store: &dyn ObjectStore,
    user_id: &str,
    query: &str,
    top_k: usize,
) -> Result<Vec<KnowledgeTriple>> {
    let mut triples = load_knowledge_triples(store, user_id).await?;

    let query = query.trim();
    if query.is_empty() {
        triples.truncate(top_k);
        return Ok(triples);
    }

    let needle = query.to_lowercase();
    let mut matched: Vec<KnowledgeTriple> = triples
        .into_iter()
        .filter(|t| t.text().to_lowercase().contains(&needle))
        .collect();
    matched.truncate(top_k);
    Ok(matched)
}
