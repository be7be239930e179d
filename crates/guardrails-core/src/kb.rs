use guardrails_shared::KnowledgeBase;
use sqlx::PgPool;
use uuid::Uuid;

/// Default top-1 cosine-similarity threshold (§4.1 step 7 names the gate but not
/// the value); conservative enough that the `NullKnowledgeBaseRetriever` default
/// and any real plugin both fail safe toward the static template resolver.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;

/// Loads the knowledge bases visible to `tenant_id`: its own plus every global
/// one, mirroring `data_security::load_entity_types`'s tenant-or-global filter.
pub async fn load_knowledge_bases(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<Vec<KnowledgeBase>> {
    sqlx::query_as::<_, KnowledgeBase>(
        "SELECT id, tenant_id, category, file_path, vector_file_path, total_qa_pairs, is_active, is_global
         FROM knowledge_bases
         WHERE is_active = true AND (tenant_id = $1 OR is_global = true)",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

/// Top-1 match from a knowledge-base retriever (§4.1 step 7).
pub struct KbMatch {
    pub answer: String,
    pub score: f64,
}

/// The knowledge-base retriever is a pluggable collaborator: embedding generation
/// and the vector index itself are out of scope (§1 Non-goals, §6 "excluded: the
/// embedding model used by the optional knowledge-base retriever"; the vector file
/// is "opaque to the core", §6 On-disk layout). This trait is the hook the template
/// resolver calls before falling back to static templates; the default
/// implementation never has a match, so deployments behave exactly as if no KB
/// were configured until a real retriever is wired in.
pub trait KnowledgeBaseRetriever: Send + Sync {
    /// Look up the closest Q&A pair for `user_query` within `kb`. Returns `None`
    /// if nothing clears the caller's similarity threshold.
    fn retrieve(&self, kb: &KnowledgeBase, user_query: &str, similarity_threshold: f64) -> Option<KbMatch>;
}

/// Ships as the default: no vector index is loaded, so every lookup misses and
/// the template resolver falls through to its next preference (§4.1 step 7).
pub struct NullKnowledgeBaseRetriever;

impl KnowledgeBaseRetriever for NullKnowledgeBaseRetriever {
    fn retrieve(&self, _kb: &KnowledgeBase, _user_query: &str, _similarity_threshold: f64) -> Option<KbMatch> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_kb() -> KnowledgeBase {
        KnowledgeBase {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            category: "S1".to_string(),
            file_path: "qa.json".to_string(),
            vector_file_path: "kb_vectors.pkl".to_string(),
            total_qa_pairs: 0,
            is_active: true,
            is_global: false,
        }
    }

    #[test]
    fn null_retriever_never_matches() {
        let retriever = NullKnowledgeBaseRetriever;
        assert!(retriever.retrieve(&sample_kb(), "anything", 0.0).is_none());
    }
}
