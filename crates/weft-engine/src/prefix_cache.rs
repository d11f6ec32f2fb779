use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use weft_core::ids::ConversationId;
use weft_core::tools::ToolDefinition;

use crate::lru::LruCache;

/// Stable prompt prefix last sent for a (conversation, model) pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPrefix {
    pub system_prompt: String,
    pub tools_hash: String,
    pub mode: String,
    pub estimated_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub reuse_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixCacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub estimated_tokens_saved: u64,
    pub entries: usize,
}

impl PrefixCacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

type PrefixKey = (ConversationId, String);

/// Tracks whether consecutive model requests share a prompt prefix.
///
/// A lookup hits only when prompt, tools hash and mode all match the stored
/// entry. A mismatch leaves the entry untouched.
pub struct PromptPrefixCache {
    entries: Mutex<LruCache<PrefixKey, CachedPrefix>>,
    total_requests: AtomicU64,
    hits: AtomicU64,
    tokens_saved: AtomicU64,
}

impl Default for PromptPrefixCache {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PromptPrefixCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            total_requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            tokens_saved: AtomicU64::new(0),
        }
    }

    pub fn get_cached_prefix(
        &self,
        conversation_id: &ConversationId,
        model: &str,
        system_prompt: &str,
        tools_hash: &str,
        mode: &str,
    ) -> Option<CachedPrefix> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let key = (conversation_id.clone(), model.to_string());
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&key)?;
        if entry.system_prompt != system_prompt || entry.tools_hash != tools_hash || entry.mode != mode {
            debug!(conversation_id = %conversation_id, model, "prompt prefix changed");
            return None;
        }

        entry.reuse_count += 1;
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.tokens_saved.fetch_add(entry.estimated_tokens, Ordering::Relaxed);
        Some(entry.clone())
    }

    /// Record a prefix, replacing whatever was stored for the key.
    pub fn store_prefix(
        &self,
        conversation_id: &ConversationId,
        model: &str,
        system_prompt: &str,
        tools_hash: &str,
        mode: &str,
    ) -> CachedPrefix {
        let prefix = CachedPrefix {
            system_prompt: system_prompt.to_string(),
            tools_hash: tools_hash.to_string(),
            mode: mode.to_string(),
            estimated_tokens: estimate_tokens(system_prompt),
            created_at: Utc::now(),
            reuse_count: 0,
        };
        let key = (conversation_id.clone(), model.to_string());
        if let Some(((evicted, _), _)) = self.entries.lock().insert(key, prefix.clone()) {
            debug!(conversation_id = %evicted, "prompt prefix evicted");
        }
        prefix
    }

    /// Whether any prefix is stored for the key, without touching recency.
    pub fn has_entry(&self, conversation_id: &ConversationId, model: &str) -> bool {
        self.entries
            .lock()
            .contains(&(conversation_id.clone(), model.to_string()))
    }

    pub fn stats(&self) -> PrefixCacheStats {
        PrefixCacheStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            estimated_tokens_saved: self.tokens_saved.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}

/// SHA-256 hex digest over each tool's name, description and schema, in order.
pub fn tools_hash(tools: &[ToolDefinition]) -> String {
    let mut hasher = Sha256::new();
    for tool in tools {
        hasher.update(tool.name.as_bytes());
        hasher.update([0]);
        hasher.update(tool.description.as_bytes());
        hasher.update([0]);
        hasher.update(tool.parameters_schema.to_string().as_bytes());
        hasher.update([0xff]);
    }
    format!("{:x}", hasher.finalize())
}

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conv() -> ConversationId {
        ConversationId::from_raw("conv-1")
    }

    #[test]
    fn empty_cache_misses() {
        let cache = PromptPrefixCache::default();
        assert!(cache.get_cached_prefix(&conv(), "m", "P", "H", "agent").is_none());
        let stats = cache.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn matching_lookup_hits_and_counts_savings() {
        let cache = PromptPrefixCache::default();
        let stored = cache.store_prefix(&conv(), "m", &"p".repeat(40), "H", "agent");
        assert_eq!(stored.estimated_tokens, 10);

        let hit = cache.get_cached_prefix(&conv(), "m", &"p".repeat(40), "H", "agent").unwrap();
        assert_eq!(hit.reuse_count, 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.estimated_tokens_saved, 10);
        assert!((stats.hit_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn each_field_must_match() {
        let cache = PromptPrefixCache::default();
        cache.store_prefix(&conv(), "m", "P", "H", "agent");
        assert!(cache.get_cached_prefix(&conv(), "m", "P2", "H", "agent").is_none());
        assert!(cache.get_cached_prefix(&conv(), "m", "P", "H2", "agent").is_none());
        assert!(cache.get_cached_prefix(&conv(), "m", "P", "H", "chat").is_none());
        assert!(cache.get_cached_prefix(&conv(), "other-model", "P", "H", "agent").is_none());
        assert!(cache.get_cached_prefix(&conv(), "m", "P", "H", "agent").is_some());
        assert_eq!(cache.stats().total_requests, 5);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn lru_across_conversations() {
        let cache = PromptPrefixCache::new(2);
        for id in ["a", "b", "c"] {
            cache.store_prefix(&ConversationId::from_raw(id), "m", "P", "H", "agent");
        }
        assert_eq!(cache.stats().entries, 2);
        assert!(!cache.has_entry(&ConversationId::from_raw("a"), "m"));
        assert!(cache.has_entry(&ConversationId::from_raw("c"), "m"));
    }

    #[test]
    fn tools_hash_is_stable_and_sensitive() {
        let read = ToolDefinition::new("read_file", "Read", json!({"type": "object"}));
        let write = ToolDefinition::new("write_file", "Write", json!({"type": "object"}));
        let h1 = tools_hash(&[read.clone(), write.clone()]);
        assert_eq!(h1, tools_hash(&[read.clone(), write.clone()]));
        assert_ne!(h1, tools_hash(&[read.clone()]));
        assert_ne!(h1, tools_hash(&[write, read]));
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
