//! Per-conversation checklist the model works through.
//!
//! Plan text is markdown; each line starting with `[ ]` or `[x]` (optionally
//! after a `-`, `*`, `+` or `1.` bullet) is a checklist item.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error};

use weft_core::ids::ConversationId;
use weft_store::PlanRepo;

use crate::lru::LruCache;

static CHECKBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])?\s*\[([ xX])\]").unwrap());

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlanProgress {
    pub completed: usize,
    pub total: usize,
}

impl PlanProgress {
    pub fn of(text: &str) -> Self {
        text.lines()
            .filter_map(|line| CHECKBOX.captures(line))
            .fold(Self::default(), |acc, caps| Self {
                completed: acc.completed + usize::from(&caps[1] != " "),
                total: acc.total + 1,
            })
    }

    /// A plan with no checklist items never blocks completion.
    pub fn is_in_effect(&self) -> bool {
        self.total > 0
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

/// LRU of plan text in front of durable storage.
///
/// Writes to one conversation are serialized; different conversations only
/// share the short cache critical section.
pub struct PlanStore {
    cache: Mutex<LruCache<ConversationId, String>>,
    repo: Option<PlanRepo>,
    key_locks: DashMap<ConversationId, Arc<Mutex<()>>>,
}

impl PlanStore {
    pub fn new(repo: PlanRepo, capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            repo: Some(repo),
            key_locks: DashMap::new(),
        }
    }

    /// Memory-only store; evicted plans are gone.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            repo: None,
            key_locks: DashMap::new(),
        }
    }

    /// Plan text for the conversation, empty if none exists.
    pub fn get(&self, conversation_id: &ConversationId) -> String {
        if let Some(text) = self.cache.lock().get(conversation_id) {
            return text.clone();
        }

        self.with_key_lock(conversation_id, || {
            // A writer may have filled the cache while we waited.
            if let Some(text) = self.cache.lock().get(conversation_id) {
                return text.clone();
            }

            let Some(repo) = &self.repo else {
                return String::new();
            };
            match repo.get(conversation_id) {
                Ok(Some(text)) => {
                    debug!(conversation_id = %conversation_id, "plan reloaded from storage");
                    self.cache_insert(conversation_id, text.clone());
                    text
                }
                Ok(None) => String::new(),
                Err(e) => {
                    error!(conversation_id = %conversation_id, error = %e, "failed to load plan");
                    String::new()
                }
            }
        })
    }

    /// Replace the plan. A storage failure is logged and the cached value
    /// stays authoritative for this process.
    pub fn set(&self, conversation_id: &ConversationId, text: impl Into<String>) {
        let text = text.into();
        self.with_key_lock(conversation_id, || {
            if let Some(repo) = &self.repo {
                if let Err(e) = repo.upsert(conversation_id, &text) {
                    error!(conversation_id = %conversation_id, error = %e, "failed to persist plan");
                }
            }
            self.cache_insert(conversation_id, text);
        });
    }

    /// Drop the plan from cache and storage.
    pub fn clear(&self, conversation_id: &ConversationId) {
        self.with_key_lock(conversation_id, || {
            let _ = self.cache.lock().remove(conversation_id);
            if let Some(repo) = &self.repo {
                if let Err(e) = repo.delete(conversation_id) {
                    error!(conversation_id = %conversation_id, error = %e, "failed to delete plan");
                }
            }
        });
    }

    pub fn progress(text: &str) -> PlanProgress {
        PlanProgress::of(text)
    }

    pub fn progress_for(&self, conversation_id: &ConversationId) -> PlanProgress {
        PlanProgress::of(&self.get(conversation_id))
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn cache_insert(&self, conversation_id: &ConversationId, text: String) {
        let evicted = self.cache.lock().insert(conversation_id.clone(), text);
        if let Some((evicted, _)) = evicted {
            debug!(conversation_id = %evicted, "plan evicted from cache");
        }
    }

    /// Run `f` holding the conversation's write lock. The lock entry is
    /// dropped again once nobody holds it, so the map only covers
    /// conversations with work in flight.
    fn with_key_lock<T>(&self, conversation_id: &ConversationId, f: impl FnOnce() -> T) -> T {
        let lock = self
            .key_locks
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let out = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        self.key_locks
            .remove_if(conversation_id, |_, l| Arc::strong_count(l) == 1);
        out
    }
}
