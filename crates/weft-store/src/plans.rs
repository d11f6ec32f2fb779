use chrono::Utc;
use rusqlite::OptionalExtension;

use weft_core::ids::ConversationId;

use crate::database::Database;
use crate::error::StoreError;

/// Durable plan text, one row per conversation.
#[derive(Clone)]
pub struct PlanRepo {
    db: Database,
}

impl PlanRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stored plan text, or `None` if the conversation has no plan.
    pub fn get(&self, conversation_id: &ConversationId) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT content FROM plans WHERE conversation_id = ?1",
                    [conversation_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Insert or replace the plan for a conversation.
    pub fn upsert(&self, conversation_id: &ConversationId, content: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO plans (conversation_id, content, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
                rusqlite::params![conversation_id.as_str(), content, now],
            )?;
            Ok(())
        })
    }

    /// Remove a plan. Returns whether a row existed.
    pub fn delete(&self, conversation_id: &ConversationId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM plans WHERE conversation_id = ?1",
                [conversation_id.as_str()],
            )?;
            Ok(n > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> PlanRepo {
        PlanRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn missing_plan_is_none() {
        assert_eq!(repo().get(&ConversationId::from_raw("conv-x")).unwrap(), None);
    }

    #[test]
    fn upsert_then_get() {
        let repo = repo();
        let conv = ConversationId::from_raw("conv-1");
        repo.upsert(&conv, "- [ ] one").unwrap();
        repo.upsert(&conv, "- [x] one").unwrap();
        assert_eq!(repo.get(&conv).unwrap().as_deref(), Some("- [x] one"));
    }

    #[test]
    fn delete_reports_existence() {
        let repo = repo();
        let conv = ConversationId::from_raw("conv-1");
        repo.upsert(&conv, "- [ ] one").unwrap();
        assert!(repo.delete(&conv).unwrap());
        assert!(!repo.delete(&conv).unwrap());
        assert_eq!(repo.get(&conv).unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.db");
        let conv = ConversationId::from_raw("conv-1");
        PlanRepo::new(Database::open(&path).unwrap())
            .upsert(&conv, "- [ ] persist me")
            .unwrap();

        let reopened = PlanRepo::new(Database::open(&path).unwrap());
        assert_eq!(reopened.get(&conv).unwrap().as_deref(), Some("- [ ] persist me"));
    }
}
