use super::{CompanionStore, QuotaInsert, StoreResult};
use crate::companion::{CompanionRecord, NewCompanion, SessionHistoryEntry, SessionRow};
use crate::error::StoreError;
use crate::query::{Predicate, RowRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    companions: Vec<CompanionRecord>,
    sessions: Vec<SessionHistoryEntry>,
}

/// A process-local store. Companions keep insertion order; the capped insert
/// runs under one lock, so the cap holds under concurrent creators.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Adds an existing record as-is.
    pub fn seed_companion(&self, record: CompanionRecord) -> StoreResult<()> {
        self.lock()?.companions.push(record);
        Ok(())
    }

    /// Adds a session entry with an explicit timestamp.
    pub fn seed_session(
        &self,
        companion_id: &str,
        user_id: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<SessionHistoryEntry> {
        let entry = SessionHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            companion_id: companion_id.to_string(),
            user_id: user_id.to_string(),
            created_at,
        };
        self.lock()?.sessions.push(entry.clone());
        Ok(entry)
    }

    fn insert_locked(tables: &mut Tables, input: NewCompanion, author: &str) -> CompanionRecord {
        let record = input.into_record(uuid::Uuid::new_v4().to_string(), author);
        tables.companions.push(record.clone());
        record
    }
}

#[async_trait]
impl CompanionStore for MemoryStore {
    async fn select_companions(
        &self,
        predicate: &Predicate,
        range: RowRange,
    ) -> StoreResult<Vec<CompanionRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .companions
            .iter()
            .filter(|c| predicate.matches(c))
            .skip(range.start)
            .take(range.count())
            .cloned()
            .collect())
    }

    async fn select_companion(&self, id: &str) -> StoreResult<Vec<CompanionRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .companions
            .iter()
            .filter(|c| c.id == id)
            .cloned()
            .collect())
    }

    async fn count_companions_by_author(&self, author: &str) -> StoreResult<usize> {
        let tables = self.lock()?;
        Ok(tables.companions.iter().filter(|c| c.author == author).count())
    }

    async fn insert_companion(
        &self,
        input: NewCompanion,
        author: &str,
    ) -> StoreResult<Vec<CompanionRecord>> {
        let mut tables = self.lock()?;
        Ok(vec![Self::insert_locked(&mut tables, input, author)])
    }

    async fn insert_companion_within_cap(
        &self,
        input: NewCompanion,
        author: &str,
        cap: usize,
    ) -> StoreResult<QuotaInsert> {
        let mut tables = self.lock()?;
        let count = tables.companions.iter().filter(|c| c.author == author).count();
        if count >= cap {
            return Ok(QuotaInsert::Rejected { count });
        }
        Ok(QuotaInsert::Inserted(vec![Self::insert_locked(
            &mut tables,
            input,
            author,
        )]))
    }

    async fn insert_session(
        &self,
        companion_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<SessionHistoryEntry>> {
        Ok(vec![self.seed_session(companion_id, user_id, Utc::now())?])
    }

    async fn select_sessions(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<SessionRow>> {
        let tables = self.lock()?;
        let mut entries: Vec<(usize, &SessionHistoryEntry)> = tables
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| user_id.is_none_or(|u| s.user_id == u))
            .collect();
        // Newest first; later inserts win ties.
        entries.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));

        // Inner join: entries whose companion is gone are skipped.
        Ok(entries
            .into_iter()
            .filter_map(|(_, entry)| {
                tables
                    .companions
                    .iter()
                    .find(|c| c.id == entry.companion_id)
                    .map(|companion| SessionRow {
                        entry: entry.clone(),
                        companion: companion.clone(),
                    })
            })
            .take(limit)
            .collect())
    }
}
