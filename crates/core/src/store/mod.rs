//! Access to the `companions` and `session_history` tables.
//!
//! Store methods never treat an empty result as a failure. `Ok(vec![])` and
//! `Err(_)` are distinct and each caller decides what an empty result means.

mod memory;
mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::{PostgrestConfig, PostgrestStore};

use crate::companion::{CompanionRecord, NewCompanion, SessionHistoryEntry, SessionRow};
use crate::error::StoreError;
use crate::query::{Predicate, RowRange};
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of an insert guarded by a companion cap.
#[derive(Debug, Clone, PartialEq)]
pub enum QuotaInsert {
    Inserted(Vec<CompanionRecord>),
    /// The author already owns `count` companions.
    Rejected { count: usize },
}

#[async_trait]
pub trait CompanionStore: Send + Sync {
    /// Companions matching `predicate`, restricted to `range`, in store order.
    async fn select_companions(
        &self,
        predicate: &Predicate,
        range: RowRange,
    ) -> StoreResult<Vec<CompanionRecord>>;

    async fn select_companion(&self, id: &str) -> StoreResult<Vec<CompanionRecord>>;

    async fn count_companions_by_author(&self, author: &str) -> StoreResult<usize>;

    /// Inserts a companion and returns the stored rows.
    async fn insert_companion(
        &self,
        input: NewCompanion,
        author: &str,
    ) -> StoreResult<Vec<CompanionRecord>>;

    /// Inserts a companion only while the author owns fewer than `cap`.
    ///
    /// The default counts then inserts, so concurrent creators can overshoot
    /// the cap. Stores that can do better override it.
    async fn insert_companion_within_cap(
        &self,
        input: NewCompanion,
        author: &str,
        cap: usize,
    ) -> StoreResult<QuotaInsert> {
        let count = self.count_companions_by_author(author).await?;
        if count >= cap {
            return Ok(QuotaInsert::Rejected { count });
        }
        let rows = self.insert_companion(input, author).await?;
        Ok(QuotaInsert::Inserted(rows))
    }

    async fn insert_session(
        &self,
        companion_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<SessionHistoryEntry>>;

    /// Session history joined with companions, newest first.
    async fn select_sessions(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<SessionRow>>;
}
