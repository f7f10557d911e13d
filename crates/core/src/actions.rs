use crate::companion::{CompanionRecord, NewCompanion, SessionHistoryEntry, SessionRow};
use crate::config::QueryConfig;
use crate::entitlements::{Allowance, IdentityProvider};
use crate::error::{Error, Result};
use crate::query::QueryFilter;
use crate::session_state::HistoryRecorder;
use crate::store::{CompanionStore, QuotaInsert, StoreResult};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Server-side companion operations: listing, creation, session history and
/// the creation quota. Every store call is bounded by the query timeout and
/// fails fast; nothing is retried.
#[derive(Clone)]
pub struct CompanionActions {
    store: Arc<dyn CompanionStore>,
    identity: Arc<dyn IdentityProvider>,
    config: QueryConfig,
}

fn first_row<T>(rows: Vec<T>, table: &'static str) -> Result<T> {
    rows.into_iter().next().ok_or(Error::NoRowsReturned(table))
}

fn project(rows: Vec<SessionRow>) -> Vec<CompanionRecord> {
    rows.into_iter().map(|row| row.companion).collect()
}

impl CompanionActions {
    pub fn new(
        store: Arc<dyn CompanionStore>,
        identity: Arc<dyn IdentityProvider>,
        config: QueryConfig,
    ) -> Self {
        Self {
            store,
            identity,
            config,
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> Result<T> {
        let timeout = self.config.query_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!("{} failed: {}", operation, e);
                Err(Error::StoreQueryFailure(e))
            }
            Err(_) => {
                tracing::error!("{} timed out after {:?}", operation, timeout);
                Err(Error::Timeout {
                    operation,
                    elapsed: timeout,
                })
            }
        }
    }

    async fn require_user(&self) -> Result<String> {
        self.identity
            .current_user_id()
            .await
            .ok_or(Error::Unauthenticated)
    }

    pub async fn list_companions(&self, filter: &QueryFilter) -> Result<Vec<CompanionRecord>> {
        let predicate = filter.predicate();
        let range = filter.range();
        self.bounded(
            "list companions",
            self.store.select_companions(&predicate, range),
        )
        .await
    }

    pub async fn get_companion(&self, id: &str) -> Result<CompanionRecord> {
        let rows = self
            .bounded("get companion", self.store.select_companion(id))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("companion {id}")))
    }

    /// Inserts a companion authored by the current user.
    pub async fn create_companion(&self, input: NewCompanion) -> Result<CompanionRecord> {
        input.validate()?;
        let author = self.require_user().await?;
        let rows = self
            .bounded("create companion", self.store.insert_companion(input, &author))
            .await?;
        let record = first_row(rows, "companions")?;
        tracing::info!("Created companion {} for {}", record.id, author);
        Ok(record)
    }

    /// Like `create_companion`, but the quota check and the insert are a
    /// single store operation.
    pub async fn create_companion_within_quota(
        &self,
        input: NewCompanion,
    ) -> Result<CompanionRecord> {
        input.validate()?;
        let author = self.require_user().await?;
        let cap = match self.config.quota().allowance(self.identity.as_ref()).await {
            Allowance::Unlimited => {
                let rows = self
                    .bounded("create companion", self.store.insert_companion(input, &author))
                    .await?;
                return first_row(rows, "companions");
            }
            Allowance::Capped(cap) => cap,
        };
        let outcome = self
            .bounded(
                "create companion",
                self.store.insert_companion_within_cap(input, &author, cap),
            )
            .await?;
        match outcome {
            QuotaInsert::Inserted(rows) => first_row(rows, "companions"),
            QuotaInsert::Rejected { count } => {
                tracing::info!("{} has reached the companion limit ({}/{})", author, count, cap);
                Err(Error::QuotaExceeded { count, cap })
            }
        }
    }

    /// Whether `author` may create another companion right now.
    pub async fn check_creation_quota(&self, author: &str) -> Result<bool> {
        let cap = match self.config.quota().allowance(self.identity.as_ref()).await {
            Allowance::Unlimited => return Ok(true),
            Allowance::Capped(cap) => cap,
        };
        let count = self
            .bounded("count companions", self.store.count_companions_by_author(author))
            .await?;
        Ok(Allowance::Capped(cap).permits(count))
    }

    pub async fn append_session_history(
        &self,
        companion_id: &str,
        user_id: &str,
    ) -> Result<SessionHistoryEntry> {
        let rows = self
            .bounded(
                "append session history",
                self.store.insert_session(companion_id, user_id),
            )
            .await?;
        first_row(rows, "session_history")
    }

    /// Companions from the most recent sessions of any user, newest first.
    pub async fn get_recent_sessions(&self, limit: usize) -> Result<Vec<CompanionRecord>> {
        let rows = self
            .bounded("recent sessions", self.store.select_sessions(None, limit))
            .await?;
        Ok(project(rows))
    }

    pub async fn get_user_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<CompanionRecord>> {
        let rows = self
            .bounded("user sessions", self.store.select_sessions(Some(user_id), limit))
            .await?;
        Ok(project(rows))
    }
}

#[async_trait]
impl HistoryRecorder for CompanionActions {
    async fn record_session(&self, companion_id: &str) -> Result<()> {
        let user_id = self.require_user().await?;
        let entry = self.append_session_history(companion_id, &user_id).await?;
        tracing::info!("Recorded session {} for {}", entry.id, user_id);
        Ok(())
    }
}
