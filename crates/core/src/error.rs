use crate::session_state::CallStatus;
use std::time::Duration;

/// Failures talking to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request to store failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode store response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("voice service connection failed: {0}")]
    ConnectFailure(String),
    #[error("voice service error: {0}")]
    VoiceService(String),
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },
    #[error("store query failed: {0}")]
    StoreQueryFailure(#[from] StoreError),
    #[error("store returned no rows for {0}")]
    NoRowsReturned(&'static str),
    #[error("{0} not found")]
    NotFound(String),
    #[error("companion limit reached ({count} of {cap})")]
    QuotaExceeded { count: usize, cap: usize },
    #[error("no authenticated user")]
    Unauthenticated,
    #[error("invalid companion input: {0}")]
    InvalidInput(String),
    #[error("cannot apply {event} while call is {from:?}")]
    InvalidTransition {
        from: CallStatus,
        event: &'static str,
    },
    #[error("a call is already {0:?}")]
    CallInProgress(CallStatus),
    #[error("the previous call has not ended yet")]
    CallEnding,
    #[error("call is not active (currently {0:?})")]
    NotActive(CallStatus),
}

pub type Result<T> = std::result::Result<T, Error>;
