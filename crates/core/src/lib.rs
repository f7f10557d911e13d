pub mod actions;
pub mod companion;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod generic_types;
pub mod query;
pub mod realtime_api;
pub mod session_state;
pub mod store;

pub use actions::CompanionActions;
pub use error::{Error, Result, StoreError};
pub use session_state::{CallSession, CallStatus, HistoryRecorder, SessionUpdate};
