use crate::generic_types::{AssistantConfig, VoiceEvent};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// A hosted real-time voice assistant.
///
/// Implementations wrap a concrete provider client; `CallSession` only ever
/// talks to this trait. Dropping the receiver returned by `events` ends the
/// subscription.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Starts a call configured for the given assistant.
    async fn connect(&mut self, config: AssistantConfig) -> Result<()>;

    /// Hangs up the current call.
    async fn disconnect(&mut self) -> Result<()>;

    fn is_muted(&self) -> bool;

    async fn set_muted(&mut self, muted: bool) -> Result<()>;

    /// Subscribes to call events. Can only be taken once.
    async fn events(&mut self) -> Result<tokio::sync::mpsc::Receiver<VoiceEvent>>;
}
