use crate::companion::CompanionRecord;
use crate::config::CallConfig;
use crate::error::{Error, Result};
use crate::generic_types::{
    AssistantConfig, EventPolicy, PersonaVariables, TranscriptMessage, VoiceEvent,
};
use crate::realtime_api::VoiceService;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Inactive,
    Connecting,
    Active,
    Finished,
}

/// Inputs that move a call between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTransition {
    StartRequested,
    ConnectFailed,
    CallStarted,
    StopRequested,
    CallEnded,
}

impl CallTransition {
    pub fn name(&self) -> &'static str {
        match self {
            CallTransition::StartRequested => "start",
            CallTransition::ConnectFailed => "connect-failed",
            CallTransition::CallStarted => "call-start",
            CallTransition::StopRequested => "stop",
            CallTransition::CallEnded => "call-end",
        }
    }
}

impl CallStatus {
    /// The state after `transition`, or `InvalidTransition` if it does not
    /// apply here.
    pub fn next(self, transition: CallTransition) -> Result<CallStatus> {
        use CallStatus::*;
        use CallTransition::*;
        match (self, transition) {
            (Inactive | Finished, StartRequested) => Ok(Connecting),
            (Connecting, ConnectFailed) => Ok(Inactive),
            (Connecting, CallStarted) => Ok(Active),
            (Connecting | Active, StopRequested) => Ok(Finished),
            (Connecting | Active | Finished, CallEnded) => Ok(Finished),
            (from, transition) => Err(Error::InvalidTransition {
                from,
                event: transition.name(),
            }),
        }
    }
}

/// State changes published to whoever renders the call.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Status(CallStatus),
    Speaking(bool),
    Muted(bool),
    Transcript(TranscriptMessage),
    HistoryRecorded(String),
}

/// Receives the one history entry each finished call produces.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record_session(&self, companion_id: &str) -> Result<()>;
}

/// One voice call with a companion.
///
/// The owner feeds `VoiceEvent`s into `handle_event` in arrival order and
/// forwards user intents to `start`, `stop` and `toggle_microphone`. All of
/// them take `&mut self`, so no two transitions overlap.
pub struct CallSession<V: VoiceService> {
    companion: CompanionRecord,
    voice: V,
    recorder: Arc<dyn HistoryRecorder>,
    config: CallConfig,
    status: CallStatus,
    is_speaking: bool,
    is_muted: bool,
    transcript: Vec<TranscriptMessage>,
    // Set by `start`, cleared by the first call-end of that call.
    history_pending: bool,
    // Set by `stop`, cleared when that call's call-end arrives.
    awaiting_call_end: bool,
    updates: broadcast::Sender<SessionUpdate>,
}

impl<V: VoiceService> CallSession<V> {
    pub fn new(
        companion: CompanionRecord,
        voice: V,
        recorder: Arc<dyn HistoryRecorder>,
        config: CallConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(config.update_capacity());
        Self {
            companion,
            voice,
            recorder,
            config,
            status: CallStatus::Inactive,
            is_speaking: false,
            is_muted: false,
            transcript: Vec::new(),
            history_pending: false,
            awaiting_call_end: false,
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    pub fn companion(&self) -> &CompanionRecord {
        &self.companion
    }

    #[cfg(test)]
    pub(crate) fn voice_mut(&mut self) -> &mut V {
        &mut self.voice
    }

    /// The configuration sent to the voice service on `start`.
    pub fn assistant_config(&self) -> AssistantConfig {
        AssistantConfig {
            name: self.companion.name.clone(),
            voice: self.companion.voice.clone(),
            variable_values: PersonaVariables {
                subject: self.companion.subject.clone(),
                topic: self.companion.topic.clone(),
                style: self.companion.style.clone(),
            },
            events: EventPolicy::default(),
        }
    }

    fn publish(&self, update: SessionUpdate) {
        // An error only means nobody is listening.
        let _ = self.updates.send(update);
    }

    fn apply(&mut self, transition: CallTransition) -> Result<CallStatus> {
        let next = self.status.next(transition)?;
        if next != self.status {
            tracing::debug!("call {:?} -> {:?} on {}", self.status, next, transition.name());
            self.status = next;
            self.publish(SessionUpdate::Status(next));
        }
        Ok(next)
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.is_speaking != speaking {
            self.is_speaking = speaking;
            self.publish(SessionUpdate::Speaking(speaking));
        }
    }

    /// Starts a call. Only valid while `Inactive` or `Finished`, and after a
    /// `stop` only once the stopped call's call-end has been handled.
    ///
    /// A failed or timed out connect puts the session back to `Inactive` so
    /// the user can try again.
    pub async fn start(&mut self) -> Result<()> {
        if !matches!(self.status, CallStatus::Inactive | CallStatus::Finished) {
            return Err(Error::CallInProgress(self.status));
        }
        if self.awaiting_call_end {
            return Err(Error::CallEnding);
        }
        self.apply(CallTransition::StartRequested)?;
        self.history_pending = true;

        let assistant = self.assistant_config();
        let timeout = self.config.connect_timeout();
        tracing::info!("Connecting call with companion '{}'", self.companion.name);

        let failure = match tokio::time::timeout(timeout, self.voice.connect(assistant)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => {
                tracing::error!("Error starting call: {:#}", e);
                Error::ConnectFailure(format!("{:#}", e))
            }
            Err(_) => {
                tracing::error!("Call did not connect within {:?}", timeout);
                if let Err(e) = self.voice.disconnect().await {
                    tracing::warn!("Failed to abandon pending connection: {:#}", e);
                }
                Error::Timeout {
                    operation: "voice connect",
                    elapsed: timeout,
                }
            }
        };
        self.history_pending = false;
        self.apply(CallTransition::ConnectFailed)?;
        Err(failure)
    }

    /// Hangs up. History is recorded when the service confirms with call-end.
    pub async fn stop(&mut self) -> Result<()> {
        self.apply(CallTransition::StopRequested)?;
        self.awaiting_call_end = true;
        self.set_speaking(false);
        if let Err(e) = self.voice.disconnect().await {
            tracing::error!("Failed to disconnect call: {:#}", e);
        }
        Ok(())
    }

    /// Flips the microphone mute state on the service. Only while `Active`.
    pub async fn toggle_microphone(&mut self) -> Result<bool> {
        if self.status != CallStatus::Active {
            return Err(Error::NotActive(self.status));
        }
        let muted = !self.voice.is_muted();
        self.voice
            .set_muted(muted)
            .await
            .map_err(|e| Error::VoiceService(format!("{:#}", e)))?;
        self.is_muted = muted;
        self.publish(SessionUpdate::Muted(muted));
        Ok(muted)
    }

    pub async fn handle_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::CallStart => {
                if let Err(e) = self.apply(CallTransition::CallStarted) {
                    tracing::warn!("Ignoring call-start: {}", e);
                }
            }
            VoiceEvent::CallEnd => self.on_call_end().await,
            VoiceEvent::SpeechStart => {
                tracing::debug!("Assistant started speaking");
                self.set_speaking(true);
            }
            VoiceEvent::SpeechEnd => {
                tracing::debug!("Assistant stopped speaking");
                self.set_speaking(false);
            }
            VoiceEvent::Transcript(message) => {
                self.transcript.push(message.clone());
                self.publish(SessionUpdate::Transcript(message));
            }
            VoiceEvent::Error(message) => {
                tracing::error!("Voice service error: {}", message);
            }
        }
    }

    async fn on_call_end(&mut self) {
        if let Err(e) = self.apply(CallTransition::CallEnded) {
            tracing::warn!("Ignoring call-end: {}", e);
            return;
        }
        self.awaiting_call_end = false;
        self.set_speaking(false);

        if !self.history_pending {
            return;
        }
        self.history_pending = false;
        let companion_id = self.companion.id.clone();
        match self.recorder.record_session(&companion_id).await {
            Ok(()) => self.publish(SessionUpdate::HistoryRecorded(companion_id)),
            Err(e) => tracing::error!("Failed to record session history: {}", e),
        }
    }
}
