use anyhow::{Context, Result};
use async_trait::async_trait;
use companion_core::generic_types::{
    AssistantConfig, MessageCategory, Role, TranscriptMessage, VoiceEvent,
};
use companion_core::realtime_api::VoiceService;
use secrecy::ExposeSecret;
use std::collections::BTreeMap;
use tokio::sync::broadcast::error::RecvError;
use voice_realtime::VoiceClient;
use voice_realtime::types::{AssistantPayload, ServerMessage};

use crate::config::Config;

const EVENT_CAPACITY: usize = 128;
const CLIENT_CAPACITY: usize = 1024;

/// An adapter that implements the generic `VoiceService` trait for the `voice_realtime::Client`.
/// It is generic over `VoiceClient` so the socket can be mocked in tests.
pub struct VoiceAdapter<C: VoiceClient> {
    client: C,
    events_taken: bool,
}

impl VoiceAdapter<voice_realtime::Client> {
    pub fn new(config: &Config) -> Self {
        let client_config = voice_realtime::Config::builder()
            .with_base_url(&config.voice_url)
            .with_api_key(config.voice_api_key.expose_secret())
            .build();
        Self::with_client(voice_realtime::connect_with_config(
            CLIENT_CAPACITY,
            client_config,
        ))
    }
}

impl<C: VoiceClient> VoiceAdapter<C> {
    pub fn with_client(client: C) -> Self {
        Self {
            client,
            events_taken: false,
        }
    }
}

fn category_name(category: MessageCategory) -> &'static str {
    match category {
        MessageCategory::Transcript => "transcript",
    }
}

fn to_payload(config: AssistantConfig) -> AssistantPayload {
    let mut variable_values = BTreeMap::new();
    variable_values.insert("subject".to_string(), config.variable_values.subject);
    variable_values.insert("topic".to_string(), config.variable_values.topic);
    variable_values.insert("style".to_string(), config.variable_values.style);

    AssistantPayload {
        name: config.name,
        voice: config.voice,
        variable_values,
        client_messages: config
            .events
            .client_messages
            .into_iter()
            .map(|c| category_name(c).to_string())
            .collect(),
        server_messages: config
            .events
            .server_messages
            .into_iter()
            .map(|c| category_name(c).to_string())
            .collect(),
    }
}

/// Maps a wire message to a call event. Partial transcripts are dropped.
fn to_voice_event(message: ServerMessage) -> Option<VoiceEvent> {
    match message {
        ServerMessage::CallStart => Some(VoiceEvent::CallStart),
        ServerMessage::CallEnd { .. } | ServerMessage::Close { .. } => Some(VoiceEvent::CallEnd),
        ServerMessage::SpeechStart => Some(VoiceEvent::SpeechStart),
        ServerMessage::SpeechEnd => Some(VoiceEvent::SpeechEnd),
        ServerMessage::Transcript(event) if event.is_final() => {
            let role = if event.role == "assistant" {
                Role::Assistant
            } else {
                Role::User
            };
            Some(VoiceEvent::Transcript(TranscriptMessage::new(
                role,
                &event.transcript,
            )))
        }
        ServerMessage::Transcript(_) => None,
        ServerMessage::Error { message } => Some(VoiceEvent::Error(message)),
    }
}

#[async_trait]
impl<C: VoiceClient> VoiceService for VoiceAdapter<C> {
    async fn connect(&mut self, config: AssistantConfig) -> Result<()> {
        self.client
            .start(to_payload(config))
            .await
            .context("Adapter failed to start the voice call")
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.client
            .stop()
            .await
            .context("Adapter failed to stop the voice call")
    }

    fn is_muted(&self) -> bool {
        self.client.is_muted()
    }

    async fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.client.set_muted(muted).await
    }

    async fn events(&mut self) -> Result<tokio::sync::mpsc::Receiver<VoiceEvent>> {
        if self.events_taken {
            return Err(anyhow::anyhow!("voice event channel has already been taken"));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(EVENT_CAPACITY);
        let mut server_rx = self.client.server_events();

        tokio::spawn(async move {
            loop {
                let message = match server_rx.recv().await {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Voice adapter lagged, skipped {} messages", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Some(event) = to_voice_event(message) {
                    if tx.send(event).await.is_err() {
                        tracing::warn!("Voice event receiver dropped, stopping adapter task.");
                        break;
                    }
                }
            }
        });

        self.events_taken = true;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::generic_types::{EventPolicy, PersonaVariables};
    use mockall::mock;
    use voice_realtime::ServerRx;
    use voice_realtime::types::{TranscriptEvent, TranscriptType};

    mock! {
        pub VoiceClient {}
        #[async_trait]
        impl VoiceClient for VoiceClient {
            async fn start(&mut self, assistant: AssistantPayload) -> Result<()>;
            async fn stop(&mut self) -> Result<()>;
            fn is_muted(&self) -> bool;
            async fn set_muted(&mut self, muted: bool) -> Result<()>;
            fn server_events(&self) -> ServerRx;
        }
    }

    fn assistant_config() -> AssistantConfig {
        AssistantConfig {
            name: "Neura the Brainy Explorer".to_string(),
            voice: "female".to_string(),
            variable_values: PersonaVariables {
                subject: "science".to_string(),
                topic: "Neural Network of the Brain".to_string(),
                style: "formal".to_string(),
            },
            events: EventPolicy::default(),
        }
    }

    fn transcript(role: &str, text: &str, transcript_type: TranscriptType) -> ServerMessage {
        ServerMessage::Transcript(TranscriptEvent {
            role: role.to_string(),
            transcript: text.to_string(),
            transcript_type,
        })
    }

    #[tokio::test]
    async fn test_connect_sends_persona_payload() {
        // --- Arrange ---
        let mut mock_client = MockVoiceClient::new();
        mock_client
            .expect_start()
            .withf(|payload| {
                payload.name == "Neura the Brainy Explorer"
                    && payload.voice == "female"
                    && payload.variable_values.get("subject").map(String::as_str) == Some("science")
                    && payload.variable_values.get("style").map(String::as_str) == Some("formal")
                    && payload.client_messages == vec!["transcript".to_string()]
                    && payload.server_messages.is_empty()
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut adapter = VoiceAdapter::with_client(mock_client);

        // --- Act ---
        let result = adapter.connect(assistant_config()).await;

        // --- Assert ---
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let mut mock_client = MockVoiceClient::new();
        mock_client
            .expect_start()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let mut adapter = VoiceAdapter::with_client(mock_client);
        assert!(adapter.connect(assistant_config()).await.is_err());
    }

    #[tokio::test]
    async fn test_events_are_translated() {
        let (s_tx, _) = tokio::sync::broadcast::channel(16);
        let subscribe_tx = s_tx.clone();
        let mut mock_client = MockVoiceClient::new();
        mock_client
            .expect_server_events()
            .times(1)
            .returning(move || subscribe_tx.subscribe());

        let mut adapter = VoiceAdapter::with_client(mock_client);
        let mut events = adapter.events().await.unwrap();

        for message in [
            ServerMessage::CallStart,
            ServerMessage::SpeechStart,
            transcript("assistant", "Hel", TranscriptType::Partial),
            transcript("assistant", "Hello there", TranscriptType::Final),
            transcript("user", "Hi", TranscriptType::Final),
            ServerMessage::SpeechEnd,
            ServerMessage::Error {
                message: "glitch".to_string(),
            },
            ServerMessage::Close { reason: None },
        ] {
            s_tx.send(message).unwrap();
        }

        let mut received = vec![];
        for _ in 0..7 {
            received.push(events.recv().await.unwrap());
        }
        assert_eq!(
            received,
            vec![
                VoiceEvent::CallStart,
                VoiceEvent::SpeechStart,
                VoiceEvent::Transcript(TranscriptMessage::new(Role::Assistant, "Hello there")),
                VoiceEvent::Transcript(TranscriptMessage::new(Role::User, "Hi")),
                VoiceEvent::SpeechEnd,
                VoiceEvent::Error("glitch".to_string()),
                VoiceEvent::CallEnd,
            ]
        );
    }

    #[tokio::test]
    async fn test_events_can_only_be_taken_once() {
        let (s_tx, _) = tokio::sync::broadcast::channel::<ServerMessage>(4);
        let mut mock_client = MockVoiceClient::new();
        mock_client
            .expect_server_events()
            .times(1)
            .returning(move || s_tx.subscribe());

        let mut adapter = VoiceAdapter::with_client(mock_client);
        assert!(adapter.events().await.is_ok());
        assert!(adapter.events().await.is_err());
    }

    #[tokio::test]
    async fn test_mute_is_forwarded() {
        let mut mock_client = MockVoiceClient::new();
        mock_client
            .expect_set_muted()
            .with(mockall::predicate::eq(true))
            .times(1)
            .returning(|_| Ok(()));
        mock_client.expect_is_muted().return_const(true);

        let mut adapter = VoiceAdapter::with_client(mock_client);
        adapter.set_muted(true).await.unwrap();
        assert!(adapter.is_muted());
    }
}
