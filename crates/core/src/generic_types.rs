use serde::{Deserialize, Serialize};

/// Who spoke a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
}

impl TranscriptMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }
}

/// Event categories the voice service can stream back to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageCategory {
    Transcript,
}

/// Which categories are delivered to the client and which to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPolicy {
    pub client_messages: Vec<MessageCategory>,
    pub server_messages: Vec<MessageCategory>,
}

impl Default for EventPolicy {
    // Transcripts to the client only; nothing server-side.
    fn default() -> Self {
        Self {
            client_messages: vec![MessageCategory::Transcript],
            server_messages: vec![],
        }
    }
}

/// Persona variables substituted into the assistant prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaVariables {
    pub subject: String,
    pub topic: String,
    pub style: String,
}

/// Everything the voice service needs to start a call with a companion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    pub name: String,
    pub voice: String,
    pub variable_values: PersonaVariables,
    #[serde(flatten)]
    pub events: EventPolicy,
}

/// Events a voice service delivers while a call is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    CallStart,
    CallEnd,
    SpeechStart,
    SpeechEnd,
    Transcript(TranscriptMessage),
    Error(String),
}
