//! Messages exchanged with the voice assistant service over the call socket.

use std::collections::BTreeMap;

/// Assistant definition sent with `start`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantPayload {
    pub name: String,
    pub voice: String,
    /// Values substituted into the assistant's prompt template.
    pub variable_values: BTreeMap<String, String>,
    pub client_messages: Vec<String>,
    pub server_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Start { assistant: AssistantPayload },
    Stop,
    SetMuted { muted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Partial,
    Final,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEvent {
    /// `assistant` or `user`.
    pub role: String,
    pub transcript: String,
    #[serde(rename = "transcriptType")]
    pub transcript_type: TranscriptType,
}

impl TranscriptEvent {
    pub fn is_final(&self) -> bool {
        self.transcript_type == TranscriptType::Final
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    CallStart,
    CallEnd {
        #[serde(default)]
        reason: Option<String>,
    },
    SpeechStart,
    SpeechEnd,
    Transcript(TranscriptEvent),
    Error {
        message: String,
    },
    /// Emitted locally when the socket closes.
    Close {
        reason: Option<String>,
    },
}
