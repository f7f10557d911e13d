use crate::types::{AssistantPayload, ClientMessage, ServerMessage};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_tungstenite::tungstenite::Message;

pub(crate) mod config;
mod consts;
mod utils;

pub type ClientTx = tokio::sync::mpsc::Sender<ClientMessage>;
type ServerTx = tokio::sync::broadcast::Sender<ServerMessage>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerMessage>;

/// Operations a voice call client offers. Implemented by `Client`; adapters
/// depend on this so the socket can be swapped out.
#[async_trait]
pub trait VoiceClient: Send + Sync {
    /// Opens the call socket if needed and asks the service to start a call.
    async fn start(&mut self, assistant: AssistantPayload) -> Result<()>;

    /// Ends the call and closes the socket.
    async fn stop(&mut self) -> Result<()>;

    fn is_muted(&self) -> bool;

    async fn set_muted(&mut self, muted: bool) -> Result<()>;

    fn server_events(&self) -> ServerRx;
}

// The broadcast sender exists from construction so callers can subscribe
// before the socket is opened and never miss call-start. Each socket gets its
// own `open` flag and a generation; only the newest socket may broadcast.
pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_tx: ServerTx,
    open: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    muted: bool,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        let (s_tx, _) = tokio::sync::broadcast::channel(capacity);
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx,
            open: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            muted: false,
        }
    }

    fn is_open(&self) -> bool {
        self.c_tx.is_some() && self.open.load(Ordering::SeqCst)
    }

    async fn connect(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<ClientMessage>(self.capacity);
        self.c_tx = Some(c_tx);
        let open = Arc::new(AtomicBool::new(true));
        self.open = open.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = self.generation.clone();

        // Forward outgoing messages until every sender is dropped, then close.
        tokio::spawn(async move {
            while let Some(message) = c_rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize message: {}", e);
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close socket: {}", e);
            }
        });

        let s_tx = self.s_tx.clone();
        tokio::spawn(async move {
            let is_latest = || latest.load(Ordering::SeqCst) == generation;
            let mut call_ended = false;
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(event) => {
                            tracing::debug!("received message: {:?}", event);
                            if !is_latest() {
                                tracing::debug!("dropping message from superseded socket");
                                continue;
                            }
                            if matches!(event, ServerMessage::CallEnd { .. }) {
                                call_ended = true;
                            }
                            if let Err(e) = s_tx.send(event) {
                                tracing::error!("failed to send event: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize message: {}, text=> {:?}", e, text);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break;
                    }
                    _ => {}
                }
            }
            open.store(false, Ordering::SeqCst);
            // A close only stands in for call-end when the service sent none.
            if call_ended || !is_latest() {
                return;
            }
            let close = ServerMessage::Close { reason: None };
            if let Err(e) = s_tx.send(close) {
                tracing::debug!("no listeners for close event: {}", e);
            }
        });
        Ok(())
    }

    async fn send_message(&mut self, message: ClientMessage) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(message).await?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }
}

#[async_trait]
impl VoiceClient for Client {
    async fn start(&mut self, assistant: AssistantPayload) -> Result<()> {
        if !self.is_open() {
            self.c_tx = None;
            self.connect().await?;
        }
        self.muted = false;
        self.send_message(ClientMessage::Start { assistant }).await
    }

    async fn stop(&mut self) -> Result<()> {
        let result = self.send_message(ClientMessage::Stop).await;
        // Dropping the sender ends the writer task, which closes the socket.
        self.c_tx = None;
        result
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    async fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.send_message(ClientMessage::SetMuted { muted }).await?;
        self.muted = muted;
        Ok(())
    }

    fn server_events(&self) -> ServerRx {
        self.s_tx.subscribe()
    }
}

/// A client for the given endpoint. The socket opens on the first `start`.
pub fn connect_with_config(capacity: usize, config: config::Config) -> Client {
    Client::new(capacity, config)
}

/// A client configured from `VOICE_URL` / `VOICE_API_KEY`.
pub fn connect() -> Client {
    connect_with_config(1024, config::Config::new())
}
