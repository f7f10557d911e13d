mod client;
pub mod types;

pub use client::config::{Config, ConfigBuilder};
pub use client::{Client, ServerRx, VoiceClient, connect, connect_with_config};
