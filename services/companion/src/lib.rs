pub mod config;
pub mod identity;
pub mod voice_adapter;
