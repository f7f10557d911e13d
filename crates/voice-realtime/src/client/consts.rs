pub const VOICE_API_KEY: &str = "VOICE_API_KEY";
pub const VOICE_URL: &str = "VOICE_URL";

pub const BASE_URL: &str = "ws://localhost:8787";
pub const CALL_PATH: &str = "call";

pub const AUTHORIZATION_HEADER: &str = "Authorization";
