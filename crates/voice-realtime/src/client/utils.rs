use crate::client::config::Config;
use crate::client::consts::{AUTHORIZATION_HEADER, CALL_PATH};
use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = format!("{}/{}", config.base_url(), CALL_PATH).into_client_request()?;
    let api_key = config.api_key().expose_secret();
    if !api_key.is_empty() {
        request.headers_mut().insert(
            AUTHORIZATION_HEADER,
            format!("Bearer {}", api_key).as_str().parse()?,
        );
    }
    Ok(request)
}
