//! Live SignalR transport: negotiate, connect, subscribe, read loop,
//! reconnect with exponential backoff.
//!
//! Mirrors the forwarder's `uplink::UplinkSession::connect` handshake shape,
//! generalized to the upstream's negotiate-then-websocket protocol instead
//! of a direct `ForwarderHello`.

use crate::ingress::Ingress;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use relay_protocol::SubscribeMessage;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};

const F1_BASE_HOST: &str = "livetiming.formula1.com/signalr";
const SIGNALR_HUB: &str = r#"[{"name":"Streaming"}]"#;
const USER_AGENT: &str = "Mozilla/5.0";
const ORIGIN: &str = "https://www.formula1.com";

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(5);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("negotiate request failed: {0}")]
    Negotiate(#[from] reqwest::Error),
    #[error("negotiate response carried no ConnectionToken")]
    MissingConnectionToken,
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Run the negotiate → connect → subscribe → listen loop forever, backing
/// off on every connection-class failure and resetting the delay after any
/// successful connect. Never returns except via the `shutdown` signal.
pub async fn run_live(ingress: &Ingress, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut retry_delay = INITIAL_RETRY_DELAY;

    loop {
        if *shutdown.borrow() {
            return;
        }

        match connect_and_listen(ingress, &mut shutdown).await {
            Ok(()) => {
                info!("websocket connection closed gracefully; reconnecting");
                retry_delay = INITIAL_RETRY_DELAY;
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?retry_delay, "connection error; retrying");
            }
        }

        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(retry_delay) => {}
            _ = shutdown.changed() => return,
        }
        retry_delay = next_retry_delay(retry_delay);
    }
}

/// Doubles the retry delay, capped at `MAX_RETRY_DELAY`.
fn next_retry_delay(current: Duration) -> Duration {
    (current * 2).min(MAX_RETRY_DELAY)
}

async fn connect_and_listen(
    ingress: &Ingress,
    shutdown: &mut tokio::sync::watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let hub_encoded = urlencoding::encode(SIGNALR_HUB);

    let client = reqwest::Client::new();
    let negotiate_url =
        format!("https://{F1_BASE_HOST}/negotiate?clientProtocol=1.5&connectionData={hub_encoded}");
    let negotiate: relay_protocol::NegotiateResponse = client
        .get(&negotiate_url)
        .header("User-Agent", USER_AGENT)
        .header("Origin", ORIGIN)
        .send()
        .await?
        .json()
        .await?;
    let token = negotiate
        .connection_token
        .ok_or(TransportError::MissingConnectionToken)?;

    let ws_url = format!(
        "wss://{F1_BASE_HOST}/connect?clientProtocol=1.5&transport=webSockets&connectionToken={}&connectionData={hub_encoded}",
        urlencoding::encode(&token),
    );

    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    let mut request = ws_url.into_client_request()?;
    request.headers_mut().insert("User-Agent", USER_AGENT.parse().unwrap());
    request.headers_mut().insert("Origin", ORIGIN.parse().unwrap());

    let (mut ws, _response) = tokio_tungstenite::connect_async(request).await?;
    info!("connected to upstream websocket");

    let subscribe = SubscribeMessage::streaming();
    let subscribe_json = serde_json::to_string(&subscribe).expect("SubscribeMessage always serializes");
    ws.send(Message::Text(subscribe_json.into())).await?;
    info!("subscribed to upstream feeds");

    loop {
        tokio::select! {
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let arrival = Utc::now();
                        if let Err(e) = ingress.handle_text_frame(&text, arrival).await {
                            warn!(error = %e, "dropped malformed text frame");
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        ingress.handle_binary_frame(&bytes, Utc::now()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(TransportError::Connect(e)),
                }
            }
            _ = shutdown.changed() => {
                let _ = ws.close(None).await;
                return Ok(());
            }
        }
    }
}
