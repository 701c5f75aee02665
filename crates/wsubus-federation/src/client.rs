//! WebSocket driver for federation links.
//!
//! [`FederationClient::run`] keeps one peer mirrored for the lifetime of
//! the process: connect, drive a [`FederationLink`] until the socket ends
//! or the session fails, terminate it, wait, reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wsubus_core::{Bus, MAX_INFLIGHT};

use crate::errors::FederationError;
use crate::link::FederationLink;
use crate::session::Credentials;

/// WebSocket subprotocol spoken by bridges.
pub const WS_SUBPROTOCOL: &str = "ubus-json";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Settings for one peer.
#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// `ws://` or `wss://` URL of the peer's WebSocket endpoint.
    pub url: String,
    /// Login credentials.
    pub credentials: Credentials,
    /// Proxied calls in flight at once.
    pub max_inflight: usize,
    /// Delay between connection attempts.
    pub reconnect_interval: Duration,
}

impl PeerConfig {
    /// Peer with default credentials and limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: Credentials::default(),
            max_inflight: MAX_INFLIGHT,
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// Mirrors one peer onto the local bus.
pub struct FederationClient {
    config: PeerConfig,
    bus: Arc<dyn Bus>,
}

impl FederationClient {
    /// Create a client. Nothing happens until [`run`](Self::run).
    pub fn new(config: PeerConfig, bus: Arc<dyn Bus>) -> Self {
        Self { config, bus }
    }

    /// Peer URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and reconnect until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            match self.run_once(&shutdown).await {
                Ok(()) => {}
                Err(e) => warn!(url = %self.config.url, error = %e, "federation link ended"),
            }
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.reconnect_interval) => {}
            }
        }
        debug!(url = %self.config.url, "federation client stopped");
    }

    /// One connection lifetime. Returns `Ok` only when stopped by
    /// `shutdown`.
    #[instrument(skip_all, fields(url = %self.config.url))]
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<(), FederationError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FederationError::InvalidUrl {
                url: self.config.url.clone(),
                reason: e.to_string(),
            })?;
        let peer = request
            .uri()
            .host()
            .ok_or_else(|| FederationError::InvalidUrl {
                url: self.config.url.clone(),
                reason: "no host".into(),
            })?
            .to_owned();
        let _ = request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(WS_SUBPROTOCOL),
        );

        let (ws, _response) = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            connected = connect_async(request) => {
                connected.map_err(|e| FederationError::Transport(e.to_string()))?
            }
        };
        info!(peer = %peer, "connected to federation peer");

        let link = FederationLink::new(
            peer,
            self.config.credentials.clone(),
            Arc::clone(&self.bus),
            self.config.max_inflight,
        );
        let (mut write, mut read) = ws.split();

        let result: Result<(), FederationError> = async {
            link.establish()?;
            loop {
                flush(&link, &mut write).await?;
                tokio::select! {
                    () = shutdown.cancelled() => return Ok(()),
                    () = link.outbound_ready() => {}
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => link.handle_frame(&text)?,
                        Some(Ok(Message::Ping(data))) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| FederationError::Transport(e.to_string()))?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(FederationError::Disconnected);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(FederationError::Transport(e.to_string())),
                    },
                }
            }
        }
        .await;

        link.terminate();
        let _ = write.send(Message::Close(None)).await;
        result
    }
}

/// Write every queued frame.
async fn flush(link: &FederationLink, write: &mut WsSink) -> Result<(), FederationError> {
    while let Some(frame) = link.take_outbound() {
        write
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| FederationError::Transport(e.to_string()))?;
    }
    Ok(())
}
