//! Lifecycle of one WebSocket client, from upgrade to disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wsubus_core::ConnectionId;

use super::connection::ClientConnection;
use super::handler::handle_message;
use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Why the outbound half stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterExit {
    /// The socket refused a write.
    SocketClosed,
    /// The client stopped answering pings.
    Unresponsive,
    /// Every sender was dropped.
    QueueClosed,
}

/// Serve one client until it disconnects, stops answering pings, or
/// `shutdown` fires.
///
/// Text and UTF-8 binary frames are dispatched as requests; responses and
/// events flow back through the connection's send queue. On exit the
/// connection's pending access checks and calls are canceled and its
/// subscriptions removed.
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: ConnectionId,
    ctx: Arc<ServerContext>,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(ctx.config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(
        conn_id.clone(),
        send_tx,
        ctx.config.max_inflight_calls,
    ));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    ctx.connections.add(Arc::clone(&connection));

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        ctx.config.clone(),
    ));

    loop {
        let msg = tokio::select! {
            () = shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
            exit = &mut writer => {
                debug!(?exit, "writer stopped");
                break;
            }
            msg = ws_rx.next() => msg,
        };
        let text = match msg {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                connection.mark_alive();
                continue;
            }
            Some(Ok(Message::Close(_))) => {
                info!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        };
        connection.mark_alive();
        if let Some(response) = handle_message(&text, &connection, &ctx) {
            if !connection.send_response(&response) {
                warn!("failed to enqueue response (queue full or closed)");
            }
        }
    }

    let canceled = connection.close();
    let removed = ctx.subscriptions.unsubscribe_all(&conn_id);
    let _ = ctx.connections.remove(&conn_id);
    writer.abort();

    info!(canceled_checks = canceled, subscriptions = removed, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS)
        .record(connection.connected_at.elapsed().as_secs_f64());
}

/// Forward queued frames to the socket and ping on every heartbeat tick.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    config: ServerConfig,
) -> WriterExit {
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    let exit = loop {
        tokio::select! {
            msg = send_rx.recv() => {
                let Some(text) = msg else { break WriterExit::QueueClosed };
                if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                    break WriterExit::SocketClosed;
                }
            }
            _ = heartbeat.tick() => {
                if !connection.check_alive()
                    && connection.last_pong_elapsed() > config.heartbeat_timeout
                {
                    warn!(
                        timeout = ?config.heartbeat_timeout,
                        "client unresponsive, disconnecting"
                    );
                    break WriterExit::Unresponsive;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break WriterExit::SocketClosed;
                }
            }
        }
    };
    let _ = ws_tx.send(Message::Close(None)).await;
    exit
}
