//! Inbound frame handling: parse, validate, dispatch.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, instrument, warn};
use wsubus_rpc::{RpcResponse, parse_command, parse_request};

use super::connection::ClientConnection;
use crate::context::ServerContext;
use crate::dispatch::dispatch;
use crate::metrics::{RPC_ERRORS_TOTAL, RPC_REQUESTS_TOTAL};

/// Handle one text frame.
///
/// Returns the response to send immediately. `None` means the command
/// answers asynchronously (a `call`).
#[instrument(skip_all, fields(conn_id = %conn.id, method))]
pub fn handle_message(
    text: &str,
    conn: &Arc<ClientConnection>,
    ctx: &Arc<ServerContext>,
) -> Option<RpcResponse> {
    let parsed = match parse_request(text).and_then(parse_command) {
        Ok(parsed) => parsed,
        Err(rejected) => {
            warn!(error = %rejected.error, "rejected request");
            counter!(RPC_ERRORS_TOTAL, "code" => rejected.error.code().to_string())
                .increment(1);
            return Some(RpcResponse::error(rejected.id, &rejected.error));
        }
    };

    let method = parsed.command.method_name();
    let _ = tracing::Span::current().record("method", method);
    debug!(id = %parsed.id, "dispatching request");
    counter!(RPC_REQUESTS_TOTAL, "method" => method).increment(1);

    let response = dispatch(parsed.id, parsed.command, conn, ctx);
    if let Some(body) = response.as_ref().and_then(|r| r.error.as_ref()) {
        counter!(RPC_ERRORS_TOTAL, "code" => body.code.to_string()).increment(1);
    }
    response
}
