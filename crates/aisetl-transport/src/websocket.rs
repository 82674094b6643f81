//! WebSocket session transport.
//!
//! A session carries framed binary requests (see [`crate::frame`]) over one
//! upgraded connection. Frames are processed strictly sequentially: the next
//! frame is not read until the previous response frame has been queued, so
//! response order always equals request order within a session. Errors are
//! answered as error frames and leave the session open; only transport
//! failures and client close end it.
//!
//! The server never initiates pings — the host drives liveness — and accepts
//! messages up to the configured maximum (16 GiB by default).

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use aisetl_core::{EtlError, EtlResult};

use crate::client::DirectPutOutcome;
use crate::frame::{self, WsRequest};
use crate::handler::invoke;
use crate::server::ServerState;

pub(crate) async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let max = state.config.max_ws_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| session(socket, state))
        .into_response()
}

async fn session(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    info!("WebSocket session established");

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                let reply = handle_frame(&state, data).await;
                if ws_tx.send(Message::Binary(reply)).await.is_err() {
                    warn!("Failed to send response frame, closing session");
                    break;
                }
            }
            Ok(Message::Text(_)) => {
                let reply = frame::encode_err("only binary frames are supported");
                if ws_tx.send(Message::Binary(reply)).await.is_err() {
                    break;
                }
            }
            // Pings are answered by the protocol layer; the host controls
            // keepalive.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("WebSocket session closed by client");
                break;
            }
            Err(e) => {
                warn!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    info!("WebSocket session ended");
}

async fn handle_frame(state: &ServerState, data: Bytes) -> Bytes {
    let len = data.len();
    match process_frame(state, data).await {
        Ok(payload) => {
            debug!(frame_len = len, "Frame transformed");
            frame::encode_ok(&payload)
        }
        Err(err) => {
            warn!(frame_len = len, code = err.code(), error = %err, "Frame failed");
            frame::encode_err(&err.to_string())
        }
    }
}

async fn process_frame(state: &ServerState, data: Bytes) -> EtlResult<Bytes> {
    let request = WsRequest::decode(data).map_err(|e| EtlError::ArgsInvalid {
        reason: e.to_string(),
    })?;

    let result = invoke(
        &state.transform,
        request.payload,
        &request.path,
        &request.etl_args,
    )
    .await?;

    let Some(url) = request.direct_put_url else {
        return Ok(result);
    };
    if !state.config.direct_put {
        return Err(EtlError::DirectPutFailed {
            url,
            reason: "direct put is not advertised by this deployment".to_string(),
        });
    }
    match state
        .client
        .direct_put(&url, state.transform.content_type(), result.clone())
        .await
    {
        DirectPutOutcome::Delivered => Ok(Bytes::new()),
        DirectPutOutcome::Unreachable(reason) => {
            // Nothing reached the target; hand the bytes back inline.
            warn!(
                url = %url,
                reason = %reason,
                code = "DIRECT_PUT_FAILED",
                "Direct-put target unreachable, returning payload in frame",
            );
            Ok(result)
        }
        DirectPutOutcome::Failed(reason) => Err(EtlError::DirectPutFailed { url, reason }),
    }
}
