//! The uniform request pipeline shared by both HTTP verbs.
//!
//! Every inline request runs the same four stages: decode arguments, acquire
//! the payload (exactly one source: request body, target fetch, or local
//! file), invoke the transform (on the blocking pool when it declares itself
//! blocking), and deliver the result (direct-put when requested and
//! advertised, inline otherwise).

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, future, stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use aisetl_core::{
    ArgType, ChunkReader, ChunkWriter, EtlError, EtlResult, ExecMode, PayloadStream, Transform,
    TransformError, TransformResult,
};

use crate::client::DirectPutOutcome;
use crate::payload;
use crate::server::ServerState;

/// Reserved request header carrying the direct-put target URL.
///
/// Exactly one header is reserved for this purpose; the name itself is a
/// deploy-time contract between host and transformer.
pub const DIRECT_PUT_HEADER: &str = "x-etl-direct-put";

/// Reserved request header overriding the payload source with a local path.
pub const FQN_HEADER: &str = "x-etl-fqn";

/// Which side carries the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// The transformer fetches the object from the host target.
    Pull,
    /// The host sends the object as the request body.
    Push,
}

// =============================================================================
// Axum handlers
// =============================================================================

pub(crate) async fn handle_get(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<HashMap<String, String>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    process(state, Mode::Pull, uri, params, headers, None).await
}

pub(crate) async fn handle_put(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<HashMap<String, String>>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    process(state, Mode::Push, uri, params, headers, Some(body)).await
}

async fn process(
    state: Arc<ServerState>,
    mode: Mode,
    uri: Uri,
    params: HashMap<String, String>,
    headers: HeaderMap,
    body: Option<Body>,
) -> Response {
    let started = Instant::now();
    let object_path = uri.path().trim_start_matches('/').to_string();
    let etl_args = params.get("etl_args").cloned().unwrap_or_default();
    let direct_put_url = header_value(&headers, DIRECT_PUT_HEADER);
    let fqn_header = header_value(&headers, FQN_HEADER);

    let result = run(
        &state,
        mode,
        &object_path,
        &etl_args,
        direct_put_url.as_deref(),
        fqn_header.as_deref(),
        body,
    )
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(delivery) => {
            debug!(path = %object_path, args_len = etl_args.len(), elapsed_ms, "Transform complete");
            delivery.into_response()
        }
        Err(err) => {
            warn!(
                path = %object_path,
                args_len = etl_args.len(),
                elapsed_ms,
                code = err.code(),
                error = %err,
                "Request failed",
            );
            error_response(&err)
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Maps a classified error onto its HTTP response.
pub(crate) fn error_response(err: &EtlError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

// =============================================================================
// Pipeline
// =============================================================================

/// The result of a request, before it becomes an HTTP response.
pub(crate) enum Delivery {
    /// Buffered inline response.
    Inline { body: Bytes, content_type: String },
    /// Streaming inline response; `first` already left the transform.
    Stream {
        first: Bytes,
        rest: mpsc::Receiver<Bytes>,
        content_type: String,
    },
    /// Result was direct-put to the host-announced target; empty 200.
    Accepted,
}

impl Delivery {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted => StatusCode::OK.into_response(),
            Self::Inline { body, content_type } => {
                ([(header::CONTENT_TYPE, content_type)], body).into_response()
            }
            Self::Stream {
                first,
                rest,
                content_type,
            } => {
                let stream = stream::once(future::ready(Ok::<_, Infallible>(first)))
                    .chain(ReceiverStream::new(rest).map(Ok));
                Response::builder()
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from_stream(stream))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}

async fn run(
    state: &ServerState,
    mode: Mode,
    object_path: &str,
    etl_args: &str,
    direct_put_url: Option<&str>,
    fqn_header: Option<&str>,
    body: Option<Body>,
) -> EtlResult<Delivery> {
    // Exactly one payload source: an explicit FQN header wins, then the
    // request path when the deployment runs in FQN mode, then body or fetch.
    let fqn = match (fqn_header, mode, state.config.arg_type) {
        (Some(header), _, _) => Some(header.to_string()),
        (None, Mode::Pull, ArgType::Fqn) => Some(object_path.to_string()),
        _ => None,
    };

    if state.transform.wants_stream() && state.config.streaming_enabled() {
        run_streaming(state, mode, object_path, etl_args, direct_put_url, fqn, body).await
    } else {
        let payload = acquire_buffered(state, mode, object_path, fqn, body).await?;
        let result = invoke(&state.transform, payload, object_path, etl_args).await?;
        deliver(state, result, direct_put_url).await
    }
}

async fn acquire_buffered(
    state: &ServerState,
    mode: Mode,
    object_path: &str,
    fqn: Option<String>,
    body: Option<Body>,
) -> EtlResult<Bytes> {
    if let Some(fqn) = fqn {
        return payload::read_fqn(&state.config.fqn_root, &fqn).await;
    }
    match mode {
        Mode::Push => {
            let body = body.unwrap_or_else(Body::empty);
            axum::body::to_bytes(body, usize::MAX)
                .await
                .map_err(body_error)
        }
        Mode::Pull => {
            let resp = state.client.fetch(object_path).await?;
            let url = resp.url().to_string();
            resp.bytes().await.map_err(|e| EtlError::FetchFailed {
                url,
                reason: e.to_string(),
            })
        }
    }
}

fn body_error(err: impl std::fmt::Display) -> EtlError {
    EtlError::FetchFailed {
        url: "<request body>".to_string(),
        reason: err.to_string(),
    }
}

/// Runs the transform under its declared scheduling mode.
pub(crate) async fn invoke(
    transform: &Arc<dyn Transform>,
    payload: Bytes,
    path: &str,
    etl_args: &str,
) -> EtlResult<Bytes> {
    let result = match transform.exec_mode() {
        ExecMode::Cooperative => transform.transform(payload, path, etl_args).await,
        ExecMode::Blocking => {
            let transform = Arc::clone(transform);
            let path = path.to_string();
            let etl_args = etl_args.to_string();
            // Blocking transforms run their synchronous body on the blocking
            // pool; the thin async wrapper is driven to completion there.
            tokio::task::spawn_blocking(move || {
                futures::executor::block_on(transform.transform(payload, &path, &etl_args))
            })
            .await
            .map_err(|e| TransformError::failed(format!("transform task aborted: {e}")))?
        }
    };
    result.map_err(EtlError::from)
}

/// Direct-puts the result when requested and advertised, else responds inline.
pub(crate) async fn deliver(
    state: &ServerState,
    result: Bytes,
    direct_put_url: Option<&str>,
) -> EtlResult<Delivery> {
    let content_type = state.transform.content_type().to_string();
    if let Some(url) = direct_put_url
        && state.config.direct_put
    {
        match state
            .client
            .direct_put(url, &content_type, result.clone())
            .await
        {
            DirectPutOutcome::Delivered => return Ok(Delivery::Accepted),
            DirectPutOutcome::Unreachable(reason) => {
                // Nothing reached the target, so the inline body is still a
                // correct response.
                warn!(
                    url = %url,
                    reason = %reason,
                    code = "DIRECT_PUT_FAILED",
                    "Direct-put target unreachable, responding inline",
                );
            }
            DirectPutOutcome::Failed(reason) => {
                return Err(EtlError::DirectPutFailed {
                    url: url.to_string(),
                    reason,
                });
            }
        }
    }
    Ok(Delivery::Inline {
        body: result,
        content_type,
    })
}

// =============================================================================
// Streaming path
// =============================================================================

async fn run_streaming(
    state: &ServerState,
    mode: Mode,
    object_path: &str,
    etl_args: &str,
    direct_put_url: Option<&str>,
    fqn: Option<String>,
    body: Option<Body>,
) -> EtlResult<Delivery> {
    let stream = acquire_stream(state, mode, object_path, fqn, body).await?;
    let mut reader = ChunkReader::new(stream, state.config.chunk_size);
    let (mut writer, mut rx) = ChunkWriter::channel(16);

    let transform = Arc::clone(&state.transform);
    let path = object_path.to_string();
    let args = etl_args.to_string();
    let task: JoinHandle<TransformResult<()>> = match state.transform.exec_mode() {
        ExecMode::Cooperative => tokio::spawn(async move {
            transform
                .transform_stream(&mut reader, &mut writer, &path, &args)
                .await
        }),
        ExecMode::Blocking => tokio::task::spawn_blocking(move || {
            futures::executor::block_on(transform.transform_stream(
                &mut reader,
                &mut writer,
                &path,
                &args,
            ))
        }),
    };

    // The first chunk decides the response status: a transform that fails
    // before producing anything still gets a classified error response.
    match rx.recv().await {
        Some(first) => {
            if direct_put_url.is_some() && state.config.direct_put {
                // Direct put needs the complete result; collect the stream.
                let mut buf = BytesMut::from(&first[..]);
                while let Some(chunk) = rx.recv().await {
                    buf.extend_from_slice(&chunk);
                }
                finish_task(task).await?;
                deliver(state, buf.freeze(), direct_put_url).await
            } else {
                tokio::spawn(async move {
                    match task.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(error = %e, "Streaming transform failed mid-stream"),
                        Err(e) => warn!(error = %e, "Streaming transform task aborted"),
                    }
                });
                Ok(Delivery::Stream {
                    first,
                    rest: rx,
                    content_type: state.transform.content_type().to_string(),
                })
            }
        }
        None => {
            finish_task(task).await?;
            deliver(state, Bytes::new(), direct_put_url).await
        }
    }
}

async fn finish_task(task: JoinHandle<TransformResult<()>>) -> EtlResult<()> {
    match task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(EtlError::from(e)),
        Err(e) => Err(EtlError::from(TransformError::failed(format!(
            "transform task aborted: {e}"
        )))),
    }
}

async fn acquire_stream(
    state: &ServerState,
    mode: Mode,
    object_path: &str,
    fqn: Option<String>,
    body: Option<Body>,
) -> EtlResult<PayloadStream> {
    if let Some(fqn) = fqn {
        return payload::open_fqn_stream(&state.config.fqn_root, &fqn).await;
    }
    match mode {
        Mode::Push => {
            let body = body.unwrap_or_else(Body::empty);
            Ok(body
                .into_data_stream()
                .map(|item| item.map_err(body_error))
                .boxed())
        }
        Mode::Pull => {
            let resp = state.client.fetch(object_path).await?;
            let url = resp.url().to_string();
            Ok(resp
                .bytes_stream()
                .map(move |item| {
                    item.map_err(|e| EtlError::FetchFailed {
                        url: url.clone(),
                        reason: e.to_string(),
                    })
                })
                .boxed())
        }
    }
}
