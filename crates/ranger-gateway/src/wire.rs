//! Shared binary wire plumbing for the JDBC-dialect and native protocols.
//!
//! Frames are a 4-byte big-endian length followed by a JSON payload. Within
//! a connection, requests are answered strictly in order. The native
//! protocol additionally opens with an 8-byte magic/version handshake.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ranger_core::{codes, QueryContext, QueryResult, RangerError, Result};
use ranger_engine::QueryEngine;

use crate::budget::ConnectionBudget;
use crate::protocol::ServerState;

/// Upper bound on a single frame payload.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Native protocol handshake magic (`RNGR`) and version.
pub const NATIVE_MAGIC: u32 = 0x524e_4752;
pub const NATIVE_VERSION: u32 = 1;

/// One SQL request on the binary protocols.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireRequest {
    pub sql: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
}

/// One response frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireResponse {
    pub status: String,
    pub columns: Vec<String>,
    pub data: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn success(result: QueryResult) -> Self {
        Self {
            status: "success".into(),
            columns: result.columns,
            data: result.rows,
            row_count: result.row_count,
            message: result.message,
            error: None,
        }
    }

    pub fn failure(err: &RangerError) -> Self {
        Self {
            status: "error".into(),
            columns: Vec::new(),
            data: Vec::new(),
            row_count: 0,
            message: String::new(),
            error: Some(err.to_string()),
        }
    }
}

/// Read one length-prefixed frame; `None` on clean end of stream.
pub async fn read_frame(stream: &mut TcpStream) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(e)),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(RangerError::new(
            codes::COMMON_INVALID_INPUT,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(io_error)?;
    Ok(Some(payload))
}

/// Write one length-prefixed frame.
pub async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> Result<()> {
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .map_err(io_error)?;
    stream.write_all(payload).await.map_err(io_error)?;
    stream.flush().await.map_err(io_error)
}

async fn write_response(stream: &mut TcpStream, response: &WireResponse) -> Result<()> {
    let payload = serde_json::to_vec(response).map_err(|e| {
        RangerError::new(codes::COMMON_INTERNAL, "failed to encode response frame").with_cause(e)
    })?;
    write_frame(stream, &payload).await
}

fn io_error(e: std::io::Error) -> RangerError {
    RangerError::new(codes::CLIENT_CONNECTION, "connection io failed").with_cause(e)
}

/// Accept loop shared by the binary protocol servers.
pub async fn run_listener(
    name: &'static str,
    listener: TcpListener,
    cancel: CancellationToken,
    state: Arc<ServerState>,
    engine: Arc<QueryEngine>,
    budget: ConnectionBudget,
    handshake: bool,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let engine = engine.clone();
                    let budget = budget.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        serve_connection(stream, peer.to_string(), engine, budget, cancel, handshake)
                            .await;
                    });
                }
                Err(e) => {
                    warn!(protocol = name, error = %e, "accept failed");
                }
            },
        }
    }
    state.set_stopped();
    debug!(protocol = name, "accept loop exited");
}

/// Serve one connection: admission, optional handshake, then one response
/// per request frame, in order.
async fn serve_connection(
    mut stream: TcpStream,
    peer: String,
    engine: Arc<QueryEngine>,
    budget: ConnectionBudget,
    cancel: CancellationToken,
    handshake: bool,
) {
    // Admission before any work; a refused connection gets one error frame.
    let _guard = match budget.try_acquire() {
        Ok(guard) => guard,
        Err(e) => {
            let _ = write_response(&mut stream, &WireResponse::failure(&e)).await;
            return;
        }
    };

    if handshake {
        if let Err(e) = perform_handshake(&mut stream).await {
            warn!(peer = %peer, error = %e, "handshake failed");
            return;
        }
    }

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read_frame(&mut stream) => frame,
        };
        let payload = match frame {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(e) => {
                debug!(peer = %peer, error = %e, "dropping connection");
                break;
            }
        };

        let response = match serde_json::from_slice::<WireRequest>(&payload) {
            Ok(request) => {
                let mut qctx = QueryContext::new(request.sql).with_user(request.user);
                qctx.database_name = request.database;
                qctx.client_address = peer.clone();
                match engine.execute_query(&cancel, &qctx).await {
                    Ok(result) => WireResponse::success(result),
                    Err(e) => WireResponse::failure(&e),
                }
            }
            Err(e) => WireResponse::failure(
                &RangerError::new(codes::COMMON_INVALID_INPUT, "malformed request frame")
                    .with_cause(e),
            ),
        };
        if write_response(&mut stream, &response).await.is_err() {
            break;
        }
    }
}

async fn perform_handshake(stream: &mut TcpStream) -> Result<()> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await.map_err(io_error)?;
    let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    if magic != NATIVE_MAGIC {
        return Err(RangerError::new(
            codes::COMMON_INVALID_INPUT,
            format!("bad native handshake magic: {magic:#x}"),
        ));
    }
    if version != NATIVE_VERSION {
        return Err(RangerError::new(
            codes::COMMON_UNSUPPORTED,
            format!("unsupported native protocol version {version}"),
        ));
    }
    let mut reply = [0u8; 8];
    reply[0..4].copy_from_slice(&NATIVE_MAGIC.to_be_bytes());
    reply[4..8].copy_from_slice(&NATIVE_VERSION.to_be_bytes());
    stream.write_all(&reply).await.map_err(io_error)?;
    Ok(())
}
