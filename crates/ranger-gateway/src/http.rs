//! HTTP protocol server.
//!
//! Serves the query endpoint plus the catalog/table REST surface on a fixed
//! address. Connections are admitted against the shared gateway budget at
//! accept time, one slot per TCP connection held until the connection
//! closes, the same discipline as the binary protocols. All JSON responses
//! use `application/json`; timestamps are RFC-3339 in UTC. Errors map to
//! status codes by code package: `common.not_found` → 404,
//! `common.invalid_input` and `query.parse_failed` → 400, everything
//! else → 500.

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, info, warn};

use ranger_core::{codes, QueryContext, RangerError, Result, DEFAULT_DATABASE};
use ranger_engine::QueryEngine;

use crate::budget::{ConnectionBudget, ConnectionGuard};
use crate::protocol::{ProtocolServer, ProtocolStatus, ServerState};

/// Raw refusal written to a connection the budget rejects.
const REFUSAL_RESPONSE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
content-type: text/plain\r\n\
content-length: 20\r\n\
connection: close\r\n\r\ntoo many connections";

pub struct HttpServer {
    engine: Arc<QueryEngine>,
    budget: ConnectionBudget,
    addr: String,
    state: Arc<ServerState>,
    task: Mutex<Option<JoinHandle<()>>>,
    token: Mutex<Option<CancellationToken>>,
    bound_addr: Mutex<Option<String>>,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine>,
    cancel: CancellationToken,
}

impl HttpServer {
    pub fn new(engine: Arc<QueryEngine>, budget: ConnectionBudget, addr: String) -> Self {
        Self {
            engine,
            budget,
            addr,
            state: Arc::new(ServerState::default()),
            task: Mutex::new(None),
            token: Mutex::new(None),
            bound_addr: Mutex::new(None),
        }
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/query", post(handle_query))
            .route("/status", get(handle_status))
            .route("/info", get(handle_info))
            .route("/health", get(handle_health))
            .route("/api/v1/query/tables", get(handle_list_tables))
            .route(
                "/api/v1/namespaces/default/tables/:name/schema",
                get(handle_table_schema),
            )
            .route(
                "/api/v1/namespaces/default/tables/:name",
                delete(handle_drop_table),
            )
            .route(
                "/api/v1/catalog/namespaces",
                get(handle_list_namespaces).post(handle_create_namespace),
            )
            .route(
                "/api/v1/catalog/namespaces/:name",
                delete(handle_drop_namespace),
            )
            .route("/api/v1/import/parquet", post(handle_import_parquet))
            .with_state(state)
    }
}

#[async_trait]
impl ProtocolServer for HttpServer {
    fn name(&self) -> &'static str {
        "http"
    }

    fn address(&self) -> String {
        self.bound_addr
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_else(|| self.addr.clone())
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            let err = RangerError::new(
                codes::GATEWAY_HTTP_SERVER_CREATION_FAILED,
                format!("failed to bind http listener on {}", self.addr),
            )
            .with_cause(e);
            self.state.set_failed(err.to_string());
            err
        })?;

        if let Ok(local) = listener.local_addr() {
            *self.bound_addr.lock().unwrap_or_else(|p| p.into_inner()) = Some(local.to_string());
        }
        let app_state = AppState {
            engine: self.engine.clone(),
            cancel: cancel.clone(),
        };
        let router = Self::router(app_state);
        let addr = self.addr.clone();

        self.state.set_running();
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = Some(cancel.clone());
        info!(address = %addr, "http server listening");
        let handle = tokio::spawn(run_listener(
            listener,
            router,
            cancel,
            self.state.clone(),
            self.budget.clone(),
        ));
        *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(token) = self.token.lock().unwrap_or_else(|p| p.into_inner()).take() {
            token.cancel();
        }
        self.state.set_stopped();
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn status(&self) -> ProtocolStatus {
        self.state.status(&self.address())
    }
}

/// Accept loop: one budget slot per TCP connection, held until the
/// connection's service future completes.
async fn run_listener(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
    state: Arc<ServerState>,
    budget: ConnectionBudget,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let guard = match budget.try_acquire() {
                        Ok(guard) => guard,
                        Err(e) => {
                            debug!(peer = %peer, error = %e, "http connection refused");
                            tokio::spawn(refuse_connection(socket));
                            continue;
                        }
                    };
                    let router = router.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(serve_connection(socket, router, cancel, guard));
                }
                Err(e) => {
                    warn!(protocol = "http", error = %e, "accept failed");
                }
            },
        }
    }
    state.set_stopped();
    debug!(protocol = "http", "accept loop exited");
}

async fn refuse_connection(mut socket: TcpStream) {
    let _ = socket.write_all(REFUSAL_RESPONSE).await;
    let _ = socket.shutdown().await;
}

/// Serve one admitted connection; the guard releases its budget slot when
/// the connection is done.
async fn serve_connection(
    socket: TcpStream,
    router: Router,
    cancel: CancellationToken,
    guard: ConnectionGuard,
) {
    let _guard = guard;
    let io = TokioIo::new(socket);
    let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
        router.clone().oneshot(request)
    });
    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(io, service);
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = conn => {
            if let Err(e) = result {
                debug!(error = %e, "http connection ended with error");
            }
        }
    }
}

/// Status code for a structured error, by code package.
fn status_for(err: &RangerError) -> StatusCode {
    match err.code().as_str() {
        codes::COMMON_NOT_FOUND => StatusCode::NOT_FOUND,
        codes::COMMON_INVALID_INPUT | codes::QUERY_PARSE_FAILED => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: RangerError) -> Response {
    (status_for(&err), err.to_string()).into_response()
}

async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(sql) = params.get("q") else {
        return (StatusCode::BAD_REQUEST, "missing required parameter: q").into_response();
    };

    let qctx = QueryContext::new(sql.clone())
        .with_user(params.get("user").cloned().unwrap_or_default())
        .with_client_address("http");
    let qctx = match params.get("database") {
        Some(db) => qctx.with_database(db.clone()),
        None => qctx,
    };

    match state.engine.execute_query(&state.cancel, &qctx).await {
        Ok(result) => Json(json!({
            "status": "success",
            "query": sql,
            "rowCount": result.row_count,
            "columns": result.columns,
            "message": result.message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "data": result.rows,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_status() -> Json<serde_json::Value> {
    Json(json!({"status": "running", "server": "http"}))
}

async fn handle_info() -> Json<serde_json::Value> {
    Json(json!({
        "server": "ranger",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "http",
        "endpoints": [
            "POST /query",
            "GET /status",
            "GET /info",
            "GET /health",
            "GET /api/v1/query/tables",
            "GET /api/v1/namespaces/default/tables/{name}/schema",
            "DELETE /api/v1/namespaces/default/tables/{name}",
            "GET /api/v1/catalog/namespaces",
            "POST /api/v1/catalog/namespaces",
            "DELETE /api/v1/catalog/namespaces/{name}",
            "POST /api/v1/import/parquet",
        ],
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "server": "http",
    }))
}

async fn handle_list_tables(State(state): State<AppState>) -> Response {
    match state.engine.storage().list_tables(DEFAULT_DATABASE) {
        Ok(tables) => Json(json!({ "tables": tables })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_table_schema(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let registry = state.engine.metadata_manager();
    match registry.get_columns(DEFAULT_DATABASE, &name) {
        Ok(columns) if columns.is_empty() => error_response(RangerError::new(
            codes::COMMON_NOT_FOUND,
            format!("table {name:?} does not exist"),
        )),
        Ok(columns) => Json(json!({
            "columns": columns
                .iter()
                .map(|c| json!({"name": c.column_name, "type": c.data_type}))
                .collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_drop_table(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.engine.storage().drop_table(DEFAULT_DATABASE, &name, false) {
        Ok(_) => Json(json!({"dropped": name})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_list_namespaces(State(state): State<AppState>) -> Response {
    match state.engine.storage().list_databases() {
        Ok(names) => Json(json!({
            "namespaces": names.iter().map(|n| vec![n.clone()]).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct CreateNamespaceBody {
    namespace: String,
}

async fn handle_create_namespace(
    State(state): State<AppState>,
    Json(body): Json<CreateNamespaceBody>,
) -> Response {
    match state.engine.storage().create_database(&body.namespace) {
        Ok(()) => Json(json!({"namespace": body.namespace, "status": "created"})).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_drop_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.engine.storage().drop_database(&name) {
        Ok(()) => Json(json!({"namespace": name, "status": "dropped"})).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct ImportParquetBody {
    file_path: String,
    table_name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    overwrite: bool,
}

async fn handle_import_parquet(
    State(state): State<AppState>,
    Json(body): Json<ImportParquetBody>,
) -> Response {
    let namespace = body.namespace.as_deref().unwrap_or(DEFAULT_DATABASE);
    match state
        .engine
        .import_parquet(&body.file_path, &body.table_name, namespace, body.overwrite)
        .await
    {
        Ok(rows) => Json(json!({
            "table": body.table_name,
            "namespace": namespace,
            "imported_rows": rows,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let not_found = RangerError::new(codes::COMMON_NOT_FOUND, "x");
        assert_eq!(status_for(&not_found), StatusCode::NOT_FOUND);
        let invalid = RangerError::new(codes::COMMON_INVALID_INPUT, "x");
        assert_eq!(status_for(&invalid), StatusCode::BAD_REQUEST);
        let parse = RangerError::new(codes::QUERY_PARSE_FAILED, "x");
        assert_eq!(status_for(&parse), StatusCode::BAD_REQUEST);
        // everything else is a 500, package notwithstanding
        for code in [
            codes::QUERY_DATABASE_NOT_FOUND,
            codes::QUERY_NOT_FOUND,
            codes::STORAGE_TABLE_NOT_FOUND,
            codes::GATEWAY_TOO_MANY_CONNECTIONS,
        ] {
            let err = RangerError::new(code, "x");
            assert_eq!(status_for(&err), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
