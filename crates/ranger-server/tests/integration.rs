//! Full-stack tests: loader bring-up, wire protocols, connection admission,
//! and shutdown ordering against a real server on ephemeral ports.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use ranger_gateway::wire::{WireRequest, WireResponse, NATIVE_MAGIC, NATIVE_VERSION};
use ranger_server::{Loader, ServerConfig};

fn test_config(tmp: &tempfile::TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.data_dir = PathBuf::from(tmp.path());
    config.http.address = "127.0.0.1:0".into();
    config.jdbc.address = "127.0.0.1:0".into();
    config.native.address = "127.0.0.1:0".into();
    config
}

async fn started_loader(config: ServerConfig) -> Loader {
    let mut loader = Loader::new(config);
    loader.initialize().expect("initialize");
    loader.start().await.expect("start");
    loader
}

fn server_addr(loader: &Loader, protocol: &str) -> String {
    loader.get_gateway().unwrap().status().servers[protocol]
        .address
        .clone()
}

async fn send_frame(stream: &mut TcpStream, request: &WireRequest) {
    let payload = serde_json::to_vec(request).unwrap();
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&payload).await.unwrap();
    stream.flush().await.unwrap();
}

async fn recv_frame(stream: &mut TcpStream) -> WireResponse {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let mut payload = vec![0u8; u32::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut payload).await.unwrap();
    serde_json::from_slice(&payload).unwrap()
}

async fn query(stream: &mut TcpStream, sql: &str) -> WireResponse {
    send_frame(
        stream,
        &WireRequest {
            sql: sql.to_string(),
            database: String::new(),
            user: "tester".to_string(),
        },
    )
    .await;
    recv_frame(stream).await
}

#[tokio::test]
async fn test_sql_round_trip_over_jdbc_protocol() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut loader = started_loader(test_config(&tmp)).await;

    let addr = server_addr(&loader, "jdbc");
    let mut conn = TcpStream::connect(&addr).await.unwrap();

    let created = query(
        &mut conn,
        "CREATE TABLE events (id BIGINT PRIMARY KEY, label VARCHAR(16));",
    )
    .await;
    assert_eq!(created.status, "success", "{:?}", created.error);
    assert_eq!(created.message, "Table created successfully");

    let inserted = query(
        &mut conn,
        "INSERT INTO events (id, label) VALUES (1, 'open'), (2, 'close');",
    )
    .await;
    assert_eq!(inserted.message, "INSERT 2");

    let selected = query(&mut conn, "SELECT id, label FROM events ORDER BY id;").await;
    assert_eq!(selected.status, "success", "{:?}", selected.error);
    assert_eq!(selected.row_count, 2);
    assert_eq!(selected.columns, vec!["id", "label"]);
    assert_eq!(selected.data[0][0], serde_json::json!(1));

    // responses arrive in request order on one connection
    let shown = query(&mut conn, "SHOW TABLES;").await;
    assert_eq!(shown.columns, vec!["Table"]);
    assert!(shown.message.contains("default"));

    let failed = query(&mut conn, "SELECT * FROM missing;").await;
    assert_eq!(failed.status, "error");
    assert!(failed.error.is_some());

    drop(conn);
    loader.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_native_protocol_handshake() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut loader = started_loader(test_config(&tmp)).await;

    let addr = server_addr(&loader, "native");
    let mut conn = TcpStream::connect(&addr).await.unwrap();

    let mut hello = [0u8; 8];
    hello[0..4].copy_from_slice(&NATIVE_MAGIC.to_be_bytes());
    hello[4..8].copy_from_slice(&NATIVE_VERSION.to_be_bytes());
    conn.write_all(&hello).await.unwrap();

    let mut reply = [0u8; 8];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, hello);

    let response = query(&mut conn, "SHOW DATABASES;").await;
    assert_eq!(response.status, "success");
    assert_eq!(response.columns, vec!["Database"]);

    drop(conn);
    loader.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connection_admission_budget() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.max_connections = 2;
    let mut loader = started_loader(config).await;
    let gateway = loader.get_gateway().unwrap();

    let addr = server_addr(&loader, "jdbc");
    let mut first = TcpStream::connect(&addr).await.unwrap();
    let mut second = TcpStream::connect(&addr).await.unwrap();
    // a round trip pins each connection's budget slot
    query(&mut first, "SHOW DATABASES;").await;
    query(&mut second, "SHOW DATABASES;").await;
    assert_eq!(gateway.connection_stats().active, 2);

    // the third connection is refused with one error frame
    let mut third = TcpStream::connect(&addr).await.unwrap();
    let refused = recv_frame(&mut third).await;
    assert_eq!(refused.status, "error");
    assert!(refused.error.unwrap().contains("too many connections"));
    assert_eq!(gateway.connection_stats().active, 2);

    // closing one frees a slot
    drop(first);
    wait_for_active(&gateway, 1).await;
    let mut fourth = TcpStream::connect(&addr).await.unwrap();
    let ok = query(&mut fourth, "SHOW DATABASES;").await;
    assert_eq!(ok.status, "success");

    drop(second);
    drop(third);
    drop(fourth);
    wait_for_active(&gateway, 0).await;

    loader.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_connections_share_the_global_budget() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.max_connections = 1;
    let mut loader = started_loader(config).await;
    let gateway = loader.get_gateway().unwrap();

    // a held keep-alive HTTP connection occupies the single slot
    let http_addr = server_addr(&loader, "http");
    let mut http_conn = TcpStream::connect(&http_addr).await.unwrap();
    http_conn
        .write_all(b"GET /health HTTP/1.1\r\nHost: ranger\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 1024];
    let n = http_conn.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200"));
    assert_eq!(gateway.connection_stats().active, 1);

    // a jdbc connection is now refused by the shared budget
    let jdbc_addr = server_addr(&loader, "jdbc");
    let mut jdbc_conn = TcpStream::connect(&jdbc_addr).await.unwrap();
    let refused = recv_frame(&mut jdbc_conn).await;
    assert_eq!(refused.status, "error");
    assert!(refused.error.unwrap().contains("too many connections"));

    // so is a second HTTP connection, with a plain 503
    let mut second_http = TcpStream::connect(&http_addr).await.unwrap();
    let mut refusal = String::new();
    second_http.read_to_string(&mut refusal).await.unwrap();
    assert!(refusal.starts_with("HTTP/1.1 503"), "{refusal}");
    assert!(refusal.contains("too many connections"));

    // closing the keep-alive connection frees the slot for jdbc
    drop(http_conn);
    wait_for_active(&gateway, 0).await;
    let mut conn = TcpStream::connect(&jdbc_addr).await.unwrap();
    let ok = query(&mut conn, "SHOW DATABASES;").await;
    assert_eq!(ok.status, "success");

    drop(conn);
    drop(jdbc_conn);
    drop(second_http);
    loader.shutdown().await.unwrap();
}

async fn wait_for_active(gateway: &std::sync::Arc<ranger_gateway::Gateway>, expected: usize) {
    for _ in 0..100 {
        if gateway.connection_stats().active == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "connection counter stuck at {} (expected {expected})",
        gateway.connection_stats().active
    );
}

#[tokio::test]
async fn test_degraded_start_when_http_port_taken() {
    let tmp = tempfile::TempDir::new().unwrap();
    // occupy a port so the http bind fails
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = blocker.local_addr().unwrap().to_string();

    let mut config = test_config(&tmp);
    config.http.address = taken;
    let mut loader = started_loader(config).await;

    let status = loader.get_gateway().unwrap().status();
    assert!(status.started);
    assert!(!status.servers["http"].running);
    assert!(status.servers["http"].last_error.is_some());
    assert!(status.servers["jdbc"].running);
    assert!(status.servers["native"].running);

    // the surviving protocols still serve queries
    let addr = server_addr(&loader, "jdbc");
    let mut conn = TcpStream::connect(&addr).await.unwrap();
    let response = query(&mut conn, "SHOW DATABASES;").await;
    assert_eq!(response.status, "success");

    drop(conn);
    loader.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_http_health_and_query() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut loader = started_loader(test_config(&tmp)).await;

    let addr = server_addr(&loader, "http");
    let health = raw_http(&addr, "GET /health HTTP/1.1").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.contains("healthy"));

    let queried = raw_http(&addr, "POST /query?q=SHOW%20DATABASES; HTTP/1.1").await;
    assert!(queried.starts_with("HTTP/1.1 200"), "{queried}");
    assert!(queried.contains("\"Database\""));

    let missing_q = raw_http(&addr, "POST /query HTTP/1.1").await;
    assert!(missing_q.starts_with("HTTP/1.1 400"));

    let wrong_method = raw_http(&addr, "GET /query?q=SELECT%201; HTTP/1.1").await;
    assert!(wrong_method.starts_with("HTTP/1.1 405"));

    loader.shutdown().await.unwrap();
}

async fn raw_http(addr: &str, request_line: &str) -> String {
    let mut conn = TcpStream::connect(addr).await.unwrap();
    let request = format!("{request_line}\r\nHost: ranger\r\nConnection: close\r\n\r\n");
    conn.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    conn.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_persistence_across_restart() {
    let tmp = tempfile::TempDir::new().unwrap();

    let mut loader = started_loader(test_config(&tmp)).await;
    let addr = server_addr(&loader, "jdbc");
    let mut conn = TcpStream::connect(&addr).await.unwrap();
    query(&mut conn, "CREATE TABLE keep (id BIGINT);").await;
    query(&mut conn, "INSERT INTO keep (id) VALUES (7);").await;
    drop(conn);
    loader.shutdown().await.unwrap();

    // second process lifetime over the same data directory
    let mut loader = started_loader(test_config(&tmp)).await;
    let addr = server_addr(&loader, "jdbc");
    let mut conn = TcpStream::connect(&addr).await.unwrap();
    let selected = query(&mut conn, "SELECT id FROM keep;").await;
    assert_eq!(selected.status, "success", "{:?}", selected.error);
    assert_eq!(selected.row_count, 1);
    assert_eq!(selected.data[0][0], serde_json::json!(7));
    drop(conn);
    loader.shutdown().await.unwrap();
}
