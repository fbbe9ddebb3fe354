//! HTTP + WebSocket signal server implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, info, warn};

use cnrs_core::SignalError;

use crate::handler::{http_error_body, RequestHandler, Response};
use crate::messages::WsReply;
use crate::publisher::BroadcastHub;

/// Maximum accepted request head + body
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// How long a client may take to send its request head, and then its body
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Signal server state
pub struct SignalServer {
    handler: Arc<RequestHandler>,
    hub: Arc<BroadcastHub>,
}

impl SignalServer {
    pub fn new(handler: Arc<RequestHandler>, hub: Arc<BroadcastHub>) -> Self {
        Self { handler, hub }
    }

    /// Start the signal server
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signal server listening on {}", addr);
        self.serve_listener(listener).await
    }

    /// Accept connections from an already bound listener
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), std::io::Error> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let handler = self.handler.clone();
            let hub = self.hub.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, hub).await {
                    debug!("Connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }

    /// Open room channels (for monitoring)
    pub fn channel_count(&self) -> usize {
        self.hub.channel_count()
    }

    /// Live subscribers (for monitoring)
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<RequestHandler>,
    hub: Arc<BroadcastHub>,
) -> Result<(), BoxError> {
    let request = tokio::time::timeout(REQUEST_TIMEOUT, read_request_head(&mut stream)).await??;

    if request.is_websocket_upgrade() {
        return handle_websocket(stream, request, peer_addr, handler, hub).await;
    }

    handle_http_request(stream, request, &handler, &hub).await
}

/// A parsed HTTP/1.1 request
#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    /// Raw body bytes; holds whatever arrived after the head until the body is read
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"))
    }

    fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

fn parse_head(head: &[u8], rest: Vec<u8>) -> HttpRequest {
    let head = String::from_utf8_lossy(head);
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or("/").to_string();

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    HttpRequest {
        method,
        path,
        headers,
        body: rest,
    }
}

/// Read up to the end of the request head
async fn read_request_head(stream: &mut TcpStream) -> Result<HttpRequest, BoxError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() >= MAX_REQUEST_BYTES {
            return Err("request head too large".into());
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err("connection closed before request head".into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let rest = buf.split_off(head_end);
    Ok(parse_head(&buf, rest))
}

/// Read the rest of the body announced by Content-Length
async fn read_body(stream: &mut TcpStream, request: &mut HttpRequest) -> Result<(), BoxError> {
    let content_length = request.content_length();
    if content_length > MAX_REQUEST_BYTES {
        return Err("request body too large".into());
    }

    let mut chunk = [0u8; 1024];
    while request.body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        request.body.extend_from_slice(&chunk[..n]);
    }
    request.body.truncate(content_length);
    Ok(())
}

/// Handle a plain HTTP request: POST for room operations, GET for health
async fn handle_http_request(
    mut stream: TcpStream,
    mut request: HttpRequest,
    handler: &RequestHandler,
    hub: &BroadcastHub,
) -> Result<(), BoxError> {
    tokio::time::timeout(REQUEST_TIMEOUT, read_body(&mut stream, &mut request)).await??;

    let (status, content_type, body) = match (request.method.as_str(), request.path.as_str()) {
        ("POST", _) => {
            let outcome = match std::str::from_utf8(&request.body) {
                Ok(json) => handler.handle_json(json).await,
                Err(_) => Err(SignalError::MalformedRequest(
                    "request body is not valid UTF-8".to_string(),
                )),
            };
            match outcome {
                Ok(Response::Subscribe { .. }) => (
                    403,
                    "text/plain",
                    "Subscribe requires a WebSocket".to_string(),
                ),
                Ok(response) => (200, "text/plain", response.http_body()?),
                Err(e) => {
                    debug!("Rejected POST: {}", e);
                    (e.code().http_status(), "text/plain", http_error_body(&e))
                }
            }
        }
        ("GET", "/health") => (
            200,
            "application/json",
            format!(
                r#"{{"status":"healthy","channels":{},"subscribers":{}}}"#,
                hub.channel_count(),
                hub.subscriber_count()
            ),
        ),
        _ => (403, "text/plain", "Expected post request".to_string()),
    };

    write_response(&mut stream, status, content_type, &body).await
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) -> Result<(), BoxError> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason_phrase(status),
        content_type,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// 101 reply completing the WebSocket opening handshake
fn switching_protocols(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        derive_accept_key(key.as_bytes())
    )
}

/// Serve requests and room events over one WebSocket
async fn handle_websocket(
    mut stream: TcpStream,
    request: HttpRequest,
    peer_addr: SocketAddr,
    handler: Arc<RequestHandler>,
    hub: Arc<BroadcastHub>,
) -> Result<(), BoxError> {
    let Some(key) = request.header("sec-websocket-key") else {
        return write_response(&mut stream, 400, "text/plain", "Missing Sec-WebSocket-Key").await;
    };
    stream.write_all(switching_protocols(key).as_bytes()).await?;

    let ws_stream =
        WebSocketStream::from_partially_read(stream, request.body, Role::Server, None).await;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let conn_id = generate_connection_id();
    debug!("New connection from {} as {}", peer_addr, conn_id);

    let mut events: Option<broadcast::Receiver<String>> = None;

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("WebSocket error: {:?}", e);
                        break;
                    }
                };

                let reply = match handler.handle_json(&text).await {
                    Ok(Response::Subscribe { room_name }) => {
                        events = Some(hub.subscribe(&room_name));
                        info!("Connection {} subscribed to room {}", conn_id, room_name);
                        WsReply::Subscribed { room_name }
                    }
                    Ok(response) => response.ws_reply(),
                    Err(e) => WsReply::error(&e),
                };

                if ws_sender.send(Message::Text(reply.to_json()?)).await.is_err() {
                    break;
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(payload) => {
                        if ws_sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Connection {} lagged, skipped {} events", conn_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                }
            }
        }
    }

    debug!("Connection closed: {}", conn_id);
    Ok(())
}

/// Next event of the current subscription; pending forever without one
async fn next_event(
    events: &mut Option<broadcast::Receiver<String>>,
) -> Result<String, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Generate a connection ID for logging
fn generate_connection_id() -> String {
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return "unknown".to_string();
    }
    hex::encode(bytes)
}
