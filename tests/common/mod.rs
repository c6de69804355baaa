//! Canned-response HTTP fixture for integration tests.
//!
//! A bare tokio TCP listener that speaks just enough HTTP/1.1 for reqwest:
//! routes are keyed by "METHOD /path", each holding either a sequence of
//! canned responses (the last one repeats) or a handler closure. Every hit
//! is recorded for assertions.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Artificial service delay before the response is written.
    pub delay: Duration,
}

impl CannedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body.as_bytes().to_vec())
    }
}

pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

type Handler = Box<dyn Fn(&ParsedRequest) -> CannedResponse + Send + Sync>;

enum Route {
    Canned(Vec<CannedResponse>, AtomicUsize),
    Dynamic(Handler),
}

#[derive(Default)]
pub struct TestServerBuilder {
    routes: HashMap<String, Route>,
}

impl TestServerBuilder {
    /// Register a sequence of responses for "METHOD /path". The last
    /// response repeats once the sequence is exhausted.
    pub fn route(mut self, key: &str, responses: Vec<CannedResponse>) -> Self {
        self.routes
            .insert(key.to_string(), Route::Canned(responses, AtomicUsize::new(0)));
        self
    }

    /// Register a handler closure for "METHOD /path".
    pub fn handler(
        mut self,
        key: &str,
        handler: impl Fn(&ParsedRequest) -> CannedResponse + Send + Sync + 'static,
    ) -> Self {
        self.routes
            .insert(key.to_string(), Route::Dynamic(Box::new(handler)));
        self
    }

    pub async fn start(self) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(self.routes);
        let hits = Arc::new(Mutex::new(Vec::new()));

        let loop_routes = routes.clone();
        let loop_hits = hits.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let routes = loop_routes.clone();
                let hits = loop_hits.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, routes, hits).await;
                });
            }
        });

        TestServer { addr, hits, handle }
    }
}

pub struct TestServer {
    addr: std::net::SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// All recorded hits as "METHOD /path".
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, key: &str) -> usize {
        self.hits().iter().filter(|h| h.as_str() == key).count()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    mut stream: tokio::net::TcpStream,
    routes: Arc<HashMap<String, Route>>,
    hits: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    // Connection: close below makes one request per connection.
    let request = match read_request(&mut stream).await? {
        Some(r) => r,
        None => return Ok(()),
    };

    let key = format!("{} {}", request.method, request.path);
    hits.lock().unwrap().push(key.clone());

    let response = match routes.get(&key) {
        Some(Route::Canned(responses, index)) => {
            let i = index.fetch_add(1, Ordering::SeqCst).min(responses.len() - 1);
            responses[i].clone()
        }
        Some(Route::Dynamic(handler)) => handler(&request),
        None => CannedResponse::new(404).with_body(b"not found".to_vec()),
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let reason = match response.status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Response",
    };
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason);
    let has_explicit_length = response
        .headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
    if !has_explicit_length {
        head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    }
    for (name, value) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("Connection: close\r\n\r\n");

    stream.write_all(head.as_bytes()).await?;
    if request.method != "HEAD" {
        stream.write_all(&response.body).await?;
    }
    stream.flush().await?;
    Ok(())
}

async fn read_request(
    stream: &mut tokio::net::TcpStream,
) -> std::io::Result<Option<ParsedRequest>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > 1 << 20 {
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("").to_string();

    let content_length = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .next()
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(ParsedRequest { method, path, body }))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
