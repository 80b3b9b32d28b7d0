//! Loopback HTTP/1.1 server answering with canned replies, for tests of
//! the HTTP clients in this workspace.
//!
//! One request per connection (`Connection: close`). Every request head is
//! recorded so tests can check paths and headers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Path and query as sent on the request line.
    pub path: String,
    headers: Vec<(String, String)>,
}

impl Recorded {
    /// Returns a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the server sends back.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    chunks: Vec<Vec<u8>>,
    pause: Duration,
    content_length: Option<usize>,
}

impl Reply {
    /// A complete body sent at once.
    pub fn body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            chunks: vec![body.into()],
            pause: Duration::ZERO,
            content_length: None,
        }
    }

    /// A 200 body sent in pieces, pausing before each one.
    pub fn trickle(chunks: Vec<Vec<u8>>, pause: Duration) -> Self {
        Self {
            status: 200,
            chunks,
            pause,
            content_length: None,
        }
    }

    /// A 200 body that announces `announced` bytes and closes after `sent`.
    pub fn truncated(sent: impl Into<Vec<u8>>, announced: usize) -> Self {
        Self {
            status: 200,
            chunks: vec![sent.into()],
            pause: Duration::ZERO,
            content_length: Some(announced),
        }
    }
}

type Route = dyn Fn(&Recorded) -> Reply + Send + Sync;

/// A running server; stops when the test runtime shuts down.
pub struct TestServer {
    base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    /// Binds an ephemeral loopback port and serves `route` for every request.
    pub async fn start(route: impl Fn(&Recorded) -> Reply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route: Arc<Route> = Arc::new(route);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let route = route.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    serve(stream, route, recorded).await;
                });
            }
        });

        Self { base, requests }
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(mut stream: TcpStream, route: Arc<Route>, recorded: Arc<Mutex<Vec<Recorded>>>) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let reply = route(&request);
    recorded.lock().unwrap().push(request);

    let total: usize = reply.chunks.iter().map(Vec::len).sum();
    let head = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reply.content_length.unwrap_or(total)
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    for chunk in &reply.chunks {
        tokio::time::sleep(reply.pause).await;
        if stream.write_all(chunk).await.is_err() || stream.flush().await.is_err() {
            return;
        }
    }
    let _ = stream.shutdown().await;
}

/// Reads the request head and discards the body.
async fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let recorded = Recorded {
        method,
        path,
        headers,
    };

    if recorded
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        let mut body = buf.split_off(head_end);
        while !body.ends_with(b"0\r\n\r\n") {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
    } else {
        let body_len = recorded
            .header("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut remaining = body_len.saturating_sub(buf.len() - head_end);
        while remaining > 0 {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            remaining = remaining.saturating_sub(n);
        }
    }

    Some(recorded)
}
