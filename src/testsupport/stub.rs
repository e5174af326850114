//! Canned-response HTTP backend shared by the inline test modules and the
//! integration suite (which pulls this file in via `#[path]`, since
//! `cfg(test)` items of the library are invisible to `tests/` binaries).

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One canned HTTP response served by [`StubServer`].
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
    /// Held before responding; lets tests overlap in-flight requests.
    pub delay: Duration,
}

/// Minimal canned-response HTTP/1.1 backend.
///
/// Serves one queued response per connection and records every request as
/// `"METHOD /path\n<body>"`. Requests beyond the queue get a 500 so tests
/// asserting "no network call" fail loudly.
pub struct StubServer {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Canned JSON response with no delay.
    pub fn json(status: u16, body: &str) -> StubResponse {
        StubResponse {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    /// Canned JSON response held for `delay` before being written.
    pub fn delayed_json(status: u16, body: &str, delay: Duration) -> StubResponse {
        StubResponse {
            status,
            body: body.to_string(),
            delay,
        }
    }

    /// Bind a local port and serve the queued responses in order.
    pub async fn start(responses: Vec<StubResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let port = listener.local_addr().expect("stub server addr").port();
        let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let task = tokio::spawn(async move {
            let mut queue = responses.into_iter();
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                recorded.lock().expect("request log lock").push(request);
                let response = queue.next().unwrap_or_else(|| StubResponse {
                    status: 500,
                    body: r#"{"message":"stub response queue exhausted"}"#.to_string(),
                    delay: Duration::ZERO,
                });
                if !response.delay.is_zero() {
                    tokio::time::sleep(response.delay).await;
                }
                let payload = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    response.status,
                    response.body.len(),
                    response.body
                );
                let _ = socket.write_all(payload.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            port,
            requests,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Stop serving and return the recorded requests in arrival order.
    pub async fn finish(self) -> Vec<String> {
        self.task.abort();
        let requests = self.requests.lock().expect("request log lock").clone();
        requests
    }
}

/// Read one HTTP request (headers plus content-length body) off the socket.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) => break buffer.len(),
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buffer) {
                    break pos;
                }
            }
            Err(_) => break buffer.len(),
        }
    };

    let headers = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    let mut body = buffer[header_end.min(buffer.len())..].to_vec();
    // Skip the blank-line delimiter if it made it into the body slice.
    if body.starts_with(b"\r\n\r\n") {
        body.drain(..4);
    }
    while body.len() < content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }

    let request_line = headers.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    format!("{method} {path}\n{}", String::from_utf8_lossy(&body))
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
}
