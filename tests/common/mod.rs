//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use rewrite_proxy::config::ProxyConfig;
use rewrite_proxy::http::HttpServer;
use rewrite_proxy::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A canned upstream response.
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
    /// Sent as `Content-Length` instead of the body length (for `HEAD`).
    pub declared_length: Option<usize>,
}

impl MockResponse {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type", content_type.to_string())],
            body: body.into(),
            declared_length: None,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn declared_length(mut self, length: usize) -> Self {
        self.declared_length = Some(length);
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Start a raw TCP upstream. `handler` gets the request head (request line
/// and headers) and returns the response to send.
pub async fn start_backend<F>(handler: F) -> SocketAddr
where
    F: Fn(&str) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let response = handler(&String::from_utf8_lossy(&head));
                        let mut raw = format!("HTTP/1.1 {} Mock\r\n", response.status);
                        for (name, value) in &response.headers {
                            raw.push_str(&format!("{name}: {value}\r\n"));
                        }
                        raw.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n",
                            response.declared_length.unwrap_or(response.body.len())
                        ));

                        let mut bytes = raw.into_bytes();
                        bytes.extend_from_slice(&response.body);
                        let _ = socket.write_all(&bytes).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start the proxy on an ephemeral port in front of `upstream`.
pub async fn start_proxy(upstream: SocketAddr, search: &str, replace: &str) -> (SocketAddr, Shutdown) {
    start_proxy_with(upstream, search, replace, |_| {}).await
}

/// Like [`start_proxy`], with `configure` applied to the config first.
pub async fn start_proxy_with<F>(
    upstream: SocketAddr,
    search: &str,
    replace: &str,
    configure: F,
) -> (SocketAddr, Shutdown)
where
    F: FnOnce(&mut ProxyConfig),
{
    let mut config = ProxyConfig::default();
    config.upstream.url = format!("http://{upstream}");
    config.rewrite.search = search.to_string();
    config.rewrite.replace = replace.to_string();
    config.observability.metrics_enabled = false;
    configure(&mut config);

    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
