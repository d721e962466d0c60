use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::peer::PeerWriter;

use super::Role;

/// Body size of a single uploaded block. The reference value for Azure's
/// fixed-size block-blob uploads; an `exitno > 0` on the shortcut's
/// configuration overrides it.
const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Bound on the FIFO of outstanding block descriptors — if the client
/// disappears mid-stream the cache must not grow without limit.
const CACHE_CAP: usize = 16;

#[derive(Debug, Clone)]
struct BlockDescriptor {
    content_length: u64,
    content_md5: String,
}

struct ClientState {
    /// Remaining bytes of the in-flight request body; 0 when idle.
    residual: u64,
    cache: VecDeque<BlockDescriptor>,
}

/// Synthesizes early `201 Created` responses for fixed-size block-blob
/// `PUT` uploads, suppressing the matching real server responses.
///
/// `block == true` (the `wormhole` config flag) puts the shortcut in
/// dry-run mode: parse and log, never inject a response or drop a real
/// one.
pub struct BlobUploadShortcut {
    route_number: u64,
    client: Arc<PeerWriter>,
    server: Arc<PeerWriter>,
    block_size: u64,
    block: bool,
    request_count: AtomicU64,
    response_count: AtomicU64,
    state: Mutex<ClientState>,
}

impl BlobUploadShortcut {
    pub fn new(
        route_number: u64,
        client: Arc<PeerWriter>,
        server: Arc<PeerWriter>,
        exitno: i64,
        wormhole: bool,
    ) -> BlobUploadShortcut {
        let block_size = if exitno > 0 {
            exitno as u64
        } else {
            DEFAULT_BLOCK_SIZE
        };
        BlobUploadShortcut {
            route_number,
            client,
            server,
            block_size,
            block: wormhole,
            request_count: AtomicU64::new(0),
            response_count: AtomicU64::new(0),
            state: Mutex::new(ClientState {
                residual: 0,
                cache: VecDeque::new(),
            }),
        }
    }

    pub async fn take(&self, role: Role, buffer: &[u8]) -> Result<usize, GatewayError> {
        match role {
            Role::Client => self.take_client(buffer).await,
            Role::Server => self.take_server(buffer).await,
        }
    }

    async fn take_client(&self, buffer: &[u8]) -> Result<usize, GatewayError> {
        if let Some(request) = parse_request(buffer) {
            if request.method == http::Method::PUT && request.content_length == Some(self.block_size) {
                if self.state.lock().await.cache.len() < CACHE_CAP {
                    return self.handle_new_request(buffer, &request).await;
                }
                log::warn!(
                    "route {}: blob-upload FIFO at capacity ({} entries), rejecting block and forwarding verbatim",
                    self.route_number,
                    CACHE_CAP
                );
            }
        }

        let residual = self.state.lock().await.residual;
        if residual != 0 {
            return self.handle_body_continuation(buffer).await;
        }

        self.server.write_all(buffer).await?;
        Ok(buffer.len())
    }

    async fn handle_new_request(
        &self,
        buffer: &[u8],
        request: &ParsedRequest,
    ) -> Result<usize, GatewayError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let body_tail = buffer.len() - request.header_len;
        let residual = request.content_length.unwrap_or(0).saturating_sub(body_tail as u64);

        {
            let mut state = self.state.lock().await;
            state.cache.push_back(BlockDescriptor {
                content_length: request.content_length.unwrap_or(0),
                content_md5: request.content_md5.clone().unwrap_or_default(),
            });
            state.residual = residual;
        }

        if residual == 0 {
            self.emit_synthesized_response().await?;
        }

        while self.response_count.load(Ordering::SeqCst) > 0 {
            let popped = {
                let mut state = self.state.lock().await;
                state.cache.pop_front()
            };
            if popped.is_none() {
                break;
            }
            self.request_count.fetch_sub(1, Ordering::SeqCst);
            self.response_count.fetch_sub(1, Ordering::SeqCst);
        }

        self.server.write_all(buffer).await?;
        Ok(buffer.len())
    }

    async fn handle_body_continuation(&self, buffer: &[u8]) -> Result<usize, GatewayError> {
        let done = {
            let mut state = self.state.lock().await;
            state.residual = state.residual.saturating_sub(buffer.len() as u64);
            state.residual == 0
        };
        if done {
            self.emit_synthesized_response().await?;
        }
        self.server.write_all(buffer).await?;
        Ok(buffer.len())
    }

    async fn take_server(&self, buffer: &[u8]) -> Result<usize, GatewayError> {
        if let Some(response) = parse_response(buffer) {
            if response.status == http::StatusCode::CREATED
                && !self.block
                && self.request_count.load(Ordering::SeqCst)
                    > self.response_count.load(Ordering::SeqCst)
            {
                self.response_count.fetch_add(1, Ordering::SeqCst);
                return Ok(buffer.len());
            }
        }
        self.client.write_all(buffer).await?;
        Ok(buffer.len())
    }

    async fn emit_synthesized_response(&self) -> Result<(), GatewayError> {
        if self.block {
            return Ok(());
        }
        let content_md5 = {
            let state = self.state.lock().await;
            state
                .cache
                .back()
                .map(|b| b.content_md5.clone())
                .unwrap_or_default()
        };
        let body = synthesize_201_response(&content_md5);
        self.client.write_all(&body).await
    }

    pub async fn shutdown(&self) {
        self.client.shutdown().await;
        self.server.shutdown().await;
    }
}

struct ParsedRequest {
    method: http::Method,
    content_length: Option<u64>,
    content_md5: Option<String>,
    header_len: usize,
}

fn parse_request(buffer: &[u8]) -> Option<ParsedRequest> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut request = httparse::Request::new(&mut headers);
    let status = request.parse(buffer).ok()?;
    let header_len = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return None,
    };

    let method = http::Method::from_bytes(request.method?.as_bytes()).ok()?;
    let mut content_length = None;
    let mut content_md5 = None;
    for header in request.headers.iter() {
        if header.name.eq_ignore_ascii_case("content-length") {
            content_length = std::str::from_utf8(header.value).ok()?.parse().ok();
        } else if header.name.eq_ignore_ascii_case("content-md5") {
            content_md5 = std::str::from_utf8(header.value).ok().map(str::to_string);
        }
    }

    Some(ParsedRequest {
        method,
        content_length,
        content_md5,
        header_len,
    })
}

struct ParsedResponse {
    status: http::StatusCode,
}

fn parse_response(buffer: &[u8]) -> Option<ParsedResponse> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(buffer).ok()? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return None,
    }
    Some(ParsedResponse {
        status: http::StatusCode::from_u16(response.code?).ok()?,
    })
}

fn synthesize_201_response(content_md5: &str) -> Vec<u8> {
    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    let request_id = new_request_id();

    let head = format!(
        "HTTP/1.1 201 Created\r\n\
         Transfer-Encoding: chunked\r\n\
         Content-MD5: {content_md5}\r\n\
         Server: Windows-Azure-Blob/1.0 Microsoft-HTTPAPI/2.0\r\n\
         x-ms-request-id: {request_id}\r\n\
         x-ms-version: 2016-05-31\r\n\
         x-ms-request-server-encrypted: true\r\n\
         Date: {date}\r\n\r\n0\r\n\r\n"
    );
    head.into_bytes()
}

fn new_request_id() -> String {
    // Fixed node id: only a fresh UUIDv1 per response is required here,
    // not MAC-derived uniqueness.
    const NODE_ID: [u8; 6] = [0x02, 0x42, 0xac, 0x11, 0x00, 0x02];
    uuid::Uuid::now_v1(&NODE_ID).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_with_matching_content_length_is_recognized() {
        let raw = b"PUT /block HTTP/1.1\r\nContent-Length: 10\r\nContent-MD5: abc==\r\n\r\n0123456789";
        let parsed = parse_request(raw).unwrap();
        assert_eq!(parsed.method, http::Method::PUT);
        assert_eq!(parsed.content_length, Some(10));
        assert_eq!(parsed.content_md5.as_deref(), Some("abc=="));
    }

    #[test]
    fn response_201_is_recognized() {
        let raw = b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n";
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.status, http::StatusCode::CREATED);
    }

    #[test]
    fn synthesized_response_carries_content_md5_and_required_headers() {
        let body = synthesize_201_response("abc==");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("HTTP/1.1 201 Created"));
        assert!(text.contains("Content-MD5: abc=="));
        assert!(text.contains("x-ms-version: 2016-05-31"));
        assert!(text.contains("GMT"));
    }

    #[tokio::test]
    async fn client_receives_201_before_forwarding_full_block() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client_listener.local_addr().unwrap();
        let server_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_listener.local_addr().unwrap();

        let (client_conn_fut, server_conn_fut) = (
            tokio::net::TcpStream::connect(client_addr),
            tokio::net::TcpStream::connect(server_addr),
        );
        let ((client_accept, _), (server_accept, _), mut client_observer, mut server_observer) = tokio::join!(
            async { client_listener.accept().await.unwrap() },
            async { server_listener.accept().await.unwrap() },
            async { client_conn_fut.await.unwrap() },
            async { server_conn_fut.await.unwrap() },
        );

        let client_writer = Arc::new(PeerWriter::new(client_accept.into_split().1));
        let server_writer = Arc::new(PeerWriter::new(server_accept.into_split().1));

        let shortcut = BlobUploadShortcut::new(1, client_writer, server_writer, 10, false);

        let request = b"PUT /block HTTP/1.1\r\nContent-Length: 10\r\nContent-MD5: abc==\r\n\r\n0123456789";
        shortcut.take(Role::Client, request).await.unwrap();

        let mut observed_on_server = vec![0u8; request.len()];
        server_observer.read_exact(&mut observed_on_server).await.unwrap();
        assert_eq!(&observed_on_server, request);

        let mut observed_on_client = [0u8; 5];
        client_observer.read_exact(&mut observed_on_client).await.unwrap();
        assert_eq!(&observed_on_client, b"HTTP/");

        assert_eq!(shortcut.request_count.load(Ordering::SeqCst), 1);
        assert_eq!(shortcut.response_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn request_past_cache_cap_is_rejected_and_forwarded_verbatim() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client_listener.local_addr().unwrap();
        let server_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_listener.local_addr().unwrap();

        let (client_conn_fut, server_conn_fut) = (
            tokio::net::TcpStream::connect(client_addr),
            tokio::net::TcpStream::connect(server_addr),
        );
        let ((client_accept, _), (server_accept, _), _client_observer, mut server_observer) = tokio::join!(
            async { client_listener.accept().await.unwrap() },
            async { server_listener.accept().await.unwrap() },
            async { client_conn_fut.await.unwrap() },
            async { server_conn_fut.await.unwrap() },
        );

        let client_writer = Arc::new(PeerWriter::new(client_accept.into_split().1));
        let server_writer = Arc::new(PeerWriter::new(server_accept.into_split().1));

        let shortcut = BlobUploadShortcut::new(1, client_writer, server_writer, 10, false);
        {
            let mut state = shortcut.state.lock().await;
            for _ in 0..CACHE_CAP {
                state.cache.push_back(BlockDescriptor {
                    content_length: 10,
                    content_md5: "stale==".to_string(),
                });
            }
        }
        shortcut.request_count.store(CACHE_CAP as u64, Ordering::SeqCst);

        let request = b"PUT /block HTTP/1.1\r\nContent-Length: 10\r\nContent-MD5: abc==\r\n\r\n0123456789";
        shortcut.take(Role::Client, request).await.unwrap();

        let mut observed_on_server = vec![0u8; request.len()];
        server_observer.read_exact(&mut observed_on_server).await.unwrap();
        assert_eq!(&observed_on_server, request);

        assert_eq!(shortcut.request_count.load(Ordering::SeqCst), CACHE_CAP as u64);
        assert_eq!(shortcut.state.lock().await.cache.len(), CACHE_CAP);
    }
}
