use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

use crate::error::GatewayError;
use crate::guide::Guide;
use crate::peer::PeerWriter;
use crate::shortcut::Role;

use super::http2;
use super::ResolvedRoute;

/// Read cap while accumulating the first request: the sniffer assumes
/// one read normally carries the whole header, but loops rather than
/// trusting that blindly.
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Intercepting HTTP/1 + HTTP/2 proxy: derives the destination from the
/// first request on the wire.
pub struct HttpMap;

impl HttpMap {
    pub fn new() -> HttpMap {
        HttpMap
    }

    pub async fn find_route(
        &self,
        route_number: u64,
        guide: &Guide,
        client_read: &mut OwnedReadHalf,
        client_writer: Arc<PeerWriter>,
    ) -> Result<ResolvedRoute, GatewayError> {
        let buffer = accumulate_header(client_read).await?;

        if buffer.len() >= http2::PREFACE.len() && &buffer[..http2::PREFACE.len()] == http2::PREFACE {
            let rest = &buffer[http2::PREFACE.len()..];
            let decoded = http2::decode_headers_frame(rest)?
                .ok_or(GatewayError::Protocol("incomplete HTTP/2 HEADERS frame"))?;
            return self
                .connect_and_attach(route_number, guide, &decoded.destination, "", client_writer)
                .await;
        }

        let request = parse_http1_request(&buffer)?;

        if request.method == http::Method::CONNECT {
            let destination = request.uri.clone();
            let resolved = self
                .connect_and_attach(route_number, guide, &destination, &request.user_agent, client_writer.clone())
                .await?;
            let status = http::StatusCode::OK;
            client_writer
                .write_all(format!("HTTP/1.1 {} {}\r\nContent-Length: 0\r\n\r\n", status.as_str(), status.canonical_reason().unwrap_or("")).as_bytes())
                .await?;
            return Ok(resolved);
        }

        let destination = derive_destination(&request)?;
        let resolved = self
            .connect_and_attach(route_number, guide, &destination, &request.user_agent, client_writer)
            .await?;

        resolved.shortcut.take(Role::Client, &buffer).await?;

        Ok(resolved)
    }

    async fn connect_and_attach(
        &self,
        route_number: u64,
        guide: &Guide,
        destination: &str,
        signature: &str,
        client_writer: Arc<PeerWriter>,
    ) -> Result<ResolvedRoute, GatewayError> {
        let stream = TcpStream::connect(destination)
            .await
            .map_err(|source| GatewayError::Dial {
                addr: destination.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        let (server_read, server_write) = stream.into_split();
        let server_writer = Arc::new(PeerWriter::new(server_write));

        let shortcut = guide.find_shortcut(
            route_number,
            Role::Client,
            signature,
            client_writer,
            server_writer,
        );

        Ok(ResolvedRoute {
            server_read,
            shortcut,
        })
    }
}

struct ParsedRequest {
    method: http::Method,
    uri: String,
    host_header: Option<String>,
    user_agent: String,
}

async fn accumulate_header(client_read: &mut OwnedReadHalf) -> Result<Vec<u8>, GatewayError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = client_read.read(&mut chunk).await?;
        if n == 0 {
            return Err(GatewayError::Protocol("connection closed before headers completed"));
        }
        buffer.extend_from_slice(&chunk[..n]);

        if buffer.len() >= http2::PREFACE.len() && &buffer[..http2::PREFACE.len()] == http2::PREFACE {
            return Ok(buffer);
        }
        if has_complete_http1_header(&buffer) {
            return Ok(buffer);
        }
        if buffer.len() >= MAX_HEADER_BYTES {
            return Err(GatewayError::Protocol("header too large"));
        }
    }
}

fn has_complete_http1_header(buffer: &[u8]) -> bool {
    buffer.windows(4).any(|w| w == b"\r\n\r\n")
}

fn parse_http1_request(buffer: &[u8]) -> Result<ParsedRequest, GatewayError> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut headers);
    match request
        .parse(buffer)
        .map_err(|_| GatewayError::Protocol("malformed HTTP/1 request"))?
    {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(GatewayError::Protocol("incomplete HTTP/1 request"))
        }
    };

    let method = http::Method::from_bytes(
        request
            .method
            .ok_or(GatewayError::Protocol("HTTP/1 request missing method"))?
            .as_bytes(),
    )
    .map_err(|_| GatewayError::Protocol("HTTP/1 request has an invalid method"))?;
    let uri = request
        .path
        .ok_or(GatewayError::Protocol("HTTP/1 request missing URI"))?
        .to_string();

    let mut host_header = None;
    let mut user_agent = String::new();
    for header in request.headers.iter() {
        if header.name.eq_ignore_ascii_case("host") {
            host_header = std::str::from_utf8(header.value).ok().map(str::to_string);
        } else if header.name.eq_ignore_ascii_case("user-agent") {
            user_agent = std::str::from_utf8(header.value).unwrap_or("").to_string();
        }
    }

    Ok(ParsedRequest {
        method,
        uri,
        host_header,
        user_agent,
    })
}

fn derive_destination(request: &ParsedRequest) -> Result<String, GatewayError> {
    let scheme_default_port = |uri: &str| if uri.starts_with("https://") { 443 } else { 80 };

    // Absolute-form request-URI (proxy style) carries its own authority;
    // that authority wins even if a Host header names something else.
    if let Some(rest) = request.uri.strip_prefix("http://").or_else(|| request.uri.strip_prefix("https://")) {
        let authority = rest.split('/').next().unwrap_or(rest);
        if authority.contains(':') {
            return Ok(authority.to_string());
        }
        return Ok(format!("{authority}:{}", scheme_default_port(&request.uri)));
    }

    // Relative-form request-URI: no authority to parse, fall back to Host.
    if let Some(host) = &request.host_header {
        if host.contains(':') {
            return Ok(host.clone());
        }
        return Ok(format!("{host}:{}", scheme_default_port(&request.uri)));
    }

    Err(GatewayError::Protocol(
        "HTTP/1 request has neither an absolute URI nor a Host header",
    ))
}
