use crate::error::GatewayError;

/// The fixed 24-byte client connection preface that opens an h2c
/// connection.
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const FRAME_HEADER_LEN: usize = 9;
const FRAME_TYPE_HEADERS: u8 = 0x1;
const FLAG_END_HEADERS: u8 = 0x4;
const FLAG_PADDED: u8 = 0x8;
const FLAG_PRIORITY: u8 = 0x20;

pub struct Http2Destination {
    pub destination: String,
}

/// Decodes frames following the 24-byte preface looking for the first
/// HEADERS frame, skipping any frames (e.g. SETTINGS) that precede it.
///
/// `buffer` starts immediately after the preface. Returns `Ok(None)` when
/// there isn't yet enough data buffered to make a decision — the caller
/// should read more and retry.
pub fn decode_headers_frame(buffer: &[u8]) -> Result<Option<Http2Destination>, GatewayError> {
    let mut offset = 0usize;

    loop {
        if buffer.len() < offset + FRAME_HEADER_LEN {
            return Ok(None);
        }

        let header = &buffer[offset..offset + FRAME_HEADER_LEN];
        let length = ((header[0] as usize) << 16) | ((header[1] as usize) << 8) | header[2] as usize;
        let frame_type = header[3];
        let flags = header[4];

        let payload_start = offset + FRAME_HEADER_LEN;
        let payload_end = payload_start + length;
        if buffer.len() < payload_end {
            return Ok(None);
        }

        if frame_type != FRAME_TYPE_HEADERS {
            offset = payload_end;
            continue;
        }

        if flags & FLAG_END_HEADERS == 0 {
            // CONTINUATION frames aren't handled; treat as unavailable.
            return Err(GatewayError::Protocol("HTTP/2 HEADERS frame not fully available"));
        }

        let mut payload = &buffer[payload_start..payload_end];

        if flags & FLAG_PADDED != 0 {
            if payload.is_empty() {
                return Err(GatewayError::Protocol("malformed HTTP/2 HEADERS frame"));
            }
            let pad_len = payload[0] as usize;
            payload = &payload[1..];
            if pad_len > payload.len() {
                return Err(GatewayError::Protocol("malformed HTTP/2 HEADERS frame"));
            }
            payload = &payload[..payload.len() - pad_len];
        }

        if flags & FLAG_PRIORITY != 0 {
            if payload.len() < 5 {
                return Err(GatewayError::Protocol("malformed HTTP/2 HEADERS frame"));
            }
            payload = &payload[5..];
        }

        let destination = extract_destination(payload)?;
        return Ok(Some(Http2Destination { destination }));
    }
}

fn extract_destination(header_block: &[u8]) -> Result<String, GatewayError> {
    let mut decoder = hpack::Decoder::new();
    let headers = decoder
        .decode(header_block)
        .map_err(|_| GatewayError::Protocol("failed to HPACK-decode HTTP/2 headers"))?;

    let mut authority = None;
    let mut scheme = None;

    for (name, value) in &headers {
        match name.as_slice() {
            b":authority" => authority = Some(String::from_utf8_lossy(value).into_owned()),
            b":scheme" => scheme = Some(String::from_utf8_lossy(value).into_owned()),
            _ => {}
        }
    }

    let authority = authority.ok_or(GatewayError::Protocol("HTTP/2 request missing :authority"))?;
    let scheme = scheme.unwrap_or_else(|| "http".to_string());

    if authority.contains(':') {
        Ok(authority)
    } else {
        let default_port = if scheme == "https" { 443 } else { 80 };
        Ok(format!("{authority}:{default_port}"))
    }
}
