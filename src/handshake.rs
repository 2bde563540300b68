//! The single HTTP Upgrade handshake accepted on `GET /jerry-debugger`
//! (§4.2, §6.3).
//!
//! There is no client-role handshake, no TLS, and no general-purpose
//! header parser: the request is read into a fixed 1024-byte buffer
//! until `\r\n\r\n`, the path and `Sec-WebSocket-Key` header are located
//! by hand instead of reaching for `httparse`, and any malformation
//! simply drops the socket without a response.

use base64::prelude::*;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

use crate::error::Error;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const EXPECTED_PATH: &str = "GET /jerry-debugger";
const KEY_HEADER: &str = "Sec-WebSocket-Key:";
pub const REQUEST_BUF_SIZE: usize = 1024;

const RESPONSE_HEAD: &str = "HTTP/1.1 101 Switching Protocols\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Accept: ";

/// RFC 6455 accept-key derivation: SHA-1 of `key || GUID`, Base64-encoded.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Block on `reader` accumulating bytes into `scratch` until the request
/// is complete (`\r\n\r\n` seen), then validate the request line and
/// extract `Sec-WebSocket-Key`. Returns the raw key value.
pub fn read_request<R: Read>(
    reader: &mut R,
    scratch: &mut [u8; REQUEST_BUF_SIZE],
) -> Result<String, Error> {
    let mut filled = 0usize;
    loop {
        if filled == scratch.len() {
            return Err(Error::HandshakeMalformed(
                "request did not fit in the 1024-byte buffer",
            ));
        }
        let n = reader.read(&mut scratch[filled..])?;
        if n == 0 {
            return Err(Error::HandshakeMalformed(
                "connection closed before the request completed",
            ));
        }
        filled += n;
        let text = String::from_utf8_lossy(&scratch[..filled]);
        if text.contains("\r\n\r\n") {
            return parse_request(&text);
        }
    }
}

fn parse_request(text: &str) -> Result<String, Error> {
    if !text.starts_with(EXPECTED_PATH) {
        return Err(Error::HandshakeMalformed(
            "request line is not GET /jerry-debugger",
        ));
    }
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(KEY_HEADER) {
            return Ok(rest.trim().to_string());
        }
    }
    Err(Error::HandshakeMalformed("Sec-WebSocket-Key header missing"))
}

/// Write the fixed `101 Switching Protocols` response.
pub fn write_response<W: Write>(writer: &mut W, accept: &str) -> Result<(), Error> {
    writer.write_all(RESPONSE_HEAD.as_bytes())?;
    writer.write_all(accept.as_bytes())?;
    writer.write_all(b"\r\n\r\n")?;
    Ok(())
}
