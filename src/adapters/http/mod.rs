//! HTTPS range-client adapter.
//!
//! Implements [`RangeClient`] over a single keep-alive connection to the
//! image host.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` with the ESP-IDF
//!   certificate bundle attached, so pre-signed object-store URLs verify
//!   against the public CA set.
//! - **all other targets**: plaintext HTTP/1.1 over `std::net::TcpStream`
//!   for host-side testing against a local server.
//!
//! ## Error mapping
//!
//! Socket, TLS and timeout failures map to [`HttpError::Network`] (retryable);
//! a request with no session is [`HttpError::NotConnected`] (retryable).
//! Unparseable responses and oversized bodies or headers are fatal.

use core::time::Duration;

use log::{debug, info};

use crate::app::ports::{RangeClient, RangeResponse, CONTENT_RANGE_LEN};
use crate::config::OtaConfig;
use crate::error::HttpError;
use crate::ota::plan::ByteRange;
use crate::ota::url::HOST_LEN;

#[cfg(not(target_os = "espidf"))]
use std::io::{BufRead, BufReader, Read, Write};
#[cfg(not(target_os = "espidf"))]
use std::net::TcpStream;

#[cfg(target_os = "espidf")]
mod esp_impl;

/// Response headers larger than this are rejected.
pub const HEADER_BUFFER_LEN: usize = 2048;

// ───────────────────────────────────────────────────────────────
// HttpsRangeClient
// ───────────────────────────────────────────────────────────────

pub struct HttpsRangeClient {
    port: u16,
    timeout: Duration,
    host: heapless::String<HOST_LEN>,

    #[cfg(target_os = "espidf")]
    conn: Option<esp_idf_svc::http::client::EspHttpConnection>,

    #[cfg(not(target_os = "espidf"))]
    stream: Option<BufReader<TcpStream>>,
}

impl HttpsRangeClient {
    pub fn new(port: u16, timeout_ms: u32) -> Self {
        Self {
            port,
            timeout: Duration::from_millis(u64::from(timeout_ms)),
            host: heapless::String::new(),
            #[cfg(target_os = "espidf")]
            conn: None,
            #[cfg(not(target_os = "espidf"))]
            stream: None,
        }
    }

    pub fn from_config(cfg: &OtaConfig) -> Self {
        Self::new(cfg.https_port, cfg.connect_timeout_ms)
    }

    pub fn is_connected(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            self.conn.is_some()
        }
        #[cfg(not(target_os = "espidf"))]
        {
            self.stream.is_some()
        }
    }

    // ── ESP-IDF ───────────────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), HttpError> {
        self.conn = Some(esp_impl::esp_connect(self.timeout)?);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_get(
        &mut self,
        resource: &str,
        range: &str,
        body: &mut [u8],
    ) -> Result<RangeResponse, HttpError> {
        let conn = self.conn.as_mut().ok_or(HttpError::NotConnected)?;
        let uri = format!("https://{}:{}{}", self.host, self.port, resource);
        esp_impl::esp_get_range(conn, &uri, range, body)
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        self.conn = None;
    }

    // ── Simulation ────────────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), HttpError> {
        use std::net::ToSocketAddrs;

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| HttpError::Network)?
            .next()
            .ok_or(HttpError::Network)?;
        let stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(|_| HttpError::Network)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|_| HttpError::Network)?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_get(
        &mut self,
        resource: &str,
        range: &str,
        body: &mut [u8],
    ) -> Result<RangeResponse, HttpError> {
        let reader = self.stream.as_mut().ok_or(HttpError::NotConnected)?;
        let request = format!(
            "GET {resource} HTTP/1.1\r\nHost: {}\r\nRange: {range}\r\nConnection: keep-alive\r\n\r\n",
            self.host
        );
        reader
            .get_mut()
            .write_all(request.as_bytes())
            .map_err(|_| HttpError::Network)?;

        let head = read_head(reader)?;
        let len = head.content_length.ok_or(HttpError::Protocol)?;

        if head.status >= 400 {
            // Drain the error body so the connection stays usable.
            std::io::copy(&mut reader.by_ref().take(len as u64), &mut std::io::sink())
                .map_err(|_| HttpError::Network)?;
            return Ok(RangeResponse {
                status: head.status,
                content_range: head.content_range,
                body_len: 0,
            });
        }
        if len > body.len() {
            return Err(HttpError::BodyTooLarge {
                capacity: body.len(),
            });
        }
        reader
            .read_exact(&mut body[..len])
            .map_err(|_| HttpError::Network)?;

        Ok(RangeResponse {
            status: head.status,
            content_range: head.content_range,
            body_len: len,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        if let Some(reader) = self.stream.take() {
            let _ = reader.get_ref().shutdown(std::net::Shutdown::Both);
        }
    }
}

impl RangeClient for HttpsRangeClient {
    fn connect(&mut self, host: &str) -> Result<(), HttpError> {
        self.platform_disconnect();
        self.host = heapless::String::try_from(host).map_err(|_| HttpError::HeaderTooLarge)?;
        self.platform_connect()?;
        info!("HTTP: connected to {}:{}", self.host, self.port);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.is_connected() {
            debug!("HTTP: disconnecting from {}", self.host);
        }
        self.platform_disconnect();
    }

    fn get_range(
        &mut self,
        resource: &str,
        range: ByteRange,
        body: &mut [u8],
    ) -> Result<RangeResponse, HttpError> {
        let header = range.header_value();
        let result = self.platform_get(resource, &header, body);
        if matches!(result, Err(HttpError::Network)) {
            // A broken session is useless; the caller reconnects.
            self.platform_disconnect();
        }
        result
    }
}

impl Drop for HttpsRangeClient {
    fn drop(&mut self) {
        self.platform_disconnect();
    }
}

// ───────────────────────────────────────────────────────────────
// Response head parsing
// ───────────────────────────────────────────────────────────────

/// Status line and the headers the range client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_length: Option<usize>,
    pub content_range: Option<heapless::String<CONTENT_RANGE_LEN>>,
}

/// Parse an HTTP/1.1 response head (status line plus header lines, no
/// trailing blank line required).
pub fn parse_head(head: &str) -> Result<ResponseHead, HttpError> {
    let mut lines = head.split("\r\n");
    let status_line = lines.next().ok_or(HttpError::Protocol)?;
    let mut parts = status_line.split_whitespace();
    match parts.next() {
        Some(v) if v.starts_with("HTTP/1.") => {}
        _ => return Err(HttpError::Protocol),
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(HttpError::Protocol)?;

    let mut out = ResponseHead {
        status,
        content_length: None,
        content_range: None,
    };
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(HttpError::Protocol)?;
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            out.content_length = Some(value.parse().map_err(|_| HttpError::Protocol)?);
        } else if name.eq_ignore_ascii_case("content-range") {
            out.content_range =
                Some(heapless::String::try_from(value).map_err(|_| HttpError::HeaderTooLarge)?);
        }
    }
    Ok(out)
}

/// Read up to and including the blank line that ends a response head.
#[cfg(not(target_os = "espidf"))]
fn read_head<R: BufRead>(reader: &mut R) -> Result<ResponseHead, HttpError> {
    let mut head = Vec::with_capacity(256);
    loop {
        let before = head.len();
        let n = reader
            .read_until(b'\n', &mut head)
            .map_err(|_| HttpError::Network)?;
        if n == 0 {
            // Peer closed the keep-alive connection.
            return Err(HttpError::Network);
        }
        if head.len() > HEADER_BUFFER_LEN {
            return Err(HttpError::HeaderTooLarge);
        }
        if &head[before..] == b"\r\n" {
            break;
        }
    }
    let text = core::str::from_utf8(&head).map_err(|_| HttpError::Protocol)?;
    parse_head(text.trim_end_matches("\r\n"))
}
