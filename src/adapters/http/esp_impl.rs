//! ESP-IDF HTTP client plumbing for [`HttpsRangeClient`](super::HttpsRangeClient).

use core::time::Duration;

use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use esp_idf_svc::http::Method;
use log::warn;

use crate::app::ports::RangeResponse;
use crate::error::HttpError;

use super::HEADER_BUFFER_LEN;

/// Build a connection that verifies servers against the CA bundle.
/// The TLS handshake happens on the first request.
pub(super) fn esp_connect(timeout: Duration) -> Result<EspHttpConnection, HttpError> {
    let config = Configuration {
        timeout: Some(timeout),
        buffer_size: Some(HEADER_BUFFER_LEN),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    EspHttpConnection::new(&config).map_err(|e| {
        warn!("HTTP: client init failed: {:?}", e);
        HttpError::Network
    })
}

pub(super) fn esp_get_range(
    conn: &mut EspHttpConnection,
    uri: &str,
    range: &str,
    body: &mut [u8],
) -> Result<RangeResponse, HttpError> {
    conn.initiate_request(
        Method::Get,
        uri,
        &[("Range", range), ("Connection", "keep-alive")],
    )
    .map_err(|e| {
        warn!("HTTP: request failed: {:?}", e);
        HttpError::Network
    })?;
    conn.initiate_response().map_err(|e| {
        warn!("HTTP: no response: {:?}", e);
        HttpError::Network
    })?;

    let status = conn.status();
    let content_range = match conn.header("Content-Range") {
        Some(v) => Some(heapless::String::try_from(v).map_err(|_| HttpError::HeaderTooLarge)?),
        None => None,
    };
    if status >= 400 {
        return Ok(RangeResponse {
            status,
            content_range,
            body_len: 0,
        });
    }

    let capacity = body.len();
    let mut filled = 0;
    loop {
        if filled == capacity {
            let mut extra = [0u8; 1];
            match conn.read(&mut extra) {
                Ok(0) => break,
                Ok(_) => return Err(HttpError::BodyTooLarge { capacity }),
                Err(_) => return Err(HttpError::Network),
            }
        }
        match conn.read(&mut body[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => {
                warn!("HTTP: body read failed after {} bytes: {:?}", filled, e);
                return Err(HttpError::Network);
            }
        }
    }

    Ok(RangeResponse {
        status,
        content_range,
        body_len: filled,
    })
}
