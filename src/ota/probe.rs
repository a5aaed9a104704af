//! Image size probe.
//!
//! Object stores answer `Range: bytes=0-0` with
//! `Content-Range: bytes 0-0/<total>`, which is the only reliable way to
//! learn the size of a pre-signed object without a HEAD request.

use log::{debug, info};

use crate::app::ports::RangeClient;
use crate::error::{HttpError, OtaError};

use super::plan::ByteRange;
use super::url::ImageLocation;

const PREFIX: &str = "bytes 0-0/";

/// Longest header value parsed (18 characters).  Longer values are
/// rejected without looking at the digits.
pub const MAX_CONTENT_RANGE_LEN: usize = PREFIX.len() + 8;

/// Extract `<total>` from `bytes 0-0/<total>`.
pub fn parse_content_range(value: &str) -> Result<u32, OtaError> {
    if value.len() > MAX_CONTENT_RANGE_LEN {
        return Err(OtaError::MalformedContentRange);
    }
    let digits = value
        .strip_prefix(PREFIX)
        .ok_or(OtaError::MalformedContentRange)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OtaError::MalformedContentRange);
    }
    digits
        .parse::<u32>()
        .map_err(|_| OtaError::MalformedContentRange)
}

/// Ask the server for byte 0 and return the declared image size.
///
/// Requires a live connection on `client`.
pub fn probe_size<C: RangeClient>(
    client: &mut C,
    location: &ImageLocation,
    max_image_size: u32,
) -> Result<u32, OtaError> {
    let mut byte = [0u8; 1];
    let resp = client.get_range(&location.resource, ByteRange::FIRST_BYTE, &mut byte)?;
    if resp.status >= 400 {
        return Err(HttpError::Status(resp.status).into());
    }
    if resp.status != 206 {
        debug!("HTTP: probe status {}", resp.status);
    }

    let header = resp
        .content_range
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or(OtaError::MissingContentRange)?;
    info!("OTA: server reported range '{}'", header);

    let total = parse_content_range(header)?;
    if total == 0 {
        return Err(OtaError::EmptyImage);
    }
    if total > max_image_size {
        return Err(OtaError::ImageTooLarge {
            declared: total,
            max: max_image_size,
        });
    }
    Ok(total)
}
