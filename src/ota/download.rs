//! Chunked ranged download into the receive file.
//!
//! One connection, one chunk in flight.  Network-level failures back off,
//! rebuild the connection in place and retry the same chunk; everything
//! else aborts the download.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, FirmwarePal, RangeClient};
use crate::config::OtaConfig;
use crate::error::{Classify, HttpError, OtaError};

use super::plan::{ByteRange, ChunkPlan};
use super::transfer::FileTransfer;
use super::url::ImageLocation;

/// An image whose size is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub location: ImageLocation,
    pub total_size: u32,
}

pub struct Downloader<'a> {
    cfg: &'a OtaConfig,
}

impl<'a> Downloader<'a> {
    pub fn new(cfg: &'a OtaConfig) -> Self {
        Self { cfg }
    }

    /// Fetch every chunk of `request` and hand it to `transfer`.
    ///
    /// `client` must be connected to `request.location.host` and
    /// `transfer` must be receiving `request.total_size` bytes.
    pub fn run<C, P, D, S>(
        &self,
        client: &mut C,
        delay: &mut D,
        transfer: &mut FileTransfer,
        pal: &mut P,
        request: &DownloadRequest,
        sink: &mut S,
    ) -> Result<(), OtaError>
    where
        C: RangeClient,
        P: FirmwarePal,
        D: DelayNs,
        S: EventSink,
    {
        let total = request.total_size;
        let every = self.cfg.progress_every_chunks.max(1);
        let mut buf = vec![0u8; self.cfg.chunk_size as usize];

        for (index, range) in ChunkPlan::new(total, self.cfg.chunk_size).enumerate() {
            let len = self.fetch_chunk(client, delay, &request.location, range, &mut buf)?;

            if index as u32 % every == every - 1 {
                let percent = (u64::from(range.start) * 100 / u64::from(total)) as u8;
                info!("OTA: progress {}%", percent);
                sink.emit(&AppEvent::OtaProgress {
                    percent,
                    offset: range.start,
                    total,
                });
            }

            transfer.write_chunk(pal, range.start, &buf[..len])?;
        }
        Ok(())
    }

    /// GET one range, retrying network failures.  Returns the body length.
    fn fetch_chunk<C: RangeClient, D: DelayNs>(
        &self,
        client: &mut C,
        delay: &mut D,
        location: &ImageLocation,
        range: ByteRange,
        buf: &mut [u8],
    ) -> Result<usize, OtaError> {
        let want = range.len() as usize;
        let capacity = buf.len();
        let body = buf
            .get_mut(..want)
            .ok_or(HttpError::BodyTooLarge { capacity })?;

        let mut retries_left = self.cfg.max_retries;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match client.get_range(&location.resource, range, body) {
                Ok(resp) if resp.status >= 400 => HttpError::Status(resp.status),
                Ok(resp) if resp.body_len != want => {
                    return Err(OtaError::UnexpectedBodyLength {
                        offset: range.start,
                        expected: range.len(),
                        received: resp.body_len as u32,
                    });
                }
                Ok(_) => return Ok(want),
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!("HTTP: range {}-{} failed: {}", range.start, range.end, err);
                return Err(err.into());
            }
            if retries_left == 0 {
                error!(
                    "HTTP: range {}-{} failed after {} attempts: {}",
                    range.start, range.end, attempts, err
                );
                return Err(OtaError::RetriesExhausted {
                    offset: range.start,
                    attempts,
                });
            }

            warn!(
                "HTTP: range {}-{} failed ({}), reconnecting",
                range.start, range.end, err
            );
            delay.delay_ms(self.cfg.retry_backoff_ms);
            client.disconnect();
            if let Err(e) = client.connect(&location.host) {
                // The next attempt reports NotConnected and spends a retry.
                warn!("HTTP: reconnect to {} failed: {}", location.host, e);
            }
            retries_left -= 1;
        }
    }
}
