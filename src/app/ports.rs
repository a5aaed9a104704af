//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService / OtaUpdater (domain)
//! ```
//!
//! Driven adapters (HTTP client, flash, MQTT, LEDs, storage) implement these
//! traits.  The domain consumes them via generics, so the update pipeline
//! never touches sockets or flash directly and runs unchanged against mocks.
//!
//! Delays are not a port of their own: everything that waits takes an
//! [`embedded_hal::delay::DelayNs`].

use crate::config::SystemConfig;
use crate::error::{AckError, HttpError, PalError};
use crate::ota::image::{FileTransferContext, ImageState};
use crate::ota::plan::ByteRange;

use super::commands::Ack;

// ───────────────────────────────────────────────────────────────
// Range client port (driven adapter: domain → HTTPS server)
// ───────────────────────────────────────────────────────────────

/// Capacity of a captured `Content-Range` header value.
pub const CONTENT_RANGE_LEN: usize = 32;

/// Result of one ranged GET.  The body itself lands in the caller's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse {
    pub status: u16,
    /// Raw `Content-Range` header value, if the server sent one.
    pub content_range: Option<heapless::String<CONTENT_RANGE_LEN>>,
    /// Bytes of body written to the caller's buffer.
    pub body_len: usize,
}

/// A persistent HTTPS connection that can fetch byte ranges of one resource.
///
/// Implementations own exactly one connection.  Errors are classified by
/// [`Classify`](crate::error::Classify): network-level failures are
/// retryable, everything else is fatal.
pub trait RangeClient {
    /// Open a TLS session to `host`.  Replaces any existing session.
    fn connect(&mut self, host: &str) -> Result<(), HttpError>;

    /// Tear down the session.  Idempotent.
    fn disconnect(&mut self);

    /// `GET resource` with `Range: bytes=<start>-<end>`, reading the body
    /// into `body`.  Fails with [`HttpError::BodyTooLarge`] rather than
    /// truncating.
    fn get_range(
        &mut self,
        resource: &str,
        range: ByteRange,
        body: &mut [u8],
    ) -> Result<RangeResponse, HttpError>;
}

// ───────────────────────────────────────────────────────────────
// Firmware PAL port (driven adapter: domain → update partition)
// ───────────────────────────────────────────────────────────────

/// Flash platform abstraction for receiving and activating an image.
///
/// One receive file at a time.  The lifecycle is
/// `create_file_for_rx → write_block* → close_file → activate_new_image`,
/// with `abort` valid at any point after create.
pub trait FirmwarePal {
    /// Prepare the inactive slot for an image of `ctx.file_size` bytes.
    fn create_file_for_rx(&mut self, ctx: &FileTransferContext) -> Result<(), PalError>;

    /// Write `data` at `offset`.  Returns the number of bytes accepted,
    /// which callers must compare against `data.len()`.
    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<usize, PalError>;

    /// Finish the receive and verify the signature, if `ctx` carries one.
    fn close_file(&mut self, ctx: &FileTransferContext) -> Result<(), PalError>;

    /// Discard whatever was received so far.
    fn abort(&mut self) -> Result<(), PalError>;

    /// Select the new image and reset.  On real hardware this does not
    /// return on success.
    fn activate_new_image(&mut self) -> Result<(), PalError>;

    fn set_image_state(&mut self, state: ImageState) -> Result<(), PalError>;

    fn image_state(&self) -> ImageState;
}

// ───────────────────────────────────────────────────────────────
// Ack port (driven adapter: domain → MQTT)
// ───────────────────────────────────────────────────────────────

/// Publishes acknowledgements on the device's ack topic.
pub trait AckPort {
    fn send_ack(&mut self, ack: &Ack) -> Result<(), AckError>;
}

// ───────────────────────────────────────────────────────────────
// LED port (driven adapter: domain → board LEDs)
// ───────────────────────────────────────────────────────────────

/// The two user LEDs on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Red,
    Green,
}

pub trait LedPort {
    fn set_led(&mut self, led: Led, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Persistence
// ───────────────────────────────────────────────────────────────

/// The persisted [`SystemConfig`].
///
/// `save` runs [`SystemConfig::validate`] first and refuses out-of-range
/// values with [`ConfigError::ValidationFailed`].
pub trait ConfigPort {
    /// Stored configuration, or the defaults when nothing was stored yet.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

/// Small blobs (certificates, station credentials) grouped by namespace.
pub trait StoragePort {
    /// Copy the value into `buf` and return its length.  A value longer
    /// than `buf` is [`StorageError::TooLarge`].
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Removing an absent key succeeds.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

#[derive(Debug)]
pub enum ConfigError {
    /// The stored blob does not decode.
    Corrupted,
    /// Names the offending field and its accepted range.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    IoError,
    /// Stored value does not fit the caller's buffer.
    TooLarge,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::NotFound => "no such key",
            Self::Full => "partition full",
            Self::IoError => "storage I/O failure",
            Self::TooLarge => "value larger than buffer",
        })
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => f.write_str("stored config does not decode"),
            Self::ValidationFailed(why) => write!(f, "invalid config: {why}"),
            Self::StorageFull => f.write_str("no room to store config"),
            Self::IoError => f.write_str("config storage I/O failure"),
        }
    }
}
