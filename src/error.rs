//! Unified error types for the firmware.
//!
//! A single [`Error`] enum that every subsystem converts into, so the
//! application task handles failures uniformly.  All variants are `Copy`
//! and allocation-free.
//!
//! Transport and flash errors also carry a [`Disposition`]: the OTA
//! downloader asks the error whether it may reconnect and retry, rather
//! than deciding from status codes at each call site.

use core::fmt;

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// Whether a failed operation may be retried after reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient network condition: back off, reconnect, retry the same request.
    Retryable,
    /// Protocol, content or flash failure: abort the transfer.
    Fatal,
}

/// Classification of an error into [`Disposition`].
pub trait Classify {
    fn disposition(&self) -> Disposition;

    fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The firmware-update pipeline failed.
    Ota(OtaError),
    /// An inbound cloud message could not be decoded.
    Message(MessageError),
    /// An acknowledgement could not be published.
    Ack(AckError),
    /// Peripheral or service initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Message(e) => write!(f, "message: {e}"),
            Self::Ack(e) => write!(f, "ack: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    /// Connection dropped, timed out, or could not be (re)established.
    Network,
    /// A request was issued with no live connection (e.g. reconnect failed).
    NotConnected,
    /// Server answered with an error status (4xx / 5xx).
    Status(u16),
    /// Response was not parseable HTTP.
    Protocol,
    /// Response body does not fit the caller-supplied buffer.
    BodyTooLarge { capacity: usize },
    /// A header value exceeded its bounded buffer.
    HeaderTooLarge,
}

impl Classify for HttpError {
    fn disposition(&self) -> Disposition {
        match self {
            Self::Network | Self::NotConnected => Disposition::Retryable,
            _ => Disposition::Fatal,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Protocol => write!(f, "malformed HTTP response"),
            Self::BodyTooLarge { capacity } => {
                write!(f, "response body exceeds {capacity} byte buffer")
            }
            Self::HeaderTooLarge => write!(f, "response header too large"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flash platform-abstraction errors
// ---------------------------------------------------------------------------

/// Errors from the [`FirmwarePal`](crate::app::ports::FirmwarePal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalError {
    OutOfMemory,
    /// No receive file is open.
    NoActiveFile,
    RxFileCreateFailed,
    /// Image does not fit the update partition.
    RxFileTooLarge,
    WriteFailed,
    /// Image signature did not verify at close.
    SignatureCheckFailed,
    /// Signer certificate missing or unreadable.
    BadSignerCert,
    FileClose,
    FileAbort,
    /// Requested image state transition is not allowed.
    BadImageState,
    CommitFailed,
    RejectFailed,
    ActivateFailed,
}

impl Classify for PalError {
    fn disposition(&self) -> Disposition {
        Disposition::Fatal
    }
}

impl fmt::Display for PalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::NoActiveFile => write!(f, "no receive file open"),
            Self::RxFileCreateFailed => write!(f, "failed to create receive file"),
            Self::RxFileTooLarge => write!(f, "image too large for update partition"),
            Self::WriteFailed => write!(f, "flash write failed"),
            Self::SignatureCheckFailed => write!(f, "image signature check failed"),
            Self::BadSignerCert => write!(f, "signer certificate unreadable"),
            Self::FileClose => write!(f, "failed to close receive file"),
            Self::FileAbort => write!(f, "failed to abort receive file"),
            Self::BadImageState => write!(f, "invalid image state transition"),
            Self::CommitFailed => write!(f, "failed to commit image"),
            Self::RejectFailed => write!(f, "failed to reject image"),
            Self::ActivateFailed => write!(f, "failed to activate image"),
        }
    }
}

// ---------------------------------------------------------------------------
// OTA pipeline errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// Download URL could not be split into host and resource.
    InvalidUrl(&'static str),
    /// Fatal HTTP failure.
    Http(HttpError),
    /// Size probe response had no `Content-Range` header.
    MissingContentRange,
    /// `Content-Range` was not `bytes 0-0/<total>`.
    MalformedContentRange,
    /// Server reported a zero-length image.
    EmptyImage,
    ImageTooLarge { declared: u32, max: u32 },
    /// A chunk kept failing with network errors past the retry budget.
    RetriesExhausted { offset: u32, attempts: u32 },
    /// Server returned a body whose length does not match the range asked for.
    UnexpectedBodyLength { offset: u32, expected: u32, received: u32 },
    /// Flash layer accepted fewer bytes than it was given.
    ShortWrite { offset: u32, expected: u32, written: u32 },
    Pal(PalError),
    /// A transfer is already running.
    AlreadyInProgress,
    /// Operation requires an active receive.
    NotReceiving,
    NonSequential { expected: u32, got: u32 },
    /// Chunk would run past the declared image size.
    Overflow,
    IncompleteTransfer { expected: u32, written: u32 },
    /// Activation requested before a verified image is ready.
    NotValidated,
    /// Offered version is older than the running one and downgrades are off.
    DowngradeRejected,
    /// Image activation returned instead of resetting the device.
    ActivationReturned,
}

impl Classify for OtaError {
    fn disposition(&self) -> Disposition {
        match self {
            Self::Http(e) => e.disposition(),
            _ => Disposition::Fatal,
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(why) => write!(f, "invalid download URL: {why}"),
            Self::Http(e) => write!(f, "HTTP: {e}"),
            Self::MissingContentRange => write!(f, "could not obtain image size"),
            Self::MalformedContentRange => write!(f, "malformed Content-Range header"),
            Self::EmptyImage => write!(f, "image is empty"),
            Self::ImageTooLarge { declared, max } => {
                write!(f, "image of {declared} bytes exceeds maximum of {max}")
            }
            Self::RetriesExhausted { offset, attempts } => {
                write!(f, "chunk at {offset} failed after {attempts} attempts")
            }
            Self::UnexpectedBodyLength {
                offset,
                expected,
                received,
            } => write!(
                f,
                "chunk at {offset}: expected {expected} bytes, received {received}"
            ),
            Self::ShortWrite {
                offset,
                expected,
                written,
            } => write!(
                f,
                "expected to write {expected} bytes at {offset}, but wrote {written}"
            ),
            Self::Pal(e) => write!(f, "flash: {e}"),
            Self::AlreadyInProgress => write!(f, "update already in progress"),
            Self::NotReceiving => write!(f, "no active receive"),
            Self::NonSequential { expected, got } => {
                write!(f, "chunk offset {got} does not match expected {expected}")
            }
            Self::Overflow => write!(f, "chunk would exceed declared image size"),
            Self::IncompleteTransfer { expected, written } => {
                write!(f, "only {written} of {expected} bytes written")
            }
            Self::NotValidated => write!(f, "no verified image to activate"),
            Self::DowngradeRejected => write!(f, "downgrade rejected by policy"),
            Self::ActivationReturned => write!(f, "image activation returned without reset"),
        }
    }
}

impl From<HttpError> for OtaError {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

impl From<PalError> for OtaError {
    fn from(e: PalError) -> Self {
        Self::Pal(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

// ---------------------------------------------------------------------------
// Inbound message errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    /// Payload is not valid JSON for the C2D envelope.
    Json,
    /// A required field is absent.
    MissingField(&'static str),
    /// A field is longer than its bounded buffer.
    FieldTooLong(&'static str),
    /// A field is present but its value cannot be used.
    InvalidField(&'static str),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "invalid JSON payload"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::FieldTooLong(name) => write!(f, "field '{name}' too long"),
            Self::InvalidField(name) => write!(f, "field '{name}' invalid"),
        }
    }
}

impl From<MessageError> for Error {
    fn from(e: MessageError) -> Self {
        Self::Message(e)
    }
}

// ---------------------------------------------------------------------------
// Acknowledgement errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckError {
    /// The ack could not be serialised.
    Encode,
    /// The MQTT client refused or failed the publish.
    Publish,
    /// Ack topic does not fit its buffer.
    TopicTooLong,
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "ack encoding failed"),
            Self::Publish => write!(f, "ack publish failed"),
            Self::TopicTooLong => write!(f, "ack topic too long"),
        }
    }
}

impl From<AckError> for Error {
    fn from(e: AckError) -> Self {
        Self::Ack(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
