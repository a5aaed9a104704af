//! Firmware-update pipeline.
//!
//! ```text
//!  OtaDirective ─▶ version gate ─▶ url ─▶ probe ─▶ download ─▶ transfer ─▶ activate
//!                                           │          │           │
//!                                      RangeClient  RangeClient  FirmwarePal
//! ```
//!
//! Everything here is hardware-agnostic; the HTTPS client and the flash
//! PAL arrive as port implementations.

pub mod download;
pub mod image;
pub mod plan;
pub mod probe;
pub mod transfer;
pub mod updater;
pub mod url;
pub mod version;

pub use download::{DownloadRequest, Downloader};
pub use image::{FileTransferContext, ImageSignature, ImageState};
pub use plan::{ByteRange, ChunkPlan};
pub use transfer::{FileTransfer, TransferState};
pub use updater::OtaUpdater;
pub use url::ImageLocation;
pub use version::{classify, VersionDecision};
