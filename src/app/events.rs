//! Outbound application events.
//!
//! The application core emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, count them in tests,
//! forward them as telemetry.

use crate::error::OtaError;
use crate::ota::image::ImageState;

use super::commands::{Command, VersionString};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service started on firmware `version`; `image` is the boot-time
    /// state of the running image after self-test confirmation.
    Started {
        version: &'static str,
        image: ImageState,
    },

    /// A plain C2D command was executed (or refused).
    CommandHandled { command: Command, success: bool },

    /// An update to `version` is starting.
    OtaStarted { version: VersionString },

    /// Periodic download progress.
    OtaProgress { percent: u8, offset: u32, total: u32 },

    /// All `total` bytes are written and the image verified.
    OtaDownloaded { total: u32 },

    /// The offered version is already running; nothing was downloaded.
    OtaSkipped { version: VersionString },

    /// The update was abandoned; the device stays on its current image.
    OtaFailed(OtaError),
}
