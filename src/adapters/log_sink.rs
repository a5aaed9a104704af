//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { version, image } => {
                info!("START | firmware={} image={:?}", version, image);
            }
            AppEvent::CommandHandled { command, success } => {
                info!(
                    "CMD   | {:?} -> {}",
                    command,
                    if *success { "ok" } else { "failed" }
                );
            }
            AppEvent::OtaStarted { version } => {
                info!("OTA   | starting update to {}", version);
            }
            AppEvent::OtaProgress {
                percent,
                offset,
                total,
            } => {
                info!("OTA   | {:>3}% ({}/{} bytes)", percent, offset, total);
            }
            AppEvent::OtaDownloaded { total } => {
                info!("OTA   | {} bytes downloaded and verified", total);
            }
            AppEvent::OtaSkipped { version } => {
                warn!("OTA   | {} already running, skipped", version);
            }
            AppEvent::OtaFailed(e) => {
                error!("OTA   | failed: {}", e);
            }
        }
    }
}
