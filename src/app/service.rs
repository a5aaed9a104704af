//! Application service: the hexagonal core.
//!
//! [`AppService`] decodes cloud-to-device messages, runs plain commands
//! against the board, gates and drives firmware updates, and acknowledges
//! every message that asked for it.  It owns the [`OtaUpdater`]; the
//! remaining ports are injected at call sites so the whole service runs
//! against mock adapters.
//!
//! ```text
//!  C2D payload ──▶ ┌──────────────────────────┐ ──▶ AckPort
//!                  │        AppService         │ ──▶ LedPort
//!                  │  commands · version gate  │ ──▶ EventSink
//!                  │        OtaUpdater         │
//!                  └──────────────────────────┘
//!                     RangeClient · FirmwarePal
//! ```

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::error::{Error, OtaError};
use crate::ota::updater::OtaUpdater;
use crate::ota::version::{classify, VersionDecision};

use super::commands::{Ack, AckId, AckKind, C2dMessage, Command, CommandText, OtaDirective};
use super::events::AppEvent;
use super::ports::{AckPort, EventSink, FirmwarePal, LedPort, RangeClient};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<C, P, D> {
    updater: OtaUpdater<C, P, D>,
    /// Version string of the running firmware.
    running_version: &'static str,
}

impl<C, P, D> AppService<C, P, D>
where
    C: RangeClient,
    P: FirmwarePal,
    D: DelayNs,
{
    pub fn new(updater: OtaUpdater<C, P, D>, running_version: &'static str) -> Self {
        Self {
            updater,
            running_version,
        }
    }

    pub fn updater(&self) -> &OtaUpdater<C, P, D> {
        &self.updater
    }

    pub fn updater_mut(&mut self) -> &mut OtaUpdater<C, P, D> {
        &mut self.updater
    }

    pub fn running_version(&self) -> &'static str {
        self.running_version
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Confirm the running image after a successful boot.
    pub fn start(&mut self, sink: &mut impl EventSink) -> Result<(), Error> {
        let image = self.updater.confirm_boot()?;
        sink.emit(&AppEvent::Started {
            version: self.running_version,
            image,
        });
        info!(
            "AppService started: firmware {} (image {:?})",
            self.running_version, image
        );
        Ok(())
    }

    // ── Message handling ──────────────────────────────────────

    /// Decode and act on one C2D payload.
    ///
    /// Errors are limited to undecodable payloads and acks that could not
    /// be published.  An undecodable request that carries an ack id is
    /// still acked as a failure.  A failed update is reported to the cloud
    /// through a failure ack and leaves the device on its current image.
    pub fn handle_message(
        &mut self,
        payload: &[u8],
        acks: &mut impl AckPort,
        leds: &mut impl LedPort,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let msg = match C2dMessage::parse(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("C2D: dropping message: {}", e);
                return Err(e.into());
            }
        };

        match msg {
            C2dMessage::Command {
                command,
                text,
                ack_id,
            } => self.handle_command(command, &text, ack_id.as_ref(), acks, leds, sink),
            C2dMessage::Ota(directive) => self.handle_ota(&directive, acks, sink),
            C2dMessage::Malformed {
                kind,
                ack_id,
                error,
            } => {
                warn!("C2D: rejecting undecodable request '{}': {}", ack_id, error);
                acks.send_ack(&Ack::new(&ack_id, kind, false, error))?;
                Err(error.into())
            }
            C2dMessage::Other { ct } => {
                info!("C2D: ignoring message type {}", ct);
                Ok(())
            }
        }
    }

    fn handle_command(
        &mut self,
        command: Command,
        text: &CommandText,
        ack_id: Option<&AckId>,
        acks: &mut impl AckPort,
        leds: &mut impl LedPort,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        info!("C2D: command '{}'", text);
        let (success, message) = match command {
            Command::Ping => (true, "OK"),
            Command::Led { led, on } => {
                leds.set_led(led, on);
                (true, "OK")
            }
            Command::Invalid(why) => (false, why),
            Command::Unknown => (false, "Not implemented"),
        };
        sink.emit(&AppEvent::CommandHandled { command, success });

        let Some(id) = ack_id else {
            info!("C2D: no ack requested for '{}'", text);
            return Ok(());
        };
        acks.send_ack(&Ack::new(id, AckKind::Command, success, message))?;
        Ok(())
    }

    fn handle_ota(
        &mut self,
        directive: &OtaDirective,
        acks: &mut impl AckPort,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let ack_id = directive.ack_id.as_ref();

        match classify(self.running_version, &directive.version) {
            VersionDecision::SameVersion => {
                info!("OTA: already running {}", directive.version);
                sink.emit(&AppEvent::OtaSkipped {
                    version: directive.version.clone(),
                });
                return Self::ack_ota(acks, ack_id, true, "Already running this version");
            }
            VersionDecision::Rollback if !self.updater.config().allow_downgrade => {
                warn!(
                    "OTA: refusing downgrade {} -> {}",
                    self.running_version, directive.version
                );
                return Self::fail_ota(OtaError::DowngradeRejected, acks, ack_id, sink);
            }
            VersionDecision::Rollback => {
                info!(
                    "OTA: downgrading {} -> {}",
                    self.running_version, directive.version
                );
            }
            VersionDecision::Upgrade => {
                info!(
                    "OTA: upgrading {} -> {}",
                    self.running_version, directive.version
                );
            }
        }

        if let Err(e) = self.updater.download(directive, sink) {
            return Self::fail_ota(e, acks, ack_id, sink);
        }

        let ack = ack_id.map(|id| Ack::new(id, AckKind::Ota, true, "OK"));
        let err = self.updater.activate(acks, ack.as_ref());
        // Only reached when the reset did not happen.  The success ack may
        // already be out, so no second ack is sent.
        error!("OTA: {}", err);
        sink.emit(&AppEvent::OtaFailed(err));
        Ok(())
    }

    fn fail_ota(
        err: OtaError,
        acks: &mut impl AckPort,
        ack_id: Option<&AckId>,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        error!("OTA: update failed: {}", err);
        sink.emit(&AppEvent::OtaFailed(err));
        Self::ack_ota(acks, ack_id, false, err)
    }

    fn ack_ota(
        acks: &mut impl AckPort,
        ack_id: Option<&AckId>,
        success: bool,
        message: impl core::fmt::Display,
    ) -> Result<(), Error> {
        if let Some(id) = ack_id {
            acks.send_ack(&Ack::new(id, AckKind::Ota, success, message))?;
        }
        Ok(())
    }
}
