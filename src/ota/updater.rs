//! OTA orchestration: download, verify, acknowledge, activate.
//!
//! [`OtaUpdater`] owns the HTTPS client, the flash PAL and the delay
//! provider for as long as it lives; no other code touches the update
//! connection or the inactive slot.

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::app::commands::{Ack, OtaDirective};
use crate::app::events::AppEvent;
use crate::app::ports::{AckPort, EventSink, FirmwarePal, RangeClient};
use crate::config::OtaConfig;
use crate::error::OtaError;

use super::download::{DownloadRequest, Downloader};
use super::image::{FileTransferContext, ImageState};
use super::probe::probe_size;
use super::transfer::{FileTransfer, TransferState};
use super::url::ImageLocation;

pub struct OtaUpdater<C, P, D> {
    client: C,
    pal: P,
    delay: D,
    transfer: FileTransfer,
    cfg: OtaConfig,
}

impl<C, P, D> OtaUpdater<C, P, D>
where
    C: RangeClient,
    P: FirmwarePal,
    D: DelayNs,
{
    pub fn new(client: C, pal: P, delay: D, cfg: OtaConfig) -> Self {
        Self {
            client,
            pal,
            delay,
            transfer: FileTransfer::new(),
            cfg,
        }
    }

    pub fn config(&self) -> &OtaConfig {
        &self.cfg
    }

    pub fn transfer_state(&self) -> TransferState {
        self.transfer.state()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn pal(&self) -> &P {
        &self.pal
    }

    pub fn pal_mut(&mut self) -> &mut P {
        &mut self.pal
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Fetch and verify the image offered by `directive`.
    ///
    /// On success the image is closed, verified and marked `Testing`, ready
    /// for [`activate`](Self::activate).  On any failure the receive file is
    /// discarded, the connection closed and the running image is untouched.
    pub fn download<S: EventSink>(
        &mut self,
        directive: &OtaDirective,
        sink: &mut S,
    ) -> Result<u32, OtaError> {
        let location = ImageLocation::parse(&directive.url)?;
        info!(
            "OTA: fetching '{}' v{} from {}",
            directive.file_name, directive.version, location.host
        );
        sink.emit(&AppEvent::OtaStarted {
            version: directive.version.clone(),
        });

        let result = self.fetch(location, directive.digest, sink);
        self.client.disconnect();
        if result.is_err() {
            self.transfer.abort(&mut self.pal);
        }
        result
    }

    fn fetch<S: EventSink>(
        &mut self,
        location: ImageLocation,
        digest: Option<[u8; 32]>,
        sink: &mut S,
    ) -> Result<u32, OtaError> {
        self.client.connect(&location.host)?;

        let total = probe_size(&mut self.client, &location, self.cfg.max_image_size)?;
        info!("OTA: image is {} bytes", total);

        let ctx = FileTransferContext::new(&self.cfg, total, digest);
        self.transfer.begin(&mut self.pal, ctx)?;

        let request = DownloadRequest {
            location,
            total_size: total,
        };
        Downloader::new(&self.cfg).run(
            &mut self.client,
            &mut self.delay,
            &mut self.transfer,
            &mut self.pal,
            &request,
            sink,
        )?;

        self.client.disconnect();
        self.delay.delay_ms(self.cfg.post_download_delay_ms);
        info!("OTA: download complete, verifying image");

        self.transfer.finalize(&mut self.pal)?;
        sink.emit(&AppEvent::OtaDownloaded { total });
        Ok(total)
    }

    /// Acknowledge success, let the ack drain, then reset into the new image.
    ///
    /// Only comes back if something went wrong: the returned error says what.
    /// A returning activation is itself [`OtaError::ActivationReturned`].
    pub fn activate<A: AckPort>(&mut self, acks: &mut A, ack: Option<&Ack>) -> OtaError {
        if self.transfer.state() != TransferState::ReadyToActivate {
            return OtaError::NotValidated;
        }

        if let Some(ack) = ack {
            if let Err(e) = acks.send_ack(ack) {
                warn!("ACK: success ack for '{}' not sent: {}", ack.ack_id, e);
            }
        }
        self.delay.delay_ms(self.cfg.ack_settle_ms);

        info!("OTA: applying firmware, resetting the board");
        if let Err(e) = self.pal.activate_new_image() {
            error!("OTA: activation failed: {}", e);
            self.transfer.abort(&mut self.pal);
            return e.into();
        }
        // The verified image stays in place; activation may be retried.
        error!("OTA: activation returned without a reset");
        OtaError::ActivationReturned
    }

    /// Boot-time self-test hook: accept an image that is still on trial.
    pub fn confirm_boot(&mut self) -> Result<ImageState, OtaError> {
        let state = self.pal.image_state();
        if state != ImageState::Testing {
            return Ok(state);
        }
        self.pal.set_image_state(ImageState::Accepted)?;
        info!("OTA: running image accepted");
        Ok(ImageState::Accepted)
    }

    /// Refuse the image on trial; the platform rolls back to the previous one.
    pub fn reject_running_image(&mut self) -> Result<(), OtaError> {
        self.pal.set_image_state(ImageState::Rejected)?;
        warn!("OTA: running image rejected");
        Ok(())
    }
}
