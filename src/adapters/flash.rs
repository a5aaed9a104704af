//! Flash PAL adapter: receives firmware into the inactive OTA slot.
//!
//! Implements [`FirmwarePal`].
//!
//! - **`target_os = "espidf"`**: `esp-ota` (`OtaUpdate::begin` / `write` /
//!   `finalize`, `set_as_boot_partition`, `restart`).  The running image's
//!   trial state comes from the bootloader, and accepting or rejecting it maps
//!   to `mark_app_valid` / `rollback_and_reboot`.
//! - **all other targets**: an in-memory partition of configurable size for
//!   host-side testing.
//!
//! On both, an image whose context carries a signature is hashed while it is
//! written and the SHA-256 digest is compared at close.

use log::{info, warn};

use crate::app::ports::FirmwarePal;
use crate::error::PalError;
use crate::ota::image::{FileTransferContext, ImageSignature, ImageState};

/// Default simulated update partition (matches a 4 MiB OTA slot).
#[cfg(not(target_os = "espidf"))]
pub const SIM_PARTITION_SIZE: usize = 4 * 1024 * 1024;

pub struct FlashPal {
    state: ImageState,
    /// Declared size of the open receive file, `None` when nothing is open.
    expected: Option<u32>,
    written: u32,
    /// Running digest, only kept when the image is signed.
    hasher: Option<hmac_sha256::Hash>,
    closed: bool,

    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(target_os = "espidf")]
    completed: Option<esp_ota::CompletedOtaUpdate>,

    #[cfg(not(target_os = "espidf"))]
    image: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    partition_size: usize,
    #[cfg(not(target_os = "espidf"))]
    activated: bool,
    #[cfg(not(target_os = "espidf"))]
    rollback_requested: bool,
}

impl FlashPal {
    /// Bind to the OTA partitions.  The image state starts from what the
    /// bootloader reports for the running image.
    #[cfg(target_os = "espidf")]
    pub fn new() -> Self {
        let state = boot_state();
        info!("PAL: running image state {:?}", state);
        Self {
            state,
            expected: None,
            written: 0,
            hasher: None,
            closed: false,
            update: None,
            completed: None,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self::with_partition_size(SIM_PARTITION_SIZE)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn with_partition_size(partition_size: usize) -> Self {
        Self {
            state: ImageState::Unknown,
            expected: None,
            written: 0,
            hasher: None,
            closed: false,
            image: Vec::new(),
            partition_size,
            activated: false,
            rollback_requested: false,
        }
    }

    /// Simulate a boot into an image in `state`.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_boot_state(mut self, state: ImageState) -> Self {
        self.state = state;
        self
    }

    /// Bytes received so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Whether the running image was rejected and a rollback requested.
    #[cfg(not(target_os = "espidf"))]
    pub fn rollback_requested(&self) -> bool {
        self.rollback_requested
    }

    fn reset_rx(&mut self) {
        self.expected = None;
        self.written = 0;
        self.hasher = None;
        self.closed = false;
    }

    fn verify_digest(&mut self, signature: &ImageSignature) -> Result<(), PalError> {
        if signature.cert_path.is_empty() {
            return Err(PalError::BadSignerCert);
        }
        let hasher = self.hasher.take().ok_or(PalError::SignatureCheckFailed)?;
        let digest = hasher.finalize();
        if signature.data.as_slice() != digest.as_slice() {
            warn!("PAL: digest mismatch for image signed by '{}'", signature.cert_path);
            return Err(PalError::SignatureCheckFailed);
        }
        Ok(())
    }

    // ── ESP-IDF ───────────────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_create(&mut self, file_size: u32) -> Result<(), PalError> {
        // SAFETY: read-only partition table lookup.
        let part = unsafe { esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null()) };
        if part.is_null() {
            return Err(PalError::RxFileCreateFailed);
        }
        // SAFETY: non-null pointer into the static partition table.
        if file_size > unsafe { (*part).size } {
            return Err(PalError::RxFileTooLarge);
        }
        self.completed = None;
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("PAL: esp-ota begin failed: {:?}", e);
            PalError::RxFileCreateFailed
        })?;
        self.update = Some(update);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_write(&mut self, data: &[u8]) -> Result<usize, PalError> {
        let update = self.update.as_mut().ok_or(PalError::NoActiveFile)?;
        update.write(data).map_err(|e| {
            warn!("PAL: esp-ota write failed: {:?}", e);
            PalError::WriteFailed
        })?;
        Ok(data.len())
    }

    #[cfg(target_os = "espidf")]
    fn platform_close(&mut self) -> Result<(), PalError> {
        let update = self.update.take().ok_or(PalError::NoActiveFile)?;
        // esp-ota validates the image header and checksum here.
        let completed = update.finalize().map_err(|e| {
            warn!("PAL: esp-ota finalize failed: {:?}", e);
            PalError::FileClose
        })?;
        self.completed = Some(completed);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_discard(&mut self) {
        // Dropping an unfinished OtaUpdate aborts it.
        self.update = None;
        self.completed = None;
    }

    #[cfg(target_os = "espidf")]
    fn platform_activate(&mut self) -> Result<(), PalError> {
        let mut completed = self.completed.take().ok_or(PalError::ActivateFailed)?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("PAL: set_as_boot_partition failed: {:?}", e);
            PalError::ActivateFailed
        })?;
        info!("PAL: boot partition switched, restarting");
        esp_ota::restart()
    }

    #[cfg(target_os = "espidf")]
    fn platform_commit(&mut self) -> Result<(), PalError> {
        esp_ota::mark_app_valid().map_err(|e| {
            warn!("PAL: mark_app_valid failed: {:?}", e);
            PalError::CommitFailed
        })
    }

    /// Roll back from the running image.  Does not return on success.
    #[cfg(target_os = "espidf")]
    fn platform_reject(&mut self) -> Result<(), PalError> {
        warn!("PAL: rolling back to the previous image");
        if let Err(e) = esp_ota::rollback_and_reboot() {
            warn!("PAL: rollback failed: {:?}", e);
            return Err(PalError::RejectFailed);
        }
        Ok(())
    }

    // ── Simulation ────────────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn platform_create(&mut self, file_size: u32) -> Result<(), PalError> {
        if file_size as usize > self.partition_size {
            return Err(PalError::RxFileTooLarge);
        }
        self.image.clear();
        self.image
            .try_reserve(file_size as usize)
            .map_err(|_| PalError::OutOfMemory)?;
        self.activated = false;
        Ok(())
    }

    /// Accepts as much as fits in the partition; a full partition shows up
    /// as a short write.
    #[cfg(not(target_os = "espidf"))]
    fn platform_write(&mut self, data: &[u8]) -> Result<usize, PalError> {
        let room = self.partition_size.saturating_sub(self.image.len());
        let n = data.len().min(room);
        self.image.extend_from_slice(&data[..n]);
        Ok(n)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_close(&mut self) -> Result<(), PalError> {
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_discard(&mut self) {
        self.image.clear();
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_activate(&mut self) -> Result<(), PalError> {
        self.activated = true;
        info!("PAL(sim): image activated, no reset in simulation");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_commit(&mut self) -> Result<(), PalError> {
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_reject(&mut self) -> Result<(), PalError> {
        self.rollback_requested = true;
        info!("PAL(sim): rollback requested, no reset in simulation");
        Ok(())
    }
}

impl Default for FlashPal {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwarePal for FlashPal {
    fn create_file_for_rx(&mut self, ctx: &FileTransferContext) -> Result<(), PalError> {
        if self.expected.is_some() {
            warn!("PAL: discarding unfinished receive file");
            self.platform_discard();
        }
        self.reset_rx();
        self.platform_create(ctx.file_size)?;

        self.state = ImageState::Unknown;
        self.expected = Some(ctx.file_size);
        if ctx.signature.is_some() {
            self.hasher = Some(hmac_sha256::Hash::new());
        }
        info!("PAL: opened '{}' for {} bytes", ctx.file_path, ctx.file_size);
        Ok(())
    }

    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<usize, PalError> {
        let expected = self.expected.ok_or(PalError::NoActiveFile)?;
        if self.closed {
            return Err(PalError::NoActiveFile);
        }
        if offset != self.written || offset as u64 + data.len() as u64 > u64::from(expected) {
            warn!(
                "PAL: write of {} bytes at {} rejected (written {}, size {})",
                data.len(),
                offset,
                self.written,
                expected
            );
            return Err(PalError::WriteFailed);
        }

        let n = self.platform_write(data)?;
        if let Some(h) = self.hasher.as_mut() {
            h.update(&data[..n]);
        }
        self.written += n as u32;
        Ok(n)
    }

    fn close_file(&mut self, ctx: &FileTransferContext) -> Result<(), PalError> {
        let expected = self.expected.ok_or(PalError::NoActiveFile)?;
        if self.written != expected {
            warn!("PAL: close with {} of {} bytes", self.written, expected);
            return Err(PalError::FileClose);
        }
        if let Some(signature) = ctx.signature.as_ref() {
            self.verify_digest(signature)?;
            info!("PAL: image digest verified");
        }
        self.platform_close()?;
        self.closed = true;
        Ok(())
    }

    fn abort(&mut self) -> Result<(), PalError> {
        self.platform_discard();
        self.reset_rx();
        Ok(())
    }

    fn activate_new_image(&mut self) -> Result<(), PalError> {
        if !self.closed {
            return Err(PalError::ActivateFailed);
        }
        self.platform_activate()
    }

    fn set_image_state(&mut self, state: ImageState) -> Result<(), PalError> {
        if !self.state.can_transition_to(state) {
            warn!("PAL: image state {:?} -> {:?} refused", self.state, state);
            return Err(PalError::BadImageState);
        }
        match state {
            ImageState::Accepted => self.platform_commit()?,
            // A receive file is open: only the received image is refused.
            ImageState::Rejected if self.expected.is_some() => {
                warn!("PAL: received image rejected, discarding");
                self.platform_discard();
                self.reset_rx();
            }
            ImageState::Rejected => self.platform_reject()?,
            ImageState::Aborted => {
                self.platform_discard();
                self.reset_rx();
            }
            ImageState::Unknown | ImageState::Testing => {}
        }
        self.state = state;
        Ok(())
    }

    fn image_state(&self) -> ImageState {
        self.state
    }
}

/// What the bootloader thinks of the running image.
#[cfg(target_os = "espidf")]
fn boot_state() -> ImageState {
    use esp_idf_svc::sys::{
        esp, esp_ota_get_running_partition, esp_ota_get_state_partition,
        esp_ota_img_states_t_ESP_OTA_IMG_PENDING_VERIFY, esp_ota_img_states_t_ESP_OTA_IMG_UNDEFINED,
    };

    let mut state = esp_ota_img_states_t_ESP_OTA_IMG_UNDEFINED;
    // SAFETY: the running partition pointer is static for the app's lifetime.
    let result = unsafe {
        let running = esp_ota_get_running_partition();
        esp!(esp_ota_get_state_partition(running, &mut state))
    };
    match result {
        Ok(()) if state == esp_ota_img_states_t_ESP_OTA_IMG_PENDING_VERIFY => ImageState::Testing,
        Ok(()) => ImageState::Unknown,
        Err(e) => {
            // Factory images have no OTA state.
            info!("PAL: no OTA state for running partition ({:?})", e);
            ImageState::Unknown
        }
    }
}
