//! Receive-file bookkeeping for one image.
//!
//! [`FileTransfer`] wraps the [`FirmwarePal`] lifecycle in a state machine
//! so the downloader cannot write out of order, past the declared size, or
//! close a half-written image.
//!
//! ```text
//! Idle ──begin──▶ Receiving ──finalize──▶ Validating ──▶ ReadyToActivate
//!   ▲                 │                       │
//!   │                 ▼                       ▼
//!   └────abort───── Failed ◀──────────────────┘
//! ```

use log::{info, warn};

use crate::app::ports::FirmwarePal;
use crate::error::OtaError;

use super::image::{FileTransferContext, ImageState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Receiving { expected: u32, written: u32 },
    /// Receive file is being closed and its signature checked.
    Validating,
    ReadyToActivate,
    Failed,
}

pub struct FileTransfer {
    state: TransferState,
    ctx: Option<FileTransferContext>,
}

impl FileTransfer {
    pub fn new() -> Self {
        Self {
            state: TransferState::Idle,
            ctx: None,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn context(&self) -> Option<&FileTransferContext> {
        self.ctx.as_ref()
    }

    /// A receive file is open.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            TransferState::Receiving { .. } | TransferState::Validating
        )
    }

    /// Open a receive file for `ctx.file_size` bytes.
    pub fn begin<P: FirmwarePal>(
        &mut self,
        pal: &mut P,
        ctx: FileTransferContext,
    ) -> Result<(), OtaError> {
        if self.is_active() {
            return Err(OtaError::AlreadyInProgress);
        }
        if ctx.file_size == 0 {
            return Err(OtaError::EmptyImage);
        }

        if let Err(e) = pal.create_file_for_rx(&ctx) {
            warn!("PAL: create '{}' failed: {}", ctx.file_path, e);
            self.state = TransferState::Failed;
            self.ctx = Some(ctx);
            return Err(e.into());
        }

        info!("PAL: receiving '{}' ({} bytes)", ctx.file_path, ctx.file_size);
        self.state = TransferState::Receiving {
            expected: ctx.file_size,
            written: 0,
        };
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Write `data` at `offset`.  Returns total bytes written so far.
    pub fn write_chunk<P: FirmwarePal>(
        &mut self,
        pal: &mut P,
        offset: u32,
        data: &[u8],
    ) -> Result<u32, OtaError> {
        let TransferState::Receiving { expected, written } = self.state else {
            return Err(OtaError::NotReceiving);
        };

        if offset != written {
            return Err(OtaError::NonSequential {
                expected: written,
                got: offset,
            });
        }
        let len = data.len() as u32;
        if written.saturating_add(len) > expected {
            return Err(OtaError::Overflow);
        }

        let accepted = match pal.write_block(offset, data) {
            Ok(n) => n,
            Err(e) => {
                self.state = TransferState::Failed;
                return Err(e.into());
            }
        };
        if accepted != data.len() {
            self.state = TransferState::Failed;
            return Err(OtaError::ShortWrite {
                offset,
                expected: len,
                written: accepted as u32,
            });
        }

        let written = written + len;
        self.state = TransferState::Receiving { expected, written };
        Ok(written)
    }

    /// Close the receive file.  The PAL verifies the signature here; a
    /// failed check marks the image `Rejected`.
    pub fn finalize<P: FirmwarePal>(&mut self, pal: &mut P) -> Result<(), OtaError> {
        match self.state {
            TransferState::Receiving { expected, written } if written == expected => {}
            TransferState::Receiving { expected, written } => {
                return Err(OtaError::IncompleteTransfer { expected, written });
            }
            _ => return Err(OtaError::NotReceiving),
        }
        let Some(ctx) = self.ctx.as_ref() else {
            return Err(OtaError::NotReceiving);
        };

        self.state = TransferState::Validating;

        if let Err(e) = pal.close_file(ctx) {
            warn!("PAL: close failed: {}", e);
            if let Err(se) = pal.set_image_state(ImageState::Rejected) {
                warn!("PAL: could not mark image rejected: {}", se);
            }
            self.state = TransferState::Failed;
            return Err(e.into());
        }

        if let Err(e) = pal.set_image_state(ImageState::Testing) {
            self.state = TransferState::Failed;
            return Err(e.into());
        }

        self.state = TransferState::ReadyToActivate;
        info!("PAL: image closed and verified");
        Ok(())
    }

    /// Discard any partial image and return to `Idle`.
    pub fn abort<P: FirmwarePal>(&mut self, pal: &mut P) {
        if self.state == TransferState::Idle {
            return;
        }
        if let Err(e) = pal.abort() {
            warn!("PAL: abort failed: {}", e);
        }
        if pal.image_state().can_transition_to(ImageState::Aborted) {
            if let Err(e) = pal.set_image_state(ImageState::Aborted) {
                warn!("PAL: could not mark image aborted: {}", e);
            }
        }
        self.state = TransferState::Idle;
        self.ctx = None;
        warn!("PAL: transfer aborted");
    }
}

impl Default for FileTransfer {
    fn default() -> Self {
        Self::new()
    }
}
