//! Received-image bookkeeping types shared by the OTA flow and the flash PAL.

use crate::config::OtaConfig;

/// Largest signature the PAL accepts (3072-bit RSA).
pub const MAX_SIGNATURE_SIZE: usize = 384;

pub const PATH_LEN: usize = 64;

/// Signature checked when the receive file is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSignature {
    /// Label of the signer certificate in the device's key store.
    pub cert_path: heapless::String<PATH_LEN>,
    pub data: heapless::Vec<u8, MAX_SIGNATURE_SIZE>,
}

/// Everything the PAL needs to receive one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferContext {
    pub file_path: heapless::String<PATH_LEN>,
    /// Declared image size from the size probe.
    pub file_size: u32,
    pub signature: Option<ImageSignature>,
}

impl FileTransferContext {
    /// Context for an image of `file_size` bytes, with an optional SHA-256
    /// digest to verify at close.
    pub fn new(cfg: &OtaConfig, file_size: u32, digest: Option<[u8; 32]>) -> Self {
        let signature = digest.map(|d| ImageSignature {
            cert_path: cfg.signer_cert_path.clone(),
            data: d.iter().copied().collect(),
        });
        Self {
            file_path: cfg.rx_file_path.clone(),
            file_size,
            signature,
        }
    }
}

/// Lifecycle of a received image.
///
/// ```text
/// Unknown ──▶ Testing ──▶ Accepted
///    │           ├──────▶ Rejected
///    └───────────┴──────▶ Aborted / Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Unknown,
    /// Written and activated, awaiting the self-test after reset.
    Testing,
    Accepted,
    Rejected,
    Aborted,
}

impl ImageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Aborted)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use ImageState::*;
        matches!(
            (self, next),
            (Unknown, Testing | Rejected | Aborted) | (Testing, Accepted | Rejected | Aborted)
        )
    }
}
