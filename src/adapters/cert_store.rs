//! Certificate store: device identity for the MQTT TLS session.
//!
//! Certificates live in the `certs` NVS namespace and are read through any
//! [`StoragePort`].  mbedTLS wants PEM buffers terminated by a NUL byte, so
//! every loaded buffer is NUL-terminated here.
//!
//! ## Namespace layout
//!
//! | Key           | Content                                  |
//! |---------------|------------------------------------------|
//! | `device_cert` | PEM-encoded device certificate           |
//! | `device_key`  | PEM-encoded device private key           |
//! | `root_ca`     | PEM-encoded broker root CA               |

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};

pub const CERT_NAMESPACE: &str = "certs";

pub const DEVICE_CERT_KEY: &str = "device_cert";
pub const DEVICE_KEY_KEY: &str = "device_key";
pub const ROOT_CA_KEY: &str = "root_ca";

/// Maximum certificate size (PEM format, includes headers and the NUL).
const MAX_CERT_SIZE: usize = 4096;

/// Maximum private key size.
const MAX_KEY_SIZE: usize = 2048;

/// Loaded certificate material, each buffer NUL-terminated.
pub struct CertBundle {
    pub device_cert: heapless::Vec<u8, MAX_CERT_SIZE>,
    pub device_key: heapless::Vec<u8, MAX_KEY_SIZE>,
    pub root_ca: heapless::Vec<u8, MAX_CERT_SIZE>,
}

impl CertBundle {
    /// Copies with `'static` lifetime for the MQTT client, which keeps
    /// pointers to them for as long as it runs.
    pub fn leak_device_cert(&self) -> &'static [u8] {
        leak(&self.device_cert)
    }

    pub fn leak_device_key(&self) -> &'static [u8] {
        leak(&self.device_key)
    }

    pub fn leak_root_ca(&self) -> &'static [u8] {
        leak(&self.root_ca)
    }
}

fn leak(buf: &[u8]) -> &'static [u8] {
    Box::leak(buf.to_vec().into_boxed_slice())
}

/// Read all three PEM buffers.  Every one of them is required.
pub fn load_bundle(storage: &impl StoragePort) -> Result<CertBundle, CertStoreError> {
    let bundle = CertBundle {
        device_cert: load_pem(storage, DEVICE_CERT_KEY)?,
        device_key: load_pem(storage, DEVICE_KEY_KEY)?,
        root_ca: load_pem(storage, ROOT_CA_KEY)?,
    };
    info!(
        "CertStore: loaded certificates (cert={}B, key={}B, ca={}B)",
        bundle.device_cert.len(),
        bundle.device_key.len(),
        bundle.root_ca.len(),
    );
    Ok(bundle)
}

/// Store one PEM component under `key`.  The firmware itself only reads
/// certificates; they are expected in NVS before first boot.
pub fn store_cert(
    storage: &mut impl StoragePort,
    key: &'static str,
    pem: &[u8],
) -> Result<(), CertStoreError> {
    storage
        .write(CERT_NAMESPACE, key, pem)
        .map_err(|e| CertStoreError::Storage(key, e))?;
    info!("CertStore: stored '{}' ({}B)", key, pem.len());
    Ok(())
}

fn load_pem<const N: usize>(
    storage: &impl StoragePort,
    key: &'static str,
) -> Result<heapless::Vec<u8, N>, CertStoreError> {
    let mut buf = [0u8; N];
    let len = storage
        .read(CERT_NAMESPACE, key, &mut buf[..N - 1])
        .map_err(|e| match e {
            StorageError::NotFound => CertStoreError::Missing(key),
            StorageError::TooLarge => CertStoreError::TooLarge(key),
            other => CertStoreError::Storage(key, other),
        })?;

    let mut pem = &buf[..len];
    while let [rest @ .., 0] = pem {
        pem = rest;
    }
    if pem.is_empty() {
        warn!("CertStore: '{}' is empty", key);
        return Err(CertStoreError::Missing(key));
    }

    let mut out = heapless::Vec::new();
    if out.extend_from_slice(pem).is_err() || out.push(0).is_err() {
        return Err(CertStoreError::TooLarge(key));
    }
    Ok(out)
}

/// Errors from the certificate store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStoreError {
    Missing(&'static str),
    TooLarge(&'static str),
    Storage(&'static str, StorageError),
}

impl core::fmt::Display for CertStoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "certificate '{}' not provisioned", key),
            Self::TooLarge(key) => write!(f, "certificate '{}' too large", key),
            Self::Storage(key, e) => write!(f, "certificate '{}': {}", key, e),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
