//! System configuration parameters
//!
//! Device identity (as provisioned into NVS) and every tunable of the
//! firmware-update pipeline.  Values are validated before they are
//! persisted; see [`SystemConfig::validate`].

use core::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::error::{AckError, Error};

/// Largest chunk the downloader will allocate a receive buffer for.
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024;

/// `Content-Range` totals are parsed from at most eight digits.
pub const MAX_DECLARABLE_IMAGE_SIZE: u32 = 99_999_999;

/// Capacity of MQTT topic strings.
pub const TOPIC_LEN: usize = 256;

pub type Topic = heapless::String<TOPIC_LEN>;

/// Device identity on the IoT platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    /// Device unique id (the MQTT thing name).
    pub duid: heapless::String<128>,
    /// Company id.
    pub cpid: heapless::String<64>,
    /// Platform environment, e.g. `poc`.
    pub env: heapless::String<32>,
    /// MQTT broker endpoint host.
    pub mqtt_endpoint: heapless::String<128>,
    /// Telemetry CD code, part of the ack topic.
    pub telemetry_cd: heapless::String<16>,
}

impl DeviceConfig {
    /// Everything needed to connect and route acknowledgements is present.
    pub fn is_provisioned(&self) -> bool {
        !self.duid.is_empty()
            && !self.cpid.is_empty()
            && !self.env.is_empty()
            && !self.mqtt_endpoint.is_empty()
            && !self.telemetry_cd.is_empty()
    }

    /// Cloud-to-device command topic: `iot/<duid>/cmd`.
    pub fn command_topic(&self) -> Result<Topic, Error> {
        let mut topic = Topic::new();
        write!(topic, "iot/{}/cmd", self.duid)
            .map_err(|_| Error::Config("command topic too long"))?;
        Ok(topic)
    }

    /// Acknowledgement topic: `$aws/rules/msg_d2c_ack/<duid>/<cd>/2.1/6`.
    pub fn ack_topic(&self) -> Result<Topic, Error> {
        let mut topic = Topic::new();
        write!(
            topic,
            "$aws/rules/msg_d2c_ack/{}/{}/2.1/6",
            self.duid, self.telemetry_cd
        )
        .map_err(|_| AckError::TopicTooLong)?;
        Ok(topic)
    }
}

/// Firmware-update tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtaConfig {
    // --- Download ---
    /// Bytes requested per ranged GET.
    pub chunk_size: u32,
    /// Retries per chunk after a network failure (on top of the first attempt).
    pub max_retries: u32,
    /// Wait before reconnecting after a network failure (ms).
    pub retry_backoff_ms: u32,
    /// Emit a progress event every this many chunks.
    pub progress_every_chunks: u32,
    /// Largest image accepted from the size probe (bytes).
    pub max_image_size: u32,

    // --- Connection ---
    pub https_port: u16,
    /// Connect / per-request transport timeout (ms).
    pub connect_timeout_ms: u32,

    // --- Apply ---
    /// Pause between the last chunk and closing the file (ms).
    pub post_download_delay_ms: u32,
    /// Pause after the success ack so it leaves the device before reset (ms).
    pub ack_settle_ms: u32,

    // --- Flash ---
    /// Receive file name handed to the flash PAL.
    pub rx_file_path: heapless::String<64>,
    /// Label of the code-signing certificate used to verify the image at close.
    pub signer_cert_path: heapless::String<64>,

    // --- Policy ---
    /// Accept offered versions that sort below the running one.
    pub allow_downgrade: bool,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024,
            max_retries: 30,
            retry_backoff_ms: 1000,
            progress_every_chunks: 30,
            max_image_size: 4 * 1024 * 1024,

            https_port: 443,
            connect_timeout_ms: 10_000,

            post_download_delay_ms: 500,
            ack_settle_ms: 1000,

            rx_file_path: bounded("firmware.bin"),
            signer_cert_path: bounded("ota_signer_pub"),

            allow_downgrade: false,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SystemConfig {
    pub device: DeviceConfig,
    pub ota: OtaConfig,
}

impl SystemConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ota = &self.ota;
        if !(512..=MAX_CHUNK_SIZE).contains(&ota.chunk_size) {
            return Err(ConfigError::ValidationFailed(
                "chunk_size must be 512-16384",
            ));
        }
        if !(1..=100).contains(&ota.max_retries) {
            return Err(ConfigError::ValidationFailed("max_retries must be 1-100"));
        }
        if ota.retry_backoff_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "retry_backoff_ms must be at most 60000",
            ));
        }
        if ota.progress_every_chunks == 0 {
            return Err(ConfigError::ValidationFailed(
                "progress_every_chunks must be non-zero",
            ));
        }
        if ota.max_image_size == 0 || ota.max_image_size > MAX_DECLARABLE_IMAGE_SIZE {
            return Err(ConfigError::ValidationFailed(
                "max_image_size must be 1-99999999",
            ));
        }
        if ota.https_port == 0 {
            return Err(ConfigError::ValidationFailed("https_port must be non-zero"));
        }
        if ota.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "connect_timeout_ms must be non-zero",
            ));
        }
        if ota.rx_file_path.is_empty() {
            return Err(ConfigError::ValidationFailed("rx_file_path is empty"));
        }
        Ok(())
    }
}

/// Copy `s` into a bounded string, truncating at capacity.
pub(crate) fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}
