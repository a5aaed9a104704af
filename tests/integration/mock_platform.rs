//! Mock platform adapters for integration tests.
//!
//! Records every port call so tests can assert on the full history
//! without a network, flash or MQTT broker.

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use iotc_ota::adapters::flash::FlashPal;
use iotc_ota::app::commands::Ack;
use iotc_ota::app::events::AppEvent;
use iotc_ota::app::ports::{AckPort, EventSink, Led, LedPort, RangeClient, RangeResponse};
use iotc_ota::app::service::AppService;
use iotc_ota::config::OtaConfig;
use iotc_ota::error::{AckError, HttpError};
use iotc_ota::ota::plan::ByteRange;
use iotc_ota::ota::OtaUpdater;

pub const RUNNING_VERSION: &str = "01.00.06";
pub const IMAGE_URL: &str = "https://fw.example.com/images/app.bin?X-Amz-Signature=abc";

// ── MockServer ────────────────────────────────────────────────

/// Serves one image over ranged GETs, with scripted failures.
pub struct MockServer {
    pub image: Vec<u8>,
    /// Per-request outcome override, consumed front to back.  `None`
    /// serves the request normally.
    pub script: VecDeque<Option<HttpError>>,
    /// Answer requests starting at this offset (other than the probe)
    /// with this status.
    pub status_at: Option<(u32, u16)>,
    /// Leave `Content-Range` off the probe response.
    pub omit_content_range: bool,
    pub requests: Vec<ByteRange>,
    pub hosts: Vec<String>,
    pub disconnects: u32,
    connected: bool,
}

#[allow(dead_code)]
impl MockServer {
    pub fn new(len: usize) -> Self {
        Self {
            image: (0..len).map(|i| (i * 7 % 256) as u8).collect(),
            script: VecDeque::new(),
            status_at: None,
            omit_content_range: false,
            requests: Vec::new(),
            hosts: Vec::new(),
            disconnects: 0,
            connected: false,
        }
    }

    pub fn fail_next(mut self, outcomes: impl IntoIterator<Item = Option<HttpError>>) -> Self {
        self.script.extend(outcomes);
        self
    }

    pub fn connects(&self) -> usize {
        self.hosts.len()
    }

    /// Ranged requests after the size probe.
    pub fn chunk_requests(&self) -> &[ByteRange] {
        self.requests.get(1..).unwrap_or(&[])
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl RangeClient for MockServer {
    fn connect(&mut self, host: &str) -> Result<(), HttpError> {
        self.hosts.push(host.to_string());
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }

    fn get_range(
        &mut self,
        _resource: &str,
        range: ByteRange,
        body: &mut [u8],
    ) -> Result<RangeResponse, HttpError> {
        self.requests.push(range);
        if !self.connected {
            return Err(HttpError::NotConnected);
        }
        if let Some(Some(e)) = self.script.pop_front() {
            if e == HttpError::Network {
                self.connected = false;
            }
            return Err(e);
        }

        let total = self.image.len();
        let is_probe = self.requests.len() == 1;
        if let Some((offset, status)) = self.status_at {
            if !is_probe && range.start == offset {
                return Ok(RangeResponse {
                    status,
                    content_range: None,
                    body_len: 0,
                });
            }
        }

        let end = (range.end as usize).min(total.saturating_sub(1));
        let slice = self.image.get(range.start as usize..=end).unwrap_or(&[]);
        if slice.len() > body.len() {
            return Err(HttpError::BodyTooLarge {
                capacity: body.len(),
            });
        }
        body[..slice.len()].copy_from_slice(slice);

        let content_range = if is_probe && self.omit_content_range {
            None
        } else {
            let value = format!("bytes {}-{}/{}", range.start, end, total);
            Some(heapless::String::try_from(value.as_str()).unwrap())
        };
        Ok(RangeResponse {
            status: 206,
            content_range,
            body_len: slice.len(),
        })
    }
}

// ── RecordingDelay ────────────────────────────────────────────

/// Returns immediately, remembering every millisecond wait.
#[derive(Default)]
pub struct RecordingDelay {
    pub waits_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}

// ── MockAcks ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockAcks {
    pub sent: Vec<Ack>,
    pub fail: bool,
}

impl AckPort for MockAcks {
    fn send_ack(&mut self, ack: &Ack) -> Result<(), AckError> {
        if self.fail {
            return Err(AckError::Publish);
        }
        self.sent.push(ack.clone());
        Ok(())
    }
}

// ── MockLeds ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLeds {
    pub calls: Vec<(Led, bool)>,
}

impl LedPort for MockLeds {
    fn set_led(&mut self, led: Led, on: bool) {
        self.calls.push((led, on));
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn last(&self) -> Option<&AppEvent> {
        self.events.last()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::OtaProgress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub type TestApp = AppService<MockServer, FlashPal, RecordingDelay>;

pub fn make_app(server: MockServer, cfg: OtaConfig) -> TestApp {
    let updater = OtaUpdater::new(server, FlashPal::new(), RecordingDelay::default(), cfg);
    AppService::new(updater, RUNNING_VERSION)
}

/// OTA C2D payload offering `version` from `url`.
#[allow(dead_code)]
pub fn ota_payload(version: &str, url: &str, sha256: Option<&str>) -> Vec<u8> {
    let digest = sha256
        .map(|h| format!(r#","sha256":"{h}""#))
        .unwrap_or_default();
    format!(
        r#"{{"v":"2.1","ct":1,"cmd":"ota","ack":"ota-1","sw":"{version}","urls":[{{"url":"{url}","fileName":"app.bin"{digest}}}]}}"#
    )
    .into_bytes()
}

/// Command C2D payload, acknowledged under `ack` when given.
#[allow(dead_code)]
pub fn command_payload(cmd: &str, ack: Option<&str>) -> Vec<u8> {
    match ack {
        Some(id) => format!(r#"{{"v":"2.1","ct":0,"cmd":"{cmd}","ack":"{id}"}}"#),
        None => format!(r#"{{"v":"2.1","ct":0,"cmd":"{cmd}"}}"#),
    }
    .into_bytes()
}
