//! MQTT link adapter.
//!
//! Implements [`AckPort`] and feeds cloud-to-device payloads into a bounded
//! static inbox the application task drains.
//!
//! ```text
//! ┌──────────────┐  C2dPayload  ┌──────────────────┐
//! │  mqtt-poll   │─────────────▶│  application task │
//! │  (thread)    │  C2D_INBOX   │  (blocking recv)  │
//! └──────────────┘              └──────────────────┘
//! ```
//!
//! - **`target_os = "espidf"`**: `EspMqttClient` with mutual TLS; a poll
//!   thread drives the connection, reassembles messages the client delivers
//!   in pieces and enqueues them.
//! - **all other targets**: published acks are recorded and
//!   [`MqttLink::deliver`] stands in for the broker.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::app::commands::Ack;
use crate::app::ports::AckPort;
use crate::config::Topic;
use crate::error::AckError;

#[cfg(target_os = "espidf")]
use crate::adapters::cert_store::CertBundle;
#[cfg(target_os = "espidf")]
use crate::config::DeviceConfig;
#[cfg(target_os = "espidf")]
use crate::error::Error;

/// Largest C2D payload kept; larger messages are dropped.
pub const C2D_MAX_PAYLOAD: usize = 4096;

/// Inbox depth.  The device handles one message at a time.
const C2D_DEPTH: usize = 4;

pub type C2dPayload = heapless::Vec<u8, C2D_MAX_PAYLOAD>;

/// Inbound C2D payloads: MQTT task → application task.
pub static C2D_INBOX: Channel<CriticalSectionRawMutex, C2dPayload, C2D_DEPTH> = Channel::new();

/// Queue a raw payload for the application task.  Returns `false` (and
/// drops the message) when it is too large or the inbox is full.
pub fn enqueue_c2d(data: &[u8]) -> bool {
    let Ok(payload) = C2dPayload::from_slice(data) else {
        warn!("C2D: dropping {} byte message (max {})", data.len(), C2D_MAX_PAYLOAD);
        return false;
    };
    if C2D_INBOX.try_send(payload).is_err() {
        warn!("C2D: inbox full, message dropped");
        return false;
    }
    true
}

/// Block the calling task until a C2D payload arrives.
pub fn recv_c2d_blocking() -> C2dPayload {
    futures_lite::future::block_on(C2D_INBOX.receive())
}

pub fn try_recv_c2d() -> Option<C2dPayload> {
    C2D_INBOX.try_receive().ok()
}

/// Rebuilds a C2D message the client delivered in pieces.
#[derive(Default)]
pub struct C2dAssembler {
    buf: C2dPayload,
    /// Declared size of the message being rebuilt; `None` when idle.
    total: Option<usize>,
}

impl C2dAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the piece at `offset` of a `total`-byte message.  Returns the
    /// whole message once its last byte has arrived.
    pub fn push(&mut self, offset: usize, total: usize, data: &[u8]) -> Option<C2dPayload> {
        if offset == 0 {
            self.buf.clear();
            self.total = None;
            if total > C2D_MAX_PAYLOAD {
                warn!("C2D: dropping {} byte message (max {})", total, C2D_MAX_PAYLOAD);
                return None;
            }
            self.total = Some(total);
        }
        if self.total != Some(total) || offset != self.buf.len() {
            if self.total.is_some() {
                warn!("C2D: piece at {} out of sequence, message dropped", offset);
            }
            self.reset();
            return None;
        }
        if self.buf.extend_from_slice(data).is_err() || self.buf.len() > total {
            warn!("C2D: message overran its declared {} bytes", total);
            self.reset();
            return None;
        }
        if self.buf.len() < total {
            return None;
        }
        self.total = None;
        Some(core::mem::take(&mut self.buf))
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.total = None;
    }
}

// ───────────────────────────────────────────────────────────────
// MqttLink
// ───────────────────────────────────────────────────────────────

pub struct MqttLink {
    ack_topic: Topic,

    #[cfg(target_os = "espidf")]
    client: esp_idf_svc::mqtt::client::EspMqttClient<'static>,

    #[cfg(not(target_os = "espidf"))]
    published: Vec<(Topic, Vec<u8>)>,
}

#[cfg(target_os = "espidf")]
impl MqttLink {
    /// Connect to the device's broker endpoint with the device certificate
    /// and start the poll thread.
    pub fn connect(device: &DeviceConfig, certs: &CertBundle) -> Result<Self, Error> {
        use esp_idf_svc::mqtt::client::{
            Details, EspMqttClient, EventPayload, MqttClientConfiguration,
        };
        use esp_idf_svc::tls::X509;

        let ack_topic = device.ack_topic()?;
        let url = format!("mqtts://{}:8883", device.mqtt_endpoint);

        // The client keeps raw pointers to the PEM buffers for its lifetime.
        let cert = certs.leak_device_cert();
        let key = certs.leak_device_key();
        let ca = certs.leak_root_ca();

        let conf = MqttClientConfiguration {
            client_id: Some(device.duid.as_str()),
            client_certificate: Some(X509::pem_until_nul(cert)),
            private_key: Some(X509::pem_until_nul(key)),
            server_certificate: Some(X509::pem_until_nul(ca)),
            // Pre-signed OTA URLs push directives past the 1 KiB default.
            buffer_size: C2D_MAX_PAYLOAD,
            ..Default::default()
        };

        let (client, mut conn) = EspMqttClient::new(&url, &conf).map_err(|e| {
            warn!("C2D: MQTT client init failed: {:?}", e);
            Error::Init("mqtt client")
        })?;

        std::thread::Builder::new()
            .name("mqtt-poll".into())
            .stack_size(8192)
            .spawn(move || {
                let mut assembler = C2dAssembler::new();
                loop {
                    let event = match conn.next() {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("C2D: connection closed: {:?}", e);
                            break;
                        }
                    };
                    match event.payload() {
                        EventPayload::Received {
                            topic,
                            data,
                            details: Details::Complete,
                            ..
                        } => {
                            info!("C2D: {} bytes on {}", data.len(), topic.unwrap_or("?"));
                            enqueue_c2d(data);
                        }
                        EventPayload::Received { data, details, .. } => {
                            let (offset, total) = match details {
                                Details::InitialChunk(c) => (0, c.total_data_size),
                                Details::SubsequentChunk(c) => {
                                    (c.current_data_offset, c.total_data_size)
                                }
                                Details::Complete => continue,
                            };
                            if let Some(payload) = assembler.push(offset, total, data) {
                                info!("C2D: {} bytes reassembled", payload.len());
                                enqueue_c2d(&payload);
                            }
                        }
                        EventPayload::Connected(_) => info!("C2D: broker connected"),
                        EventPayload::Disconnected => warn!("C2D: broker disconnected"),
                        _ => {}
                    }
                }
            })
            .map_err(|_| Error::Init("mqtt poll thread"))?;

        info!("C2D: MQTT client started for {}", url);
        Ok(Self { ack_topic, client })
    }

    /// Subscribe to `topic`, retrying while the session comes up.
    pub fn subscribe(&mut self, topic: &str, attempts: u32) -> Result<(), Error> {
        use esp_idf_svc::mqtt::client::QoS;

        for attempt in 1..=attempts {
            match self.client.subscribe(topic, QoS::AtLeastOnce) {
                Ok(_) => {
                    info!("C2D: subscribed to {}", topic);
                    return Ok(());
                }
                Err(e) => {
                    warn!("C2D: subscribe attempt {}/{} failed: {:?}", attempt, attempts, e);
                    std::thread::sleep(core::time::Duration::from_secs(1));
                }
            }
        }
        Err(Error::Init("mqtt subscribe"))
    }

    fn publish(&mut self, payload: &[u8]) -> Result<(), AckError> {
        use esp_idf_svc::mqtt::client::QoS;

        self.client
            .publish(&self.ack_topic, QoS::AtMostOnce, false, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("ACK: publish failed: {:?}", e);
                AckError::Publish
            })
    }
}

#[cfg(not(target_os = "espidf"))]
impl MqttLink {
    pub fn new(ack_topic: Topic) -> Self {
        Self {
            ack_topic,
            published: Vec::new(),
        }
    }

    /// Hand a payload to the inbox as if it arrived from the broker.
    pub fn deliver(&self, payload: &[u8]) -> bool {
        enqueue_c2d(payload)
    }

    /// Every `(topic, payload)` published so far.
    pub fn published(&self) -> &[(Topic, Vec<u8>)] {
        &self.published
    }

    fn publish(&mut self, payload: &[u8]) -> Result<(), AckError> {
        self.published.push((self.ack_topic.clone(), payload.to_vec()));
        Ok(())
    }
}

impl MqttLink {
    pub fn ack_topic(&self) -> &str {
        &self.ack_topic
    }
}

impl AckPort for MqttLink {
    fn send_ack(&mut self, ack: &Ack) -> Result<(), AckError> {
        let json = ack.to_json()?;
        self.publish(&json)?;
        info!("ACK: '{}' st={} msg='{}'", ack.ack_id, ack.status(), ack.message);
        Ok(())
    }
}
