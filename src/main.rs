//! IoTConnect OTA firmware entry point.
//!
//! Hexagonal architecture: one application task drains cloud-to-device
//! messages and runs each to completion, including a full firmware update.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HttpsRangeClient  FlashPal       MqttLink     GpioLeds        │
//! │  (RangeClient)     (FirmwarePal)  (AckPort)    (LedPort)       │
//! │  NvsAdapter        LogEventSink   SystemDelay                  │
//! │  (Config+Storage)  (EventSink)    (DelayNs)                    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Commands · Version gate · OtaUpdater                  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use anyhow::{bail, Result};
use log::{error, info, warn};

use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use iotc_ota::adapters::cert_store;
use iotc_ota::adapters::flash::FlashPal;
use iotc_ota::adapters::http::HttpsRangeClient;
use iotc_ota::adapters::leds::GpioLeds;
use iotc_ota::adapters::log_sink::LogEventSink;
use iotc_ota::adapters::mqtt::{self, MqttLink};
use iotc_ota::adapters::nvs::NvsAdapter;
use iotc_ota::adapters::time::SystemDelay;
use iotc_ota::app::ports::{ConfigPort, FirmwarePal, StoragePort};
use iotc_ota::app::service::AppService;
use iotc_ota::config::SystemConfig;
use iotc_ota::ota::{ImageState, OtaUpdater};
use iotc_ota::FIRMWARE_VERSION;

/// Station credentials, provisioned alongside the certificates.
const NET_NAMESPACE: &str = "net";

const SUBSCRIBE_ATTEMPTS: u32 = 30;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  IoTConnect OTA v{}            ║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    if let Err(e) = config.validate() {
        bail!("stored configuration invalid: {}", e);
    }
    if !config.device.is_provisioned() {
        bail!("device identity not provisioned");
    }
    info!(
        "Device {} (cpid {}, env {})",
        config.device.duid, config.device.cpid, config.device.env
    );

    // ── 3. Board + network ────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let mut leds = GpioLeds::new(
        PinDriver::output(peripherals.pins.gpio4)?,
        PinDriver::output(peripherals.pins.gpio5)?,
    );

    let sysloop = EspSystemEventLoop::take()?;
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), None)?,
        sysloop,
    )?;
    connect_wifi(&mut wifi, &nvs)?;

    // ── 4. OTA pipeline + app service ─────────────────────────
    let updater = OtaUpdater::new(
        HttpsRangeClient::from_config(&config.ota),
        FlashPal::new(),
        SystemDelay::new(),
        config.ota.clone(),
    );
    let mut app = AppService::new(updater, FIRMWARE_VERSION);
    let mut log_sink = LogEventSink::new();

    // ── 5. MQTT ───────────────────────────────────────────────
    let mut link = match connect_cloud(&config, &nvs) {
        Ok(link) => link,
        Err(e) => {
            // An image on trial must reach the cloud before it is accepted.
            if app.updater().pal().image_state() == ImageState::Testing {
                error!("Cloud unreachable on trial image: {}", e);
                app.updater_mut()
                    .reject_running_image()
                    .map_err(|e| anyhow::anyhow!("rollback: {}", e))?;
            }
            return Err(e);
        }
    };
    app.start(&mut log_sink)
        .map_err(|e| anyhow::anyhow!("start: {}", e))?;

    info!("System ready. Waiting for cloud messages.");

    // ── 6. Message loop ───────────────────────────────────────
    loop {
        let payload = mqtt::recv_c2d_blocking();
        if let Err(e) = app.handle_message(&payload, &mut link, &mut leds, &mut log_sink) {
            warn!("C2D: message not handled: {}", e);
        }
    }
}

fn connect_cloud(config: &SystemConfig, nvs: &NvsAdapter) -> Result<MqttLink> {
    let certs = cert_store::load_bundle(nvs).map_err(|e| anyhow::anyhow!("{}", e))?;
    let mut link =
        MqttLink::connect(&config.device, &certs).map_err(|e| anyhow::anyhow!("{}", e))?;
    let cmd_topic = config
        .device
        .command_topic()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    link.subscribe(&cmd_topic, SUBSCRIBE_ATTEMPTS)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(link)
}

fn connect_wifi(wifi: &mut BlockingWifi<EspWifi<'static>>, nvs: &NvsAdapter) -> Result<()> {
    let mut ssid_buf = [0u8; 32];
    let mut pass_buf = [0u8; 64];
    let ssid_len = nvs
        .read(NET_NAMESPACE, "ssid", &mut ssid_buf)
        .map_err(|e| anyhow::anyhow!("WiFi SSID: {}", e))?;
    let pass_len = nvs.read(NET_NAMESPACE, "pass", &mut pass_buf).unwrap_or(0);
    let ssid = core::str::from_utf8(&ssid_buf[..ssid_len])?;
    let pass = core::str::from_utf8(&pass_buf[..pass_len])?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow::anyhow!("SSID too long"))?,
        password: pass
            .try_into()
            .map_err(|_| anyhow::anyhow!("password too long"))?,
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;
    info!("WiFi connected to '{}'", ssid);
    Ok(())
}
