//! Firmware update flow through `AppService`, end to end on the host.
//!
//! The HTTPS side is a scripted `MockServer`; the flash side is the real
//! `FlashPal` running its in-memory simulation.

use iotc_ota::app::commands::AckKind;
use iotc_ota::app::events::AppEvent;
use iotc_ota::app::ports::FirmwarePal;
use iotc_ota::config::OtaConfig;
use iotc_ota::error::{Error, HttpError, MessageError, OtaError, PalError};
use iotc_ota::ota::{ByteRange, ImageState, TransferState};

use crate::mock_platform::*;

const IMAGE_LEN: usize = 10_000;

fn run_ota(app: &mut TestApp, payload: &[u8]) -> (MockAcks, MockLeds, RecordingSink) {
    let mut acks = MockAcks::default();
    let mut leds = MockLeds::default();
    let mut sink = RecordingSink::default();
    app.handle_message(payload, &mut acks, &mut leds, &mut sink)
        .expect("OTA messages never surface errors when acks publish");
    (acks, leds, sink)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ── Happy path ────────────────────────────────────────────────

#[test]
fn upgrade_downloads_verifies_acks_and_activates() {
    let server = MockServer::new(IMAGE_LEN);
    let expected = server.image.clone();
    let mut app = make_app(server, OtaConfig::default());

    let (acks, _, sink) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    let updater = app.updater();
    assert_eq!(updater.pal().image(), expected.as_slice());
    assert!(updater.pal().is_activated());
    assert_eq!(updater.pal().image_state(), ImageState::Testing);
    assert_eq!(updater.transfer_state(), TransferState::ReadyToActivate);

    let server = updater.client();
    assert_eq!(server.hosts, vec!["fw.example.com".to_string()]);
    assert_eq!(server.requests[0], ByteRange::FIRST_BYTE);
    assert_eq!(
        server.chunk_requests(),
        &[
            ByteRange { start: 0, end: 4095 },
            ByteRange { start: 4096, end: 8191 },
            ByteRange { start: 8192, end: 9999 },
        ]
    );
    assert!(!server.is_connected());

    assert_eq!(acks.sent.len(), 1);
    assert_eq!(acks.sent[0].ack_id.as_str(), "ota-1");
    assert_eq!(acks.sent[0].status(), 0);
    assert_eq!(acks.sent[0].message.as_str(), "OK");

    assert!(matches!(
        &sink.events[0],
        AppEvent::OtaStarted { version } if version.as_str() == "01.00.07"
    ));
    assert!(sink.events.contains(&AppEvent::OtaDownloaded {
        total: IMAGE_LEN as u32
    }));
    // The simulation does not reset the board.
    assert_eq!(
        sink.last(),
        Some(&AppEvent::OtaFailed(OtaError::ActivationReturned))
    );
}

#[test]
fn post_download_and_ack_settle_delays_are_observed() {
    let cfg = OtaConfig::default();
    let (post, settle) = (cfg.post_download_delay_ms, cfg.ack_settle_ms);
    let mut app = make_app(MockServer::new(IMAGE_LEN), cfg);

    run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    // No retries, so the only waits are the two fixed pauses, in order.
    let waits = delays(&app);
    assert_eq!(waits, vec![post, settle]);
}

fn delays(app: &TestApp) -> Vec<u32> {
    app.updater().delay().waits_ms.clone()
}

#[test]
fn progress_is_reported_every_n_chunks() {
    let cfg = OtaConfig {
        progress_every_chunks: 1,
        ..OtaConfig::default()
    };
    let mut app = make_app(MockServer::new(IMAGE_LEN), cfg);

    let (_, _, sink) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    assert_eq!(sink.progress(), vec![0, 40, 81]);
}

#[test]
fn matching_digest_is_accepted() {
    let server = MockServer::new(IMAGE_LEN);
    let digest = hex(&hmac_sha256::Hash::hash(&server.image));
    let mut app = make_app(server, OtaConfig::default());

    let (acks, _, _) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, Some(&digest)));

    assert!(app.updater().pal().is_activated());
    assert_eq!(acks.sent[0].status(), 0);
}

// ── Version gate ──────────────────────────────────────────────

#[test]
fn same_version_is_acknowledged_without_download() {
    let mut app = make_app(MockServer::new(IMAGE_LEN), OtaConfig::default());

    let (acks, _, sink) = run_ota(&mut app, &ota_payload(RUNNING_VERSION, IMAGE_URL, None));

    assert_eq!(app.updater().client().connects(), 0);
    assert_eq!(acks.sent.len(), 1);
    assert_eq!(acks.sent[0].status(), 0);
    assert_eq!(acks.sent[0].message.as_str(), "Already running this version");
    assert!(matches!(sink.events.as_slice(), [AppEvent::OtaSkipped { .. }]));
}

#[test]
fn downgrade_is_refused_by_default() {
    let mut app = make_app(MockServer::new(IMAGE_LEN), OtaConfig::default());

    let (acks, _, sink) = run_ota(&mut app, &ota_payload("01.00.05", IMAGE_URL, None));

    assert_eq!(app.updater().client().connects(), 0);
    assert_eq!(acks.sent[0].status(), 4);
    assert_eq!(acks.sent[0].message.as_str(), "downgrade rejected by policy");
    assert_eq!(
        sink.last(),
        Some(&AppEvent::OtaFailed(OtaError::DowngradeRejected))
    );
}

#[test]
fn downgrade_proceeds_when_allowed() {
    let cfg = OtaConfig {
        allow_downgrade: true,
        ..OtaConfig::default()
    };
    let mut app = make_app(MockServer::new(IMAGE_LEN), cfg);

    let (acks, _, _) = run_ota(&mut app, &ota_payload("01.00.05", IMAGE_URL, None));

    assert!(app.updater().pal().is_activated());
    assert_eq!(acks.sent[0].status(), 0);
}

// ── Retry and reconnect ───────────────────────────────────────

#[test]
fn network_errors_reconnect_and_retry_the_same_chunk() {
    // Probe succeeds, then the first chunk fails twice.
    let server = MockServer::new(IMAGE_LEN).fail_next([
        None,
        Some(HttpError::Network),
        Some(HttpError::Network),
    ]);
    let expected = server.image.clone();
    let cfg = OtaConfig::default();
    let backoff = cfg.retry_backoff_ms;
    let mut app = make_app(server, cfg);

    let (acks, _, _) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    let server = app.updater().client();
    assert_eq!(server.connects(), 3);
    assert_eq!(
        &server.chunk_requests()[..3],
        &[ByteRange { start: 0, end: 4095 }; 3]
    );
    assert_eq!(app.updater().pal().image(), expected.as_slice());
    assert_eq!(&delays(&app)[..2], &[backoff, backoff]);
    assert_eq!(acks.sent[0].status(), 0);
}

#[test]
fn exhausted_retries_abort_and_report_failure() {
    let cfg = OtaConfig {
        max_retries: 3,
        ..OtaConfig::default()
    };
    let failures = std::iter::repeat_n(Some(HttpError::Network), 10);
    let server = MockServer::new(IMAGE_LEN).fail_next(std::iter::once(None).chain(failures));
    let mut app = make_app(server, cfg);

    let (acks, _, sink) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    let err = OtaError::RetriesExhausted {
        offset: 0,
        attempts: 4,
    };
    assert_eq!(sink.last(), Some(&AppEvent::OtaFailed(err)));
    assert_eq!(acks.sent.len(), 1);
    assert_eq!(acks.sent[0].status(), 4);
    assert_eq!(acks.sent[0].message.as_str(), "chunk at 0 failed after 4 attempts");

    let updater = app.updater();
    assert_eq!(updater.client().chunk_requests().len(), 4);
    assert!(updater.pal().image().is_empty());
    assert!(!updater.pal().is_activated());
    assert_eq!(updater.pal().image_state(), ImageState::Aborted);
    assert_eq!(updater.transfer_state(), TransferState::Idle);
}

#[test]
fn http_error_status_is_fatal_without_retry() {
    let mut server = MockServer::new(IMAGE_LEN);
    server.status_at = Some((4096, 404));
    let mut app = make_app(server, OtaConfig::default());

    let (acks, _, sink) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    assert_eq!(
        sink.last(),
        Some(&AppEvent::OtaFailed(OtaError::Http(HttpError::Status(404))))
    );
    assert_eq!(acks.sent[0].status(), 4);
    let updater = app.updater();
    assert_eq!(updater.client().connects(), 1);
    assert_eq!(updater.client().chunk_requests().len(), 2);
    assert!(updater.pal().image().is_empty());
}

#[test]
fn protocol_errors_are_not_retried() {
    let server = MockServer::new(IMAGE_LEN).fail_next([None, Some(HttpError::Protocol)]);
    let mut app = make_app(server, OtaConfig::default());

    let (acks, _, _) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    assert_eq!(app.updater().client().connects(), 1);
    assert_eq!(acks.sent[0].status(), 4);
}

// ── Probe and image checks ────────────────────────────────────

#[test]
fn missing_content_range_fails_before_flash_is_touched() {
    let mut server = MockServer::new(IMAGE_LEN);
    server.omit_content_range = true;
    let mut app = make_app(server, OtaConfig::default());

    let (acks, _, _) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    assert_eq!(acks.sent[0].message.as_str(), "could not obtain image size");
    assert_eq!(app.updater().client().requests.len(), 1);
    assert_eq!(app.updater().pal().image_state(), ImageState::Unknown);
}

#[test]
fn oversized_image_is_refused() {
    let cfg = OtaConfig {
        max_image_size: 8_192,
        ..OtaConfig::default()
    };
    let mut app = make_app(MockServer::new(IMAGE_LEN), cfg);

    let (_, _, sink) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, None));

    assert_eq!(
        sink.last(),
        Some(&AppEvent::OtaFailed(OtaError::ImageTooLarge {
            declared: IMAGE_LEN as u32,
            max: 8_192
        }))
    );
}

#[test]
fn digest_mismatch_rejects_the_image() {
    let mut app = make_app(MockServer::new(IMAGE_LEN), OtaConfig::default());
    let wrong = "00".repeat(32);

    let (acks, _, sink) = run_ota(&mut app, &ota_payload("01.00.07", IMAGE_URL, Some(&wrong)));

    assert_eq!(
        sink.last(),
        Some(&AppEvent::OtaFailed(OtaError::Pal(
            PalError::SignatureCheckFailed
        )))
    );
    assert_eq!(acks.sent[0].status(), 4);
    assert_eq!(
        acks.sent[0].message.as_str(),
        "flash: image signature check failed"
    );
    let pal = app.updater().pal();
    assert_eq!(pal.image_state(), ImageState::Rejected);
    assert!(!pal.is_activated());
    // The running image stays selected.
    assert!(!pal.rollback_requested());
    assert!(pal.image().is_empty());
}

fn assert_ota_refused(payload: &[u8], error: MessageError, message: &str) {
    let server = MockServer::new(IMAGE_LEN);
    let mut app = make_app(server, OtaConfig::default());
    let mut acks = MockAcks::default();
    let mut leds = MockLeds::default();
    let mut sink = RecordingSink::default();

    let result = app.handle_message(payload, &mut acks, &mut leds, &mut sink);

    assert_eq!(result, Err(Error::Message(error)));
    assert_eq!(acks.sent.len(), 1);
    assert_eq!(acks.sent[0].ack_id.as_str(), "ota-9");
    assert_eq!(acks.sent[0].kind, AckKind::Ota);
    assert_eq!(acks.sent[0].status(), 4);
    assert_eq!(acks.sent[0].message.as_str(), message);
    assert!(app.updater().client().chunk_requests().is_empty());
    assert!(app.updater().pal().image().is_empty());
}

#[test]
fn directive_without_urls_is_acked_as_failure() {
    assert_ota_refused(
        br#"{"ct":1,"ack":"ota-9","sw":"01.00.07","urls":[]}"#,
        MessageError::MissingField("urls"),
        "missing field 'urls'",
    );
}

#[test]
fn directive_without_version_is_acked_as_failure() {
    assert_ota_refused(
        br#"{"ct":1,"ack":"ota-9","urls":[{"url":"https://h/fw.bin"}]}"#,
        MessageError::MissingField("sw"),
        "missing field 'sw'",
    );
}

#[test]
fn oversized_url_is_acked_as_failure() {
    let url = format!("https://fw.example.com/{}", "a".repeat(2_000));
    let payload = format!(r#"{{"ct":1,"ack":"ota-9","sw":"01.00.07","urls":[{{"url":"{url}"}}]}}"#);
    assert_ota_refused(
        payload.as_bytes(),
        MessageError::FieldTooLong("url"),
        "field 'url' too long",
    );
}

#[test]
fn bad_digest_is_acked_as_failure() {
    assert_ota_refused(
        br#"{"ct":1,"ack":"ota-9","sw":"01.00.07","urls":[{"url":"https://h/fw.bin","sha256":"zz"}]}"#,
        MessageError::InvalidField("sha256"),
        "field 'sha256' invalid",
    );
}

#[test]
fn url_without_path_is_rejected() {
    let mut app = make_app(MockServer::new(IMAGE_LEN), OtaConfig::default());

    let (acks, _, sink) = run_ota(
        &mut app,
        &ota_payload("01.00.07", "https://fw.example.com", None),
    );

    assert!(matches!(
        sink.last(),
        Some(AppEvent::OtaFailed(OtaError::InvalidUrl(_)))
    ));
    assert_eq!(acks.sent[0].status(), 4);
    assert_eq!(app.updater().client().connects(), 0);
}

// ── Acks ──────────────────────────────────────────────────────

#[test]
fn ota_without_ack_id_still_updates() {
    let mut app = make_app(MockServer::new(IMAGE_LEN), OtaConfig::default());
    let payload = format!(
        r#"{{"ct":1,"sw":"01.00.07","ack":"","urls":[{{"url":"{IMAGE_URL}","fileName":"app.bin"}}]}}"#
    );

    let (acks, _, _) = run_ota(&mut app, payload.as_bytes());

    assert!(acks.sent.is_empty());
    assert!(app.updater().pal().is_activated());
}

#[test]
fn failure_ack_publish_error_is_surfaced() {
    let mut app = make_app(MockServer::new(IMAGE_LEN), OtaConfig::default());
    let mut acks = MockAcks {
        fail: true,
        ..MockAcks::default()
    };

    let result = app.handle_message(
        &ota_payload("01.00.05", IMAGE_URL, None),
        &mut acks,
        &mut MockLeds::default(),
        &mut RecordingSink::default(),
    );

    assert!(matches!(result, Err(iotc_ota::error::Error::Ack(_))));
}

// ── Boot confirmation ─────────────────────────────────────────

#[test]
fn start_accepts_an_image_on_trial() {
    let updater = iotc_ota::ota::OtaUpdater::new(
        MockServer::new(0),
        iotc_ota::adapters::flash::FlashPal::new().with_boot_state(ImageState::Testing),
        RecordingDelay::default(),
        OtaConfig::default(),
    );
    let mut app = iotc_ota::app::service::AppService::new(updater, RUNNING_VERSION);
    let mut sink = RecordingSink::default();

    app.start(&mut sink).unwrap();

    assert_eq!(
        sink.events,
        vec![AppEvent::Started {
            version: RUNNING_VERSION,
            image: ImageState::Accepted
        }]
    );
    assert_eq!(app.updater().pal().image_state(), ImageState::Accepted);
}

#[test]
fn trial_image_can_be_rejected_before_start() {
    let updater = iotc_ota::ota::OtaUpdater::new(
        MockServer::new(0),
        iotc_ota::adapters::flash::FlashPal::new().with_boot_state(ImageState::Testing),
        RecordingDelay::default(),
        OtaConfig::default(),
    );
    let mut app = iotc_ota::app::service::AppService::new(updater, RUNNING_VERSION);

    app.updater_mut().reject_running_image().unwrap();

    assert_eq!(app.updater().pal().image_state(), ImageState::Rejected);
    assert!(app.updater().pal().rollback_requested());
    // A rejected image cannot be accepted afterwards.
    let mut sink = RecordingSink::default();
    app.start(&mut sink).unwrap();
    assert_eq!(app.updater().pal().image_state(), ImageState::Rejected);
}
