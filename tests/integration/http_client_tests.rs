//! `HttpsRangeClient` against a local HTTP/1.1 range server.
//!
//! On the host the client speaks plaintext HTTP, so a small
//! `TcpListener` loop stands in for the object store.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use iotc_ota::adapters::flash::FlashPal;
use iotc_ota::adapters::http::HttpsRangeClient;
use iotc_ota::app::commands::OtaDirective;
use iotc_ota::app::ports::RangeClient;
use iotc_ota::config::OtaConfig;
use iotc_ota::error::{HttpError, OtaError};
use iotc_ota::ota::{ByteRange, OtaUpdater};

use crate::mock_platform::{RecordingDelay, RecordingSink};

const RESOURCE: &str = "/fw.bin";

struct RangeServer {
    port: u16,
    image: Arc<Vec<u8>>,
    connections: Arc<AtomicUsize>,
}

impl RangeServer {
    /// Serve `len` bytes at `/fw.bin`, closing each connection after
    /// `per_connection` responses.
    fn start(len: usize, per_connection: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let image: Arc<Vec<u8>> = Arc::new((0..len).map(|i| (i % 253) as u8).collect());
        let connections = Arc::new(AtomicUsize::new(0));

        let (img, count) = (image.clone(), connections.clone());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                count.fetch_add(1, Ordering::SeqCst);
                serve(stream, &img, per_connection);
            }
        });

        Self {
            port,
            image,
            connections,
        }
    }

    fn client(&self) -> HttpsRangeClient {
        HttpsRangeClient::new(self.port, 2_000)
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, image: &[u8], per_connection: usize) {
    let Ok(write_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(stream);
    let mut writer = write_half;

    for _ in 0..per_connection {
        let mut path = String::new();
        let mut range = None;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("GET ") {
                path = rest.split_whitespace().next().unwrap_or("").to_string();
            } else if let Some(spec) = line.strip_prefix("Range: bytes=") {
                let (s, e) = spec.split_once('-').unwrap();
                range = Some((s.parse::<usize>().unwrap(), e.parse::<usize>().unwrap()));
            }
        }

        let response = match range {
            Some((start, end)) if path == RESOURCE && start < image.len() => {
                let end = end.min(image.len() - 1);
                let mut out = format!(
                    "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{end}/{}\r\nContent-Length: {}\r\n\r\n",
                    image.len(),
                    end - start + 1
                )
                .into_bytes();
                out.extend_from_slice(&image[start..=end]);
                out
            }
            _ => b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found".to_vec(),
        };
        if writer.write_all(&response).is_err() {
            return;
        }
    }
}

fn directive(path: &str) -> OtaDirective {
    OtaDirective {
        url: heapless::String::try_from(format!("http://127.0.0.1{path}").as_str()).unwrap(),
        file_name: heapless::String::try_from("fw.bin").unwrap(),
        version: heapless::String::try_from("01.00.07").unwrap(),
        ack_id: None,
        digest: None,
    }
}

fn small_chunks() -> OtaConfig {
    OtaConfig {
        chunk_size: 1_024,
        ..OtaConfig::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[test]
fn fetches_ranges_over_one_keep_alive_connection() {
    let server = RangeServer::start(3_000, usize::MAX);
    let mut client = server.client();
    client.connect("127.0.0.1").unwrap();

    let mut byte = [0u8; 1];
    let probe = client
        .get_range(RESOURCE, ByteRange::FIRST_BYTE, &mut byte)
        .unwrap();
    assert_eq!(probe.status, 206);
    assert_eq!(probe.content_range.as_deref(), Some("bytes 0-0/3000"));
    assert_eq!(byte[0], server.image[0]);

    let mut body = [0u8; 100];
    let resp = client
        .get_range(RESOURCE, ByteRange { start: 2_900, end: 2_999 }, &mut body)
        .unwrap();
    assert_eq!(resp.body_len, 100);
    assert_eq!(&body[..], &server.image[2_900..]);

    assert_eq!(server.connections(), 1);
    client.disconnect();
    assert!(!client.is_connected());
}

#[test]
fn error_status_is_returned_with_empty_body() {
    let server = RangeServer::start(100, usize::MAX);
    let mut client = server.client();
    client.connect("127.0.0.1").unwrap();

    let mut buf = [0u8; 16];
    let resp = client
        .get_range("/missing.bin", ByteRange::FIRST_BYTE, &mut buf)
        .unwrap();
    assert_eq!(resp.status, 404);
    assert_eq!(resp.body_len, 0);

    // The error body was drained, so the session is still usable.
    let resp = client
        .get_range(RESOURCE, ByteRange { start: 0, end: 15 }, &mut buf)
        .unwrap();
    assert_eq!(resp.status, 206);
}

#[test]
fn peer_close_is_a_network_error_and_drops_the_session() {
    let server = RangeServer::start(100, 1);
    let mut client = server.client();
    client.connect("127.0.0.1").unwrap();

    let mut buf = [0u8; 1];
    client
        .get_range(RESOURCE, ByteRange::FIRST_BYTE, &mut buf)
        .unwrap();
    assert_eq!(
        client.get_range(RESOURCE, ByteRange::FIRST_BYTE, &mut buf),
        Err(HttpError::Network)
    );
    assert!(!client.is_connected());
}

#[test]
fn updater_downloads_the_whole_image() {
    let server = RangeServer::start(5_000, usize::MAX);
    let mut updater = OtaUpdater::new(
        server.client(),
        FlashPal::new(),
        RecordingDelay::default(),
        small_chunks(),
    );
    let mut sink = RecordingSink::default();

    assert_eq!(updater.download(&directive(RESOURCE), &mut sink), Ok(5_000));
    assert_eq!(updater.pal().image(), server.image.as_slice());
    assert!(!updater.client().is_connected());
}

#[test]
fn updater_reconnects_when_the_server_drops_the_connection() {
    // Probe plus one chunk per connection.
    let server = RangeServer::start(5_000, 2);
    let mut updater = OtaUpdater::new(
        server.client(),
        FlashPal::new(),
        RecordingDelay::default(),
        small_chunks(),
    );
    let mut sink = RecordingSink::default();

    assert_eq!(updater.download(&directive(RESOURCE), &mut sink), Ok(5_000));
    assert_eq!(updater.pal().image(), server.image.as_slice());
    assert!(server.connections() >= 2);
    assert!(!updater.delay().waits_ms.is_empty());
}

#[test]
fn updater_fails_fast_on_missing_object() {
    let server = RangeServer::start(100, usize::MAX);
    let mut updater = OtaUpdater::new(
        server.client(),
        FlashPal::new(),
        RecordingDelay::default(),
        small_chunks(),
    );
    let mut sink = RecordingSink::default();

    assert_eq!(
        updater.download(&directive("/missing.bin"), &mut sink),
        Err(OtaError::Http(HttpError::Status(404)))
    );
    assert_eq!(server.connections(), 1);
    assert!(updater.pal().image().is_empty());
}
