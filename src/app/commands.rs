//! Cloud-to-device messages and their acknowledgements.
//!
//! Inbound payloads use the IoTConnect 2.1 C2D envelope:
//!
//! ```json
//! {"v":"2.1","ct":0,"cmd":"led-red on","ack":"<id>"}
//! {"v":"2.1","ct":1,"cmd":"ota","ack":"<id>","sw":"01.00.07",
//!  "urls":[{"url":"https://...","fileName":"fw.bin"}]}
//! ```
//!
//! Outbound acks: `{"d":{"ack":"<id>","type":0|1,"st":<code>,"msg":"..."}}`.

use core::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::error::{AckError, MessageError};
use crate::ota::url::MAX_URL_LEN;

use super::ports::Led;

pub type AckId = heapless::String<64>;
pub type VersionString = heapless::String<32>;
pub type FileName = heapless::String<128>;
pub type CommandText = heapless::String<128>;
pub type DownloadUrl = heapless::String<MAX_URL_LEN>;

pub const ACK_MSG_LEN: usize = 128;

/// C2D message types.
const CT_COMMAND: u16 = 0;
const CT_OTA: u16 = 1;

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

/// A plain device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Led { led: Led, on: bool },
    /// Recognised command with unusable arguments.
    Invalid(&'static str),
    Unknown,
}

impl Command {
    /// Parse command text such as `led-red on`.  Case-insensitive.
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace();
        let Some(name) = words.next() else {
            return Self::Invalid("Invalid command: empty");
        };
        let led = if name.eq_ignore_ascii_case("ping") {
            return Self::Ping;
        } else if name.eq_ignore_ascii_case("led-red") {
            Led::Red
        } else if name.eq_ignore_ascii_case("led-green") {
            Led::Green
        } else {
            return Self::Unknown;
        };
        match words.next() {
            Some(arg) if arg.eq_ignore_ascii_case("on") => Self::Led { led, on: true },
            Some(arg) if arg.eq_ignore_ascii_case("off") => Self::Led { led, on: false },
            _ => Self::Invalid("Invalid argument: expected 'on' or 'off'"),
        }
    }
}

/// A firmware update offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaDirective {
    pub url: DownloadUrl,
    pub file_name: FileName,
    pub version: VersionString,
    pub ack_id: Option<AckId>,
    /// SHA-256 of the image, verified when the receive file is closed.
    pub digest: Option<[u8; 32]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum C2dMessage {
    Command {
        command: Command,
        text: CommandText,
        ack_id: Option<AckId>,
    },
    Ota(OtaDirective),
    /// A command or update that asked for an ack but could not be decoded.
    Malformed {
        kind: AckKind,
        ack_id: AckId,
        error: MessageError,
    },
    /// Message types this device does not act on.
    Other { ct: u16 },
}

#[derive(Deserialize)]
struct Envelope {
    ct: Option<u16>,
    #[serde(default)]
    cmd: Option<String>,
    #[serde(default)]
    ack: Option<String>,
    #[serde(default)]
    sw: Option<String>,
    #[serde(default)]
    urls: Vec<UrlEntry>,
}

#[derive(Deserialize)]
struct UrlEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "fileName", default)]
    file_name: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
}

impl C2dMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, MessageError> {
        let env: Envelope = serde_json::from_slice(payload).map_err(|_| MessageError::Json)?;
        let ct = env.ct.ok_or(MessageError::MissingField("ct"))?;

        let ack_id = match env.ack.as_deref() {
            None | Some("") => None,
            Some(id) => Some(bounded_field(id, "ack")?),
        };

        let parsed = match ct {
            CT_COMMAND => Self::command(env.cmd, &ack_id),
            CT_OTA => Self::ota(env.sw, env.urls, &ack_id),
            other => return Ok(Self::Other { ct: other }),
        };
        let kind = if ct == CT_OTA {
            AckKind::Ota
        } else {
            AckKind::Command
        };
        match (parsed, ack_id) {
            (Ok(msg), _) => Ok(msg),
            (Err(error), Some(ack_id)) => Ok(Self::Malformed {
                kind,
                ack_id,
                error,
            }),
            (Err(error), None) => Err(error),
        }
    }

    fn command(cmd: Option<String>, ack_id: &Option<AckId>) -> Result<Self, MessageError> {
        let raw = cmd.ok_or(MessageError::MissingField("cmd"))?;
        let text: CommandText = bounded_field(&raw, "cmd")?;
        Ok(Self::Command {
            command: Command::parse(&text),
            text,
            ack_id: ack_id.clone(),
        })
    }

    fn ota(
        sw: Option<String>,
        urls: Vec<UrlEntry>,
        ack_id: &Option<AckId>,
    ) -> Result<Self, MessageError> {
        let sw = sw.ok_or(MessageError::MissingField("sw"))?;
        let entry = urls
            .into_iter()
            .next()
            .ok_or(MessageError::MissingField("urls"))?;
        let digest = entry
            .sha256
            .as_deref()
            .map(|hex| decode_digest(hex).ok_or(MessageError::InvalidField("sha256")))
            .transpose()?;
        Ok(Self::Ota(OtaDirective {
            url: bounded_field(
                entry.url.as_deref().ok_or(MessageError::MissingField("url"))?,
                "url",
            )?,
            file_name: bounded_field(entry.file_name.as_deref().unwrap_or(""), "fileName")?,
            version: bounded_field(&sw, "sw")?,
            ack_id: ack_id.clone(),
            digest,
        }))
    }
}

fn bounded_field<const N: usize>(
    value: &str,
    name: &'static str,
) -> Result<heapless::String<N>, MessageError> {
    heapless::String::try_from(value).map_err(|_| MessageError::FieldTooLong(name))
}

fn decode_digest(hex: &str) -> Option<[u8; 32]> {
    if hex.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (byte, pair) in out.iter_mut().zip(hex.as_bytes().chunks_exact(2)) {
        let s = core::str::from_utf8(pair).ok()?;
        *byte = u8::from_str_radix(s, 16).ok()?;
    }
    Some(out)
}

// ───────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Command,
    Ota,
}

impl AckKind {
    fn type_code(self) -> u8 {
        match self {
            Self::Command => 0,
            Self::Ota => 1,
        }
    }

    /// Platform status code for the outcome.
    pub fn status(self, success: bool) -> u8 {
        match (self, success) {
            (Self::Command, true) => 7,
            (Self::Ota, true) => 0,
            (_, false) => 4,
        }
    }
}

/// Acknowledgement of one C2D message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub ack_id: AckId,
    pub kind: AckKind,
    pub success: bool,
    pub message: heapless::String<ACK_MSG_LEN>,
}

#[derive(Serialize)]
struct AckWire<'a> {
    d: AckBody<'a>,
}

#[derive(Serialize)]
struct AckBody<'a> {
    ack: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    st: u8,
    msg: &'a str,
}

impl Ack {
    /// Build an ack; `message` is truncated to fit.
    pub fn new(ack_id: &AckId, kind: AckKind, success: bool, message: impl fmt::Display) -> Self {
        let mut text = heapless::String::new();
        let _ = write!(Truncating(&mut text), "{message}");
        Self {
            ack_id: ack_id.clone(),
            kind,
            success,
            message: text,
        }
    }

    pub fn status(&self) -> u8 {
        self.kind.status(self.success)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, AckError> {
        serde_json::to_vec(&AckWire {
            d: AckBody {
                ack: &self.ack_id,
                kind: self.kind.type_code(),
                st: self.status(),
                msg: &self.message,
            },
        })
        .map_err(|_| AckError::Encode)
    }
}

/// `fmt::Write` adapter that drops whatever does not fit.
struct Truncating<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> fmt::Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}
