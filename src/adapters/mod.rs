//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements         | Connects to                   |
//! |--------------|--------------------|-------------------------------|
//! | `http`       | RangeClient        | HTTPS image host              |
//! | `flash`      | FirmwarePal        | OTA partitions (esp-ota)      |
//! | `mqtt`       | AckPort            | IoTConnect broker             |
//! |              | C2D inbox          | Application task              |
//! | `leds`       | LedPort            | Board GPIO                    |
//! | `log_sink`   | EventSink          | Serial log output             |
//! | `nvs`        | ConfigPort         | NVS / in-memory store         |
//! |              | StoragePort        |                               |
//! | `cert_store` | (StoragePort user) | Device certificates in NVS    |
//! | `time`       | DelayNs            | FreeRTOS / std sleep          |

pub mod cert_store;
pub mod flash;
pub mod http;
pub mod leds;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod time;
