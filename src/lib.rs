//! IoTConnect OTA firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod ota;

/// Version string of this firmware as reported to the cloud.  OTA offers
/// are compared against it.
pub const FIRMWARE_VERSION: &str = "01.00.06";
