//! Delay adapter.
//!
//! [`SystemDelay`] is the `embedded_hal` delay provider handed to the OTA
//! pipeline for retry back-off and settle pauses.
//!
//! - **`target_os = "espidf"`**: millisecond waits block the calling FreeRTOS
//!   task (`FreeRtos::delay_ms`) so other tasks keep running; sub-millisecond
//!   waits busy-wait in ROM (`Ets::delay_us`).
//! - **`not(target_os = "espidf")`**: `std::thread::sleep` for host-side
//!   testing and simulation.

use embedded_hal::delay::DelayNs;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDelay;

impl SystemDelay {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl DelayNs for SystemDelay {
    fn delay_ns(&mut self, ns: u32) {
        if ns >= 1_000_000 {
            esp_idf_hal::delay::FreeRtos::delay_ms(ns.div_ceil(1_000_000));
        } else {
            esp_idf_hal::delay::Ets::delay_us(ns.div_ceil(1_000));
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }
}

#[cfg(not(target_os = "espidf"))]
impl DelayNs for SystemDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
