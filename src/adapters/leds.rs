//! Board LED adapter.
//!
//! Implements [`LedPort`] over two `embedded-hal` output pins, so the same
//! code drives ESP-IDF `PinDriver`s on target and fake pins in tests.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::{Led, LedPort};

pub struct GpioLeds<R, G> {
    red: R,
    green: G,
}

impl<R: OutputPin, G: OutputPin> GpioLeds<R, G> {
    /// Take ownership of both pins and switch the LEDs off.
    pub fn new(red: R, green: G) -> Self {
        let mut leds = Self { red, green };
        leds.set_led(Led::Red, false);
        leds.set_led(Led::Green, false);
        leds
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool) -> Result<(), P::Error> {
    if on {
        pin.set_high()
    } else {
        pin.set_low()
    }
}

impl<R: OutputPin, G: OutputPin> LedPort for GpioLeds<R, G> {
    fn set_led(&mut self, led: Led, on: bool) {
        let result = match led {
            Led::Red => drive(&mut self.red, on).map_err(|e| format!("{e:?}")),
            Led::Green => drive(&mut self.green, on).map_err(|e| format!("{e:?}")),
        };
        match result {
            Ok(()) => debug!("LED: {:?} {}", led, if on { "on" } else { "off" }),
            Err(e) => warn!("LED: failed to drive {:?}: {}", led, e),
        }
    }
}
