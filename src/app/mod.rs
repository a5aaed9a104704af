//! Application core: pure domain logic, zero I/O.
//!
//! Cloud-to-device message handling and the decision of what to do with a
//! firmware offer.  All interaction with the network, flash and board
//! happens through **port traits** defined in [`ports`], keeping this layer
//! fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
