//! Core infrastructure for the OTS controller runtime.
//!
//! This crate provides the building blocks shared by the application and
//! every hardware module: the bounded event bus, the module contract and
//! registry, the session and connectivity state machines, the hardware
//! driver contract, command routing, the OTA flag, logging, and the
//! cooperative runtime loop that ties them together.

pub mod blink;
pub mod bus;
pub mod command;
pub mod fps;
pub mod hal;
pub mod logging;
pub mod module;
pub mod ota;
pub mod registry;
pub mod runtime;
pub mod state;
