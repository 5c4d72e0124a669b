//! Configuration types and loaders for the OTS controller.
//!
//! This crate owns the on-disk device configuration so the runtime and the
//! binary agree on one schema. It deliberately knows nothing about the
//! runtime types; the binary maps sections onto module settings.

pub mod device;

pub use device::{
    ChannelsConfig, DeviceConfig, DeviceSection, LoggingConfig, ModulesConfig, Pin, RuntimeConfig,
    TimingConfig, KNOWN_MODULES,
};
