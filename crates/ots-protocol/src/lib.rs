//! Wire protocol for the OTS controller.
//!
//! Everything that crosses the message channel or the CAN sound bus is
//! defined here: the event model and its kind table, the JSON envelope
//! codec, session snapshot types, and the sound-board frame builders.
//! Payloads are typed as soon as they are decoded; nothing downstream of
//! [`decode`] sees raw JSON for the kinds this crate knows about.

pub mod can;
pub mod error;
pub mod event;
pub mod message;
pub mod state;

pub use error::{DecodeError, EncodeError};
pub use event::{
    DiagnosticReport, Event, EventData, EventKind, ModuleHealth, NukeType, Outcome, PeripheralHealth,
    SoundRequest, TroopStatus, UnitRef,
};
pub use message::{decode, encode, Command, Handshake, Message};
pub use state::{ConnectivityState, SessionPhase, SessionSnapshot};
