//! Character display modules.
//!
//! [`StatusModule`] owns the display outside a match; [`TroopsModule`] takes
//! over while one is running. They never draw at the same time because both
//! key off the session phase.

pub mod format;
pub mod status;
pub mod troops;

pub use status::{Screen, StatusModule};
pub use troops::{TroopsConfig, TroopsModule, SET_TROOPS_PERCENT};
