//! Hardware driver contract consumed by modules.
//!
//! Modules never own a driver. The runtime lends one to them through
//! [`crate::module::TickContext`] for the duration of a call, so every
//! access is synchronous and short. Bus retries and buffering are the
//! driver's business.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::debug;

/// Rows on the character display.
pub const DISPLAY_ROWS: u8 = 2;
/// Columns on the character display.
pub const DISPLAY_COLS: usize = 16;

/// One digital line on an I/O expander board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    pub board: u8,
    pub pin: u8,
}

impl ChannelId {
    pub const fn new(board: u8, pin: u8) -> Self {
        Self { board, pin }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "board{}:pin{}", self.board, self.pin)
    }
}

/// Peripheral groups that may be missing from a given build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Peripheral {
    InputBoard,
    OutputBoard,
    Display,
    Analog,
    SoundBus,
}

impl Peripheral {
    pub const ALL: [Peripheral; 5] = [
        Peripheral::InputBoard,
        Peripheral::OutputBoard,
        Peripheral::Display,
        Peripheral::Analog,
        Peripheral::SoundBus,
    ];

    /// Key used in diagnostic reports.
    pub fn key(self) -> &'static str {
        match self {
            Peripheral::InputBoard => "inputBoard",
            Peripheral::OutputBoard => "outputBoard",
            Peripheral::Display => "lcd",
            Peripheral::Analog => "adc",
            Peripheral::SoundBus => "soundModule",
        }
    }
}

/// Error type for driver operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("{0:?} is not present")]
    Absent(Peripheral),
    #[error("bus transaction on {0} failed")]
    Bus(ChannelId),
    #[error("display row {0} out of range")]
    DisplayRow(u8),
    #[error("analog channel {0} not available")]
    AnalogChannel(u8),
}

/// Fast, non-blocking access to the controller's peripherals.
///
/// `read_input` reports `true` while the line is asserted (a button is
/// held), whatever the electrical polarity of the board.
pub trait HardwareIo {
    /// Return `true` if the peripheral answered detection.
    fn detect(&mut self, peripheral: Peripheral) -> bool;

    fn set_output(&mut self, channel: ChannelId, on: bool) -> Result<(), DriverError>;

    fn read_input(&mut self, channel: ChannelId) -> Result<bool, DriverError>;

    /// Write a full display row. Text is padded or cut to the row width.
    fn set_display_line(&mut self, row: u8, text: &str) -> Result<(), DriverError>;

    /// Read an analog channel scaled to 0-100.
    fn read_analog_percent(&mut self, channel: u8) -> Result<u8, DriverError>;
}

/// In-memory board used on the host and in tests.
#[derive(Debug, Default)]
pub struct SimulatedIo {
    absent: HashSet<Peripheral>,
    failing: HashSet<ChannelId>,
    outputs: BTreeMap<ChannelId, bool>,
    inputs: BTreeMap<ChannelId, bool>,
    analog: BTreeMap<u8, u8>,
    display: [String; DISPLAY_ROWS as usize],
    output_writes: usize,
}

impl SimulatedIo {
    /// A board with every peripheral fitted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a peripheral from the board.
    pub fn without(mut self, peripheral: Peripheral) -> Self {
        self.absent.insert(peripheral);
        self
    }

    /// Make every later write to `channel` fail.
    pub fn fail_channel(&mut self, channel: ChannelId) {
        self.failing.insert(channel);
    }

    pub fn set_input(&mut self, channel: ChannelId, asserted: bool) {
        self.inputs.insert(channel, asserted);
    }

    pub fn set_analog(&mut self, channel: u8, percent: u8) {
        self.analog.insert(channel, percent.min(100));
    }

    /// Current level of an output; unwritten outputs read low.
    pub fn output(&self, channel: ChannelId) -> bool {
        self.outputs.get(&channel).copied().unwrap_or(false)
    }

    pub fn display_line(&self, row: u8) -> &str {
        self.display
            .get(row as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Number of `set_output` calls that reached the board.
    pub fn output_writes(&self) -> usize {
        self.output_writes
    }

    fn require(&self, peripheral: Peripheral) -> Result<(), DriverError> {
        if self.absent.contains(&peripheral) {
            Err(DriverError::Absent(peripheral))
        } else {
            Ok(())
        }
    }
}

impl HardwareIo for SimulatedIo {
    fn detect(&mut self, peripheral: Peripheral) -> bool {
        !self.absent.contains(&peripheral)
    }

    fn set_output(&mut self, channel: ChannelId, on: bool) -> Result<(), DriverError> {
        self.require(Peripheral::OutputBoard)?;
        if self.failing.contains(&channel) {
            return Err(DriverError::Bus(channel));
        }
        self.output_writes += 1;
        if self.outputs.insert(channel, on) != Some(on) {
            debug!(%channel, on, "output changed");
        }
        Ok(())
    }

    fn read_input(&mut self, channel: ChannelId) -> Result<bool, DriverError> {
        self.require(Peripheral::InputBoard)?;
        if self.failing.contains(&channel) {
            return Err(DriverError::Bus(channel));
        }
        Ok(self.inputs.get(&channel).copied().unwrap_or(false))
    }

    fn set_display_line(&mut self, row: u8, text: &str) -> Result<(), DriverError> {
        self.require(Peripheral::Display)?;
        let slot = self
            .display
            .get_mut(row as usize)
            .ok_or(DriverError::DisplayRow(row))?;
        let mut line: String = text.chars().take(DISPLAY_COLS).collect();
        while line.chars().count() < DISPLAY_COLS {
            line.push(' ');
        }
        debug!(row, line = %line, "display row");
        *slot = line;
        Ok(())
    }

    fn read_analog_percent(&mut self, channel: u8) -> Result<u8, DriverError> {
        self.require(Peripheral::Analog)?;
        Ok(self.analog.get(&channel).copied().unwrap_or(0))
    }
}
