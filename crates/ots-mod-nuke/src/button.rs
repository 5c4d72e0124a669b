use ots_core::hal::{ChannelId, DriverError, HardwareIo};

/// Debounced push button that reports rising edges.
///
/// A new raw level has to hold for `debounce_ms` before it is accepted.
#[derive(Debug, Clone, Copy)]
pub struct Button {
    channel: ChannelId,
    debounce_ms: u64,
    stable: bool,
    raw: bool,
    raw_since: u64,
}

impl Button {
    pub fn new(channel: ChannelId, debounce_ms: u64) -> Self {
        Self {
            channel,
            debounce_ms,
            stable: false,
            raw: false,
            raw_since: 0,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    /// Sample the input. Returns `true` exactly once per accepted press.
    pub fn poll(&mut self, io: &mut dyn HardwareIo, now: u64) -> Result<bool, DriverError> {
        let level = io.read_input(self.channel)?;
        if level != self.raw {
            self.raw = level;
            self.raw_since = now;
        }
        if self.raw == self.stable || now.saturating_sub(self.raw_since) < self.debounce_ms {
            return Ok(false);
        }
        self.stable = self.raw;
        Ok(self.stable)
    }
}
