//! Cooperative timing helpers for patterned outputs.
//!
//! Nothing here sleeps. Every type compares a stored start time against the
//! `now` it is handed, so callers can poll at any cadence and tolerate
//! jitter.

use crate::hal::{ChannelId, DriverError, HardwareIo};

/// Square wave that starts lit and flips every `interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blink {
    interval_ms: u64,
    lit: bool,
    last_toggle: u64,
}

impl Blink {
    pub fn start(now: u64, interval_ms: u64) -> Self {
        Self {
            interval_ms,
            lit: true,
            last_toggle: now,
        }
    }

    /// Advance to `now` and return the level to drive.
    pub fn poll(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_toggle) >= self.interval_ms {
            self.lit = !self.lit;
            self.last_toggle = now;
        }
        self.lit
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn last_toggle(&self) -> u64 {
        self.last_toggle
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}

/// A blink that ends by itself after `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedBlink {
    started_at: u64,
    duration_ms: u64,
    blink: Blink,
}

impl TimedBlink {
    pub fn start(now: u64, duration_ms: u64, interval_ms: u64) -> Self {
        Self {
            started_at: now,
            duration_ms,
            blink: Blink::start(now, interval_ms),
        }
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.started_at) >= self.duration_ms
    }

    /// Level to drive at `now`, or `None` once expired.
    pub fn poll(&mut self, now: u64) -> Option<bool> {
        if self.is_expired(now) {
            None
        } else {
            Some(self.blink.poll(now))
        }
    }

    pub fn is_lit(&self) -> bool {
        self.blink.is_lit()
    }
}

/// Remembers the level last written to a channel and skips redundant
/// writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLatch {
    channel: ChannelId,
    level: Option<bool>,
}

impl OutputLatch {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            level: None,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Last level written; `false` before the first write.
    pub fn level(&self) -> bool {
        self.level.unwrap_or(false)
    }

    pub fn write(&mut self, io: &mut dyn HardwareIo, on: bool) -> Result<(), DriverError> {
        if self.level == Some(on) {
            return Ok(());
        }
        io.set_output(self.channel, on)?;
        self.level = Some(on);
        Ok(())
    }

    /// Write regardless of the remembered level.
    pub fn force(&mut self, io: &mut dyn HardwareIo, on: bool) -> Result<(), DriverError> {
        self.level = None;
        self.write(io, on)
    }
}
