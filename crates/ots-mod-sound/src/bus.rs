//! Transmit side of the sound board bus.

use std::sync::{Arc, Mutex};

/// Error type for bus transmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SoundBusError {
    #[error("sound bus not ready")]
    NotReady,
    #[error("sound bus transmit queue full")]
    Busy,
    #[error("sound bus I/O error")]
    Io,
}

/// Fire-and-forget frame transmission to the sound board.
///
/// `send` must not wait for an acknowledgement.
pub trait SoundBus {
    fn send(&mut self, frame_id: u16, data: [u8; 8]) -> Result<(), SoundBusError>;

    /// Check if the bus can accept frames.
    fn is_ready(&self) -> bool;
}

/// One transmitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub id: u16,
    pub data: [u8; 8],
}

/// Bus that keeps frames in memory. Clones share the same log, so a test or
/// the host binary can inspect what the module sent.
#[derive(Debug, Clone)]
pub struct RecordingBus {
    frames: Arc<Mutex<Vec<Frame>>>,
    ready: bool,
    failure: Option<SoundBusError>,
}

impl Default for RecordingBus {
    fn default() -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            ready: true,
            failure: None,
        }
    }
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with no sound board attached.
    pub fn disconnected() -> Self {
        Self {
            ready: false,
            ..Self::default()
        }
    }

    /// Make every later `send` fail with `error`.
    pub fn failing(mut self, error: SoundBusError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames
            .lock()
            .map(|frames| frames.clone())
            .unwrap_or_default()
    }
}

impl SoundBus for RecordingBus {
    fn send(&mut self, frame_id: u16, data: [u8; 8]) -> Result<(), SoundBusError> {
        if !self.ready {
            return Err(SoundBusError::NotReady);
        }
        if let Some(err) = self.failure {
            return Err(err);
        }
        let mut frames = self.frames.lock().map_err(|_| SoundBusError::Io)?;
        frames.push(Frame { id: frame_id, data });
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_frame_log() {
        let bus = RecordingBus::new();
        let mut sender = bus.clone();
        sender.send(0x420, [1; 8]).unwrap();
        assert_eq!(bus.frames(), vec![Frame { id: 0x420, data: [1; 8] }]);
    }

    #[test]
    fn disconnected_bus_rejects_frames() {
        let mut bus = RecordingBus::disconnected();
        assert!(!bus.is_ready());
        assert_eq!(bus.send(0x420, [0; 8]), Err(SoundBusError::NotReady));
        assert!(bus.frames().is_empty());
    }
}
