//! Firmware update collaborator.
//!
//! The transfer itself lives outside the runtime. What the runtime needs is
//! the [`OtaSink`] contract the transfer writes through, and the shared
//! [`UpdateFlag`] the link indicator polls to show an update in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

/// Shared "update in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlag(Arc<AtomicBool>);

impl UpdateFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtaError {
    #[error("update image rejected: {0}")]
    Rejected(String),
    #[error("flash write failed: {0}")]
    Write(String),
    #[error("image validation failed: {0}")]
    Validation(String),
    #[error("could not select boot partition: {0}")]
    Boot(String),
}

/// Destination of an update image.
pub trait OtaSink {
    fn begin(&mut self, size_hint: Option<usize>) -> Result<(), OtaError>;
    fn write(&mut self, chunk: &[u8]) -> Result<(), OtaError>;
    /// Finish writing and validate the image.
    fn end(&mut self) -> Result<(), OtaError>;
    fn set_boot_partition(&mut self) -> Result<(), OtaError>;
}

/// One update attempt. The flag is raised for as long as the session
/// lives and lowered on completion, failure, or drop.
pub struct OtaSession<'a, S: OtaSink> {
    sink: &'a mut S,
    flag: UpdateFlag,
    written: usize,
}

impl<'a, S: OtaSink> OtaSession<'a, S> {
    pub fn begin(
        sink: &'a mut S,
        flag: UpdateFlag,
        size_hint: Option<usize>,
    ) -> Result<Self, OtaError> {
        sink.begin(size_hint)?;
        flag.set(true);
        info!(?size_hint, "firmware update started");
        Ok(Self {
            sink,
            flag,
            written: 0,
        })
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<(), OtaError> {
        self.sink.write(chunk)?;
        self.written += chunk.len();
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Validate the image and make it the next boot target. Returns the
    /// number of bytes written.
    pub fn finish(self) -> Result<usize, OtaError> {
        let result = self
            .sink
            .end()
            .and_then(|()| self.sink.set_boot_partition());
        match &result {
            Ok(()) => info!(bytes = self.written, "firmware update complete"),
            Err(err) => warn!(error = %err, "firmware update failed"),
        }
        result.map(|()| self.written)
    }
}

impl<S: OtaSink> Drop for OtaSession<'_, S> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemorySink {
        image: Vec<u8>,
        begun: bool,
        boot_set: bool,
        corrupt: bool,
    }

    impl OtaSink for MemorySink {
        fn begin(&mut self, _size_hint: Option<usize>) -> Result<(), OtaError> {
            self.begun = true;
            Ok(())
        }
        fn write(&mut self, chunk: &[u8]) -> Result<(), OtaError> {
            if !self.begun {
                return Err(OtaError::Write("not started".into()));
            }
            self.image.extend_from_slice(chunk);
            Ok(())
        }
        fn end(&mut self) -> Result<(), OtaError> {
            if self.corrupt {
                Err(OtaError::Validation("bad checksum".into()))
            } else {
                Ok(())
            }
        }
        fn set_boot_partition(&mut self) -> Result<(), OtaError> {
            self.boot_set = true;
            Ok(())
        }
    }

    #[test]
    fn flag_tracks_session_lifetime() {
        let flag = UpdateFlag::new();
        let mut sink = MemorySink::default();
        let mut session = OtaSession::begin(&mut sink, flag.clone(), Some(6)).unwrap();
        assert!(flag.is_set());
        session.write(b"abc").unwrap();
        session.write(b"def").unwrap();
        assert_eq!(session.finish().unwrap(), 6);
        assert!(!flag.is_set());
        assert_eq!(sink.image, b"abcdef");
        assert!(sink.boot_set);
    }

    #[test]
    fn failed_validation_clears_flag_and_keeps_boot_target() {
        let flag = UpdateFlag::new();
        let mut sink = MemorySink {
            corrupt: true,
            ..MemorySink::default()
        };
        let mut session = OtaSession::begin(&mut sink, flag.clone(), None).unwrap();
        session.write(b"x").unwrap();
        let err = session.finish().unwrap_err();
        assert!(matches!(err, OtaError::Validation(_)));
        assert!(!flag.is_set());
        assert!(!sink.boot_set);
    }

    #[test]
    fn abandoned_session_clears_flag() {
        let flag = UpdateFlag::new();
        let mut sink = MemorySink::default();
        {
            let _session = OtaSession::begin(&mut sink, flag.clone(), None).unwrap();
            assert!(flag.is_set());
        }
        assert!(!flag.is_set());
    }
}
