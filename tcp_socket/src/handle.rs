//! Socket Handle Module
//!
//! Provides the `Handle` type: an opaque identifier for one OS-level socket
//! descriptor. A handle carries no behavior beyond identity and a basic
//! validity check; ownership and release are entirely the responsibility of
//! the `Socket` that holds it.

use socket2::Socket as Socket2;
use std::os::unix::io::{IntoRawFd, RawFd};

/// Opaque identifier for an OS-level socket resource.
///
/// Equality is identity of the underlying native descriptor value. A
/// `Handle` is move-only: adopting one into a `Socket` transfers it, so a
/// given descriptor has a single owner at a time.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    raw: RawFd,
}

impl Handle {
    /// Wrap a raw descriptor value
    ///
    /// The caller asserts that the descriptor refers to an established
    /// socket; no syscall is performed.
    ///
    /// # Arguments
    ///
    /// * `raw` - Native descriptor value
    pub fn new(raw: RawFd) -> Self {
        Self { raw }
    }

    /// Get the native descriptor value
    pub fn raw(&self) -> RawFd {
        self.raw
    }

    /// Check whether the descriptor value is in the valid range
    ///
    /// This is an arithmetic check only (descriptors are non-negative); it
    /// does not query the OS.
    pub fn is_valid(&self) -> bool {
        self.raw >= 0
    }
}

impl From<Socket2> for Handle {
    /// Take ownership of an established `socket2` socket's descriptor.
    ///
    /// The socket is consumed, so its drop no longer releases the
    /// descriptor; the receiving `Socket` becomes the sole owner.
    fn from(socket: Socket2) -> Self {
        Self::new(socket.into_raw_fd())
    }
}
