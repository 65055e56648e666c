//! Stream Socket Module
//!
//! Provides the core stream-socket ownership primitive. A `Socket` owns
//! exactly one descriptor [`Handle`], records its immutable creation-time
//! configuration, and guarantees the descriptor is released exactly once,
//! with an optional one-shot notification hook fired immediately before
//! release.
//!
//! Connection establishment, data transfer, address resolution, and I/O
//! multiplexing are collaborator concerns built on top of this type; they
//! consume the raw descriptor exposed here and are not part of this module.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::io::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, SockRef, Socket as Socket2, Type};

use crate::handle::Handle;

/// Identifies the creation-time syscall that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOp {
    /// Allocating the stream socket
    SocketCreate,
    /// Switching the descriptor into non-blocking mode
    SetNonBlocking,
    /// Enabling address reuse on the descriptor
    SetReuseAddress,
}

impl fmt::Display for SyscallOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyscallOp::SocketCreate => write!(f, "socket_create"),
            SyscallOp::SetNonBlocking => write!(f, "set_non_blocking"),
            SyscallOp::SetReuseAddress => write!(f, "set_reuse_address"),
        }
    }
}

/// Error raised when socket creation fails.
///
/// Carries the OS error code captured at the failing syscall's return
/// together with the operation identifier. Only [`Socket::create`] produces
/// these; adoption, the liveness probe, and release do not fail at this
/// layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemError {
    /// Which operation failed
    pub op: SyscallOp,
    /// OS error code reported for the failing operation
    pub errno: i32,
}

impl SystemError {
    /// Package an I/O error from a failed syscall
    ///
    /// The error code is taken from `err`, which the socket layer captured
    /// at the point of the failing call, before any later operation could
    /// overwrite it.
    fn from_io(op: SyscallOp, err: io::Error) -> Self {
        Self {
            op,
            errno: err.raw_os_error().unwrap_or(-1),
        }
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed: {} (errno {})",
            self.op,
            io::Error::from_raw_os_error(self.errno),
            self.errno
        )
    }
}

impl std::error::Error for SystemError {}

/// Address family for socket creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4
    Ipv4,
    /// IPv6
    Ipv6,
}

impl From<AddressFamily> for Domain {
    fn from(family: AddressFamily) -> Self {
        match family {
            AddressFamily::Ipv4 => Domain::IPV4,
            AddressFamily::Ipv6 => Domain::IPV6,
        }
    }
}

/// Creation-time configuration for [`Socket::create`].
///
/// The defaults request a non-blocking IPv4 socket with address reuse
/// enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// Put the descriptor into non-blocking I/O mode
    pub is_non_blocking: bool,
    /// Enable rapid rebinding of the local address at the OS level
    pub should_reuse_address: bool,
    /// Address family of the new socket
    pub family: AddressFamily,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            is_non_blocking: true,
            should_reuse_address: true,
            family: AddressFamily::Ipv4,
        }
    }
}

/// One-shot hook invoked immediately before the descriptor is released.
pub type CloseHandler = Box<dyn FnOnce()>;

/// A stream socket endpoint that owns its descriptor.
///
/// A `Socket` is created either by fresh allocation ([`Socket::create`]) or
/// by adopting a descriptor established elsewhere ([`Socket::adopt`]), e.g.
/// one produced by a collaborator's accept loop. The descriptor is valid
/// from construction until [`Socket::close`] runs; release happens exactly
/// once, whether triggered explicitly or by the socket going out of scope.
///
/// Single-owner, single-threaded usage model: a `Socket` is not designed
/// for concurrent mutation or concurrent close.
pub struct Socket {
    handle: Handle,
    remote_address: Option<SocketAddr>,
    is_non_blocking: bool,
    should_reuse_address: bool,
    on_close: Option<CloseHandler>,
    closed: bool,
}

impl Socket {
    /// Create a new stream socket
    ///
    /// Opens a connection-oriented stream socket for the requested address
    /// family and applies the requested creation-time options. A descriptor
    /// opened before a failing configuration step is released before the
    /// error propagates, so failures never leak descriptors.
    ///
    /// # Arguments
    ///
    /// * `options` - Creation-time configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Socket)` - Configured socket with no remote address
    /// * `Err(SystemError)` - Which syscall failed and the OS error code
    pub fn create(options: SocketOptions) -> Result<Self, SystemError> {
        let socket = Socket2::new(options.family.into(), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| SystemError::from_io(SyscallOp::SocketCreate, e))?;

        // On an early return below the socket2 wrapper still owns the
        // descriptor and closes it when dropped.
        if options.is_non_blocking {
            socket
                .set_nonblocking(true)
                .map_err(|e| SystemError::from_io(SyscallOp::SetNonBlocking, e))?;
        }

        if options.should_reuse_address {
            socket
                .set_reuse_address(true)
                .map_err(|e| SystemError::from_io(SyscallOp::SetReuseAddress, e))?;
        }

        Ok(Self::adopt(
            Handle::from(socket),
            options.is_non_blocking,
            options.should_reuse_address,
            None,
        ))
    }

    /// Adopt an already-established descriptor
    ///
    /// Wraps a descriptor produced elsewhere (e.g. by a collaborator's
    /// accept operation) with caller-supplied configuration flags and an
    /// optional known peer address. Performs no syscalls and always
    /// succeeds; the flags are recorded as given, not queried from the OS.
    ///
    /// # Arguments
    ///
    /// * `handle` - Descriptor to take ownership of
    /// * `is_non_blocking` - Whether the descriptor is in non-blocking mode
    /// * `should_reuse_address` - Whether address reuse was requested
    /// * `remote_address` - Peer address, if already known
    pub fn adopt(
        handle: Handle,
        is_non_blocking: bool,
        should_reuse_address: bool,
        remote_address: Option<SocketAddr>,
    ) -> Self {
        Self {
            handle,
            remote_address,
            is_non_blocking,
            should_reuse_address,
            on_close: None,
            closed: false,
        }
    }

    /// Check whether the socket is still considered healthy
    ///
    /// Queries the OS-level pending-error state of the descriptor
    /// (`SO_ERROR`) and returns true iff no error is reported. This is a
    /// point-in-time probe, not a guarantee of future I/O success; it is
    /// meaningful primarily after a collaborator has attempted a
    /// connection. Returns false once the socket has been closed.
    pub fn is_connected(&self) -> bool {
        if self.closed {
            return false;
        }
        matches!(SockRef::from(self).take_error(), Ok(None))
    }

    /// Close the socket
    ///
    /// Fires the close handler if one is attached, then releases the
    /// descriptor. Release is best-effort: an OS-level failure during close
    /// is discarded at this layer. Calling `close` again, or dropping the
    /// socket afterwards, does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // The handler runs before release so it may still reason about the
        // descriptor's last-known state.
        if let Some(handler) = self.on_close.take() {
            handler();
        }

        let _ = nix::unistd::close(self.handle.raw());
    }

    /// Attach a hook to run once, immediately before the descriptor is
    /// released.
    ///
    /// A later call replaces an earlier, not-yet-fired hook.
    pub fn set_on_close<F>(&mut self, handler: F)
    where
        F: FnOnce() + 'static,
    {
        self.on_close = Some(Box::new(handler));
    }

    /// Get the owned descriptor handle
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Get the peer address, if one has been recorded
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.remote_address
    }

    /// Record the peer address
    ///
    /// Set by connect/accept collaborators; metadata only, not involved in
    /// the descriptor's lifetime.
    pub fn set_remote_address(&mut self, address: SocketAddr) {
        self.remote_address = Some(address);
    }

    /// True if the descriptor was put into non-blocking mode at construction
    pub fn is_non_blocking(&self) -> bool {
        self.is_non_blocking
    }

    /// True if address reuse was requested at construction
    pub fn should_reuse_address(&self) -> bool {
        self.should_reuse_address
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.raw()
    }
}

impl AsFd for Socket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // Valid while the socket is open; borrows must not outlive close().
        unsafe { BorrowedFd::borrow_raw(self.handle.raw()) }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("handle", &self.handle)
            .field("remote_address", &self.remote_address)
            .field("is_non_blocking", &self.is_non_blocking)
            .field("should_reuse_address", &self.should_reuse_address)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::net::Ipv4Addr;
    use std::rc::Rc;

    fn descriptor_is_open(fd: RawFd) -> bool {
        unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
    }

    fn nonblocking_flag(fd: RawFd) -> bool {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        assert_ne!(flags, -1);
        flags & libc::O_NONBLOCK != 0
    }

    #[test]
    fn test_create_defaults() {
        let socket = Socket::create(SocketOptions::default()).unwrap();

        assert!(socket.handle().is_valid());
        assert!(descriptor_is_open(socket.as_raw_fd()));
        assert!(socket.is_non_blocking());
        assert!(socket.should_reuse_address());
        assert_eq!(socket.remote_address(), None);
    }

    #[test]
    fn test_create_sets_nonblocking_mode() {
        let socket = Socket::create(SocketOptions::default()).unwrap();
        assert!(nonblocking_flag(socket.as_raw_fd()));
    }

    #[test]
    fn test_create_blocking_when_requested() {
        let options = SocketOptions {
            is_non_blocking: false,
            ..Default::default()
        };
        let socket = Socket::create(options).unwrap();

        assert!(!socket.is_non_blocking());
        assert!(!nonblocking_flag(socket.as_raw_fd()));
    }

    #[test]
    fn test_create_enables_reuse_address() {
        let socket = Socket::create(SocketOptions::default()).unwrap();
        assert!(SockRef::from(&socket).reuse_address().unwrap());
    }

    #[test]
    fn test_create_without_reuse_address() {
        let options = SocketOptions {
            should_reuse_address: false,
            ..Default::default()
        };
        let socket = Socket::create(options).unwrap();

        assert!(!socket.should_reuse_address());
        assert!(!SockRef::from(&socket).reuse_address().unwrap());
    }

    #[test]
    fn test_create_ipv6() {
        let options = SocketOptions {
            family: AddressFamily::Ipv6,
            ..Default::default()
        };
        let socket = Socket::create(options).unwrap();
        assert!(descriptor_is_open(socket.as_raw_fd()));
    }

    #[test]
    fn test_adopt_echoes_configuration() {
        let peer = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 4242);
        let established = Socket2::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
        let handle = Handle::from(established);
        let raw = handle.raw();

        let socket = Socket::adopt(handle, false, false, Some(peer));

        // The flags are recorded as supplied, regardless of the
        // descriptor's actual OS-level state.
        assert!(!socket.is_non_blocking());
        assert!(!socket.should_reuse_address());
        assert_eq!(socket.remote_address(), Some(peer));
        assert_eq!(socket.handle().raw(), raw);
        assert!(descriptor_is_open(raw));
    }

    #[test]
    fn test_set_remote_address() {
        let mut socket = Socket::create(SocketOptions::default()).unwrap();
        assert_eq!(socket.remote_address(), None);

        let peer = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 9000);
        socket.set_remote_address(peer);
        assert_eq!(socket.remote_address(), Some(peer));
    }

    #[test]
    fn test_close_fires_handler_exactly_once() {
        let fired = Rc::new(Cell::new(0u32));
        let observer = Rc::clone(&fired);

        let mut socket = Socket::create(SocketOptions::default()).unwrap();
        socket.set_on_close(move || observer.set(observer.get() + 1));

        socket.close();
        socket.close();
        drop(socket);

        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_handler_runs_before_release() {
        let mut socket = Socket::create(SocketOptions::default()).unwrap();
        let raw = socket.as_raw_fd();

        let open_during_handler = Rc::new(Cell::new(false));
        let observer = Rc::clone(&open_during_handler);
        socket.set_on_close(move || observer.set(descriptor_is_open(raw)));

        socket.close();

        assert!(open_during_handler.get());
        assert!(!descriptor_is_open(raw));
    }

    #[test]
    fn test_close_releases_descriptor() {
        let mut socket = Socket::create(SocketOptions::default()).unwrap();
        let raw = socket.as_raw_fd();

        socket.close();
        assert!(!descriptor_is_open(raw));
    }

    #[test]
    fn test_drop_releases_descriptor() {
        let socket = Socket::create(SocketOptions::default()).unwrap();
        let raw = socket.as_raw_fd();

        drop(socket);
        assert!(!descriptor_is_open(raw));
    }

    #[test]
    fn test_drop_after_close_does_not_release_twice() {
        let mut socket = Socket::create(SocketOptions::default()).unwrap();
        socket.close();

        // The next descriptor allocated typically reuses the released
        // number. A second release on drop would close the unrelated
        // bystander descriptor.
        let bystander = Socket::create(SocketOptions::default()).unwrap();
        let bystander_raw = bystander.as_raw_fd();

        drop(socket);
        assert!(descriptor_is_open(bystander_raw));
    }

    #[test]
    fn test_is_connected_on_fresh_socket() {
        let socket = Socket::create(SocketOptions::default()).unwrap();

        // No connection attempt has been made, so no pending error is
        // reported.
        assert!(socket.is_connected());
    }

    #[test]
    fn test_is_connected_after_close() {
        let mut socket = Socket::create(SocketOptions::default()).unwrap();
        socket.close();
        assert!(!socket.is_connected());
    }

    #[test]
    fn test_system_error_display() {
        let err = SystemError {
            op: SyscallOp::SetReuseAddress,
            errno: libc::EBADF,
        };

        let rendered = err.to_string();
        assert!(rendered.starts_with("set_reuse_address failed:"));
        assert!(rendered.contains(&format!("errno {}", libc::EBADF)));
    }

    #[test]
    fn test_syscall_op_display() {
        assert_eq!(SyscallOp::SocketCreate.to_string(), "socket_create");
        assert_eq!(SyscallOp::SetNonBlocking.to_string(), "set_non_blocking");
        assert_eq!(SyscallOp::SetReuseAddress.to_string(), "set_reuse_address");
    }

    #[test]
    fn test_default_options() {
        let options = SocketOptions::default();
        assert!(options.is_non_blocking);
        assert!(options.should_reuse_address);
        assert_eq!(options.family, AddressFamily::Ipv4);
    }
}
