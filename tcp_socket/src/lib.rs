//! Stream Socket Ownership Primitive
//!
//! Provides the resource-ownership core for POSIX-style stream sockets,
//! built on the `socket2` crate for socket allocation and option
//! manipulation and `nix` for descriptor release.
//!
//! ## Overview
//!
//! The `tcp_socket` crate provides:
//! - **Handle**: an opaque wrapper around a native socket descriptor
//! - **Socket**: exclusive owner of one handle, with creation-time
//!   configuration (non-blocking mode, address reuse), an optional peer
//!   address slot, a liveness probe, and exactly-once release with an
//!   optional close hook
//!
//! ## Architecture
//!
//! This crate is the leaf of the networking stack. Listeners, clients,
//! accept loops, read/write framing, and I/O polling are collaborators
//! layered on top: they consume the raw descriptor a `Socket` exposes and
//! hand established descriptors back for adoption. None of those concerns
//! live here.

pub mod handle;
pub mod socket;

pub use handle::Handle;
pub use socket::{AddressFamily, CloseHandler, Socket, SocketOptions, SyscallOp, SystemError};
