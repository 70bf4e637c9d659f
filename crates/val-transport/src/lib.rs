#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Caller-owned I/O adapter traits for the VAL file transfer protocol,
//! plus in-memory test doubles for each.
//!
//! # Overview
//!
//! A session never opens a socket or a file itself. It is handed three
//! small traits — [`Transport`], [`Filesystem`], [`Clock`] — and drives
//! them synchronously on the caller's own thread. This crate defines
//! those traits plus an optional [`DebugSink`], and ships test doubles
//! for all four so `val-core`'s test suite (and any embedder's) never
//! needs a real socket or disk.
//!
//! # Design
//!
//! Each trait covers exactly one capability, mirroring the reference
//! implementation's hook-table groups (transport, filesystem, clock) but
//! expressed as ordinary Rust traits with default methods standing in
//! for the optional hooks (`is_connected`, `flush`, `delay_ms`) rather
//! than nullable function pointers.
//!
//! # Invariants
//!
//! - [`Transport::send`] blocks until all bytes are accepted or an error
//!   occurs; it never partially sends without reporting how far it got
//!   via the error.
//! - [`Transport::recv`] may return fewer bytes than `buf.len()`; callers
//!   must loop. Returning `Ok(0)` means the timeout elapsed with nothing
//!   available, not EOF.
//! - [`Clock::ticks_ms`] wraps at `u32::MAX`; elapsed-time arithmetic
//!   must treat the subtraction as unsigned 32-bit wraparound.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use val_transport::duplex::{duplex_pair, FaultInjection};
//! use val_transport::Transport;
//!
//! let (mut a, mut b) = duplex_pair(FaultInjection::none(), 1);
//! a.send(b"hello").unwrap();
//! let mut buf = [0u8; 16];
//! let n = b.recv(&mut buf, Duration::from_millis(50)).unwrap();
//! assert_eq!(&buf[..n], b"hello");
//! ```
//!
//! # See also
//!
//! - [`val_protocol`] for the wire format these transports carry.

pub mod clock;
pub mod duplex;
pub mod memfs;
pub mod traits;
pub mod tracing_sink;

pub use clock::{SystemClock, TestClock};
pub use duplex::{duplex_pair, DuplexTransport, FaultInjection};
pub use memfs::{MemFile, MemFs};
pub use traits::{Clock, DebugLevel, DebugSink, Filesystem, Transport, Whence};
pub use tracing_sink::TracingDebugSink;
