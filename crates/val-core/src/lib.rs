#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Session engine for the VAL file transfer protocol.
//!
//! # Overview
//!
//! This crate owns the stateful half of VAL: the HELLO handshake, the
//! receiver-driven resume decision matrix, the windowed sender and
//! receiver file loops, adaptive RTO, and congestion-window flow
//! control. It is generic over three caller-owned adapters —
//! [`val_transport::Transport`], [`val_transport::Filesystem`], and
//! [`val_transport::Clock`] — so embedders can run it over a real
//! socket and disk, or (as the test suite does throughout) over the
//! in-memory doubles `val-transport` ships.
//!
//! [`session::Session`] is the crate's single entry point: construct one
//! from a validated [`config::Config`] and the three adapters, then call
//! [`session::Session::send_files`] or [`session::Session::receive_files`].
//! Both run exactly one handshake followed by a batch of files and a
//! terminal EOT/EOT-ACK exchange.
//!
//! # Design
//!
//! - `config` — the validated, immutable settings a session is built
//!   from: buffer sizes, timeouts, retry budgets, resume policy, flow
//!   control caps, and the caller's callbacks.
//! - `session` — the `Session` struct itself plus the low-level frame
//!   I/O (`write_frame`/`read_frame`/`await_frame`) every phase builds
//!   on.
//! - `handshake` — the one HELLO round-trip: version check, MTU
//!   negotiation, feature intersection, window-cap exchange.
//! - `resume` — the pure, I/O-free resume decision matrix
//!   (`decide_with_existence`) plus the CRC-streaming helper
//!   (`crc_over_range`) the matrix's `Verify` arm and the sender's
//!   answer both call into.
//! - `sender` / `receiver` — the two file loops: windowed DATA send
//!   with Go-Back-N retransmission on the sender side, in-order DATA
//!   acceptance with cumulative ACK/NAK on the receiver side.
//! - `rto` — the adaptive retransmission timeout estimator (additive
//!   increase on timeout, multiplicative decrease on sustained success).
//! - `cwnd` — the congestion window: packets-in-flight cap that grows on
//!   clean ACK streaks and collapses on NAK or ACK-wait timeout.
//! - `metrics` / `deadline` — observability counters and the wrapping
//!   `u32` millisecond-tick arithmetic shared by the RTO and the
//!   `await_frame` retry loop.
//! - `error` — [`error::SessionError`], wrapping transport/filesystem
//!   I/O errors and [`val_protocol::ProtocolError`] behind one type, plus
//!   the [`val_protocol::error::LastError`] snapshot a session exposes
//!   after any failure.
//!
//! # Invariants
//!
//! - A `Session` runs its handshake exactly once; `send_files`/
//!   `receive_files` each call it at the top and error out if the
//!   session is already terminal (see [`session::Session::is_cancelled`]).
//! - The resume matrix ([`resume::decide_with_existence`]) never touches
//!   the filesystem: existence and size are determined by the receiver
//!   before the matrix is consulted, keeping the decision table unit
//!   testable without I/O.
//! - `await_frame` retries until the adaptive RTO's hard deadline for
//!   the caller-supplied retry budget; the sender's windowed data loop
//!   additionally bounds *consecutive* ACK-wait timeouts so a dead
//!   transport eventually surfaces [`error::SessionError`] rather than
//!   retrying forever.
//!
//! # Errors
//!
//! Every public operation returns [`error::Result`]. A returned error
//! always updates [`session::Session::last_error`] before propagating,
//! so a caller that only inspects the return value and one that polls
//! `last_error` after the fact see the same failure.
//!
//! # Examples
//!
//! ```no_run
//! use val_core::config::ConfigBuilder;
//! use val_core::session::Session;
//! use val_transport::{SystemClock, Filesystem, Transport};
//!
//! # fn run<T: Transport, F: Filesystem>(transport: T, filesystem: F) -> val_core::error::Result<()> {
//! let config = ConfigBuilder::new().build().unwrap();
//! let mut session = Session::new(config, transport, filesystem, SystemClock::new());
//! session.send_files(&["report.csv".to_string()])?;
//! # Ok(()) }
//! ```
//!
//! # See also
//!
//! - [`val_protocol`] for the wire format this crate encodes and decodes.
//! - [`val_transport`] for the adapter traits and test doubles this
//!   crate is generic over.
//! - [`val_checksums`] for the CRC32 engine behind `crc_over_range` and
//!   every DATA trailer.

pub mod config;
pub mod cwnd;
pub mod deadline;
pub mod error;
pub mod handshake;
pub mod metrics;
pub mod receiver;
pub mod resume;
pub mod rto;
pub mod sender;
pub mod session;

pub use config::{Config, ConfigBuilder, ResumeMode};
pub use error::{Result, SessionError};
pub use metrics::{Metrics, WireAudit};
pub use session::Session;
