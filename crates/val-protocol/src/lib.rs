#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Wire codec for the VAL file transfer protocol.
//!
//! # Overview
//!
//! This crate owns the protocol's external contract: the frame layout,
//! the per-type payload structures, the error/detail-mask taxonomy, and
//! the little-endian integer encoding shared by all of them. It has no
//! notion of sockets, files, or timers — those belong to `val-transport`
//! and `val-core`. Everything here is a pure, allocation-light transform
//! between Rust values and octet buffers.
//!
//! # Design
//!
//! A wire frame is always three pieces, assembled by [`frame::Frame`]:
//!
//! ```text
//! +----------------+-----------------------+------------+
//! | header (8 B)   | payload (0..=N bytes) | CRC32 (4 B) |
//! +----------------+-----------------------+------------+
//! ```
//!
//! The header identifies the frame's [`header::FrameType`] and carries a
//! small type-specific field (`type_data`) used for offsets and cumulative
//! ACK sequencing without needing a separate payload for the common case.
//! The trailer CRC32 covers header and payload together, computed with the
//! same IEEE 802.3 polynomial used for whole-file and resume-verify
//! checksums (see [`val_checksums`]).
//!
//! # Invariants
//!
//! - All multi-byte integers are little-endian regardless of host
//!   architecture; see [`byteorder`].
//! - [`constants::MAGIC`], field widths, and [`error::Detail`]'s bit
//!   layout are part of the wire contract and must never change within a
//!   major version.
//! - Name fields are fixed-width and NUL-padded on the wire; see
//!   [`sanitize`] for the sender-side cleaning applied before encoding.
//!
//! # Errors
//!
//! Every decode function returns [`error::Result`], carrying an
//! [`error::ProtocolError`] (a [`error::Code`] paired with an
//! [`error::Detail`] mask) rather than panicking on malformed input —
//! this crate sits directly on the wire and must treat all input as
//! untrusted.
//!
//! # Examples
//!
//! ```
//! use val_protocol::frame::Frame;
//! use val_protocol::header::{FrameHeader, FrameType};
//!
//! let frame = Frame::new(FrameHeader::new(FrameType::Data, 0), b"payload".to_vec());
//! let mut buf = vec![0u8; frame.wire_len()];
//! frame.encode(&mut buf);
//! let decoded = Frame::decode(&buf).unwrap();
//! assert_eq!(decoded, frame);
//! ```
//!
//! # See also
//!
//! - [`val_checksums`] for the CRC32 engine this crate's trailers and the
//!   resume-verify sub-protocol both depend on.

pub mod byteorder;
pub mod constants;
pub mod error;
pub mod frame;
pub mod header;
pub mod payload;
pub mod sanitize;

pub use error::{Code, Detail, ProtocolError, Result};
pub use frame::Frame;
pub use header::{FrameHeader, FrameType};
