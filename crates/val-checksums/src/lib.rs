#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `val_checksums` provides the CRC32 integrity primitive used by the VAL
//! file transfer protocol: header/trailer verification on every frame, and
//! prefix/tail verification during resume negotiation.
//!
//! # Design
//!
//! The crate exposes a single [`Crc32`] streaming accumulator built on top
//! of [`flate2::Crc`], which already implements the IEEE 802.3 polynomial
//! (reflected, init `0xFFFFFFFF`, final XOR `0xFFFFFFFF`) for gzip trailers.
//! Reusing it here avoids hand-rolling a lookup table for an algorithm the
//! workspace already depends on transitively.
//!
//! Callers that want a hardware-accelerated engine (e.g. a CRC32
//! instruction on the target MCU) implement [`Crc32Engine`] and hand it to
//! `val-core`'s `Config`; the software [`Crc32Engine`] implementation here
//! is always the default.
//!
//! # Invariants
//!
//! - [`crc32`] and a fresh [`Crc32`] fed the same bytes in one `update`
//!   call always agree.
//! - [`Crc32::finalize`] does not consume or reset the accumulator; callers
//!   that need to keep accumulating after reading an intermediate value may
//!   call it repeatedly.
//!
//! # Examples
//!
//! ```
//! use val_checksums::{crc32, Crc32};
//!
//! let mut streaming = Crc32::new();
//! streaming.update(b"hello ");
//! streaming.update(b"world");
//! assert_eq!(streaming.finalize(), crc32(b"hello world"));
//! ```
//!
//! # See also
//!
//! - `val-protocol` for the frame trailer that wraps this checksum.
//! - `val-core`'s resume engine for tail/full-prefix verification.

mod engine;

pub use engine::{crc32, Crc32, Crc32Engine, SoftwareCrc32Engine};
