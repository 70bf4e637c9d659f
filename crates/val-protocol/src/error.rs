//! Error taxonomy and 32-bit detail mask.
//!
//! The detail mask layout is part of the protocol's external contract (it
//! is meant to stay stable across implementations), so the bit values below
//! are pinned to the reference implementation rather than chosen freely.

use std::fmt;

/// Primary status/error code. `Ok` and `Skipped` are non-error; everything
/// else corresponds to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Operation completed successfully.
    Ok,
    /// A file was skipped per resume policy; not an error.
    Skipped,
    /// Bad configuration or public API input.
    InvalidArg,
    /// Allocation failure during session creation.
    NoMemory,
    /// Transport send/recv failed or the connection was lost.
    Io,
    /// Retries exhausted or a hard deadline was reached.
    Timeout,
    /// Malformed frame, unknown type, payload-size mismatch, or invalid
    /// state.
    Protocol,
    /// Header or trailer CRC mismatch on a received frame.
    Crc,
    /// CRC verify mismatch where policy dictates abort.
    ResumeVerify,
    /// Handshake: magic mismatch or incompatible major version.
    IncompatibleVersion,
    /// Handshake: negotiated packet size out of bounds.
    PacketSizeMismatch,
    /// Handshake: a required feature is not supported by the peer.
    FeatureNegotiation,
    /// Local cancel, peer cancel, or an ERROR frame was received.
    Aborted,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Ok => "ok",
            Code::Skipped => "skipped",
            Code::InvalidArg => "invalid argument",
            Code::NoMemory => "out of memory",
            Code::Io => "i/o error",
            Code::Timeout => "timeout",
            Code::Protocol => "protocol error",
            Code::Crc => "crc mismatch",
            Code::ResumeVerify => "resume verify mismatch",
            Code::IncompatibleVersion => "incompatible version",
            Code::PacketSizeMismatch => "packet size mismatch",
            Code::FeatureNegotiation => "feature negotiation failed",
            Code::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// A 32-bit error detail mask, laid out in five bit ranges:
///
/// | bits  | category                   |
/// |-------|----------------------------|
/// | 0-7   | network/transport          |
/// | 8-15  | CRC/integrity              |
/// | 16-23 | protocol/feature           |
/// | 24-27 | filesystem                 |
/// | 28-31 | context selector           |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Detail(pub u32);

impl Detail {
    /// No detail bits set.
    pub const NONE: Detail = Detail(0);

    // Network/transport (bits 0-7).
    /// The transport reported a reset/disconnect.
    pub const NETWORK_RESET: u32 = 0x0000_0001;
    /// Timed out waiting for an ACK.
    pub const TIMEOUT_ACK: u32 = 0x0000_0002;
    /// Timed out waiting for DATA.
    pub const TIMEOUT_DATA: u32 = 0x0000_0004;
    /// Timed out waiting for META.
    pub const TIMEOUT_META: u32 = 0x0000_0008;
    /// Timed out waiting for HELLO.
    pub const TIMEOUT_HELLO: u32 = 0x0000_0010;
    /// `Transport::send` failed.
    pub const SEND_FAILED: u32 = 0x0000_0020;
    /// `Transport::recv` failed.
    pub const RECV_FAILED: u32 = 0x0000_0040;
    /// `Transport::is_connected` reported not connected.
    pub const CONNECTION: u32 = 0x0000_0080;

    // CRC/integrity (bits 8-15).
    /// Frame header CRC mismatch.
    pub const CRC_HEADER: u32 = 0x0000_0100;
    /// Frame trailer CRC mismatch.
    pub const CRC_TRAILER: u32 = 0x0000_0200;
    /// Whole-file CRC mismatch on DONE.
    pub const CRC_FILE: u32 = 0x0000_0400;
    /// Resume verify CRC mismatch.
    pub const CRC_RESUME: u32 = 0x0000_0800;
    /// Declared size does not match observed size.
    pub const SIZE_MISMATCH: u32 = 0x0000_1000;
    /// Packet failed structural validation.
    pub const PACKET_CORRUPT: u32 = 0x0000_2000;
    /// Out-of-sequence frame observed.
    pub const SEQ_ERROR: u32 = 0x0000_4000;
    /// DATA frame offset did not match the expected write offset.
    pub const OFFSET_ERROR: u32 = 0x0000_8000;

    // Protocol/feature (bits 16-23).
    /// Version mismatch during handshake.
    pub const VERSION: u32 = 0x0001_0000;
    /// Negotiated packet size out of bounds.
    pub const PACKET_SIZE: u32 = 0x0002_0000;
    /// A required feature is missing on the peer.
    pub const FEATURE_MISSING: u32 = 0x0004_0000;
    /// The session observed an invalid state transition.
    pub const INVALID_STATE: u32 = 0x0008_0000;
    /// The frame failed to parse.
    pub const MALFORMED_PKT: u32 = 0x0010_0000;
    /// The frame carried an unrecognized type byte.
    pub const UNKNOWN_TYPE: u32 = 0x0020_0000;
    /// `content_len` disagreed with the expected payload size for the type.
    pub const PAYLOAD_SIZE: u32 = 0x0040_0000;
    /// The retry budget for the current operation was exhausted.
    pub const EXCESSIVE_RETRIES: u32 = 0x0080_0000;

    // Filesystem (bits 24-27).
    /// The target or source file could not be found.
    pub const FILE_NOT_FOUND: u32 = 0x0100_0000;
    /// The target file was locked by another process.
    pub const FILE_LOCKED: u32 = 0x0200_0000;
    /// The filesystem reported no space left.
    pub const DISK_FULL: u32 = 0x0400_0000;
    /// The filesystem denied the operation.
    pub const PERMISSION: u32 = 0x0800_0000;

    const NET_MASK: u32 = 0x0000_00FF;
    const CRC_MASK: u32 = 0x0000_FF00;
    const PROTO_MASK: u32 = 0x00FF_0000;
    const FS_MASK: u32 = 0x0F00_0000;
    const CONTEXT_MASK: u32 = 0xF000_0000;
    const CONTEXT_SHIFT: u32 = 28;

    /// Context selector: no extra payload in the low 24 bits.
    pub const CONTEXT_NONE: u32 = 0;
    /// Context selector: low 24 bits carry a missing-feature bitmask.
    pub const CONTEXT_MISSING_FEATURES: u32 = 1;
    /// Context selector: the session was missing one or more required
    /// adapter hooks at creation time.
    pub const CONTEXT_MISSING_HOOKS: u32 = 2;

    /// Combine detail bits.
    #[must_use]
    pub const fn with(self, bit: u32) -> Detail {
        Detail(self.0 | bit)
    }

    /// The 4-bit context selector carried in the top nibble.
    #[must_use]
    pub const fn context(self) -> u32 {
        (self.0 & Self::CONTEXT_MASK) >> Self::CONTEXT_SHIFT
    }

    /// Encode a missing-features detail: context selector set to
    /// [`Detail::CONTEXT_MISSING_FEATURES`], the low 24 bits carrying
    /// `mask`, with [`Detail::FEATURE_MISSING`] also set.
    #[must_use]
    pub const fn missing_features(mask: u32) -> Detail {
        Detail(
            (Self::CONTEXT_MISSING_FEATURES << Self::CONTEXT_SHIFT)
                | (mask & 0x00FF_FFFF)
                | Self::FEATURE_MISSING,
        )
    }

    /// Decode the missing-features mask, or `0` if this detail does not
    /// carry one.
    #[must_use]
    pub const fn missing_feature_mask(self) -> u32 {
        if self.context() == Self::CONTEXT_MISSING_FEATURES {
            (self.0 & 0x00FF_FFFF) & !Self::PROTO_MASK
        } else {
            0
        }
    }

    /// Encode a missing-required-hooks detail.
    #[must_use]
    pub const fn missing_hooks() -> Detail {
        Detail((Self::CONTEXT_MISSING_HOOKS << Self::CONTEXT_SHIFT) | Self::INVALID_STATE)
    }

    /// Whether this detail marks a missing-hooks failure.
    #[must_use]
    pub const fn is_missing_hooks(self) -> bool {
        self.context() == Self::CONTEXT_MISSING_HOOKS
    }

    /// Whether any network/transport bit is set.
    #[must_use]
    pub const fn is_network_related(self) -> bool {
        self.0 & Self::NET_MASK != 0
    }

    /// Whether any CRC/integrity bit is set.
    #[must_use]
    pub const fn is_crc_related(self) -> bool {
        self.0 & Self::CRC_MASK != 0
    }

    /// Whether any protocol/feature bit is set.
    #[must_use]
    pub const fn is_protocol_related(self) -> bool {
        self.0 & Self::PROTO_MASK != 0
    }

    /// Whether any filesystem bit is set.
    #[must_use]
    pub const fn is_filesystem_related(self) -> bool {
        self.0 & Self::FS_MASK != 0
    }
}

impl From<u32> for Detail {
    fn from(value: u32) -> Self {
        Detail(value)
    }
}

impl From<Detail> for u32 {
    fn from(value: Detail) -> Self {
        value.0
    }
}

/// The most recent failure observed by a session: a status [`Code`], a
/// [`Detail`] mask, and an optional static string naming the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastError {
    /// Primary status code.
    pub code: Option<Code>,
    /// Detail mask further qualifying `code`.
    pub detail: Detail,
    /// Static string identifying the operation/site, if any.
    pub op: Option<&'static str>,
}

impl LastError {
    /// No error recorded.
    pub const NONE: LastError = LastError {
        code: None,
        detail: Detail::NONE,
        op: None,
    };

    /// Record a new last-error.
    #[must_use]
    pub const fn new(code: Code, detail: Detail, op: &'static str) -> Self {
        LastError {
            code: Some(code),
            detail,
            op: Some(op),
        }
    }
}

/// A wire/protocol error, carrying a [`Code`] and a [`Detail`] mask.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("{code}: detail=0x{:08x}", detail.0)]
pub struct ProtocolError {
    /// Status code.
    pub code: Code,
    /// Detail mask.
    pub detail: Detail,
}

impl ProtocolError {
    /// Construct a new protocol error.
    #[must_use]
    pub const fn new(code: Code, detail: u32) -> Self {
        ProtocolError {
            code,
            detail: Detail(detail),
        }
    }
}

/// Convenience `Result` alias used throughout `val-protocol`.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_features_round_trip() {
        let detail = Detail::missing_features(0x0012_34);
        assert_eq!(detail.context(), Detail::CONTEXT_MISSING_FEATURES);
        assert_eq!(detail.missing_feature_mask(), 0x0012_34);
        assert_ne!(detail.0 & Detail::FEATURE_MISSING, 0);
    }

    #[test]
    fn missing_hooks_round_trip() {
        let detail = Detail::missing_hooks();
        assert!(detail.is_missing_hooks());
        assert!(detail.is_protocol_related());
    }

    #[test]
    fn category_checks() {
        let net = Detail(Detail::TIMEOUT_DATA);
        assert!(net.is_network_related());
        assert!(!net.is_crc_related());

        let crc = Detail(Detail::CRC_TRAILER);
        assert!(crc.is_crc_related());
        assert!(!crc.is_network_related());

        let fs = Detail(Detail::DISK_FULL);
        assert!(fs.is_filesystem_related());
    }

    #[test]
    fn display_includes_detail_hex() {
        let err = ProtocolError::new(Code::Crc, Detail::CRC_TRAILER);
        let rendered = err.to_string();
        assert!(rendered.contains("crc mismatch"));
        assert!(rendered.contains("0x00000200"));
    }
}
