//! Per-type payload structures.

use crate::byteorder::{get_u16, get_u32, get_u64, put_u16, put_u32, put_u64};
use crate::constants::{
    ERROR_PAYLOAD_LEN, HELLO_LEN, MAGIC, MAX_NAME_LEN, META_LEN, NAME_FIELD_LEN, RESUME_RESP_LEN,
    VERIFY_REQUEST_LEN, VERIFY_RESPONSE_LEN,
};
use crate::error::{Code, Detail, ProtocolError, Result};

fn encode_name_field(name: &str, out: &mut [u8]) {
    debug_assert_eq!(out.len(), NAME_FIELD_LEN);
    out.fill(0);
    let bytes = name.as_bytes();
    let n = bytes.len().min(MAX_NAME_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
}

fn decode_name_field(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// The HELLO handshake payload (44 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    /// Major protocol version.
    pub version_major: u8,
    /// Minor protocol version.
    pub version_minor: u8,
    /// This endpoint's MTU.
    pub packet_size: u32,
    /// Feature bits this endpoint supports.
    pub features: u32,
    /// Feature bits this endpoint requires the peer to support.
    pub required: u32,
    /// Feature bits this endpoint would like if the peer supports them.
    pub requested: u32,
    /// Maximum in-flight packets this endpoint can transmit.
    pub tx_max_window_packets: u16,
    /// Maximum in-flight packets this endpoint can accept as a receiver.
    pub rx_max_window_packets: u16,
    /// Preferred number of DATA packets between cumulative ACKs (`0` means
    /// "once per window").
    pub ack_stride_packets: u8,
}

impl Hello {
    /// Serialize into `out[0..HELLO_LEN]`.
    pub fn encode(&self, out: &mut [u8]) {
        put_u32(&mut out[0..4], u32::from_le_bytes(MAGIC));
        out[4] = self.version_major;
        out[5] = self.version_minor;
        put_u16(&mut out[6..8], 0);
        put_u32(&mut out[8..12], self.packet_size);
        put_u32(&mut out[12..16], self.features);
        put_u32(&mut out[16..20], self.required);
        put_u32(&mut out[20..24], self.requested);
        put_u16(&mut out[24..26], self.tx_max_window_packets);
        put_u16(&mut out[26..28], self.rx_max_window_packets);
        out[28] = self.ack_stride_packets;
        out[29] = 0;
        out[30] = 0;
        out[31] = 0;
        put_u16(&mut out[32..34], 0);
        put_u16(&mut out[34..36], 0);
        put_u16(&mut out[36..38], 0);
        put_u16(&mut out[38..40], 0);
        put_u32(&mut out[40..44], 0);
    }

    /// Deserialize from `data[0..HELLO_LEN]`.
    ///
    /// # Errors
    ///
    /// [`Code::IncompatibleVersion`] if the magic does not match.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HELLO_LEN {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }
        if get_u32(&data[0..4]).to_le_bytes() != MAGIC {
            return Err(ProtocolError::new(Code::IncompatibleVersion, Detail::VERSION));
        }
        Ok(Hello {
            version_major: data[4],
            version_minor: data[5],
            packet_size: get_u32(&data[8..12]),
            features: get_u32(&data[12..16]),
            required: get_u32(&data[16..20]),
            requested: get_u32(&data[20..24]),
            tx_max_window_packets: get_u16(&data[24..26]),
            rx_max_window_packets: get_u16(&data[26..28]),
            ack_stride_packets: data[28],
        })
    }
}

/// The file metadata payload (filename, sender path, size, whole-file CRC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Sanitized basename (no directory components).
    pub filename: String,
    /// Sanitized path hint from the sender; receivers must not use this to
    /// construct output paths.
    pub sender_path: String,
    /// Total file size in bytes.
    pub file_size: u64,
    /// CRC32 over the entire file, computed by the sender.
    pub file_crc32: u32,
}

impl Meta {
    /// Serialize into `out[0..META_LEN]`.
    pub fn encode(&self, out: &mut [u8]) {
        encode_name_field(&self.filename, &mut out[0..NAME_FIELD_LEN]);
        encode_name_field(
            &self.sender_path,
            &mut out[NAME_FIELD_LEN..2 * NAME_FIELD_LEN],
        );
        put_u64(&mut out[2 * NAME_FIELD_LEN..2 * NAME_FIELD_LEN + 8], self.file_size);
        put_u32(
            &mut out[2 * NAME_FIELD_LEN + 8..2 * NAME_FIELD_LEN + 12],
            self.file_crc32,
        );
    }

    /// Deserialize from `data[0..META_LEN]`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < META_LEN {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }
        let filename = decode_name_field(&data[0..NAME_FIELD_LEN]);
        let sender_path = decode_name_field(&data[NAME_FIELD_LEN..2 * NAME_FIELD_LEN]);
        let file_size = get_u64(&data[2 * NAME_FIELD_LEN..2 * NAME_FIELD_LEN + 8]);
        let file_crc32 = get_u32(&data[2 * NAME_FIELD_LEN + 8..2 * NAME_FIELD_LEN + 12]);
        Ok(Meta {
            filename,
            sender_path,
            file_size,
            file_crc32,
        })
    }
}

/// The receiver's resume decision, per the six-mode resume matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResumeAction {
    /// Skip the file entirely; it already matches.
    Skip = 1,
    /// Resume from `resume_offset`.
    ResumeFromOffset = 2,
    /// Restart from offset zero, overwriting any existing content.
    RestartZero = 3,
    /// Abort the session (used by the metadata validator, not the resume
    /// matrix itself).
    Abort = 4,
    /// The receiver needs a CRC verify before deciding; a follow-up
    /// RESUME_RESP will carry the final action.
    VerifyRequired = 5,
}

impl ResumeAction {
    fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => ResumeAction::Skip,
            2 => ResumeAction::ResumeFromOffset,
            3 => ResumeAction::RestartZero,
            4 => ResumeAction::Abort,
            5 => ResumeAction::VerifyRequired,
            _ => return None,
        })
    }
}

/// The RESUME_RESP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeResp {
    /// The decided (or pending) action.
    pub action: ResumeAction,
    /// Offset to resume from, meaningful for `ResumeFromOffset`.
    pub resume_offset: u64,
    /// CRC the receiver expects over the verify range, meaningful for
    /// `VerifyRequired`.
    pub verify_crc: u32,
    /// Length of the verify range, meaningful for `VerifyRequired`.
    pub verify_length: u64,
}

impl ResumeResp {
    /// Serialize into `out[0..RESUME_RESP_LEN]`.
    pub fn encode(&self, out: &mut [u8]) {
        put_u32(&mut out[0..4], self.action as u32);
        put_u64(&mut out[4..12], self.resume_offset);
        put_u32(&mut out[12..16], self.verify_crc);
        put_u64(&mut out[16..24], self.verify_length);
    }

    /// Deserialize from `data[0..RESUME_RESP_LEN]`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < RESUME_RESP_LEN {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }
        let action = ResumeAction::from_u32(get_u32(&data[0..4]))
            .ok_or_else(|| ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT))?;
        Ok(ResumeResp {
            action,
            resume_offset: get_u64(&data[4..12]),
            verify_crc: get_u32(&data[12..16]),
            verify_length: get_u64(&data[16..24]),
        })
    }
}

/// A VERIFY request: asks the sender to stream a CRC over `[offset,
/// offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyRequest {
    /// Start of the verify range.
    pub offset: u64,
    /// The receiver's own CRC over its local range, sent for informational
    /// cross-checking (the receiver, not the sender, is authoritative).
    pub crc: u32,
    /// Length of the verify range.
    pub length: u32,
}

impl VerifyRequest {
    /// Serialize into `out[0..VERIFY_REQUEST_LEN]`.
    pub fn encode(&self, out: &mut [u8]) {
        put_u64(&mut out[0..8], self.offset);
        put_u32(&mut out[8..12], self.crc);
        put_u32(&mut out[12..16], self.length);
    }

    /// Deserialize from `data[0..VERIFY_REQUEST_LEN]`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < VERIFY_REQUEST_LEN {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }
        Ok(VerifyRequest {
            offset: get_u64(&data[0..8]),
            crc: get_u32(&data[8..12]),
            length: get_u32(&data[12..16]),
        })
    }
}

/// A VERIFY response: the sender's CRC over the requested range.
/// Informational — the receiver is the authoritative comparer (see
/// `DESIGN.md`'s Open Question decisions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyResponse {
    /// `0` on success, non-zero if the sender could not stream the range
    /// (e.g. source file shorter than expected).
    pub status: u32,
    /// The sender's CRC over the requested range.
    pub sender_crc: u32,
}

impl VerifyResponse {
    /// Serialize into `out[0..VERIFY_RESPONSE_LEN]`.
    pub fn encode(&self, out: &mut [u8]) {
        put_u32(&mut out[0..4], self.status);
        put_u32(&mut out[4..8], self.sender_crc);
    }

    /// Deserialize from `data[0..VERIFY_RESPONSE_LEN]`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < VERIFY_RESPONSE_LEN {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }
        Ok(VerifyResponse {
            status: get_u32(&data[0..4]),
            sender_crc: get_u32(&data[4..8]),
        })
    }
}

/// The ERROR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Signed status code, matching [`crate::error::Code`]'s wire encoding.
    pub code: i32,
    /// Detail mask.
    pub detail: u32,
}

impl ErrorPayload {
    /// Serialize into `out[0..ERROR_PAYLOAD_LEN]`.
    pub fn encode(&self, out: &mut [u8]) {
        put_u32(&mut out[0..4], self.code as u32);
        put_u32(&mut out[4..8], self.detail);
    }

    /// Deserialize from `data[0..ERROR_PAYLOAD_LEN]`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < ERROR_PAYLOAD_LEN {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }
        Ok(ErrorPayload {
            code: get_u32(&data[0..4]) as i32,
            detail: get_u32(&data[4..8]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let hello = Hello {
            version_major: 0,
            version_minor: 7,
            packet_size: 4096,
            features: 0,
            required: 0,
            requested: 0,
            tx_max_window_packets: 32,
            rx_max_window_packets: 16,
            ack_stride_packets: 4,
        };
        let mut buf = [0u8; HELLO_LEN];
        hello.encode(&mut buf);
        assert_eq!(Hello::decode(&buf).unwrap(), hello);
    }

    #[test]
    fn hello_rejects_bad_magic() {
        let mut buf = [0u8; HELLO_LEN];
        buf[0..4].copy_from_slice(&[0, 0, 0, 0]);
        let err = Hello::decode(&buf).unwrap_err();
        assert_eq!(err.code, Code::IncompatibleVersion);
    }

    #[test]
    fn meta_round_trips_with_unicode_filename() {
        let meta = Meta {
            filename: "héllo-wörld.bin".to_string(),
            sender_path: "/tmp/héllo-wörld.bin".to_string(),
            file_size: 123_456_789,
            file_crc32: 0xCAFEBABE,
        };
        let mut buf = [0u8; META_LEN];
        meta.encode(&mut buf);
        assert_eq!(Meta::decode(&buf).unwrap(), meta);
    }

    #[test]
    fn meta_truncates_long_names_at_byte_boundary() {
        let long_name = "a".repeat(200);
        let meta = Meta {
            filename: long_name,
            sender_path: String::new(),
            file_size: 0,
            file_crc32: 0,
        };
        let mut buf = [0u8; META_LEN];
        meta.encode(&mut buf);
        let decoded = Meta::decode(&buf).unwrap();
        assert_eq!(decoded.filename.len(), MAX_NAME_LEN);
    }

    #[test]
    fn meta_field_layout_matches_wire_spec() {
        assert_eq!(META_LEN, 128 + 128 + 8 + 4);
    }

    #[test]
    fn resume_resp_round_trips() {
        let resp = ResumeResp {
            action: ResumeAction::ResumeFromOffset,
            resume_offset: 65536,
            verify_crc: 0,
            verify_length: 0,
        };
        let mut buf = [0u8; RESUME_RESP_LEN];
        resp.encode(&mut buf);
        assert_eq!(ResumeResp::decode(&buf).unwrap(), resp);
    }

    #[test]
    fn verify_request_round_trips() {
        let req = VerifyRequest {
            offset: 1024,
            crc: 0x1234_5678,
            length: 512,
        };
        let mut buf = [0u8; VERIFY_REQUEST_LEN];
        req.encode(&mut buf);
        assert_eq!(VerifyRequest::decode(&buf).unwrap(), req);
    }

    #[test]
    fn verify_response_round_trips() {
        let resp = VerifyResponse {
            status: 0,
            sender_crc: 0x90AB_CDEF,
        };
        let mut buf = [0u8; VERIFY_RESPONSE_LEN];
        resp.encode(&mut buf);
        assert_eq!(VerifyResponse::decode(&buf).unwrap(), resp);
    }

    #[test]
    fn error_payload_round_trips_negative_code() {
        let payload = ErrorPayload {
            code: -11,
            detail: Detail::MALFORMED_PKT,
        };
        let mut buf = [0u8; ERROR_PAYLOAD_LEN];
        payload.encode(&mut buf);
        assert_eq!(ErrorPayload::decode(&buf).unwrap(), payload);
    }
}
