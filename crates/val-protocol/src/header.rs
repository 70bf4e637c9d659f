//! The 8-byte universal frame header.

use crate::byteorder::{get_u16, get_u32, put_u16, put_u32};
use crate::constants::HEADER_LEN;
use crate::error::{Code, Detail, ProtocolError, Result};

/// On-wire frame type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Session/version negotiation.
    Hello = 1,
    /// Filename, size, and whole-file CRC.
    SendMeta = 2,
    /// Sender asks for resume options (unused by this implementation; the
    /// resume engine is entirely receiver-driven, but the type is reserved
    /// on the wire for protocol compatibility).
    ResumeReq = 3,
    /// Receiver responds with a resume action.
    ResumeResp = 4,
    /// A chunk of file data.
    Data = 5,
    /// Cumulative acknowledgement of DATA.
    DataAck = 6,
    /// CRC verify request/response.
    Verify = 7,
    /// File complete.
    Done = 8,
    /// Error report.
    Error = 9,
    /// End of transmission (batch complete).
    Eot = 10,
    /// Acknowledgement of EOT.
    EotAck = 11,
    /// Acknowledgement of DONE.
    DoneAck = 12,
    /// Reserved heartbeat/control (unused; see crate docs).
    ModeSync = 13,
    /// Reserved heartbeat/control acknowledgement (unused).
    ModeSyncAck = 14,
    /// Negative acknowledgement with `next_expected_offset`.
    DataNak = 15,
    /// Emergency cancel (ASCII `CAN`).
    Cancel = 0x18,
}

impl FrameType {
    /// Decode a wire type byte, if recognized.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => FrameType::Hello,
            2 => FrameType::SendMeta,
            3 => FrameType::ResumeReq,
            4 => FrameType::ResumeResp,
            5 => FrameType::Data,
            6 => FrameType::DataAck,
            7 => FrameType::Verify,
            8 => FrameType::Done,
            9 => FrameType::Error,
            10 => FrameType::Eot,
            11 => FrameType::EotAck,
            12 => FrameType::DoneAck,
            13 => FrameType::ModeSync,
            14 => FrameType::ModeSyncAck,
            15 => FrameType::DataNak,
            0x18 => FrameType::Cancel,
            _ => return None,
        })
    }
}

/// DATA frame flag: `type_data` carries the low 32 bits of the file offset.
pub const DATA_OFFSET_PRESENT: u8 = 1 << 0;
/// DATA frame flag: this is the final chunk of the file.
pub const DATA_FINAL_CHUNK: u8 = 1 << 1;

/// ACK/NAK frame flag: an extended feedback payload follows (reserved,
/// unused by this implementation — next_expected_offset always rides in
/// `type_data`).
pub const ACK_FEEDBACK_PRESENT: u8 = 1 << 0;
/// ACK frame flag: this ACK also finalizes the file.
pub const ACK_DONE_FILE: u8 = 1 << 1;
/// ACK frame flag: this ACK also finalizes the batch.
pub const ACK_EOT: u8 = 1 << 2;

/// The 8-byte universal frame header, preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Wire type byte.
    pub frame_type: FrameType,
    /// Per-type flags.
    pub flags: u8,
    /// Payload length in bytes, `0..=packet_size - HEADER_LEN - TRAILER_LEN`.
    pub content_len: u16,
    /// Type-specific 32-bit field (offset low bits, next_expected_offset
    /// low bits, or 0).
    pub type_data: u32,
}

impl FrameHeader {
    /// Construct a header with no flags and `type_data = 0`.
    #[must_use]
    pub fn new(frame_type: FrameType, content_len: u16) -> Self {
        FrameHeader {
            frame_type,
            flags: 0,
            content_len,
            type_data: 0,
        }
    }

    /// Serialize into `out[0..HEADER_LEN]`. Panics if `out` is shorter than
    /// [`HEADER_LEN`]; callers always pass a packet_size-sized buffer.
    pub fn encode(&self, out: &mut [u8]) {
        out[0] = self.frame_type as u8;
        out[1] = self.flags;
        put_u16(&mut out[2..4], self.content_len);
        put_u32(&mut out[4..8], self.type_data);
    }

    /// Deserialize from `data[0..HEADER_LEN]`.
    ///
    /// # Errors
    ///
    /// Returns [`Code::Protocol`] with [`Detail::UNKNOWN_TYPE`] if the type
    /// byte is not recognized, or [`Detail::MALFORMED_PKT`] if `data` is
    /// shorter than [`HEADER_LEN`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }
        let frame_type = FrameType::from_u8(data[0])
            .ok_or_else(|| ProtocolError::new(Code::Protocol, Detail::UNKNOWN_TYPE))?;
        Ok(FrameHeader {
            frame_type,
            flags: data[1],
            content_len: get_u16(&data[2..4]),
            type_data: get_u32(&data[4..8]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire_bytes() {
        let header = FrameHeader {
            frame_type: FrameType::Data,
            flags: DATA_OFFSET_PRESENT | DATA_FINAL_CHUNK,
            content_len: 4096,
            type_data: 0xDEAD_BEEF,
        };
        let mut buf = [0u8; HEADER_LEN];
        header.encode(&mut buf);
        let decoded = FrameHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let buf = [0xFFu8, 0, 0, 0, 0, 0, 0, 0];
        let err = FrameHeader::decode(&buf).unwrap_err();
        assert_eq!(err.code, Code::Protocol);
        assert_eq!(err.detail.0, Detail::UNKNOWN_TYPE);
    }

    #[test]
    fn short_buffer_is_malformed() {
        let buf = [1u8, 0, 0];
        let err = FrameHeader::decode(&buf).unwrap_err();
        assert_eq!(err.detail.0, Detail::MALFORMED_PKT);
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_known_type_round_trips(
            flags: u8,
            content_len: u16,
            type_data: u32,
        ) {
            let header = FrameHeader {
                frame_type: FrameType::Data,
                flags,
                content_len,
                type_data,
            };
            let mut buf = [0u8; HEADER_LEN];
            header.encode(&mut buf);
            let decoded = FrameHeader::decode(&buf).unwrap();
            proptest::prop_assert_eq!(decoded, header);
        }
    }
}
