//! Complete frames: header + payload + trailer CRC32.

use val_checksums::Crc32;

use crate::constants::{HEADER_LEN, TRAILER_LEN};
use crate::error::{Code, Detail, ProtocolError, Result};
use crate::header::FrameHeader;

/// A fully assembled wire frame: header, payload bytes, and the trailer
/// CRC32 computed over header||payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The 8-byte universal header.
    pub header: FrameHeader,
    /// The type-specific payload bytes (length equals `header.content_len`).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Construct a frame from a header and owned payload bytes. The
    /// header's `content_len` is overwritten to match `payload.len()`.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: Vec<u8>) -> Self {
        header.content_len = payload.len() as u16;
        Frame { header, payload }
    }

    /// Total length on the wire: header + payload + trailer.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + TRAILER_LEN
    }

    /// Serialize the complete frame (header, payload, trailer CRC32) into
    /// `out`, which must be at least [`Frame::wire_len`] bytes.
    pub fn encode(&self, out: &mut [u8]) {
        let header_end = HEADER_LEN;
        let payload_end = header_end + self.payload.len();
        self.header.encode(&mut out[0..header_end]);
        out[header_end..payload_end].copy_from_slice(&self.payload);

        let mut crc = Crc32::new();
        crc.update(&out[0..payload_end]);
        out[payload_end..payload_end + TRAILER_LEN].copy_from_slice(&crc.finalize().to_le_bytes());
    }

    /// Deserialize a complete frame from `data`, verifying the trailer
    /// CRC32.
    ///
    /// # Errors
    ///
    /// [`Code::Protocol`] with [`Detail::MALFORMED_PKT`] if `data` is too
    /// short for the declared `content_len`; [`Code::Crc`] with
    /// [`Detail::CRC_TRAILER`] if the trailer does not match.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = FrameHeader::decode(data)?;
        let payload_end = HEADER_LEN + header.content_len as usize;
        let frame_end = payload_end + TRAILER_LEN;
        if data.len() < frame_end {
            return Err(ProtocolError::new(Code::Protocol, Detail::MALFORMED_PKT));
        }

        let mut crc = Crc32::new();
        crc.update(&data[0..payload_end]);
        let expected_crc = crc.finalize();
        let actual_crc = u32::from_le_bytes(
            data[payload_end..payload_end + TRAILER_LEN]
                .try_into()
                .expect("slice is exactly TRAILER_LEN bytes"),
        );
        if expected_crc != actual_crc {
            return Err(ProtocolError::new(Code::Crc, Detail::CRC_TRAILER));
        }

        Ok(Frame {
            header,
            payload: data[HEADER_LEN..payload_end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FrameType;

    #[test]
    fn round_trips_with_payload() {
        let frame = Frame::new(
            FrameHeader::new(FrameType::Data, 0),
            b"hello, world".to_vec(),
        );
        let mut buf = vec![0u8; frame.wire_len()];
        frame.encode(&mut buf);
        let decoded = Frame::decode(&buf).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trips_with_empty_payload() {
        let frame = Frame::new(FrameHeader::new(FrameType::Eot, 0), Vec::new());
        let mut buf = vec![0u8; frame.wire_len()];
        frame.encode(&mut buf);
        assert_eq!(Frame::decode(&buf).unwrap(), frame);
    }

    #[test]
    fn corrupted_trailer_is_rejected() {
        let frame = Frame::new(FrameHeader::new(FrameType::Data, 0), vec![1, 2, 3]);
        let mut buf = vec![0u8; frame.wire_len()];
        frame.encode(&mut buf);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let err = Frame::decode(&buf).unwrap_err();
        assert_eq!(err.code, Code::Crc);
        assert_eq!(err.detail.0, Detail::CRC_TRAILER);
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let frame = Frame::new(FrameHeader::new(FrameType::Data, 0), vec![1, 2, 3, 4]);
        let mut buf = vec![0u8; frame.wire_len()];
        frame.encode(&mut buf);
        buf[HEADER_LEN] ^= 0x01;
        let err = Frame::decode(&buf).unwrap_err();
        assert_eq!(err.code, Code::Crc);
    }

    #[test]
    fn truncated_buffer_is_malformed() {
        let frame = Frame::new(FrameHeader::new(FrameType::Data, 0), vec![1, 2, 3, 4]);
        let mut buf = vec![0u8; frame.wire_len()];
        frame.encode(&mut buf);
        buf.truncate(buf.len() - 1);
        let err = Frame::decode(&buf).unwrap_err();
        assert_eq!(err.detail.0, Detail::MALFORMED_PKT);
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_payload_round_trips(payload: Vec<u8>) {
            let payload = if payload.len() > u16::MAX as usize {
                payload[..u16::MAX as usize].to_vec()
            } else {
                payload
            };
            let frame = Frame::new(FrameHeader::new(FrameType::Data, 0), payload);
            let mut buf = vec![0u8; frame.wire_len()];
            frame.encode(&mut buf);
            let decoded = Frame::decode(&buf).unwrap();
            proptest::prop_assert_eq!(decoded, frame);
        }
    }
}
