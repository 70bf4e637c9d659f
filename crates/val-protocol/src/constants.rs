//! Wire-level constants normative across all VAL implementations.

/// The four magic octets `"VAL\0"` that open every [`crate::payload::Hello`].
pub const MAGIC: [u8; 4] = [0x56, 0x41, 0x4C, 0x00];

/// Current protocol major version.
pub const VERSION_MAJOR: u8 = 0;
/// Current protocol minor version.
pub const VERSION_MINOR: u8 = 7;

/// Minimum negotiable packet size (MTU bound), inclusive.
pub const MIN_PACKET_SIZE: u32 = 512;
/// Maximum negotiable packet size (MTU bound), inclusive.
pub const MAX_PACKET_SIZE: u32 = 65536;

/// Length in bytes of a filename or path field on the wire, NUL included.
pub const NAME_FIELD_LEN: usize = 128;
/// Maximum usable bytes in a filename or path, excluding the trailing NUL.
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// Size in bytes of the universal frame header.
pub const HEADER_LEN: usize = 8;
/// Size in bytes of the frame trailer (CRC32).
pub const TRAILER_LEN: usize = 4;
/// Size in bytes of the HELLO payload.
pub const HELLO_LEN: usize = 44;
/// Size in bytes of the META payload (filename + path + size + whole-file CRC).
pub const META_LEN: usize = NAME_FIELD_LEN + NAME_FIELD_LEN + 8 + 4;
/// Size in bytes of the RESUME_RESP payload.
pub const RESUME_RESP_LEN: usize = 24;
/// Size in bytes of a VERIFY request payload.
pub const VERIFY_REQUEST_LEN: usize = 16;
/// Size in bytes of a VERIFY response payload.
pub const VERIFY_RESPONSE_LEN: usize = 8;
/// Size in bytes of an ERROR payload.
pub const ERROR_PAYLOAD_LEN: usize = 8;

/// Emergency cancel byte, the ASCII `CAN` control character.
pub const CANCEL_BYTE: u8 = 0x18;
