//! Bitstream header.
//!
//! Every bitstream image starts with a fixed 32-byte header of eight
//! little-endian 32-bit words:
//!
//! ```text
//! +0x00 magic            "DFX\0" (0x44465800)
//! +0x04 version
//! +0x08 bitstream_length payload bytes
//! +0x0C target_rp_id
//! +0x10 bitstream_id
//! +0x14 timestamp
//! +0x18 checksum         wrapping sum of payload words
//! +0x1C reserved
//! ```

use thiserror::Error;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::device::platform_spec::{
    BITSTREAM_HEADER_VERSION, BITSTREAM_HEADER_WORDS, BITSTREAM_MAGIC,
};

/// Header decode and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("bitstream header needs 32 bytes, got {0}")]
    TooShort(usize),
    #[error("bad bitstream magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("bitstream targets partition {found}, job selected {expected}")]
    PartitionMismatch { expected: u32, found: u32 },
}

/// Raw bitstream header (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BitstreamHeader {
    pub magic: U32,
    pub version: U32,
    /// Payload length in bytes
    pub bitstream_length: U32,
    pub target_rp_id: U32,
    pub bitstream_id: U32,
    pub timestamp: U32,
    pub checksum: U32,
    pub reserved: U32,
}

impl BitstreamHeader {
    /// Header for a payload of `length` bytes.
    pub fn new(target_rp_id: u32, bitstream_id: u32, length: u32, checksum: u32) -> Self {
        Self {
            magic: U32::new(BITSTREAM_MAGIC),
            version: U32::new(BITSTREAM_HEADER_VERSION),
            bitstream_length: U32::new(length),
            target_rp_id: U32::new(target_rp_id),
            bitstream_id: U32::new(bitstream_id),
            timestamp: U32::new(0),
            checksum: U32::new(checksum),
            reserved: U32::new(0),
        }
    }

    /// Parse from the start of a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        let (header, _) =
            Self::read_from_prefix(data).map_err(|_| HeaderError::TooShort(data.len()))?;
        Ok(header)
    }

    /// Assemble from the eight words fetched over AXI.
    pub fn from_words(words: &[u32; BITSTREAM_HEADER_WORDS]) -> Self {
        let w = |i: usize| U32::new(words[i]);
        Self {
            magic: w(0),
            version: w(1),
            bitstream_length: w(2),
            target_rp_id: w(3),
            bitstream_id: w(4),
            timestamp: w(5),
            checksum: w(6),
            reserved: w(7),
        }
    }

    /// Check magic and target partition.
    pub fn validate(&self, expected_rp: u32) -> Result<(), HeaderError> {
        if self.magic.get() != BITSTREAM_MAGIC {
            return Err(HeaderError::BadMagic(self.magic.get()));
        }
        if self.target_rp_id.get() != expected_rp {
            return Err(HeaderError::PartitionMismatch {
                expected: expected_rp,
                found: self.target_rp_id.get(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::platform_spec::BITSTREAM_HEADER_BYTES;

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<BitstreamHeader>(), BITSTREAM_HEADER_BYTES);

        let header = BitstreamHeader::new(2, 0x77, 64, 0x1234);
        let bytes = header.as_bytes();
        assert_eq!(&bytes[0..4], &BITSTREAM_MAGIC.to_le_bytes());
        assert_eq!(&bytes[12..16], &2u32.to_le_bytes());
        assert_eq!(BitstreamHeader::parse(bytes), Ok(header));
    }

    #[test]
    fn test_from_words() {
        let words = [BITSTREAM_MAGIC, 1, 128, 3, 9, 0, 0xABCD, 0];
        let header = BitstreamHeader::from_words(&words);
        assert_eq!(header.bitstream_length.get(), 128);
        assert_eq!(header.bitstream_id.get(), 9);
        assert!(header.validate(3).is_ok());
    }

    #[test]
    fn test_validate_failures() {
        let mut header = BitstreamHeader::new(1, 5, 0, 0);
        assert_eq!(
            header.validate(0),
            Err(HeaderError::PartitionMismatch { expected: 0, found: 1 })
        );

        header.magic = U32::new(0x4446_5801);
        assert_eq!(header.validate(1), Err(HeaderError::BadMagic(0x4446_5801)));
    }

    #[test]
    fn test_parse_short() {
        assert_eq!(BitstreamHeader::parse(&[0u8; 31]), Err(HeaderError::TooShort(31)));
    }
}
