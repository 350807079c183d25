//! Bitstream image builder.
//!
//! An image is the 32-byte header followed by the payload words, exactly as
//! the DFX controller fetches it from host memory:
//!
//! ```text
//! addr + 0x00  BitstreamHeader (8 words, little-endian)
//! addr + 0x20  payload word 0
//! ...
//! ```

use byteorder::{ByteOrder, LittleEndian};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::IntoBytes;

use crate::control::dfx::{BitstreamHeader, HeaderError};
use crate::device::host_memory::HostMemory;
use crate::device::platform_spec::{BITSTREAM_HEADER_BYTES, CONFIG_WORD_BYTES};
use crate::emu::host::LoadJob;

/// Wrapping 32-bit sum, as recorded in the header checksum field.
pub fn payload_checksum(words: &[u32]) -> u32 {
    words.iter().fold(0u32, |acc, w| acc.wrapping_add(*w))
}

/// A header plus payload, ready to be placed in host memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitstreamImage {
    header: BitstreamHeader,
    payload: Vec<u32>,
}

impl BitstreamImage {
    /// Image targeting `partition` with the given payload.
    pub fn new(partition: u32, bitstream_id: u32, payload: Vec<u32>) -> Self {
        let length = (payload.len() * CONFIG_WORD_BYTES) as u32;
        let header = BitstreamHeader::new(partition, bitstream_id, length, payload_checksum(&payload));
        Self { header, payload }
    }

    /// Image with a deterministic pseudo-random payload of `words` words.
    pub fn synthetic(partition: u32, bitstream_id: u32, words: usize) -> Self {
        let mut state = bitstream_id.wrapping_mul(0x9E37_79B9) | 1;
        let payload = (0..words)
            .map(|_| {
                // xorshift32
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state
            })
            .collect();
        Self::new(partition, bitstream_id, payload)
    }

    /// Parse an image file: header, then as many payload words as the header
    /// declares and the data holds.
    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        let header = BitstreamHeader::parse(data)?;
        let body = &data[BITSTREAM_HEADER_BYTES..];
        let declared = header.bitstream_length.get() as usize / CONFIG_WORD_BYTES;
        let words = declared.min(body.len() / CONFIG_WORD_BYTES);
        if words < declared {
            log::warn!("image declares {} payload words but holds {}", declared, words);
        }
        let mut payload = vec![0u32; words];
        LittleEndian::read_u32_into(&body[..words * CONFIG_WORD_BYTES], &mut payload);
        Ok(Self { header, payload })
    }

    /// Replace the magic word (for negative tests).
    pub fn with_magic(mut self, magic: u32) -> Self {
        self.header.magic = U32::new(magic);
        self
    }

    /// Retarget the header without touching the payload.
    pub fn with_target(mut self, partition: u32) -> Self {
        self.header.target_rp_id = U32::new(partition);
        self
    }

    pub fn header(&self) -> &BitstreamHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u32] {
        &self.payload
    }

    pub fn bitstream_id(&self) -> u32 {
        self.header.bitstream_id.get()
    }

    pub fn partition(&self) -> u32 {
        self.header.target_rp_id.get()
    }

    /// Payload bytes, the value for BS_SIZE.
    pub fn size_bytes(&self) -> u32 {
        (self.payload.len() * CONFIG_WORD_BYTES) as u32
    }

    pub fn checksum(&self) -> u32 {
        self.header.checksum.get()
    }

    /// Serialized image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; BITSTREAM_HEADER_BYTES + self.payload.len() * CONFIG_WORD_BYTES];
        bytes[..BITSTREAM_HEADER_BYTES].copy_from_slice(self.header.as_bytes());
        LittleEndian::write_u32_into(&self.payload, &mut bytes[BITSTREAM_HEADER_BYTES..]);
        bytes
    }

    /// Write the image into host memory at `addr`.
    pub fn install(&self, memory: &mut HostMemory, addr: u64) {
        memory.write_bytes(addr, &self.to_bytes());
    }

    /// LOAD job for this image placed at `addr`.
    pub fn load_job(&self, addr: u64, timeout: u32) -> LoadJob {
        LoadJob {
            partition: self.partition(),
            addr,
            size_bytes: self.size_bytes(),
            bitstream_id: self.bitstream_id(),
            timeout,
        }
    }
}
