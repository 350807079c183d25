//! Ensemble Platform Specification Constants
//!
//! Fixed values of the reconfigurable audio platform's control plane: bus
//! widths, configuration-port command words, bitstream header layout and
//! AXI burst limits. Values the platform builder may change (core count,
//! buffer depth, latencies) live in [`crate::config::PlatformConfig`] instead.

// ============================================================================
// Cores and Bus
// ============================================================================

/// Maximum number of ensemble cores.
///
/// The interrupt controller packs per-core pending flags into STATUS[31:16]
/// and INT_CLEAR[31:16], and CORE_STATUS holds sixteen 2-bit fields, so at
/// most 16 cores are addressable.
pub const MAX_CORES: usize = 16;

/// Width of a bus instruction in bits.
pub const BUS_INSTRUCTION_BITS: u32 = 2;

/// Width of a core status field in bits (idle/busy/error/complete).
pub const CORE_STATUS_BITS: u32 = 2;

// ============================================================================
// Configuration Port (ICAP / PCAP)
// ============================================================================

/// Synchronization word that opens a configuration packet stream.
pub const CONFIG_SYNC_WORD: u32 = 0xAA99_5566;

/// DESYNC command word that closes a configuration packet stream.
pub const CONFIG_DESYNC_WORD: u32 = 0x0000_000D;

/// Configuration port data width in bytes.
pub const CONFIG_WORD_BYTES: usize = 4;

// ============================================================================
// Bitstream Header
// ============================================================================

/// Bitstream header magic: ASCII "DFX\0" read as a big-endian word.
pub const BITSTREAM_MAGIC: u32 = 0x4446_5800;

/// Bitstream header size in bytes.
pub const BITSTREAM_HEADER_BYTES: usize = 32;

/// Bitstream header size in 32-bit words.
pub const BITSTREAM_HEADER_WORDS: usize = BITSTREAM_HEADER_BYTES / 4;

/// Header format version written by the image builder.
pub const BITSTREAM_HEADER_VERSION: u32 = 1;

// ============================================================================
// AXI
// ============================================================================

/// AXI4 data width in bytes (32-bit data bus).
pub const AXI_DATA_BYTES: usize = 4;

/// AXI4 `AxSIZE` encoding for 4-byte beats.
pub const AXI_SIZE_4_BYTES: u8 = 2;

/// Maximum INCR burst length in beats (AXI4).
pub const AXI_MAX_BURST_BEATS: usize = 256;

/// AXI ID used by the DFX controller on the shared AXI4 master port.
pub const AXI_ID_DFX: u8 = 0;

/// AXI ID used by the audio subsystem on the shared AXI4 master port.
pub const AXI_ID_AUDIO: u8 = 1;

// ============================================================================
// Control-Plane Address Map
// ============================================================================

/// Address bit that selects between the Interrupt Controller (0) and the DFX
/// Controller (1) on the shared AXI-Lite slave port.
pub const LITE_SELECT_BIT: u32 = 12;

/// Base address of the Interrupt Controller register window.
pub const INTC_BASE: u32 = 0x0000;

/// Base address of the DFX Controller register window.
pub const DFX_BASE: u32 = 1 << LITE_SELECT_BIT;

/// Offset mask inside a register window.
pub const LITE_WINDOW_MASK: u32 = DFX_BASE - 1;

// ============================================================================
// DFX Controller
// ============================================================================

/// Value of the read-only DFX VERSION register.
pub const DFX_VERSION: u32 = 0x0001_0000;

/// Number of registers in the DFX Controller register file.
pub const DFX_NUM_REGISTERS: usize = 16;

/// Number of registers in the Interrupt Controller register file.
pub const INTC_NUM_REGISTERS: usize = 8;

/// Number of interrupt causes handled by the Interrupt Controller.
pub const INTC_NUM_CAUSES: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_is_ascii_dfx() {
        assert_eq!(BITSTREAM_MAGIC.to_be_bytes(), *b"DFX\0");
    }

    #[test]
    fn test_address_windows_disjoint() {
        assert_eq!(INTC_BASE & DFX_BASE, 0);
        assert_eq!(LITE_WINDOW_MASK, 0xFFF);
        assert_eq!(BITSTREAM_HEADER_WORDS, 8);
    }
}
