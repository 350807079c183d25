//! Control-plane register files and address decoding.
//!
//! # Address Encoding
//!
//! The shared AXI-Lite slave port carries 32-bit byte addresses:
//! ```text
//! [31:13] ignored
//! [12]    block select (0 = Interrupt Controller, 1 = DFX Controller)
//! [11:2]  register word index
//! [1:0]   byte offset (ignored, accesses are word-aligned)
//! ```

use std::fmt;

use super::platform_spec::{LITE_SELECT_BIT, LITE_WINDOW_MASK};
use super::registers_spec::{dfx, intc};

/// Register block addressed by the select bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterModule {
    /// Interrupt Controller window.
    InterruptController,
    /// DFX Controller window.
    DfxController,
}

impl fmt::Display for RegisterModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterModule::InterruptController => write!(f, "INTC"),
            RegisterModule::DfxController => write!(f, "DFX"),
        }
    }
}

/// Decoded control-plane address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteAddress {
    /// Target block.
    pub module: RegisterModule,
    /// Register word index within the block.
    pub index: usize,
}

impl LiteAddress {
    /// Decode a byte address from the AXI-Lite port.
    pub fn decode(addr: u32) -> Self {
        let module = if (addr >> LITE_SELECT_BIT) & 1 == 0 {
            RegisterModule::InterruptController
        } else {
            RegisterModule::DfxController
        };
        Self {
            module,
            index: ((addr & LITE_WINDOW_MASK) >> 2) as usize,
        }
    }

    /// Encode a block and word index into a byte address.
    pub fn encode(module: RegisterModule, index: usize) -> u32 {
        let select = match module {
            RegisterModule::InterruptController => 0,
            RegisterModule::DfxController => 1 << LITE_SELECT_BIT,
        };
        select | (((index as u32) << 2) & LITE_WINDOW_MASK)
    }
}

impl fmt::Display for LiteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match RegisterInfo::lookup(self.module, self.index) {
            Some(info) => write!(f, "{}.{}", self.module, info.name),
            None => write!(f, "{}[{}]", self.module, self.index),
        }
    }
}

/// Expand a 4-bit AXI write strobe into a 32-bit byte-lane mask.
#[inline]
pub fn strobe_mask(strobe: u8) -> u32 {
    (0..4)
        .filter(|lane| strobe & (1 << lane) != 0)
        .fold(0u32, |mask, lane| mask | (0xFF << (lane * 8)))
}

/// Fixed-size array of 32-bit registers with byte-strobed writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile<const N: usize> {
    regs: [u32; N],
}

impl<const N: usize> RegisterFile<N> {
    /// Create a register file with every register at zero.
    pub fn new() -> Self {
        Self { regs: [0; N] }
    }

    /// Number of registers.
    pub const fn len(&self) -> usize {
        N
    }

    /// Always false; register files have a fixed, non-zero size in practice.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Read raw storage. Out-of-range indices read as zero.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.regs.get(index).copied().unwrap_or(0)
    }

    /// Overwrite a register unconditionally.
    #[inline]
    pub fn set(&mut self, index: usize, value: u32) {
        if let Some(reg) = self.regs.get_mut(index) {
            *reg = value;
        }
    }

    /// Update only the byte lanes enabled in `strobe`.
    ///
    /// Returns the new register value, or `None` if `index` is out of range.
    pub fn write(&mut self, index: usize, data: u32, strobe: u8) -> Option<u32> {
        let reg = self.regs.get_mut(index)?;
        let mask = strobe_mask(strobe);
        *reg = (*reg & !mask) | (data & mask);
        Some(*reg)
    }

    /// Reset all registers to zero.
    pub fn clear(&mut self) {
        self.regs = [0; N];
    }
}

impl<const N: usize> Default for RegisterFile<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A register block reachable through an AXI-Lite slave front-end.
///
/// `read_register` returns `None` for indices outside the defined register
/// range, which the front-end turns into a SLVERR response.
pub trait RegisterBlock {
    /// Read a register, synthesizing live values where the block defines them.
    fn read_register(&self, index: usize) -> Option<u32>;

    /// Apply a byte-strobed write, including any one-shot side effects.
    ///
    /// Returns false if `index` is outside the register range.
    fn write_register(&mut self, index: usize, data: u32, strobe: u8) -> bool;
}

/// Access type of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read/write storage.
    ReadWrite,
    /// Read-only (synthesized or constant).
    ReadOnly,
    /// Write-1-to-clear.
    WriteOneToClear,
}

/// Information about a specific register.
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    /// Register name
    pub name: &'static str,
    /// Word index within its block
    pub index: usize,
    /// Access type
    pub access: Access,
    /// Brief description
    pub description: &'static str,
}

impl RegisterInfo {
    /// Look up register info for a block and word index.
    pub fn lookup(module: RegisterModule, index: usize) -> Option<Self> {
        let table = match module {
            RegisterModule::InterruptController => INTC_REGISTERS,
            RegisterModule::DfxController => DFX_REGISTERS,
        };
        table.iter().find(|r| r.index == index).cloned()
    }

    /// Get a formatted description suitable for display.
    pub fn format(&self) -> String {
        format!("{} ({:?}): {}", self.name, self.access, self.description)
    }
}

macro_rules! reg {
    ($name:expr, $index:expr, $access:ident, $desc:expr) => {
        RegisterInfo { name: $name, index: $index, access: Access::$access, description: $desc }
    };
}

/// DFX Controller registers.
static DFX_REGISTERS: &[RegisterInfo] = &[
    reg!("CTRL", dfx::CTRL, ReadWrite, "Start/abort/clear-error, command, sw-reset"),
    reg!("STATUS", dfx::STATUS, ReadOnly, "State, error, done, busy"),
    reg!("ERROR", dfx::ERROR, ReadOnly, "Error code"),
    reg!("RP_SELECT", dfx::RP_SELECT, ReadWrite, "Target partition"),
    reg!("BS_ADDR_LOW", dfx::BS_ADDR_LOW, ReadWrite, "Bitstream address [31:0]"),
    reg!("BS_ADDR_HIGH", dfx::BS_ADDR_HIGH, ReadWrite, "Bitstream address [63:32]"),
    reg!("BS_SIZE", dfx::BS_SIZE, ReadWrite, "Payload size in bytes"),
    reg!("BS_ID", dfx::BS_ID, ReadWrite, "Bitstream identifier"),
    reg!("TIMEOUT", dfx::TIMEOUT, ReadWrite, "LOADING cycle budget"),
    reg!("VERSION", dfx::VERSION, ReadOnly, "Controller version"),
    reg!("RESERVED", dfx::RESERVED, ReadWrite, "Reserved"),
    reg!("CONFIG_ID", dfx::CONFIG_ID, ReadOnly, "Configured bitstream of selected partition"),
    reg!("PROGRESS", dfx::PROGRESS, ReadOnly, "Words streamed"),
    reg!("INT_ENABLE", dfx::INT_ENABLE, ReadWrite, "Done/error/timeout/progress enable"),
    reg!("INT_STATUS", dfx::INT_STATUS, WriteOneToClear, "Done/error/timeout/progress status"),
    reg!("RP_STATUS", dfx::RP_STATUS, ReadOnly, "Per-partition core status"),
];

/// Interrupt Controller registers.
static INTC_REGISTERS: &[RegisterInfo] = &[
    reg!("CTRL", intc::CTRL, ReadWrite, "Global enable, global pause/stop/resume"),
    reg!("STATUS", intc::STATUS, ReadOnly, "IRQ, bus pending, per-core pending"),
    reg!("CORE_CTRL", intc::CORE_CTRL, ReadWrite, "Per-core pause/stop/resume"),
    reg!("CORE_STATUS", intc::CORE_STATUS, ReadOnly, "2-bit status per core"),
    reg!("INT_ENABLE", intc::INT_ENABLE, ReadWrite, "Per-cause enable"),
    reg!("INT_STATUS", intc::INT_STATUS, ReadOnly, "Latched causes"),
    reg!("INT_CLEAR", intc::INT_CLEAR, WriteOneToClear, "Clear causes and pending flags"),
    reg!("CORE_SELECT", intc::CORE_SELECT, ReadWrite, "Target core for CORE_CTRL"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_decode() {
        let addr = LiteAddress::decode(0x1000 + 4 * 3);
        assert_eq!(addr.module, RegisterModule::DfxController);
        assert_eq!(addr.index, 3);

        let addr = LiteAddress::decode(0x0018);
        assert_eq!(addr.module, RegisterModule::InterruptController);
        assert_eq!(addr.index, 6);
    }

    #[test]
    fn test_address_encode_roundtrip() {
        let raw = LiteAddress::encode(RegisterModule::DfxController, dfx::INT_STATUS);
        assert_eq!(raw, 0x1038);
        assert_eq!(LiteAddress::decode(raw).index, dfx::INT_STATUS);
    }

    #[test]
    fn test_strobe_mask() {
        assert_eq!(strobe_mask(0b0000), 0);
        assert_eq!(strobe_mask(0b1111), 0xFFFF_FFFF);
        assert_eq!(strobe_mask(0b0101), 0x00FF_00FF);
        assert_eq!(strobe_mask(0b1000), 0xFF00_0000);
    }

    #[test]
    fn test_partial_strobe_write() {
        let mut regs: RegisterFile<4> = RegisterFile::new();
        regs.set(1, 0x1122_3344);

        regs.write(1, 0xAABB_CCDD, 0b0101);

        // Only bytes 0 and 2 change
        assert_eq!(regs.get(1), 0x11BB_33DD);
    }

    #[test]
    fn test_out_of_range_write() {
        let mut regs: RegisterFile<4> = RegisterFile::new();
        assert!(regs.write(4, 1, 0xF).is_none());
        assert_eq!(regs.get(4), 0);
    }

    #[test]
    fn test_register_lookup() {
        let info = RegisterInfo::lookup(RegisterModule::DfxController, dfx::PROGRESS).unwrap();
        assert_eq!(info.name, "PROGRESS");
        assert_eq!(info.access, Access::ReadOnly);

        let info = RegisterInfo::lookup(RegisterModule::InterruptController, intc::INT_CLEAR).unwrap();
        assert_eq!(info.access, Access::WriteOneToClear);

        assert!(RegisterInfo::lookup(RegisterModule::InterruptController, 8).is_none());
    }

    #[test]
    fn test_display() {
        let addr = LiteAddress::decode(0x1004);
        assert_eq!(format!("{}", addr), "DFX.STATUS");
    }
}
