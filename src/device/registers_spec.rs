//! Control-Plane Register Specification
//!
//! Word indices and bit layouts for the two AXI-Lite register blocks of the
//! runtime control plane. Addresses on the bus are `base + index * 4`, see
//! [`super::platform_spec`] for the window bases.

// ============================================================================
// DFX Controller (16 registers)
// ============================================================================

pub mod dfx {
    //! DFX Controller register map.

    /// Control register (one-shot bits self-clear).
    pub const CTRL: usize = 0;
    /// Synthesized status: state[7:4] | reserved[3] | error[2] | done[1] | busy[0].
    pub const STATUS: usize = 1;
    /// 4-bit error code.
    pub const ERROR: usize = 2;
    /// Target reconfigurable partition.
    pub const RP_SELECT: usize = 3;
    /// Bitstream source address, low word.
    pub const BS_ADDR_LOW: usize = 4;
    /// Bitstream source address, high word.
    pub const BS_ADDR_HIGH: usize = 5;
    /// Payload length in bytes.
    pub const BS_SIZE: usize = 6;
    /// Bitstream identifier.
    pub const BS_ID: usize = 7;
    /// LOADING cycle budget.
    pub const TIMEOUT: usize = 8;
    /// Constant version word.
    pub const VERSION: usize = 9;
    /// Reserved; plain storage.
    pub const RESERVED: usize = 10;
    /// Synthesized: configured bitstream id of the selected partition.
    pub const CONFIG_ID: usize = 11;
    /// Synthesized: words streamed to the configuration port.
    pub const PROGRESS: usize = 12;
    /// Interrupt enable.
    pub const INT_ENABLE: usize = 13;
    /// Interrupt status, write-1-to-clear.
    pub const INT_STATUS: usize = 14;
    /// Synthesized: one bit per partition, mirrors core status.
    pub const RP_STATUS: usize = 15;

    // CTRL bits
    pub const CTRL_START: u32 = 1 << 0;
    pub const CTRL_ABORT: u32 = 1 << 1;
    pub const CTRL_CLEAR_ERROR: u32 = 1 << 2;
    pub const CTRL_COMMAND_SHIFT: u32 = 4;
    pub const CTRL_COMMAND_MASK: u32 = 0xF;
    pub const CTRL_SECURE: u32 = 1 << 8;
    pub const CTRL_SELF_TEST: u32 = 1 << 9;
    pub const CTRL_SW_RESET: u32 = 1 << 31;

    /// CTRL bits that read back as zero after being written.
    pub const CTRL_SELF_CLEARING: u32 =
        CTRL_START | CTRL_ABORT | CTRL_CLEAR_ERROR | CTRL_SECURE | CTRL_SELF_TEST | CTRL_SW_RESET;

    // STATUS bits
    pub const STATUS_BUSY: u32 = 1 << 0;
    pub const STATUS_DONE: u32 = 1 << 1;
    pub const STATUS_ERROR: u32 = 1 << 2;
    pub const STATUS_STATE_SHIFT: u32 = 4;
    pub const STATUS_STATE_MASK: u32 = 0xF;

    // Interrupt bits (INT_ENABLE / INT_STATUS)
    pub const INT_DONE: u32 = 1 << 0;
    pub const INT_ERROR: u32 = 1 << 1;
    pub const INT_TIMEOUT: u32 = 1 << 2;
    pub const INT_PROGRESS: u32 = 1 << 3;
    pub const INT_MASK: u32 = INT_DONE | INT_ERROR | INT_TIMEOUT | INT_PROGRESS;

    /// ERROR register width mask.
    pub const ERROR_MASK: u32 = 0xF;
}

// ============================================================================
// Interrupt Controller (8 registers)
// ============================================================================

pub mod intc {
    //! Interrupt Controller register map.

    /// Global enable and one-shot global commands.
    pub const CTRL: usize = 0;
    /// Synthesized: irq[0] | bus pending[1] | per-core pending[31:16].
    pub const STATUS: usize = 1;
    /// One-shot per-core commands for the core in CORE_SELECT.
    pub const CORE_CTRL: usize = 2;
    /// Synthesized: 2-bit status per core.
    pub const CORE_STATUS: usize = 3;
    /// Per-cause interrupt enable.
    pub const INT_ENABLE: usize = 4;
    /// Synthesized: latched causes.
    pub const INT_STATUS: usize = 5;
    /// Write-1-to-clear causes [7:0] and per-core pending flags [31:16].
    pub const INT_CLEAR: usize = 6;
    /// Target core for CORE_CTRL.
    pub const CORE_SELECT: usize = 7;

    // CTRL bits
    pub const CTRL_GLOBAL_ENABLE: u32 = 1 << 0;
    pub const CTRL_PAUSE_ALL: u32 = 1 << 1;
    pub const CTRL_STOP_ALL: u32 = 1 << 2;
    pub const CTRL_RESUME_ALL: u32 = 1 << 3;
    pub const CTRL_SW_INTERRUPT: u32 = 1 << 4;
    pub const CTRL_SELF_CLEARING: u32 =
        CTRL_PAUSE_ALL | CTRL_STOP_ALL | CTRL_RESUME_ALL | CTRL_SW_INTERRUPT;

    // CORE_CTRL bits
    pub const CORE_CTRL_PAUSE: u32 = 1 << 0;
    pub const CORE_CTRL_STOP: u32 = 1 << 1;
    pub const CORE_CTRL_RESUME: u32 = 1 << 2;
    pub const CORE_CTRL_SELF_CLEARING: u32 = CORE_CTRL_PAUSE | CORE_CTRL_STOP | CORE_CTRL_RESUME;

    // STATUS bits
    pub const STATUS_IRQ: u32 = 1 << 0;
    pub const STATUS_BUS_PENDING: u32 = 1 << 1;
    pub const STATUS_PENDING_SHIFT: u32 = 16;

    // Interrupt causes
    pub const CAUSE_CORE_DONE: u32 = 1 << 0;
    pub const CAUSE_CORE_ERROR: u32 = 1 << 1;
    pub const CAUSE_BUS_ERROR: u32 = 1 << 2;
    pub const CAUSE_BUFFER_OVERFLOW: u32 = 1 << 3;
    pub const CAUSE_BUFFER_UNDERFLOW: u32 = 1 << 4;
    pub const CAUSE_SYNC_LOST: u32 = 1 << 5;
    pub const CAUSE_TEMPERATURE: u32 = 1 << 6;
    pub const CAUSE_SOFTWARE: u32 = 1 << 7;
    pub const CAUSE_MASK: u32 = 0xFF;

    /// INT_CLEAR bits that clear per-core pending flags.
    pub const CLEAR_PENDING_SHIFT: u32 = 16;
}
