//! DFX controller state, command and error encodings.

use std::fmt;

/// Top-level reconfiguration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum DfxState {
    #[default]
    Idle,
    Init,
    CheckBitstream,
    Shutdown,
    LoadPrep,
    Loading,
    Verify,
    Startup,
    Done,
    Error,
}

impl DfxState {
    /// 4-bit code reported in STATUS[7:4].
    pub fn code(self) -> u32 {
        match self {
            DfxState::Idle => 0,
            DfxState::Init => 1,
            DfxState::CheckBitstream => 2,
            DfxState::Shutdown => 3,
            DfxState::LoadPrep => 4,
            DfxState::Loading => 5,
            DfxState::Verify => 6,
            DfxState::Startup => 7,
            DfxState::Done => 8,
            DfxState::Error => 15,
        }
    }

    /// Decode a STATUS state field.
    pub fn from_code(code: u32) -> Option<Self> {
        let state = match code {
            0 => DfxState::Idle,
            1 => DfxState::Init,
            2 => DfxState::CheckBitstream,
            3 => DfxState::Shutdown,
            4 => DfxState::LoadPrep,
            5 => DfxState::Loading,
            6 => DfxState::Verify,
            7 => DfxState::Startup,
            8 => DfxState::Done,
            15 => DfxState::Error,
            _ => return None,
        };
        Some(state)
    }

    /// True while a job is in progress.
    #[inline]
    pub fn is_busy(self) -> bool {
        !matches!(self, DfxState::Idle | DfxState::Error)
    }
}

impl fmt::Display for DfxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DfxState::Idle => "IDLE",
            DfxState::Init => "INIT",
            DfxState::CheckBitstream => "CHECK_BITSTREAM",
            DfxState::Shutdown => "SHUTDOWN",
            DfxState::LoadPrep => "LOAD_PREP",
            DfxState::Loading => "LOADING",
            DfxState::Verify => "VERIFY",
            DfxState::Startup => "STARTUP",
            DfxState::Done => "DONE",
            DfxState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Command field of the CTRL register (bits 7:4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DfxCommand {
    /// Shut down, stream a new bitstream, restart
    Load = 1,
    /// Shut down and restart without streaming
    Reset = 2,
    Status = 3,
    Abort = 4,
    ClearError = 5,
    Debug = 6,
    Reserve = 7,
}

impl DfxCommand {
    /// Decode a command field; `None` for values outside the command set.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let cmd = match bits {
            1 => DfxCommand::Load,
            2 => DfxCommand::Reset,
            3 => DfxCommand::Status,
            4 => DfxCommand::Abort,
            5 => DfxCommand::ClearError,
            6 => DfxCommand::Debug,
            7 => DfxCommand::Reserve,
            _ => return None,
        };
        Some(cmd)
    }

    /// Field encoding.
    #[inline]
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Commands that run a reconfiguration job.
    #[inline]
    pub fn starts_job(self) -> bool {
        matches!(self, DfxCommand::Load | DfxCommand::Reset)
    }
}

/// Error codes reported in the ERROR register.
///
/// Only `InvalidCommand`, `InvalidPartition`, `InvalidBitstream` and `Timeout`
/// are raised by the controller itself. The others are reserved for external
/// monitors, see [`super::DfxController::report_fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u8)]
pub enum DfxErrorCode {
    #[default]
    None = 0,
    InvalidCommand = 1,
    InvalidPartition = 2,
    InvalidBitstream = 3,
    Busy = 4,
    Timeout = 5,
    AccessError = 6,
    CrcError = 7,
    SeuDetected = 8,
    MemoryAccessError = 9,
    SystemError = 10,
}

impl DfxErrorCode {
    /// Register encoding.
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Decode the ERROR register.
    pub fn from_code(code: u32) -> Option<Self> {
        let err = match code {
            0 => DfxErrorCode::None,
            1 => DfxErrorCode::InvalidCommand,
            2 => DfxErrorCode::InvalidPartition,
            3 => DfxErrorCode::InvalidBitstream,
            4 => DfxErrorCode::Busy,
            5 => DfxErrorCode::Timeout,
            6 => DfxErrorCode::AccessError,
            7 => DfxErrorCode::CrcError,
            8 => DfxErrorCode::SeuDetected,
            9 => DfxErrorCode::MemoryAccessError,
            10 => DfxErrorCode::SystemError,
            _ => return None,
        };
        Some(err)
    }
}

impl fmt::Display for DfxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DfxErrorCode::None => "none",
            DfxErrorCode::InvalidCommand => "invalid command",
            DfxErrorCode::InvalidPartition => "invalid partition",
            DfxErrorCode::InvalidBitstream => "invalid bitstream",
            DfxErrorCode::Busy => "busy",
            DfxErrorCode::Timeout => "timeout",
            DfxErrorCode::AccessError => "access error",
            DfxErrorCode::CrcError => "CRC error",
            DfxErrorCode::SeuDetected => "SEU detected",
            DfxErrorCode::MemoryAccessError => "memory access error",
            DfxErrorCode::SystemError => "system error",
        };
        f.write_str(name)
    }
}
