//! Cycle-level emulation of the ensemble platform.
//!
//! This module provides the platform that steps every block of the control
//! plane in lock-step, plus the host-side AXI-Lite master used to drive it.
//!
//! # Architecture
//!
//! Every block is a synchronous state machine with registered outputs. The
//! platform advances them together, one clock per step, building all inputs
//! from the previous step's outputs (evaluate, then commit).
//!
//! # Example
//!
//! ```
//! use ensemble_emu::config::PlatformConfig;
//! use ensemble_emu::device::RegisterModule;
//! use ensemble_emu::device::registers_spec::dfx;
//! use ensemble_emu::emu::Platform;
//!
//! let mut platform = Platform::new(&PlatformConfig::default()).unwrap();
//! let version = platform
//!     .host(100)
//!     .read_reg(RegisterModule::DfxController, dfx::VERSION)
//!     .unwrap();
//! assert_eq!(version, 0x0001_0000);
//! ```

pub mod host;
pub mod platform;

pub use host::{HostDriver, HostError, HostOp, HostPort, LoadJob};
pub use platform::{InterruptLines, Platform};
