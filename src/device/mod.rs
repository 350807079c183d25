//! Device models and register definitions for the ensemble audio platform.
//!
//! This module provides:
//! - Platform constants and the control-plane register maps
//! - AXI signal bundles and the AXI-Lite slave front-end
//! - Sparse host memory behind an AXI4 memory slave
//! - The ICAP/PCAP configuration port
//! - Behavioural models of the ensemble cores and the audio memory traffic
//!
//! # Platform Overview
//!
//! ```text
//!   host CPU                         shared memory
//!      | AXI-Lite                        ^ AXI4
//!      v                                 |
//!  +--------------------- control plane ----------------------+
//!  |  INTC  <----------+        DFX -----+---- audio traffic  |
//!  |   |  control port |         |  ICAP/PCAP                 |
//!  |   v               |         v                            |
//!  |  bus arbiter <--> cores  (one per reconfigurable partition)
//!  +----------------------------------------------------------+
//! ```
//!
//! # Example
//!
//! ```
//! use ensemble_emu::device::{LiteAddress, RegisterModule, HostMemory};
//!
//! // Decode a control-plane address
//! let addr = LiteAddress::decode(0x1008);
//! assert_eq!(addr.module, RegisterModule::DfxController);
//! assert_eq!(addr.index, 2);
//!
//! // Stage data in host memory
//! let mut mem = HostMemory::new();
//! mem.write_u32(0x1000, 0xDEAD_BEEF);
//! assert_eq!(mem.read_u32(0x1000), 0xDEAD_BEEF);
//! ```

pub mod platform_spec;
pub mod registers_spec;
pub mod registers;
pub mod axi;
pub mod host_memory;
pub mod axi_memory;
pub mod config_port;
pub mod ensemble;
pub mod audio;

pub use registers::{LiteAddress, RegisterBlock, RegisterFile, RegisterInfo, RegisterModule};
pub use axi::{Axi4MasterSignals, Axi4SlaveSignals, AxiResp, LiteMasterSignals, LiteSlavePort, LiteSlaveSignals};
pub use host_memory::{HostMemory, HostMemoryError, MemoryRegion};
pub use axi_memory::AxiMemory;
pub use config_port::{ConfigPort, ConfigPortKind};
pub use ensemble::{CoreStatus, CoreTiming, EnsembleCore};
pub use audio::{AudioMaster, AudioParams};
