//! Runtime control plane.
//!
//! - [`arbiter`]: single-winner control bus shared by the cores and the
//!   interrupt controller
//! - [`intc`]: interrupt aggregation and host-issued core commands
//! - [`dfx`]: partial-reconfiguration controller
//! - [`interconnect`]: AXI-Lite decode and AXI4 master mux

pub mod arbiter;
pub mod dfx;
pub mod intc;
pub mod interconnect;

pub use arbiter::{BusArbiter, BusInstruction, BusMessage, BusRequest, Destination, PriorityScheme};
pub use dfx::{DfxController, DfxErrorCode, DfxParams, DfxState};
pub use intc::InterruptController;
pub use interconnect::{AxiMux, LiteRouter};
