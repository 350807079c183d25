//! ensemble-emu library
//!
//! Cycle-level model of the runtime control plane of an FPGA audio platform:
//! bus arbiter, interrupt controller, DFX controller and interconnect, with
//! behavioural models of the cores, memory, configuration port and audio
//! traffic around them.

pub mod config;
pub mod control;
pub mod device;
pub mod emu;
pub mod testing;
