//! AXI signal bundles and the AXI-Lite slave front-end.
//!
//! Signals are modelled as plain structs sampled once per cycle. A `valid`
//! with payload is carried as `Option<T>`; `None` means the valid line is low.
//! Handshakes complete on a cycle where both sides observe valid and ready in
//! the same snapshot, which keeps master and slave views consistent under the
//! platform's two-phase tick.
//!
//! # AXI-Lite Transaction Timeline
//!
//! ```text
//! cycle   master               slave
//!   0     awvalid+wvalid       awready=wready=1
//!   1     bready               write applied, bvalid
//!   2     response consumed    bvalid cleared, ready again
//! ```

use super::registers::{LiteAddress, RegisterBlock};

/// AXI response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AxiResp {
    /// Normal access success.
    #[default]
    Okay = 0,
    /// Exclusive access success.
    ExOkay = 1,
    /// Slave error.
    SlvErr = 2,
    /// Decode error.
    DecErr = 3,
}

impl AxiResp {
    /// True for OKAY and EXOKAY.
    pub fn is_ok(self) -> bool {
        matches!(self, AxiResp::Okay | AxiResp::ExOkay)
    }
}

// ============================================================================
// AXI-Lite
// ============================================================================

/// Signals driven by an AXI-Lite master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiteMasterSignals {
    pub awvalid: bool,
    pub awaddr: u32,
    pub wvalid: bool,
    pub wdata: u32,
    pub wstrb: u8,
    pub bready: bool,
    pub arvalid: bool,
    pub araddr: u32,
    pub rready: bool,
}

/// Signals driven by an AXI-Lite slave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiteSlaveSignals {
    pub awready: bool,
    pub wready: bool,
    pub bvalid: bool,
    pub bresp: AxiResp,
    pub arready: bool,
    pub rvalid: bool,
    pub rdata: u32,
    pub rresp: AxiResp,
}

impl LiteSlaveSignals {
    /// Idle slave ready to accept a transaction.
    pub fn ready() -> Self {
        Self { awready: true, wready: true, arready: true, ..Default::default() }
    }
}

/// AXI-Lite slave front-end shared by the control-plane register blocks.
///
/// Accepts a write when address and data are valid together and the slave is
/// ready, applies it through [`RegisterBlock::write_register`] and raises a
/// write response on the following cycle. Reads return data and OKAY for
/// defined registers, zero and SLVERR otherwise.
#[derive(Debug, Clone)]
pub struct LiteSlavePort {
    out: LiteSlaveSignals,
    writes: u64,
    reads: u64,
    read_errors: u64,
}

impl LiteSlavePort {
    /// Create an idle front-end.
    pub fn new() -> Self {
        Self {
            out: LiteSlaveSignals::ready(),
            writes: 0,
            reads: 0,
            read_errors: 0,
        }
    }

    /// Registered outputs from the last tick.
    #[inline]
    pub fn outputs(&self) -> LiteSlaveSignals {
        self.out
    }

    /// Advance one cycle against `block`.
    pub fn tick<B: RegisterBlock + ?Sized>(&mut self, block: &mut B, input: &LiteMasterSignals) {
        let mut next = self.out;

        // Write channel
        if self.out.bvalid {
            if input.bready {
                next.bvalid = false;
                next.awready = true;
                next.wready = true;
            }
        } else if input.awvalid && input.wvalid && self.out.awready && self.out.wready {
            let addr = LiteAddress::decode(input.awaddr);
            if !block.write_register(addr.index, input.wdata, input.wstrb) {
                log::warn!("AXI-Lite write to undefined register {}", addr);
            }
            self.writes += 1;
            next.bvalid = true;
            next.bresp = AxiResp::Okay;
            next.awready = false;
            next.wready = false;
        }

        // Read channel
        if self.out.rvalid {
            if input.rready {
                next.rvalid = false;
                next.arready = true;
            }
        } else if input.arvalid && self.out.arready {
            let addr = LiteAddress::decode(input.araddr);
            let (data, resp) = match block.read_register(addr.index) {
                Some(value) => (value, AxiResp::Okay),
                None => {
                    self.read_errors += 1;
                    (0, AxiResp::SlvErr)
                }
            };
            self.reads += 1;
            next.rvalid = true;
            next.rdata = data;
            next.rresp = resp;
            next.arready = false;
        }

        self.out = next;
    }

    /// Return to the idle handshake state.
    pub fn reset(&mut self) {
        self.out = LiteSlaveSignals::ready();
    }

    /// Accepted writes.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Accepted reads.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Reads answered with SLVERR.
    pub fn read_errors(&self) -> u64 {
        self.read_errors
    }
}

impl Default for LiteSlavePort {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// AXI4 (memory-mapped, bursts)
// ============================================================================

/// Address-channel payload (AR or AW).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxiAddr {
    /// Transaction ID, used to route responses.
    pub id: u8,
    /// Start byte address.
    pub addr: u64,
    /// Burst length minus one (`AxLEN`).
    pub len: u8,
    /// Beat size encoding (`AxSIZE`).
    pub size: u8,
}

impl AxiAddr {
    /// Number of beats in the burst.
    #[inline]
    pub fn beats(&self) -> usize {
        self.len as usize + 1
    }
}

/// Read-data beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxiReadBeat {
    pub id: u8,
    pub data: u32,
    pub resp: AxiResp,
    pub last: bool,
}

/// Write-data beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxiWriteBeat {
    pub data: u32,
    pub strb: u8,
    pub last: bool,
}

/// Write response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxiWriteResp {
    pub id: u8,
    pub resp: AxiResp,
}

/// Signals driven by an AXI4 master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Axi4MasterSignals {
    pub ar: Option<AxiAddr>,
    pub rready: bool,
    pub aw: Option<AxiAddr>,
    pub w: Option<AxiWriteBeat>,
    pub bready: bool,
}

impl Axi4MasterSignals {
    /// True if an address phase is outstanding on either channel.
    #[inline]
    pub fn address_request(&self) -> bool {
        self.ar.is_some() || self.aw.is_some()
    }
}

/// Signals driven by an AXI4 slave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Axi4SlaveSignals {
    pub arready: bool,
    pub r: Option<AxiReadBeat>,
    pub awready: bool,
    pub wready: bool,
    pub b: Option<AxiWriteResp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::registers::RegisterFile;

    /// Four plain storage registers.
    struct Plain(RegisterFile<4>);

    impl RegisterBlock for Plain {
        fn read_register(&self, index: usize) -> Option<u32> {
            (index < 4).then(|| self.0.get(index))
        }

        fn write_register(&mut self, index: usize, data: u32, strobe: u8) -> bool {
            self.0.write(index, data, strobe).is_some()
        }
    }

    #[test]
    fn test_write_handshake() {
        let mut port = LiteSlavePort::new();
        let mut block = Plain(RegisterFile::new());

        let req = LiteMasterSignals {
            awvalid: true,
            awaddr: 0x4,
            wvalid: true,
            wdata: 0xDEAD_BEEF,
            wstrb: 0xF,
            ..Default::default()
        };
        port.tick(&mut block, &req);
        assert!(port.outputs().bvalid);
        assert!(!port.outputs().awready);
        assert_eq!(block.0.get(1), 0xDEAD_BEEF);

        // Master holds bready; response retires
        let ack = LiteMasterSignals { bready: true, ..Default::default() };
        port.tick(&mut block, &ack);
        assert!(!port.outputs().bvalid);
        assert!(port.outputs().awready);
        assert_eq!(port.writes(), 1);
    }

    #[test]
    fn test_write_needs_both_channels() {
        let mut port = LiteSlavePort::new();
        let mut block = Plain(RegisterFile::new());

        let req = LiteMasterSignals { awvalid: true, awaddr: 0, ..Default::default() };
        port.tick(&mut block, &req);
        assert!(!port.outputs().bvalid);
        assert_eq!(port.writes(), 0);
    }

    #[test]
    fn test_read_slave_error() {
        let mut port = LiteSlavePort::new();
        let mut block = Plain(RegisterFile::new());

        let req = LiteMasterSignals { arvalid: true, araddr: 0x40, ..Default::default() };
        port.tick(&mut block, &req);
        let out = port.outputs();
        assert!(out.rvalid);
        assert_eq!(out.rresp, AxiResp::SlvErr);
        assert_eq!(out.rdata, 0);
        assert_eq!(port.read_errors(), 1);
    }

    #[test]
    fn test_read_ok() {
        let mut port = LiteSlavePort::new();
        let mut block = Plain(RegisterFile::new());
        block.0.set(2, 0x1234);

        let req = LiteMasterSignals { arvalid: true, araddr: 0x8, ..Default::default() };
        port.tick(&mut block, &req);
        assert_eq!(port.outputs().rdata, 0x1234);
        assert_eq!(port.outputs().rresp, AxiResp::Okay);

        let ack = LiteMasterSignals { rready: true, ..Default::default() };
        port.tick(&mut block, &ack);
        assert!(!port.outputs().rvalid);
        assert!(port.outputs().arready);
    }

    #[test]
    fn test_axi_addr_beats() {
        let a = AxiAddr { id: 0, addr: 0, len: 7, size: 2 };
        assert_eq!(a.beats(), 8);
    }
}
