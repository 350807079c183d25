//! Top-level interconnect.
//!
//! Two fabrics sit between the control plane and the outside world:
//!
//! ```text
//!                 +-------------+ bit12=0 +------+
//!  host AXI-Lite->| LiteRouter  |-------->| INTC |
//!                 |             |-------->| DFX  |
//!                 +-------------+ bit12=1 +------+
//!
//!   DFX  AXI4 --->+-------------+
//!                 |   AxiMux    |-------> memory slave
//!  audio AXI4 --->+-------------+
//! ```
//!
//! Both are combinational over the cycle snapshot. The router remembers which
//! block owns each outstanding AXI-Lite transaction so the response reaches
//! the host even if the next request targets the other block. The mux gives
//! the DFX controller priority whenever it has an address phase pending; read
//! data and write responses return by AXI ID.

use crate::device::axi::{Axi4MasterSignals, Axi4SlaveSignals, LiteMasterSignals, LiteSlaveSignals};
use crate::device::platform_spec::{AXI_ID_AUDIO, AXI_ID_DFX};
use crate::device::registers::{LiteAddress, RegisterModule};

// ============================================================================
// AXI-Lite router
// ============================================================================

/// Per-block views of the host AXI-Lite port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiteRoutes {
    pub intc: LiteMasterSignals,
    pub dfx: LiteMasterSignals,
}

/// Address decoder for the shared AXI-Lite slave port.
#[derive(Debug, Clone, Default)]
pub struct LiteRouter {
    /// Block owing the current write response
    write_owner: Option<RegisterModule>,
    /// Block owing the current read response
    read_owner: Option<RegisterModule>,
    writes: [u64; 2],
    reads: [u64; 2],
}

impl LiteRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_target(&self, host: &LiteMasterSignals) -> RegisterModule {
        self.write_owner.unwrap_or_else(|| LiteAddress::decode(host.awaddr).module)
    }

    fn read_target(&self, host: &LiteMasterSignals) -> RegisterModule {
        self.read_owner.unwrap_or_else(|| LiteAddress::decode(host.araddr).module)
    }

    /// Split the host signals between the two register blocks.
    pub fn route(&self, host: &LiteMasterSignals) -> LiteRoutes {
        let write = LiteMasterSignals {
            awvalid: host.awvalid,
            awaddr: host.awaddr,
            wvalid: host.wvalid,
            wdata: host.wdata,
            wstrb: host.wstrb,
            bready: host.bready,
            ..Default::default()
        };
        let read = LiteMasterSignals {
            arvalid: host.arvalid,
            araddr: host.araddr,
            rready: host.rready,
            ..Default::default()
        };

        let mut routes = LiteRoutes::default();
        merge_master(slot(&mut routes, self.write_target(host)), &write);
        merge_master(slot(&mut routes, self.read_target(host)), &read);
        routes
    }

    /// Slave signals as seen by the host.
    pub fn respond(
        &self,
        host: &LiteMasterSignals,
        intc: &LiteSlaveSignals,
        dfx: &LiteSlaveSignals,
    ) -> LiteSlaveSignals {
        let pick = |module| match module {
            RegisterModule::InterruptController => intc,
            RegisterModule::DfxController => dfx,
        };
        let w = pick(self.write_target(host));
        let r = pick(self.read_target(host));
        LiteSlaveSignals {
            awready: w.awready,
            wready: w.wready,
            bvalid: w.bvalid,
            bresp: w.bresp,
            arready: r.arready,
            rvalid: r.rvalid,
            rdata: r.rdata,
            rresp: r.rresp,
        }
    }

    /// Track transaction ownership from the cycle snapshot.
    pub fn tick(&mut self, host: &LiteMasterSignals, intc: &LiteSlaveSignals, dfx: &LiteSlaveSignals) {
        let seen = self.respond(host, intc, dfx);
        let write_target = self.write_target(host);
        let read_target = self.read_target(host);

        if seen.bvalid && host.bready {
            self.write_owner = None;
        } else if host.awvalid && host.wvalid && seen.awready && seen.wready {
            log::trace!("AXI-Lite write 0x{:04x} -> {}", host.awaddr, write_target);
            self.writes[index(write_target)] += 1;
            self.write_owner = Some(write_target);
        }

        if seen.rvalid && host.rready {
            self.read_owner = None;
        } else if host.arvalid && seen.arready {
            log::trace!("AXI-Lite read 0x{:04x} -> {}", host.araddr, read_target);
            self.reads[index(read_target)] += 1;
            self.read_owner = Some(read_target);
        }
    }

    /// Accepted writes for a block.
    pub fn writes(&self, module: RegisterModule) -> u64 {
        self.writes[index(module)]
    }

    /// Accepted reads for a block.
    pub fn reads(&self, module: RegisterModule) -> u64 {
        self.reads[index(module)]
    }

    pub fn reset(&mut self) {
        self.write_owner = None;
        self.read_owner = None;
    }
}

fn index(module: RegisterModule) -> usize {
    match module {
        RegisterModule::InterruptController => 0,
        RegisterModule::DfxController => 1,
    }
}

fn slot(routes: &mut LiteRoutes, module: RegisterModule) -> &mut LiteMasterSignals {
    match module {
        RegisterModule::InterruptController => &mut routes.intc,
        RegisterModule::DfxController => &mut routes.dfx,
    }
}

fn merge_master(dst: &mut LiteMasterSignals, src: &LiteMasterSignals) {
    dst.awvalid |= src.awvalid;
    dst.wvalid |= src.wvalid;
    dst.bready |= src.bready;
    dst.arvalid |= src.arvalid;
    dst.rready |= src.rready;
    if src.awvalid || src.wvalid || src.bready {
        dst.awaddr = src.awaddr;
        dst.wdata = src.wdata;
        dst.wstrb = src.wstrb;
    }
    if src.arvalid || src.rready {
        dst.araddr = src.araddr;
    }
}

// ============================================================================
// AXI4 master mux
// ============================================================================

/// Master owning the address channels this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxiOwner {
    Dfx,
    Audio,
}

/// Per-master and slave-side signals after muxing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxiRoutes {
    pub slave: Axi4MasterSignals,
    pub dfx: Axi4SlaveSignals,
    pub audio: Axi4SlaveSignals,
}

/// Mux statistics.
#[derive(Debug, Clone, Default)]
pub struct AxiMuxStats {
    pub dfx_cycles: u64,
    /// Cycles the audio master had an address pending behind the DFX master
    pub audio_blocked_cycles: u64,
    /// Beats whose ID matched neither master
    pub misrouted_beats: u64,
}

/// Two-master AXI4 mux with fixed DFX priority.
#[derive(Debug, Clone, Default)]
pub struct AxiMux {
    stats: AxiMuxStats,
}

impl AxiMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &AxiMuxStats {
        &self.stats
    }

    /// Owner of the address channels for this snapshot.
    pub fn owner(dfx: &Axi4MasterSignals) -> AxiOwner {
        if dfx.address_request() {
            AxiOwner::Dfx
        } else {
            AxiOwner::Audio
        }
    }

    /// Route one cycle.
    pub fn route(
        &mut self,
        dfx: &Axi4MasterSignals,
        audio: &Axi4MasterSignals,
        slave: &Axi4SlaveSignals,
    ) -> AxiRoutes {
        let owner = Self::owner(dfx);
        let mut routes = AxiRoutes::default();

        let granted = match owner {
            AxiOwner::Dfx => {
                self.stats.dfx_cycles += 1;
                if audio.address_request() {
                    self.stats.audio_blocked_cycles += 1;
                }
                dfx
            }
            AxiOwner::Audio => audio,
        };
        routes.slave.ar = granted.ar;
        routes.slave.aw = granted.aw;
        routes.slave.w = granted.w;

        let to_owner = match owner {
            AxiOwner::Dfx => &mut routes.dfx,
            AxiOwner::Audio => &mut routes.audio,
        };
        to_owner.arready = slave.arready;
        to_owner.awready = slave.awready;
        to_owner.wready = slave.wready;

        if let Some(beat) = slave.r {
            match beat.id {
                AXI_ID_DFX => {
                    routes.dfx.r = Some(beat);
                    routes.slave.rready = dfx.rready;
                }
                AXI_ID_AUDIO => {
                    routes.audio.r = Some(beat);
                    routes.slave.rready = audio.rready;
                }
                id => {
                    self.stats.misrouted_beats += 1;
                    log::warn!("AXI4 read beat with unknown ID {}", id);
                }
            }
        }

        if let Some(resp) = slave.b {
            match resp.id {
                AXI_ID_DFX => {
                    routes.dfx.b = Some(resp);
                    routes.slave.bready = dfx.bready;
                }
                AXI_ID_AUDIO => {
                    routes.audio.b = Some(resp);
                    routes.slave.bready = audio.bready;
                }
                id => log::warn!("AXI4 write response with unknown ID {}", id),
            }
        }

        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::axi::{AxiAddr, AxiReadBeat, AxiResp, AxiWriteResp};
    use crate::device::platform_spec::DFX_BASE;

    fn ar(id: u8, addr: u64) -> Option<AxiAddr> {
        Some(AxiAddr { id, addr, len: 0, size: 2 })
    }

    #[test]
    fn test_lite_decode_by_select_bit() {
        let router = LiteRouter::new();
        let host = LiteMasterSignals { awvalid: true, awaddr: DFX_BASE | 0x8, wvalid: true, ..Default::default() };
        let routes = router.route(&host);
        assert!(routes.dfx.awvalid && routes.dfx.wvalid);
        assert!(!routes.intc.awvalid);
        assert_eq!(routes.dfx.awaddr, DFX_BASE | 0x8);

        let host = LiteMasterSignals { arvalid: true, araddr: 0x14, ..Default::default() };
        let routes = router.route(&host);
        assert!(routes.intc.arvalid);
        assert!(!routes.dfx.arvalid);
    }

    #[test]
    fn test_lite_response_follows_owner() {
        let mut router = LiteRouter::new();
        let ready = LiteSlaveSignals::ready();

        // Write to DFX accepted
        let host = LiteMasterSignals {
            awvalid: true,
            awaddr: DFX_BASE,
            wvalid: true,
            bready: true,
            ..Default::default()
        };
        router.tick(&host, &ready, &ready);
        assert_eq!(router.writes(RegisterModule::DfxController), 1);

        // Host moves on to an INTC address while the DFX response is pending
        let host = LiteMasterSignals { awaddr: 0, bready: true, ..Default::default() };
        let dfx = LiteSlaveSignals { bvalid: true, ..Default::default() };
        let seen = router.respond(&host, &ready, &dfx);
        assert!(seen.bvalid);
        assert!(router.route(&host).dfx.bready);

        router.tick(&host, &ready, &dfx);
        assert!(!router.respond(&host, &ready, &LiteSlaveSignals::default()).bvalid);
    }

    #[test]
    fn test_unrouted_response_is_idle() {
        let router = LiteRouter::new();
        let host = LiteMasterSignals::default();
        let dfx = LiteSlaveSignals { rvalid: true, rdata: 7, ..Default::default() };
        let seen = router.respond(&host, &LiteSlaveSignals::default(), &dfx);
        assert!(!seen.rvalid);
    }

    #[test]
    fn test_dfx_priority() {
        let mut mux = AxiMux::new();
        let dfx = Axi4MasterSignals { ar: ar(AXI_ID_DFX, 0x100), ..Default::default() };
        let audio = Axi4MasterSignals { ar: ar(AXI_ID_AUDIO, 0x200), ..Default::default() };
        let slave = Axi4SlaveSignals { arready: true, awready: true, ..Default::default() };

        let routes = mux.route(&dfx, &audio, &slave);
        assert_eq!(routes.slave.ar.map(|a| a.addr), Some(0x100));
        assert!(routes.dfx.arready);
        assert!(!routes.audio.arready);
        assert_eq!(mux.stats().audio_blocked_cycles, 1);

        let routes = mux.route(&Axi4MasterSignals::default(), &audio, &slave);
        assert_eq!(routes.slave.ar.map(|a| a.addr), Some(0x200));
        assert!(routes.audio.arready);
        assert!(!routes.dfx.arready);
    }

    #[test]
    fn test_read_data_by_id() {
        let mut mux = AxiMux::new();
        let dfx = Axi4MasterSignals { rready: true, ..Default::default() };
        let audio = Axi4MasterSignals { rready: false, ..Default::default() };
        let beat = |id| Axi4SlaveSignals {
            r: Some(AxiReadBeat { id, data: 1, resp: AxiResp::Okay, last: true }),
            ..Default::default()
        };

        let routes = mux.route(&dfx, &audio, &beat(AXI_ID_DFX));
        assert!(routes.dfx.r.is_some() && routes.audio.r.is_none());
        assert!(routes.slave.rready);

        let routes = mux.route(&dfx, &audio, &beat(AXI_ID_AUDIO));
        assert!(routes.audio.r.is_some() && routes.dfx.r.is_none());
        assert!(!routes.slave.rready);

        mux.route(&dfx, &audio, &beat(9));
        assert_eq!(mux.stats().misrouted_beats, 1);
    }

    #[test]
    fn test_write_response_by_id() {
        let mut mux = AxiMux::new();
        let audio = Axi4MasterSignals { bready: true, ..Default::default() };
        let slave = Axi4SlaveSignals {
            b: Some(AxiWriteResp { id: AXI_ID_AUDIO, resp: AxiResp::Okay }),
            ..Default::default()
        };
        let routes = mux.route(&Axi4MasterSignals::default(), &audio, &slave);
        assert!(routes.audio.b.is_some());
        assert!(routes.slave.bready);
    }
}
