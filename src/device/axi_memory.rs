//! AXI4 slave in front of [`HostMemory`].
//!
//! Serves one read burst and one write burst at a time. Read beats are
//! tagged with the ARID of the burst so the interconnect can route them back
//! to the requesting master.
//!
//! # Read Burst Timing
//!
//! ```text
//! cycle  0: AR accepted (arready drops)
//! cycle  1..=L: first-beat latency
//! cycle  L+1..: one beat per cycle while rready is high
//! last beat consumed: arready rises
//! ```

use super::axi::{AxiAddr, AxiReadBeat, AxiResp, AxiWriteResp, Axi4MasterSignals, Axi4SlaveSignals};
use super::host_memory::HostMemory;
use super::registers::strobe_mask;

/// In-flight read burst.
#[derive(Debug, Clone, Copy)]
struct ReadBurst {
    id: u8,
    addr: u64,
    beats_left: usize,
    wait: u32,
    resp: AxiResp,
}

/// In-flight write burst.
#[derive(Debug, Clone, Copy)]
struct WriteBurst {
    id: u8,
    start: u64,
    addr: u64,
    bytes: usize,
}

/// Statistics for the memory slave.
#[derive(Debug, Clone, Default)]
pub struct AxiMemoryStats {
    /// Read bursts accepted
    pub read_bursts: u64,
    /// Read beats delivered
    pub read_beats: u64,
    /// Write bursts completed
    pub write_bursts: u64,
    /// Write beats accepted
    pub write_beats: u64,
    /// Bursts answered with SLVERR
    pub error_bursts: u64,
}

/// AXI4 memory slave.
#[derive(Debug)]
pub struct AxiMemory {
    mem: HostMemory,
    /// Cycles between AR acceptance and the first data beat
    latency: u32,
    /// Answer reads outside registered regions with SLVERR
    strict: bool,
    out: Axi4SlaveSignals,
    read: Option<ReadBurst>,
    write: Option<WriteBurst>,
    stats: AxiMemoryStats,
}

impl AxiMemory {
    /// Create a slave over `mem` with the given first-beat latency.
    pub fn new(mem: HostMemory, latency: u32) -> Self {
        Self {
            mem,
            latency,
            strict: false,
            out: Self::idle_outputs(),
            read: None,
            write: None,
            stats: AxiMemoryStats::default(),
        }
    }

    fn idle_outputs() -> Axi4SlaveSignals {
        Axi4SlaveSignals { arready: true, awready: true, ..Default::default() }
    }

    /// Enable or disable strict decoding of unmapped reads.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Backing memory.
    pub fn memory(&self) -> &HostMemory {
        &self.mem
    }

    /// Mutable backing memory (for loading images).
    pub fn memory_mut(&mut self) -> &mut HostMemory {
        &mut self.mem
    }

    /// Registered outputs from the last tick.
    #[inline]
    pub fn outputs(&self) -> Axi4SlaveSignals {
        self.out
    }

    /// Statistics.
    pub fn stats(&self) -> &AxiMemoryStats {
        &self.stats
    }

    /// True if no burst is in flight.
    pub fn is_idle(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }

    /// Advance one cycle.
    pub fn tick(&mut self, input: &Axi4MasterSignals) {
        let mut next = self.out;

        self.tick_read(input, &mut next);
        self.tick_write(input, &mut next);

        self.out = next;
    }

    fn tick_read(&mut self, input: &Axi4MasterSignals, next: &mut Axi4SlaveSignals) {
        // Retire the presented beat
        if let Some(beat) = self.out.r {
            if input.rready {
                next.r = None;
                self.stats.read_beats += 1;
                if beat.last {
                    self.read = None;
                    next.arready = true;
                } else if let Some(burst) = self.read.as_mut() {
                    burst.addr += 4;
                    burst.beats_left -= 1;
                }
            }
        }

        // Address phase
        if self.out.arready {
            if let Some(ar) = input.ar {
                self.accept_read(ar);
                next.arready = false;
            }
        }

        // Present the next beat
        if next.r.is_none() {
            if let Some(burst) = self.read.as_mut() {
                if burst.wait > 0 {
                    burst.wait -= 1;
                } else {
                    let data = if burst.resp.is_ok() { self.mem.read_u32(burst.addr) } else { 0 };
                    next.r = Some(AxiReadBeat {
                        id: burst.id,
                        data,
                        resp: burst.resp,
                        last: burst.beats_left == 1,
                    });
                }
            }
        }
    }

    fn accept_read(&mut self, ar: AxiAddr) {
        let bytes = ar.beats() * 4;
        let resp = if self.strict && !self.mem.is_mapped(ar.addr, bytes) {
            log::warn!("AXI read of unmapped range 0x{:x}+{} (id {})", ar.addr, bytes, ar.id);
            self.stats.error_bursts += 1;
            AxiResp::SlvErr
        } else {
            AxiResp::Okay
        };

        log::trace!("AR accepted: id={} addr=0x{:x} beats={}", ar.id, ar.addr, ar.beats());
        self.mem.record_burst_read(ar.addr, bytes);
        self.stats.read_bursts += 1;
        self.read = Some(ReadBurst {
            id: ar.id,
            addr: ar.addr,
            beats_left: ar.beats(),
            wait: self.latency,
            resp,
        });
    }

    fn tick_write(&mut self, input: &Axi4MasterSignals, next: &mut Axi4SlaveSignals) {
        // Retire the write response
        if self.out.b.is_some() && input.bready {
            next.b = None;
            next.awready = true;
        }

        // Data beats
        if self.out.wready {
            if let (Some(w), Some(burst)) = (input.w, self.write.as_mut()) {
                let mask = strobe_mask(w.strb);
                let old = self.mem.read_u32(burst.addr);
                self.mem.write_u32(burst.addr, (old & !mask) | (w.data & mask));
                burst.addr += 4;
                burst.bytes += 4;
                self.stats.write_beats += 1;

                if w.last {
                    let done = *burst;
                    self.mem.record_burst_write(done.start, done.bytes);
                    self.stats.write_bursts += 1;
                    self.write = None;
                    next.wready = false;
                    next.b = Some(AxiWriteResp { id: done.id, resp: AxiResp::Okay });
                }
            }
        }

        // Address phase
        if self.out.awready {
            if let Some(aw) = input.aw {
                self.write = Some(WriteBurst { id: aw.id, start: aw.addr, addr: aw.addr, bytes: 0 });
                next.awready = false;
                next.wready = true;
            }
        }
    }

    /// Drop any in-flight bursts.
    pub fn reset(&mut self) {
        self.out = Self::idle_outputs();
        self.read = None;
        self.write = None;
    }
}
