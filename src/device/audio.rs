//! Audio subsystem memory traffic.
//!
//! The audio sample path itself is outside the control plane. What matters
//! here is its share of the AXI4 master port: every period it fetches one
//! burst of samples from a ring of frame buffers. The model counts the cycles
//! it spends waiting for the address channel and the frames it could not
//! fetch before the next period began.

use super::axi::{AxiAddr, Axi4MasterSignals, Axi4SlaveSignals};
use super::platform_spec::{AXI_DATA_BYTES, AXI_ID_AUDIO, AXI_MAX_BURST_BEATS, AXI_SIZE_4_BYTES};

/// Frame buffers in the fetch ring.
const FRAME_RING: u64 = 4;

/// Traffic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    /// Cycles between frames; 0 disables traffic
    pub period_cycles: u64,
    /// Beats per frame burst
    pub burst_beats: usize,
    /// Base address of the frame ring
    pub buffer_addr: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AudioStats {
    pub bursts_issued: u64,
    pub bursts_completed: u64,
    pub beats: u64,
    /// Cycles an AR was presented but not accepted
    pub wait_cycles: u64,
    /// Longest single address wait
    pub max_wait: u64,
    /// Periods that began with the previous frame still outstanding
    pub overruns: u64,
}

/// Periodic AXI4 read master.
#[derive(Debug, Clone)]
pub struct AudioMaster {
    params: AudioParams,
    out: Axi4MasterSignals,
    countdown: u64,
    /// A frame is due but not yet issued
    due: bool,
    beats_left: usize,
    frame: u64,
    current_wait: u64,
    stats: AudioStats,
}

impl AudioMaster {
    pub fn new(params: AudioParams) -> Self {
        Self {
            params,
            out: Axi4MasterSignals::default(),
            countdown: params.period_cycles,
            due: false,
            beats_left: 0,
            frame: 0,
            current_wait: 0,
            stats: AudioStats::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.params.period_cycles > 0
    }

    #[inline]
    pub fn outputs(&self) -> Axi4MasterSignals {
        self.out
    }

    pub fn stats(&self) -> &AudioStats {
        &self.stats
    }

    fn busy(&self) -> bool {
        self.out.ar.is_some() || self.beats_left > 0
    }

    /// Advance one cycle against the routed slave signals.
    pub fn tick(&mut self, slave: &Axi4SlaveSignals) {
        if !self.enabled() {
            return;
        }
        let mut next = self.out;

        // Address channel
        if self.out.ar.is_some() {
            if slave.arready {
                next.ar = None;
                next.rready = true;
                self.stats.max_wait = self.stats.max_wait.max(self.current_wait);
                self.current_wait = 0;
            } else {
                self.stats.wait_cycles += 1;
                self.current_wait += 1;
            }
        }

        // Data channel
        if let Some(beat) = slave.r.filter(|_| self.out.rready) {
            self.stats.beats += 1;
            self.beats_left = self.beats_left.saturating_sub(1);
            if !beat.resp.is_ok() {
                log::warn!("audio: read beat returned {:?}", beat.resp);
            }
            if beat.last {
                next.rready = false;
                self.beats_left = 0;
                self.stats.bursts_completed += 1;
            }
        }

        // Frame clock
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.countdown = self.params.period_cycles;
            if self.due || self.busy() {
                self.stats.overruns += 1;
                log::debug!("audio: frame {} still outstanding at period start", self.frame);
            }
            self.due = true;
        }

        if self.due && next.ar.is_none() && !next.rready {
            let beats = self.params.burst_beats.clamp(1, AXI_MAX_BURST_BEATS);
            let frame_bytes = (beats * AXI_DATA_BYTES) as u64;
            next.ar = Some(AxiAddr {
                id: AXI_ID_AUDIO,
                addr: self.params.buffer_addr + (self.frame % FRAME_RING) * frame_bytes,
                len: (beats - 1) as u8,
                size: AXI_SIZE_4_BYTES,
            });
            self.beats_left = beats;
            self.frame += 1;
            self.due = false;
            self.stats.bursts_issued += 1;
        }

        self.out = next;
    }
}
