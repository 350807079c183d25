//! Memory-read sub-machine.
//!
//! Issues one AXI4 INCR read burst per request and pushes every returned
//! beat into the stream buffer.
//!
//! ```text
//! IDLE --request--> ADDR --arready--> DATA --last--> DONE --> IDLE
//! ```
//!
//! `done` is high for exactly one cycle. A request that arrives while a burst
//! is in flight is held and started once the machine is back in IDLE.

use crate::device::axi::{AxiAddr, Axi4SlaveSignals};
use crate::device::platform_spec::{AXI_ID_DFX, AXI_MAX_BURST_BEATS, AXI_SIZE_4_BYTES};

use super::buffer::StreamBuffer;

/// A burst the top-level machine wants fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Start byte address
    pub addr: u64,
    /// Beats (1..=256)
    pub beats: usize,
}

/// Memory sub-machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemState {
    #[default]
    Idle,
    /// Address presented, waiting for arready
    Addr,
    /// Collecting beats; `discard` drops them instead of buffering
    Data { discard: bool },
    Done,
}

/// Registered memory-machine outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemOutputs {
    pub ar: Option<AxiAddr>,
    pub rready: bool,
    /// Burst complete (one cycle)
    pub done: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryMachine {
    state: MemState,
    out: MemOutputs,
    queued: Option<ReadRequest>,
    /// Beats received with a non-OKAY response
    read_errors: u64,
    beats: u64,
}

impl MemoryMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MemState {
        self.state
    }

    #[inline]
    pub fn outputs(&self) -> MemOutputs {
        self.out
    }

    /// True when no burst is in flight or queued.
    pub fn is_idle(&self) -> bool {
        self.state == MemState::Idle && self.queued.is_none()
    }

    pub fn read_errors(&self) -> u64 {
        self.read_errors
    }

    pub fn beats(&self) -> u64 {
        self.beats
    }

    /// Advance one cycle.
    ///
    /// `request` is the top-level machine's request from the previous cycle,
    /// `slave` the snapshot of the routed AXI4 slave signals. With `abandon`
    /// set the current burst is dropped: an address not yet accepted is
    /// withdrawn and beats still owed by the slave are drained and discarded.
    pub fn tick(
        &mut self,
        request: Option<ReadRequest>,
        abandon: bool,
        slave: &Axi4SlaveSignals,
        buffer: &mut StreamBuffer,
    ) {
        if let Some(req) = request {
            if self.queued.replace(req).is_some() {
                log::warn!("DFX memory: read request replaced before issue");
            }
        }
        if abandon {
            self.queued = None;
        }

        let mut next = MemOutputs { done: false, ..self.out };

        match self.state {
            MemState::Idle => {
                if let Some(req) = self.queued.take() {
                    let beats = req.beats.clamp(1, AXI_MAX_BURST_BEATS);
                    log::trace!("DFX memory: AR 0x{:x} x{}", req.addr, beats);
                    next.ar = Some(AxiAddr {
                        id: AXI_ID_DFX,
                        addr: req.addr,
                        len: (beats - 1) as u8,
                        size: AXI_SIZE_4_BYTES,
                    });
                    self.state = MemState::Addr;
                }
            }
            MemState::Addr => {
                if self.out.ar.is_some() && slave.arready {
                    next.ar = None;
                    next.rready = true;
                    self.state = MemState::Data { discard: abandon };
                } else if abandon {
                    next.ar = None;
                    self.state = MemState::Idle;
                }
            }
            MemState::Data { discard } => {
                let discard = discard || abandon;
                self.state = MemState::Data { discard };
                if let Some(beat) = slave.r.filter(|_| self.out.rready) {
                    self.beats += 1;
                    if !beat.resp.is_ok() {
                        self.read_errors += 1;
                        log::warn!("DFX memory: read beat returned {:?}", beat.resp);
                    }
                    if !discard && !buffer.push(beat.data) {
                        log::warn!("DFX memory: stream buffer overflow, beat dropped");
                    }
                    if beat.last {
                        next.rready = false;
                        if discard {
                            self.state = MemState::Idle;
                        } else {
                            next.done = true;
                            self.state = MemState::Done;
                        }
                    }
                }
            }
            MemState::Done => {
                self.state = MemState::Idle;
            }
        }

        self.out = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::axi::{AxiReadBeat, AxiResp};

    fn beat(data: u32, last: bool) -> Axi4SlaveSignals {
        Axi4SlaveSignals {
            r: Some(AxiReadBeat { id: AXI_ID_DFX, data, resp: AxiResp::Okay, last }),
            ..Default::default()
        }
    }

    fn accept() -> Axi4SlaveSignals {
        Axi4SlaveSignals { arready: true, ..Default::default() }
    }

    #[test]
    fn test_burst_into_buffer() {
        let mut m = MemoryMachine::new();
        let mut buf = StreamBuffer::new(8);
        let idle = Axi4SlaveSignals::default();

        m.tick(Some(ReadRequest { addr: 0x40, beats: 2 }), false, &idle, &mut buf);
        assert_eq!(m.state(), MemState::Addr);
        let ar = m.outputs().ar.unwrap();
        assert_eq!((ar.addr, ar.len, ar.id), (0x40, 1, AXI_ID_DFX));

        // Address held until accepted
        m.tick(None, false, &idle, &mut buf);
        assert!(m.outputs().ar.is_some());
        m.tick(None, false, &accept(), &mut buf);
        assert!(m.outputs().ar.is_none() && m.outputs().rready);

        m.tick(None, false, &beat(0xA, false), &mut buf);
        m.tick(None, false, &beat(0xB, true), &mut buf);
        assert!(m.outputs().done);
        assert_eq!(m.state(), MemState::Done);

        m.tick(None, false, &idle, &mut buf);
        assert!(!m.outputs().done);
        assert!(m.is_idle());
        assert_eq!(buf.pop(), Some(0xA));
        assert_eq!(buf.pop(), Some(0xB));
    }

    #[test]
    fn test_abandon_drains_owed_beats() {
        let mut m = MemoryMachine::new();
        let mut buf = StreamBuffer::new(8);

        m.tick(Some(ReadRequest { addr: 0, beats: 2 }), false, &Default::default(), &mut buf);
        m.tick(None, false, &accept(), &mut buf);
        m.tick(None, true, &beat(1, false), &mut buf);
        assert_eq!(m.state(), MemState::Data { discard: true });
        assert!(m.outputs().rready);

        m.tick(None, false, &beat(2, true), &mut buf);
        assert!(!m.outputs().done);
        assert!(m.is_idle());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_abandon_before_accept() {
        let mut m = MemoryMachine::new();
        let mut buf = StreamBuffer::new(8);

        m.tick(Some(ReadRequest { addr: 0, beats: 4 }), false, &Default::default(), &mut buf);
        m.tick(None, true, &Default::default(), &mut buf);
        assert!(m.is_idle());
        assert!(m.outputs().ar.is_none());
    }

    #[test]
    fn test_request_queued_while_busy() {
        let mut m = MemoryMachine::new();
        let mut buf = StreamBuffer::new(8);

        m.tick(Some(ReadRequest { addr: 0, beats: 1 }), false, &Default::default(), &mut buf);
        m.tick(Some(ReadRequest { addr: 0x100, beats: 1 }), false, &accept(), &mut buf);
        m.tick(None, false, &beat(7, true), &mut buf);
        assert!(m.outputs().done);
        m.tick(None, false, &Default::default(), &mut buf);
        m.tick(None, false, &Default::default(), &mut buf);
        assert_eq!(m.outputs().ar.map(|a| a.addr), Some(0x100));
    }
}
