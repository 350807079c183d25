//! Configuration-port streaming sub-machine.
//!
//! Active only while the top-level machine is in LOADING. Drains the stream
//! buffer into the ICAP/PCAP port, framed by SYNC and DESYNC:
//!
//! ```text
//! IDLE --active--> INIT --data--> SYNC --> WRITE ...... --> DESYNC --> DONE
//!                                            |  buffer empty   ^
//!                                            +--refill, wait---+
//! ```
//!
//! A word is on the wire while `write` is high and leaves it on a cycle where
//! the port is not busy. DONE holds (enable low) until the top-level machine
//! drops `active`; dropping `active` in any other state abandons the stream.

use crate::device::config_port::{ConfigPortKind, ConfigPortSignals};
use crate::device::platform_spec::{CONFIG_DESYNC_WORD, CONFIG_SYNC_WORD};

use super::buffer::StreamBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortState {
    #[default]
    Idle,
    Init,
    Sync,
    Write,
    Desync,
    Done,
}

/// Inputs sampled each cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortInputs {
    /// Set by the top-level machine (previous cycle)
    pub active: bool,
    /// Buffer occupancy at the start of the cycle
    pub available: usize,
    /// Port busy (snapshot)
    pub port_busy: bool,
    /// Payload words in the job
    pub total_words: usize,
}

/// Registered outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortOutputs {
    pub signals: ConfigPortSignals,
    /// Stream complete (level, until deactivated)
    pub done: bool,
    /// Buffer ran dry with payload outstanding
    pub refill: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigMachine {
    kind: ConfigPortKind,
    state: PortState,
    out: PortOutputs,
    /// Payload words accepted by the port
    words_written: usize,
    /// Payload words taken from the buffer
    popped: usize,
    /// Cycles spent waiting for a refill
    starved_cycles: u64,
}

impl ConfigMachine {
    pub fn new(kind: ConfigPortKind) -> Self {
        Self {
            kind,
            state: PortState::Idle,
            out: PortOutputs::default(),
            words_written: 0,
            popped: 0,
            starved_cycles: 0,
        }
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    #[inline]
    pub fn outputs(&self) -> PortOutputs {
        self.out
    }

    /// Payload words accepted by the port in the current or last stream.
    pub fn words_written(&self) -> usize {
        self.words_written
    }

    pub fn starved_cycles(&self) -> u64 {
        self.starved_cycles
    }

    /// Force IDLE with the port disabled.
    pub fn reset(&mut self) {
        self.state = PortState::Idle;
        self.out = PortOutputs::default();
    }

    /// Advance one cycle.
    pub fn tick(&mut self, input: &PortInputs, buffer: &mut StreamBuffer) {
        if !input.active {
            if !matches!(self.state, PortState::Idle | PortState::Done) {
                log::debug!("DFX port: stream abandoned in {:?}", self.state);
            }
            self.reset();
            return;
        }

        let accepted = self.out.signals.write && !input.port_busy;
        let mut next = PortOutputs { refill: false, ..self.out };

        match self.state {
            PortState::Idle => {
                self.words_written = 0;
                self.popped = 0;
                next.signals = ConfigPortSignals { enable: true, write: false, data: 0 };
                self.state = PortState::Init;
            }
            PortState::Init => {
                if input.available > 0 || input.total_words == 0 {
                    self.present(&mut next, CONFIG_SYNC_WORD);
                    self.state = PortState::Sync;
                }
            }
            PortState::Sync => {
                if accepted {
                    self.state = PortState::Write;
                    self.feed(input, buffer, &mut next);
                }
            }
            PortState::Write => {
                if self.out.signals.write {
                    if accepted {
                        self.words_written += 1;
                        self.feed(input, buffer, &mut next);
                    }
                } else {
                    self.feed(input, buffer, &mut next);
                }
            }
            PortState::Desync => {
                if accepted {
                    log::debug!("DFX port: stream complete, {} words", self.words_written);
                    next.signals = ConfigPortSignals::default();
                    next.done = true;
                    self.state = PortState::Done;
                }
            }
            PortState::Done => {}
        }

        self.out = next;
    }

    fn present(&self, next: &mut PortOutputs, word: u32) {
        next.signals = ConfigPortSignals {
            enable: true,
            write: true,
            data: self.kind.to_wire(word),
        };
    }

    /// Put the next word on the wire, or wait for a refill.
    fn feed(&mut self, input: &PortInputs, buffer: &mut StreamBuffer, next: &mut PortOutputs) {
        if self.popped >= input.total_words {
            self.present(next, CONFIG_DESYNC_WORD);
            self.state = PortState::Desync;
            return;
        }
        // Only words present at the start of the cycle may be consumed
        let word = if input.available > 0 { buffer.pop() } else { None };
        match word {
            Some(word) => {
                self.popped += 1;
                self.present(next, word);
            }
            None => {
                next.signals.write = false;
                next.refill = true;
                self.starved_cycles += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(buffer: &StreamBuffer, total: usize, busy: bool) -> PortInputs {
        PortInputs {
            active: true,
            available: buffer.len(),
            port_busy: busy,
            total_words: total,
        }
    }

    /// Run until DONE, returning the logical words written to the wire.
    fn stream(kind: ConfigPortKind, payload: &[u32]) -> Vec<u32> {
        let mut m = ConfigMachine::new(kind);
        let mut buf = StreamBuffer::new(16);
        for w in payload {
            buf.push(*w);
        }
        let mut wire = Vec::new();
        for _ in 0..64 {
            let out = m.outputs();
            if out.signals.write {
                wire.push(kind.to_wire(out.signals.data));
            }
            let input = inputs(&buf, payload.len(), false);
            m.tick(&input, &mut buf);
            if m.outputs().done {
                break;
            }
        }
        wire
    }

    #[test]
    fn test_framing() {
        let wire = stream(ConfigPortKind::Pcap, &[1, 2, 3]);
        assert_eq!(wire, vec![CONFIG_SYNC_WORD, 1, 2, 3, CONFIG_DESYNC_WORD]);
    }

    #[test]
    fn test_icap_wire_order() {
        let mut m = ConfigMachine::new(ConfigPortKind::Icap);
        let mut buf = StreamBuffer::new(4);
        buf.push(0x1122_3344);
        m.tick(&inputs(&buf, 1, false), &mut buf);
        m.tick(&inputs(&buf, 1, false), &mut buf);
        assert_eq!(m.outputs().signals.data, 0x6655_99AA);
        m.tick(&inputs(&buf, 1, false), &mut buf);
        assert_eq!(m.outputs().signals.data, 0x4433_2211);
    }

    #[test]
    fn test_empty_payload() {
        let wire = stream(ConfigPortKind::Pcap, &[]);
        assert_eq!(wire, vec![CONFIG_SYNC_WORD, CONFIG_DESYNC_WORD]);
    }

    #[test]
    fn test_busy_holds_word() {
        let mut m = ConfigMachine::new(ConfigPortKind::Pcap);
        let mut buf = StreamBuffer::new(4);
        buf.push(9);
        m.tick(&inputs(&buf, 1, false), &mut buf); // INIT
        m.tick(&inputs(&buf, 1, false), &mut buf); // SYNC on wire
        m.tick(&inputs(&buf, 1, true), &mut buf);
        assert_eq!(m.state(), PortState::Sync);
        assert_eq!(m.outputs().signals.data, CONFIG_SYNC_WORD);
        m.tick(&inputs(&buf, 1, false), &mut buf);
        assert_eq!(m.outputs().signals.data, 9);
    }

    #[test]
    fn test_refill_request() {
        let mut m = ConfigMachine::new(ConfigPortKind::Pcap);
        let mut buf = StreamBuffer::new(4);
        buf.push(1);
        for _ in 0..4 {
            m.tick(&inputs(&buf, 2, false), &mut buf);
        }
        // First word accepted, buffer dry, second word outstanding
        assert_eq!(m.state(), PortState::Write);
        assert!(m.outputs().refill);
        assert!(!m.outputs().signals.write);
        assert!(m.outputs().signals.enable);
        assert_eq!(m.words_written(), 1);

        buf.push(2);
        m.tick(&inputs(&buf, 2, false), &mut buf);
        assert_eq!(m.outputs().signals.data, 2);
        assert!(!m.outputs().refill);
    }

    #[test]
    fn test_deactivate_abandons() {
        let mut m = ConfigMachine::new(ConfigPortKind::Pcap);
        let mut buf = StreamBuffer::new(4);
        buf.push(1);
        m.tick(&inputs(&buf, 1, false), &mut buf);
        m.tick(&inputs(&buf, 1, false), &mut buf);
        let idle = PortInputs { active: false, ..Default::default() };
        m.tick(&idle, &mut buf);
        assert_eq!(m.state(), PortState::Idle);
        assert!(!m.outputs().signals.enable);
    }
}
