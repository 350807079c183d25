//! Ensemble core behavioural model.
//!
//! An ensemble core is the audio DSP function loaded into one reconfigurable
//! partition. The control plane never looks inside it; it only drives the
//! pause/stop/resume/decouple lines, delivers bus instructions and observes
//! the 2-bit status and the interrupt line. This model reproduces exactly
//! that boundary with configurable quiesce and startup latencies.

use crate::control::arbiter::{BusInstruction, BusRequest, Destination};

/// 2-bit core status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CoreStatus {
    /// Not processing
    #[default]
    Idle = 0,
    /// Processing audio
    Busy = 1,
    /// Faulted
    Error = 2,
    /// Finished its workload
    Complete = 3,
}

impl CoreStatus {
    /// Register encoding.
    #[inline]
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// The status line observed by the DFX controller: high while busy.
    #[inline]
    pub fn is_active(self) -> bool {
        self == CoreStatus::Busy
    }
}

/// Control inputs sampled by a core each cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreInputs {
    pub pause: bool,
    pub stop: bool,
    pub resume: bool,
    pub decouple: bool,
    /// Bus instruction delivered to this core
    pub bus: Option<BusInstruction>,
    /// Grant pulse for this core's bus request
    pub grant: bool,
}

/// Registered core outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreOutputs {
    pub status: CoreStatus,
    /// One-cycle interrupt pulse
    pub interrupt: bool,
    /// Bus request held until granted
    pub bus_request: Option<BusRequest>,
}

/// Timing parameters for a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreTiming {
    /// Cycles from halt request to idle
    pub quiesce_cycles: u32,
    /// Cycles from resume to busy
    pub startup_cycles: u32,
}

/// Pending status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    target: CoreStatus,
    cycles_left: u32,
}

/// One ensemble core.
#[derive(Debug, Clone)]
pub struct EnsembleCore {
    id: usize,
    timing: CoreTiming,
    out: CoreOutputs,
    pending: Option<Transition>,
    /// Cycles per workload run; `None` runs forever
    workload: Option<u64>,
    progress: u64,
    bitstream_id: u32,
    runs_completed: u64,
}

impl EnsembleCore {
    /// Create a core running its power-on configuration (bitstream 0).
    pub fn new(id: usize, timing: CoreTiming) -> Self {
        Self {
            id,
            timing,
            out: CoreOutputs { status: CoreStatus::Busy, ..Default::default() },
            pending: None,
            workload: None,
            progress: 0,
            bitstream_id: 0,
            runs_completed: 0,
        }
    }

    /// Core identity.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Registered outputs from the last tick.
    #[inline]
    pub fn outputs(&self) -> CoreOutputs {
        self.out
    }

    /// Current status.
    pub fn status(&self) -> CoreStatus {
        self.out.status
    }

    /// Bitstream currently configured into the partition.
    pub fn bitstream_id(&self) -> u32 {
        self.bitstream_id
    }

    /// Record a completed reconfiguration.
    pub fn set_bitstream(&mut self, id: u32) {
        log::debug!("core {}: bitstream {} -> {}", self.id, self.bitstream_id, id);
        self.bitstream_id = id;
        self.progress = 0;
    }

    /// Give the core a finite workload; it completes, interrupts and
    /// broadcasts DONE every `cycles` busy cycles.
    pub fn set_workload(&mut self, cycles: Option<u64>) {
        self.workload = cycles.filter(|&c| c > 0);
        self.progress = 0;
    }

    /// Number of workload runs completed.
    pub fn runs_completed(&self) -> u64 {
        self.runs_completed
    }

    /// Force the core into the error status.
    pub fn inject_fault(&mut self) {
        log::debug!("core {}: fault injected", self.id);
        self.out.status = CoreStatus::Error;
        self.pending = None;
    }

    /// Advance one cycle.
    pub fn tick(&mut self, input: &CoreInputs) {
        let mut next = self.out;
        next.interrupt = false;

        if input.grant {
            next.bus_request = None;
        }

        let bus = if input.decouple { None } else { input.bus };
        let halt = input.pause
            || input.stop
            || matches!(bus, Some(BusInstruction::HaltPause | BusInstruction::Stop));
        let resume = (input.resume || bus == Some(BusInstruction::Continue)) && !input.decouple;

        if input.stop || bus == Some(BusInstruction::Stop) {
            self.progress = 0;
        }

        if halt {
            let halting = matches!(self.pending, Some(t) if t.target == CoreStatus::Idle);
            if next.status == CoreStatus::Busy && !halting {
                self.schedule(CoreStatus::Idle, self.timing.quiesce_cycles);
            } else if matches!(self.pending, Some(t) if t.target == CoreStatus::Busy) {
                self.pending = None;
            }
        } else if resume {
            let starting = matches!(self.pending, Some(t) if t.target == CoreStatus::Busy);
            if next.status != CoreStatus::Busy && !starting {
                self.schedule(CoreStatus::Busy, self.timing.startup_cycles);
            }
        }

        if let Some(t) = self.pending.as_mut() {
            if t.cycles_left == 0 {
                log::trace!("core {}: {:?} -> {:?}", self.id, next.status, t.target);
                next.status = t.target;
                self.pending = None;
            } else {
                t.cycles_left -= 1;
            }
        }

        if next.status == CoreStatus::Busy {
            if let Some(limit) = self.workload {
                self.progress += 1;
                if self.progress >= limit {
                    self.progress = 0;
                    self.runs_completed += 1;
                    next.status = CoreStatus::Complete;
                    if !input.decouple {
                        next.interrupt = true;
                        next.bus_request = Some(BusRequest {
                            instruction: BusInstruction::Done,
                            destination: Destination::Broadcast,
                        });
                    }
                }
            }
        }

        self.out = next;
    }

    fn schedule(&mut self, target: CoreStatus, cycles: u32) {
        self.pending = Some(Transition { target, cycles_left: cycles });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(quiesce: u32, startup: u32) -> EnsembleCore {
        EnsembleCore::new(0, CoreTiming { quiesce_cycles: quiesce, startup_cycles: startup })
    }

    fn run(core: &mut EnsembleCore, input: CoreInputs, cycles: usize) {
        for _ in 0..cycles {
            core.tick(&input);
        }
    }

    #[test]
    fn test_power_on_busy() {
        let c = core(2, 2);
        assert_eq!(c.status(), CoreStatus::Busy);
        assert!(c.status().is_active());
        assert_eq!(c.bitstream_id(), 0);
    }

    #[test]
    fn test_pause_quiesces_after_latency() {
        let mut c = core(2, 2);
        let pause = CoreInputs { pause: true, ..Default::default() };

        run(&mut c, pause, 2);
        assert_eq!(c.status(), CoreStatus::Busy);
        run(&mut c, pause, 1);
        assert_eq!(c.status(), CoreStatus::Idle);
    }

    #[test]
    fn test_resume_ignored_while_decoupled() {
        let mut c = core(0, 0);
        run(&mut c, CoreInputs { stop: true, ..Default::default() }, 1);
        assert_eq!(c.status(), CoreStatus::Idle);

        run(&mut c, CoreInputs { resume: true, decouple: true, ..Default::default() }, 5);
        assert_eq!(c.status(), CoreStatus::Idle);

        run(&mut c, CoreInputs { resume: true, ..Default::default() }, 1);
        assert_eq!(c.status(), CoreStatus::Busy);
    }

    #[test]
    fn test_bus_instructions() {
        let mut c = core(0, 0);
        let halt = CoreInputs { bus: Some(BusInstruction::HaltPause), ..Default::default() };
        c.tick(&halt);
        assert_eq!(c.status(), CoreStatus::Idle);

        let cont = CoreInputs { bus: Some(BusInstruction::Continue), ..Default::default() };
        c.tick(&cont);
        assert_eq!(c.status(), CoreStatus::Busy);
    }

    #[test]
    fn test_workload_completion() {
        let mut c = core(0, 0);
        c.set_workload(Some(3));

        run(&mut c, CoreInputs::default(), 2);
        assert_eq!(c.status(), CoreStatus::Busy);
        c.tick(&CoreInputs::default());

        let out = c.outputs();
        assert_eq!(out.status, CoreStatus::Complete);
        assert!(out.interrupt);
        assert_eq!(out.bus_request.map(|r| r.instruction), Some(BusInstruction::Done));
        assert_eq!(c.runs_completed(), 1);

        // Interrupt is a pulse, request is held until granted
        c.tick(&CoreInputs::default());
        assert!(!c.outputs().interrupt);
        assert!(c.outputs().bus_request.is_some());
        c.tick(&CoreInputs { grant: true, ..Default::default() });
        assert!(c.outputs().bus_request.is_none());
    }

    #[test]
    fn test_fault_and_recover() {
        let mut c = core(0, 1);
        c.inject_fault();
        assert_eq!(c.status(), CoreStatus::Error);
        assert!(!c.status().is_active());

        run(&mut c, CoreInputs { resume: true, ..Default::default() }, 2);
        assert_eq!(c.status(), CoreStatus::Busy);
    }
}
