//! Interrupt Controller.
//!
//! Aggregates per-core interrupt and status lines into one maskable
//! interrupt output and turns host pause/stop/resume commands into bus
//! requests on the arbiter's control port.
//!
//! # Command Path
//!
//! ```text
//! host write CTRL/CORE_CTRL --> queued command (depth 1, newest wins)
//!                               |  start of next tick, bus line free
//!                               v
//!                            bus request (held until granted)
//! ```

use crate::device::axi::{LiteMasterSignals, LiteSlavePort, LiteSlaveSignals};
use crate::device::ensemble::CoreStatus;
use crate::device::platform_spec::{CORE_STATUS_BITS, INTC_NUM_REGISTERS};
use crate::device::registers::{strobe_mask, RegisterBlock, RegisterFile};
use crate::device::registers_spec::intc;

use super::arbiter::{BusInstruction, BusMessage, BusRequest};

/// Inputs sampled each cycle.
#[derive(Debug, Clone, Copy)]
pub struct IntcInputs<'a> {
    /// AXI-Lite master signals routed to this block
    pub lite: LiteMasterSignals,
    /// Status of every core
    pub core_status: &'a [CoreStatus],
    /// Interrupt line of every core, bit per core
    pub core_interrupts: u32,
    /// Grant pulse for the control port
    pub grant: bool,
    /// Message delivered to the control port
    pub bus_message: Option<BusMessage>,
    /// Causes raised by external monitors (bus error, overflow, ...)
    pub external_causes: u32,
}

/// Registered outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntcOutputs {
    pub lite: LiteSlaveSignals,
    /// Aggregate interrupt line
    pub irq: bool,
    pub bus_request: Option<BusRequest>,
}

/// Interrupt controller statistics.
#[derive(Debug, Clone, Default)]
pub struct IntcStats {
    /// Commands placed on the bus
    pub commands_issued: u64,
    /// Queued commands replaced by a newer one before issue
    pub commands_replaced: u64,
    /// Command bits ignored because a write set more than one
    pub commands_dropped: u64,
    /// DONE broadcasts observed on the control port
    pub done_messages: u64,
    /// Cycles the aggregate interrupt was asserted
    pub irq_cycles: u64,
}

/// Interrupt Controller block.
#[derive(Debug)]
pub struct InterruptController {
    num_cores: usize,
    port: LiteSlavePort,
    regs: RegisterFile<INTC_NUM_REGISTERS>,
    /// Latched causes (INT_STATUS)
    causes: u32,
    /// Per-core pending interrupt flags
    pending: u32,
    /// Host command waiting for the bus line
    command: Option<BusRequest>,
    /// Software interrupt requested by the last CTRL write
    sw_interrupt: bool,
    bus_request: Option<BusRequest>,
    irq: bool,
    /// Packed 2-bit core status, refreshed every tick
    core_status: u32,
    stats: IntcStats,
}

impl InterruptController {
    /// Create a controller for `num_cores` cores.
    pub fn new(num_cores: usize) -> Self {
        Self {
            num_cores,
            port: LiteSlavePort::new(),
            regs: RegisterFile::new(),
            causes: 0,
            pending: 0,
            command: None,
            sw_interrupt: false,
            bus_request: None,
            irq: false,
            core_status: 0,
            stats: IntcStats::default(),
        }
    }

    /// Registered outputs from the last tick.
    pub fn outputs(&self) -> IntcOutputs {
        IntcOutputs {
            lite: self.port.outputs(),
            irq: self.irq,
            bus_request: self.bus_request,
        }
    }

    /// Latched interrupt causes.
    pub fn causes(&self) -> u32 {
        self.causes
    }

    /// Per-core pending interrupt flags.
    pub fn pending_cores(&self) -> u32 {
        self.pending
    }

    /// Statistics.
    pub fn stats(&self) -> &IntcStats {
        &self.stats
    }

    /// AXI-Lite front-end counters.
    pub fn lite_port(&self) -> &LiteSlavePort {
        &self.port
    }

    fn core_mask(&self) -> u32 {
        if self.num_cores >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_cores) - 1
        }
    }

    /// Advance one cycle.
    pub fn tick(&mut self, input: &IntcInputs<'_>) {
        // Bus line: retire a granted request, then issue a queued command
        if input.grant && self.bus_request.take().is_some() {
            self.stats.commands_issued += 1;
        }
        if self.bus_request.is_none() {
            if let Some(cmd) = self.command.take() {
                log::debug!("INTC: bus request {} {:?}", cmd.instruction, cmd.destination);
                self.bus_request = Some(cmd);
            }
        }
        if let Some(msg) = input.bus_message {
            if msg.instruction == BusInstruction::Done {
                self.stats.done_messages += 1;
            }
        }

        // Core errors latch on the status edge
        let prev_status = self.core_status;
        self.core_status = pack_status(input.core_status);
        let newly_error = input
            .core_status
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                **s == CoreStatus::Error
                    && status_field(prev_status, *i) != CoreStatus::Error.bits()
            })
            .count();
        if newly_error > 0 {
            self.causes |= intc::CAUSE_CORE_ERROR;
        }

        let lines = input.core_interrupts & self.core_mask();
        if lines != 0 {
            self.causes |= intc::CAUSE_CORE_DONE;
            self.pending |= lines;
        }
        if std::mem::take(&mut self.sw_interrupt) {
            self.causes |= intc::CAUSE_SOFTWARE;
        }
        self.causes |= input.external_causes & intc::CAUSE_MASK;

        // Host access sees this cycle's latched causes
        let mut port = std::mem::take(&mut self.port);
        port.tick(self, &input.lite);
        self.port = port;

        let enabled = self.regs.get(intc::INT_ENABLE) & intc::CAUSE_MASK;
        let global = self.regs.get(intc::CTRL) & intc::CTRL_GLOBAL_ENABLE != 0;
        self.irq = global && (self.causes & enabled) != 0;
        if self.irq {
            self.stats.irq_cycles += 1;
        }
    }

    fn queue(&mut self, cmd: BusRequest) {
        if let Some(old) = self.command.replace(cmd) {
            self.stats.commands_replaced += 1;
            log::warn!("INTC: queued {} replaced by {}", old.instruction, cmd.instruction);
        }
    }

    /// First command bit set in `value`, in table order. The rest are dropped.
    fn pick_command(
        &mut self,
        register: &str,
        value: u32,
        table: &[(u32, BusInstruction)],
    ) -> Option<BusInstruction> {
        let mut set = table.iter().filter(|(bit, _)| value & bit != 0);
        let (_, instr) = *set.next()?;
        let dropped = set.count();
        if dropped > 0 {
            self.stats.commands_dropped += dropped as u64;
            log::warn!("INTC: {} 0x{:x} sets several commands, issuing {}", register, value, instr);
        }
        Some(instr)
    }

    fn write_ctrl(&mut self, value: u32) {
        let global = [
            (intc::CTRL_STOP_ALL, BusInstruction::Stop),
            (intc::CTRL_PAUSE_ALL, BusInstruction::HaltPause),
            (intc::CTRL_RESUME_ALL, BusInstruction::Continue),
        ];
        if let Some(instr) = self.pick_command("CTRL", value, &global) {
            self.queue(BusRequest::broadcast(instr));
        }
        if value & intc::CTRL_SW_INTERRUPT != 0 {
            self.sw_interrupt = true;
        }
        self.regs.set(intc::CTRL, value & !intc::CTRL_SELF_CLEARING);
    }

    fn write_core_ctrl(&mut self, value: u32) {
        let per_core = [
            (intc::CORE_CTRL_STOP, BusInstruction::Stop),
            (intc::CORE_CTRL_PAUSE, BusInstruction::HaltPause),
            (intc::CORE_CTRL_RESUME, BusInstruction::Continue),
        ];
        if let Some(instr) = self.pick_command("CORE_CTRL", value, &per_core) {
            let core = self.regs.get(intc::CORE_SELECT) as usize;
            if core < self.num_cores {
                self.queue(BusRequest::to_port(instr, core));
            } else {
                log::warn!("INTC: CORE_CTRL for nonexistent core {}", core);
            }
        }
        self.regs.set(intc::CORE_CTRL, value & !intc::CORE_CTRL_SELF_CLEARING);
    }

    /// Return to the power-on state.
    pub fn reset(&mut self) {
        self.port.reset();
        self.regs.clear();
        self.causes = 0;
        self.pending = 0;
        self.command = None;
        self.sw_interrupt = false;
        self.bus_request = None;
        self.irq = false;
    }
}

impl RegisterBlock for InterruptController {
    fn read_register(&self, index: usize) -> Option<u32> {
        let value = match index {
            intc::STATUS => {
                let bus_pending = self.bus_request.is_some() || self.command.is_some();
                let irq = if self.irq { intc::STATUS_IRQ } else { 0 };
                let bus = if bus_pending { intc::STATUS_BUS_PENDING } else { 0 };
                irq | bus | (self.pending << intc::STATUS_PENDING_SHIFT)
            }
            intc::CORE_STATUS => self.core_status,
            intc::INT_STATUS => self.causes,
            intc::INT_CLEAR => 0,
            i if i < INTC_NUM_REGISTERS => self.regs.get(i),
            _ => return None,
        };
        Some(value)
    }

    fn write_register(&mut self, index: usize, data: u32, strobe: u8) -> bool {
        let merged = |old: u32| {
            let mask = strobe_mask(strobe);
            (old & !mask) | (data & mask)
        };
        match index {
            intc::CTRL => self.write_ctrl(merged(self.regs.get(intc::CTRL))),
            intc::CORE_CTRL => self.write_core_ctrl(merged(self.regs.get(intc::CORE_CTRL))),
            intc::INT_CLEAR => {
                let clear = data & strobe_mask(strobe);
                self.causes &= !(clear & intc::CAUSE_MASK);
                self.pending &= !(clear >> intc::CLEAR_PENDING_SHIFT);
            }
            intc::STATUS | intc::CORE_STATUS | intc::INT_STATUS => {}
            i if i < INTC_NUM_REGISTERS => {
                self.regs.write(i, data, strobe);
            }
            _ => return false,
        }
        true
    }
}

fn pack_status(status: &[CoreStatus]) -> u32 {
    status
        .iter()
        .take(32 / CORE_STATUS_BITS as usize)
        .enumerate()
        .fold(0, |acc, (i, s)| acc | (s.bits() << (i as u32 * CORE_STATUS_BITS)))
}

fn status_field(packed: u32, core: usize) -> u32 {
    let shift = core as u32 * CORE_STATUS_BITS;
    if shift >= 32 {
        return 0;
    }
    (packed >> shift) & 0b11
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::arbiter::Destination;
    use crate::device::platform_spec::MAX_CORES;

    struct Bench {
        intc: InterruptController,
        status: Vec<CoreStatus>,
        interrupts: u32,
        grant: bool,
    }

    impl Bench {
        fn new(cores: usize) -> Self {
            Self {
                intc: InterruptController::new(cores),
                status: vec![CoreStatus::Busy; cores],
                interrupts: 0,
                grant: false,
            }
        }

        fn tick(&mut self, lite: LiteMasterSignals) {
            let input = IntcInputs {
                lite,
                core_status: &self.status,
                core_interrupts: self.interrupts,
                grant: self.grant,
                bus_message: None,
                external_causes: 0,
            };
            self.intc.tick(&input);
        }

        fn idle(&mut self) {
            self.tick(LiteMasterSignals { bready: true, rready: true, ..Default::default() });
        }

        fn write(&mut self, index: usize, data: u32) {
            self.tick(LiteMasterSignals {
                awvalid: true,
                awaddr: (index * 4) as u32,
                wvalid: true,
                wdata: data,
                wstrb: 0xF,
                bready: true,
                ..Default::default()
            });
            self.idle();
        }

        fn read(&mut self, index: usize) -> u32 {
            self.tick(LiteMasterSignals {
                arvalid: true,
                araddr: (index * 4) as u32,
                ..Default::default()
            });
            let data = self.intc.outputs().lite.rdata;
            self.idle();
            data
        }
    }

    #[test]
    fn test_interrupt_aggregation() {
        let mut b = Bench::new(4);
        b.interrupts = 0b0100;
        b.idle();
        b.interrupts = 0;
        assert!(!b.intc.outputs().irq, "no enables yet");

        b.write(intc::INT_ENABLE, intc::CAUSE_CORE_DONE);
        assert!(!b.intc.outputs().irq, "global enable still off");

        b.write(intc::CTRL, intc::CTRL_GLOBAL_ENABLE);
        assert!(b.intc.outputs().irq);
        assert_eq!(b.read(intc::INT_STATUS), intc::CAUSE_CORE_DONE);
        assert_eq!(b.read(intc::STATUS) >> intc::STATUS_PENDING_SHIFT, 0b0100);
    }

    #[test]
    fn test_int_clear_w1c() {
        let mut b = Bench::new(4);
        b.interrupts = 0b0011;
        b.idle();
        b.interrupts = 0;
        b.write(intc::CTRL, intc::CTRL_SW_INTERRUPT);
        assert_eq!(b.intc.causes(), intc::CAUSE_CORE_DONE | intc::CAUSE_SOFTWARE);

        // Clear only the software cause and core 0's pending flag
        b.write(intc::INT_CLEAR, intc::CAUSE_SOFTWARE | (1 << 16));
        assert_eq!(b.intc.causes(), intc::CAUSE_CORE_DONE);
        assert_eq!(b.intc.pending_cores(), 0b0010);
        assert_eq!(b.read(intc::INT_CLEAR), 0);
    }

    #[test]
    fn test_global_command_broadcast() {
        let mut b = Bench::new(4);
        b.write(intc::CTRL, intc::CTRL_GLOBAL_ENABLE | intc::CTRL_PAUSE_ALL);

        let req = b.intc.outputs().bus_request.unwrap();
        assert_eq!(req.instruction, BusInstruction::HaltPause);
        assert_eq!(req.destination, Destination::Broadcast);
        // One-shot bit reads back clear, enable persists
        assert_eq!(b.read(intc::CTRL), intc::CTRL_GLOBAL_ENABLE);

        // Held until granted
        b.idle();
        assert!(b.intc.outputs().bus_request.is_some());
        b.grant = true;
        b.idle();
        b.grant = false;
        assert!(b.intc.outputs().bus_request.is_none());
        assert_eq!(b.intc.stats().commands_issued, 1);
    }

    #[test]
    fn test_core_command_unicast() {
        let mut b = Bench::new(4);
        b.write(intc::CORE_SELECT, 2);
        b.write(intc::CORE_CTRL, intc::CORE_CTRL_RESUME);

        let req = b.intc.outputs().bus_request.unwrap();
        assert_eq!(req.instruction, BusInstruction::Continue);
        assert_eq!(req.destination, Destination::Port(2));
        assert_eq!(b.read(intc::CORE_CTRL), 0);
    }

    #[test]
    fn test_newer_command_replaces_queued() {
        let mut b = Bench::new(4);
        b.write(intc::CTRL, intc::CTRL_STOP_ALL);
        // Bus line busy: the next two commands queue behind it
        b.write(intc::CTRL, intc::CTRL_PAUSE_ALL);
        b.write(intc::CTRL, intc::CTRL_RESUME_ALL);
        assert_eq!(b.intc.stats().commands_replaced, 1);

        b.grant = true;
        b.idle();
        b.grant = false;
        let req = b.intc.outputs().bus_request.unwrap();
        assert_eq!(req.instruction, BusInstruction::Continue);
    }

    #[test]
    fn test_status_register_fields() {
        let mut b = Bench::new(4);
        b.interrupts = 0b1001;
        b.idle();
        b.interrupts = 0;
        b.write(intc::INT_ENABLE, intc::CAUSE_CORE_DONE);
        b.write(intc::CTRL, intc::CTRL_GLOBAL_ENABLE | intc::CTRL_PAUSE_ALL);

        let status = b.read(intc::STATUS);
        assert_eq!(status & intc::STATUS_IRQ, intc::STATUS_IRQ);
        assert_eq!(status & intc::STATUS_BUS_PENDING, intc::STATUS_BUS_PENDING);
        assert_eq!(status >> intc::STATUS_PENDING_SHIFT, 0b1001);
        assert_eq!(b.intc.read_register(intc::STATUS), Some(status));

        b.grant = true;
        b.idle();
        b.grant = false;
        assert_eq!(b.read(intc::STATUS) & intc::STATUS_BUS_PENDING, 0);
    }

    #[test]
    fn test_last_core_pending_flag() {
        let last = MAX_CORES - 1;
        let mut b = Bench::new(MAX_CORES);
        b.interrupts = 1 << last;
        b.idle();
        b.interrupts = 0;
        assert_eq!(b.read(intc::STATUS) >> intc::STATUS_PENDING_SHIFT, 1 << last);

        b.write(intc::INT_CLEAR, 1 << (intc::CLEAR_PENDING_SHIFT + last as u32));
        assert_eq!(b.intc.pending_cores(), 0);

        b.status = vec![CoreStatus::Error; MAX_CORES];
        b.idle();
        assert_eq!(status_field(b.read(intc::CORE_STATUS), last), CoreStatus::Error.bits());
    }

    #[test]
    fn test_multiple_command_bits() {
        let mut b = Bench::new(4);
        b.write(intc::CTRL, intc::CTRL_PAUSE_ALL | intc::CTRL_STOP_ALL | intc::CTRL_RESUME_ALL);
        let req = b.intc.outputs().bus_request.unwrap();
        assert_eq!(req.instruction, BusInstruction::Stop);
        assert_eq!(b.intc.stats().commands_dropped, 2);
        assert_eq!(b.intc.stats().commands_replaced, 0);

        b.grant = true;
        b.idle();
        b.grant = false;

        b.write(intc::CORE_SELECT, 1);
        b.write(intc::CORE_CTRL, intc::CORE_CTRL_PAUSE | intc::CORE_CTRL_RESUME);
        let req = b.intc.outputs().bus_request.unwrap();
        assert_eq!(req.instruction, BusInstruction::HaltPause);
        assert_eq!(req.destination, Destination::Port(1));
        assert_eq!(b.intc.stats().commands_dropped, 3);
    }

    #[test]
    fn test_core_status_and_error() {
        let mut b = Bench::new(3);
        b.status = vec![CoreStatus::Idle, CoreStatus::Complete, CoreStatus::Error];
        b.idle();
        assert_eq!(b.read(intc::CORE_STATUS), 0b10_11_00);
        assert!(b.intc.causes() & intc::CAUSE_CORE_ERROR != 0);
    }

    #[test]
    fn test_undefined_register() {
        let mut b = Bench::new(2);
        b.tick(LiteMasterSignals { arvalid: true, araddr: 8 * 4, ..Default::default() });
        assert_eq!(b.intc.outputs().lite.rresp, crate::device::axi::AxiResp::SlvErr);
    }
}
