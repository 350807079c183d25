//! DFX Controller.
//!
//! Swaps the bitstream of one reconfigurable partition at a time: shut the
//! partition's core down, validate and stream the new bitstream into the
//! configuration port, restart the core. Three machines cooperate:
//!
//! ```text
//!                 +-------------------+
//!   host CTRL --> |  top-level FSM    | --pause/stop/resume/decouple--> cores
//!                 +-------------------+
//!                  | read req   ^ done      ^ done / refill
//!                  v            |           |
//!         +----------------+  words  +-----------------+
//!  AXI4 <-| memory machine |-------->| config machine  |--> ICAP / PCAP
//!         +----------------+ buffer  +-----------------+
//! ```
//!
//! The machines talk through [`Links`], a registered bundle: each machine
//! reads the previous cycle's links and produces the next cycle's. Host
//! one-shot control bits are captured by the register front-end and consumed
//! at the start of the following tick.
//!
//! # Job Flow
//!
//! ```text
//! IDLE -LOAD-> INIT -> CHECK_BITSTREAM -> SHUTDOWN -> LOAD_PREP -> LOADING
//!  ^   -RESET-----------------------------^   |                     |
//!  |                                          +------> STARTUP <- VERIFY
//!  +------------- DONE <----------------------------------+
//! ```
//!
//! Any failure ends in ERROR, which holds until CLEAR-ERROR.

mod buffer;
mod header;
mod memory;
mod port;
mod types;

pub use buffer::StreamBuffer;
pub use header::{BitstreamHeader, HeaderError};
pub use memory::{MemState, MemoryMachine, ReadRequest};
pub use port::{ConfigMachine, PortInputs, PortState};
pub use types::{DfxCommand, DfxErrorCode, DfxState};

use crate::device::axi::{
    Axi4MasterSignals, Axi4SlaveSignals, LiteMasterSignals, LiteSlavePort, LiteSlaveSignals,
};
use crate::device::config_port::{ConfigPortKind, ConfigPortSignals};
use crate::device::platform_spec::{
    AXI_MAX_BURST_BEATS, BITSTREAM_HEADER_BYTES, BITSTREAM_HEADER_WORDS, CONFIG_WORD_BYTES,
    DFX_NUM_REGISTERS, DFX_VERSION,
};
use crate::device::registers::{strobe_mask, RegisterBlock, RegisterFile};
use crate::device::registers_spec::dfx;

/// Construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct DfxParams {
    /// Reconfigurable partitions (partition `i` holds core `i`)
    pub num_partitions: usize,
    /// Stream buffer depth in words
    pub buffer_words: usize,
    pub port_kind: ConfigPortKind,
    /// TIMEOUT register value after reset
    pub default_timeout: u32,
}

/// Inputs sampled each cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DfxInputs {
    /// AXI-Lite master signals routed to this block
    pub lite: LiteMasterSignals,
    /// AXI4 slave signals routed to this master
    pub axi: Axi4SlaveSignals,
    /// Configuration port busy
    pub port_busy: bool,
    /// Core status lines, one bit per partition
    pub core_active: u32,
}

/// Per-partition control lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlLines {
    pub pause: u32,
    pub stop: u32,
    pub resume: u32,
    pub decouple: u32,
}

/// Registered outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DfxOutputs {
    pub lite: LiteSlaveSignals,
    pub axi: Axi4MasterSignals,
    pub config: ConfigPortSignals,
    pub lines: ControlLines,
    /// One-cycle done pulse
    pub done: bool,
    /// Interrupt line (INT_STATUS & INT_ENABLE)
    pub irq: bool,
    /// Partition and bitstream recorded by VERIFY this cycle
    pub configured: Option<(usize, u32)>,
}

/// Job fields latched on START.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DfxJob {
    /// LOAD (true) or RESET (false)
    pub load: bool,
    pub partition: usize,
    /// Header address
    pub addr: u64,
    /// Payload bytes
    pub size_bytes: u32,
    pub bitstream_id: u32,
    pub timeout: u32,
}

impl DfxJob {
    /// Payload words streamed to the configuration port.
    pub fn words(&self) -> usize {
        self.size_bytes as usize / CONFIG_WORD_BYTES
    }

    fn payload_addr(&self) -> u64 {
        self.addr + BITSTREAM_HEADER_BYTES as u64
    }
}

/// Signals exchanged between the three machines, registered.
#[derive(Debug, Clone, Copy, Default)]
struct Links {
    read_request: Option<ReadRequest>,
    mem_done: bool,
    cfg_done: bool,
    refill: bool,
    active: bool,
}

/// Host one-shot bits awaiting the next tick.
#[derive(Debug, Clone, Copy, Default)]
struct Pending {
    start: Option<u32>,
    abort: bool,
    clear_error: bool,
    sw_reset: bool,
}

/// Controller statistics.
#[derive(Debug, Clone, Default)]
pub struct DfxStats {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub aborts: u64,
    pub soft_resets: u64,
    /// Host commands ignored (START while busy, ABORT outside LOADING)
    pub ignored_commands: u64,
    pub words_streamed: u64,
    pub payload_bursts: u64,
    /// Read beats answered with a non-OKAY response
    pub read_errors: u64,
    pub loading_cycles: u64,
}

/// The DFX Controller.
#[derive(Debug)]
pub struct DfxController {
    num_partitions: usize,
    port: LiteSlavePort,
    regs: RegisterFile<DFX_NUM_REGISTERS>,
    default_timeout: u32,

    state: DfxState,
    job: DfxJob,
    error: DfxErrorCode,
    error_sticky: bool,
    done_latched: bool,
    int_status: u32,
    timeout_counter: u32,
    progress: u32,
    configured: Vec<u32>,

    lines: ControlLines,
    done_pulse: bool,
    configured_event: Option<(usize, u32)>,
    irq: bool,

    pending: Pending,
    links: Links,
    memory: MemoryMachine,
    config: ConfigMachine,
    buffer: StreamBuffer,
    /// Payload words requested from memory
    fetched: usize,
    fetch_in_flight: bool,
    abandon_memory: bool,
    core_active: u32,

    stats: DfxStats,
}

impl DfxController {
    pub fn new(params: DfxParams) -> Self {
        let mut regs = RegisterFile::new();
        regs.set(dfx::TIMEOUT, params.default_timeout);
        Self {
            num_partitions: params.num_partitions,
            port: LiteSlavePort::new(),
            regs,
            default_timeout: params.default_timeout,
            state: DfxState::Idle,
            job: DfxJob::default(),
            error: DfxErrorCode::None,
            error_sticky: false,
            done_latched: false,
            int_status: 0,
            timeout_counter: 0,
            progress: 0,
            configured: vec![0; params.num_partitions],
            lines: ControlLines::default(),
            done_pulse: false,
            configured_event: None,
            irq: false,
            pending: Pending::default(),
            links: Links::default(),
            memory: MemoryMachine::new(),
            config: ConfigMachine::new(params.port_kind),
            buffer: StreamBuffer::new(params.buffer_words),
            fetched: 0,
            fetch_in_flight: false,
            abandon_memory: false,
            core_active: 0,
            stats: DfxStats::default(),
        }
    }

    pub fn state(&self) -> DfxState {
        self.state
    }

    pub fn error(&self) -> DfxErrorCode {
        self.error
    }

    /// Most recently latched job.
    pub fn job(&self) -> &DfxJob {
        &self.job
    }

    /// Bitstream configured into `partition` by the last completed load.
    pub fn configured_bitstream(&self, partition: usize) -> Option<u32> {
        self.configured.get(partition).copied()
    }

    pub fn configured_bitstreams(&self) -> &[u32] {
        &self.configured
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Words streamed in the current or last job.
    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn int_status(&self) -> u32 {
        self.int_status
    }

    pub fn memory_state(&self) -> MemState {
        self.memory.state()
    }

    pub fn port_state(&self) -> PortState {
        self.config.state()
    }

    pub fn stats(&self) -> &DfxStats {
        &self.stats
    }

    pub fn lite_port(&self) -> &LiteSlavePort {
        &self.port
    }

    /// Registered outputs from the last tick.
    pub fn outputs(&self) -> DfxOutputs {
        let mem = self.memory.outputs();
        DfxOutputs {
            lite: self.port.outputs(),
            axi: Axi4MasterSignals { ar: mem.ar, rready: mem.rready, ..Default::default() },
            config: self.config.outputs().signals,
            lines: self.lines,
            done: self.done_pulse,
            irq: self.irq,
            configured: self.configured_event,
        }
    }

    /// STATUS register value.
    pub fn status_word(&self) -> u32 {
        let mut status = (self.state.code() & dfx::STATUS_STATE_MASK) << dfx::STATUS_STATE_SHIFT;
        if self.error_sticky {
            status |= dfx::STATUS_ERROR;
        }
        if self.done_latched {
            status |= dfx::STATUS_DONE;
        }
        if self.state.is_busy() {
            status |= dfx::STATUS_BUSY;
        }
        status
    }

    /// Record a fault detected outside the controller (CRC, SEU, ...).
    ///
    /// Sets the error code, the sticky error bit and the error interrupt.
    /// The state machine is not moved.
    pub fn report_fault(&mut self, code: DfxErrorCode) {
        if code == DfxErrorCode::None {
            return;
        }
        log::warn!("DFX: external fault reported: {}", code);
        self.error = code;
        self.error_sticky = true;
        self.int_status |= dfx::INT_ERROR;
    }

    /// Advance one cycle.
    pub fn tick(&mut self, input: &DfxInputs) {
        let mut links = self.links;
        let mut next = Links { active: links.active, ..Default::default() };
        let available = self.buffer.len();

        self.core_active = input.core_active;
        self.done_pulse = false;
        self.configured_event = None;

        let pending = std::mem::take(&mut self.pending);
        if pending.sw_reset {
            self.soft_reset();
            links = Links::default();
            next = Links::default();
        } else {
            self.step(&pending, &links, &mut next);
        }

        let abandon = std::mem::take(&mut self.abandon_memory);
        let errors_before = self.memory.read_errors();
        self.memory.tick(links.read_request, abandon, &input.axi, &mut self.buffer);
        self.stats.read_errors += self.memory.read_errors() - errors_before;
        next.mem_done = self.memory.outputs().done;

        let port_in = PortInputs {
            active: links.active,
            available,
            port_busy: input.port_busy,
            total_words: self.job.words(),
        };
        self.config.tick(&port_in, &mut self.buffer);
        next.cfg_done = self.config.outputs().done;
        next.refill = self.config.outputs().refill;

        let mut port = std::mem::take(&mut self.port);
        port.tick(self, &input.lite);
        self.port = port;

        self.irq = self.int_status & self.regs.get(dfx::INT_ENABLE) & dfx::INT_MASK != 0;
        self.links = next;
    }

    /// Top-level state machine.
    fn step(&mut self, pending: &Pending, links: &Links, next: &mut Links) {
        let abort = pending.abort || pending.start == Some(DfxCommand::Abort.bits());

        if self.state.is_busy() {
            if let Some(bits) = pending.start.filter(|_| !(abort && self.state == DfxState::Loading)) {
                self.stats.ignored_commands += 1;
                log::warn!("DFX: START (command {}) ignored in {}", bits, self.state);
            }
            if pending.abort && self.state != DfxState::Loading {
                self.stats.ignored_commands += 1;
                log::warn!("DFX: ABORT ignored in {}", self.state);
            }
        }

        let bit = 1u32 << self.job.partition.min(31);

        match self.state {
            DfxState::Idle => {
                if pending.abort {
                    log::debug!("DFX: ABORT ignored in IDLE");
                }
                if let Some(bits) = pending.start {
                    self.start(bits);
                }
            }
            DfxState::Init => {
                self.buffer.reset();
                next.read_request = Some(ReadRequest {
                    addr: self.job.addr,
                    beats: BITSTREAM_HEADER_WORDS,
                });
                self.state = DfxState::CheckBitstream;
            }
            DfxState::CheckBitstream => {
                if links.mem_done {
                    self.check_header();
                }
            }
            DfxState::Shutdown => {
                if self.core_active & bit != 0 {
                    self.lines.pause |= bit;
                    self.lines.stop |= bit;
                } else {
                    log::debug!("DFX: partition {} quiesced, decoupling", self.job.partition);
                    self.lines.pause &= !bit;
                    self.lines.stop &= !bit;
                    self.lines.decouple |= bit;
                    self.state = if self.job.load { DfxState::LoadPrep } else { DfxState::Startup };
                }
            }
            DfxState::LoadPrep => {
                self.buffer.reset();
                self.fetched = 0;
                self.fetch_in_flight = false;
                self.progress = 0;
                self.issue_fetch(next);
                next.active = true;
                self.state = DfxState::Loading;
            }
            DfxState::Loading => {
                self.stats.loading_cycles += 1;
                self.progress = self.config.words_written() as u32;
                if links.mem_done {
                    self.fetch_in_flight = false;
                    self.stats.payload_bursts += 1;
                    self.int_status |= dfx::INT_PROGRESS;
                }

                if links.cfg_done {
                    next.active = false;
                    self.stats.words_streamed += self.progress as u64;
                    self.state = DfxState::Verify;
                } else if abort {
                    log::info!("DFX: job aborted after {} words", self.progress);
                    next.active = false;
                    self.abandon_memory = true;
                    self.stats.aborts += 1;
                    self.state = DfxState::Error;
                } else {
                    self.timeout_counter = self.timeout_counter.saturating_sub(1);
                    if self.timeout_counter == 0 {
                        next.active = false;
                        self.abandon_memory = true;
                        self.fail(DfxErrorCode::Timeout);
                    } else if links.refill && !self.fetch_in_flight {
                        self.issue_fetch(next);
                    }
                }
            }
            DfxState::Verify => {
                let (rp, id) = (self.job.partition, self.job.bitstream_id);
                if let Some(slot) = self.configured.get_mut(rp) {
                    *slot = id;
                }
                self.configured_event = Some((rp, id));
                self.state = DfxState::Startup;
            }
            DfxState::Startup => {
                self.lines.decouple &= !bit;
                if self.core_active & bit != 0 {
                    self.lines.resume &= !bit;
                    self.state = DfxState::Done;
                } else {
                    self.lines.resume |= bit;
                }
            }
            DfxState::Done => {
                log::info!(
                    "DFX: partition {} now runs bitstream 0x{:x}",
                    self.job.partition,
                    self.configured_bitstream(self.job.partition).unwrap_or(0)
                );
                self.done_pulse = true;
                self.done_latched = true;
                self.int_status |= dfx::INT_DONE;
                self.stats.jobs_completed += 1;
                self.state = DfxState::Idle;
            }
            DfxState::Error => {
                let clear = pending.clear_error
                    || pending.start == Some(DfxCommand::ClearError.bits());
                if clear {
                    log::debug!("DFX: error {} cleared", self.error);
                    self.error = DfxErrorCode::None;
                    self.error_sticky = false;
                    self.state = DfxState::Idle;
                } else if let Some(bits) = pending.start {
                    self.stats.ignored_commands += 1;
                    log::warn!("DFX: START (command {}) ignored in ERROR", bits);
                }
            }
        }
    }

    /// Handle START in IDLE.
    fn start(&mut self, bits: u32) {
        match DfxCommand::from_bits(bits) {
            Some(cmd) if cmd.starts_job() => {
                self.latch_job(cmd == DfxCommand::Load);
                self.stats.jobs_started += 1;
                self.done_latched = false;
                if self.job.partition >= self.num_partitions {
                    log::warn!(
                        "DFX: partition {} out of range (0..{})",
                        self.job.partition,
                        self.num_partitions
                    );
                    self.fail(DfxErrorCode::InvalidPartition);
                    return;
                }
                log::info!(
                    "DFX: {:?} partition {} bitstream 0x{:x} from 0x{:x} ({} bytes)",
                    cmd,
                    self.job.partition,
                    self.job.bitstream_id,
                    self.job.addr,
                    self.job.size_bytes
                );
                self.timeout_counter = self.job.timeout;
                self.progress = 0;
                self.state = if self.job.load { DfxState::Init } else { DfxState::Shutdown };
            }
            Some(cmd) => {
                log::debug!("DFX: {:?} completes immediately", cmd);
                self.done_pulse = true;
            }
            None => {
                log::warn!("DFX: invalid command {}", bits);
                self.fail(DfxErrorCode::InvalidCommand);
            }
        }
    }

    fn latch_job(&mut self, load: bool) {
        let addr = ((self.regs.get(dfx::BS_ADDR_HIGH) as u64) << 32)
            | self.regs.get(dfx::BS_ADDR_LOW) as u64;
        self.job = DfxJob {
            load,
            partition: self.regs.get(dfx::RP_SELECT) as usize,
            addr,
            size_bytes: self.regs.get(dfx::BS_SIZE),
            bitstream_id: self.regs.get(dfx::BS_ID),
            timeout: self.regs.get(dfx::TIMEOUT),
        };
    }

    fn check_header(&mut self) {
        let mut words = [0u32; BITSTREAM_HEADER_WORDS];
        for word in words.iter_mut() {
            *word = self.buffer.pop().unwrap_or(0);
        }
        let header = BitstreamHeader::from_words(&words);
        match header.validate(self.job.partition as u32) {
            Ok(()) => {
                log::debug!(
                    "DFX: header ok, bitstream 0x{:x}, {} bytes",
                    header.bitstream_id.get(),
                    header.bitstream_length.get()
                );
                self.state = DfxState::Shutdown;
            }
            Err(e) => {
                log::warn!("DFX: {}", e);
                self.fail(DfxErrorCode::InvalidBitstream);
            }
        }
    }

    /// Request the next payload burst, sized to the free buffer space.
    fn issue_fetch(&mut self, next: &mut Links) {
        let remaining = self.job.words().saturating_sub(self.fetched);
        let beats = remaining.min(self.buffer.free()).min(AXI_MAX_BURST_BEATS);
        if beats == 0 {
            return;
        }
        let addr = self.job.payload_addr() + (self.fetched * CONFIG_WORD_BYTES) as u64;
        next.read_request = Some(ReadRequest { addr, beats });
        self.fetched += beats;
        self.fetch_in_flight = true;
    }

    fn fail(&mut self, code: DfxErrorCode) {
        log::warn!("DFX: {} -> ERROR ({})", self.state, code);
        self.error = code;
        self.error_sticky = true;
        self.int_status |= dfx::INT_ERROR;
        if code == DfxErrorCode::Timeout {
            self.int_status |= dfx::INT_TIMEOUT;
        }
        self.stats.jobs_failed += 1;
        self.state = DfxState::Error;
    }

    /// Software reset: all machines back to idle, control lines released.
    fn soft_reset(&mut self) {
        log::info!("DFX: software reset in {}", self.state);
        self.state = DfxState::Idle;
        self.lines = ControlLines::default();
        self.config.reset();
        self.buffer.reset();
        self.abandon_memory = true;
        self.fetched = 0;
        self.fetch_in_flight = false;
        self.error = DfxErrorCode::None;
        self.error_sticky = false;
        self.done_latched = false;
        self.timeout_counter = 0;
        self.stats.soft_resets += 1;
    }

    fn write_ctrl(&mut self, value: u32) {
        if value & dfx::CTRL_START != 0 {
            self.pending.start = Some((value >> dfx::CTRL_COMMAND_SHIFT) & dfx::CTRL_COMMAND_MASK);
        }
        if value & dfx::CTRL_ABORT != 0 {
            self.pending.abort = true;
        }
        if value & dfx::CTRL_CLEAR_ERROR != 0 {
            self.pending.clear_error = true;
        }
        if value & dfx::CTRL_SW_RESET != 0 {
            self.pending.sw_reset = true;
        }
        if value & (dfx::CTRL_SECURE | dfx::CTRL_SELF_TEST) != 0 {
            log::debug!("DFX: secure/self-test request 0x{:x} has no effect", value);
        }
        self.regs.set(dfx::CTRL, value & !dfx::CTRL_SELF_CLEARING);
    }

    fn partition_mask(&self) -> u32 {
        if self.num_partitions >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_partitions) - 1
        }
    }

    /// Reset value of the TIMEOUT register.
    pub fn default_timeout(&self) -> u32 {
        self.default_timeout
    }
}

impl RegisterBlock for DfxController {
    fn read_register(&self, index: usize) -> Option<u32> {
        let value = match index {
            dfx::STATUS => self.status_word(),
            dfx::ERROR => self.error.code() & dfx::ERROR_MASK,
            dfx::VERSION => DFX_VERSION,
            dfx::CONFIG_ID => {
                let rp = self.regs.get(dfx::RP_SELECT) as usize;
                self.configured_bitstream(rp).unwrap_or(0)
            }
            dfx::PROGRESS => self.progress,
            dfx::INT_STATUS => self.int_status,
            dfx::RP_STATUS => self.core_active & self.partition_mask(),
            i if i < DFX_NUM_REGISTERS => self.regs.get(i),
            _ => return None,
        };
        Some(value)
    }

    fn write_register(&mut self, index: usize, data: u32, strobe: u8) -> bool {
        let mask = strobe_mask(strobe);
        match index {
            dfx::CTRL => {
                let value = (self.regs.get(dfx::CTRL) & !mask) | (data & mask);
                self.write_ctrl(value);
            }
            dfx::INT_STATUS => self.int_status &= !(data & mask),
            dfx::STATUS
            | dfx::ERROR
            | dfx::VERSION
            | dfx::CONFIG_ID
            | dfx::PROGRESS
            | dfx::RP_STATUS => {
                log::debug!("DFX: write to read-only register {} ignored", index);
            }
            i if i < DFX_NUM_REGISTERS => {
                self.regs.write(i, data, strobe);
            }
            _ => return false,
        }
        true
    }
}
