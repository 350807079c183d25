//! Platform composition and the two-phase tick loop.
//!
//! The platform wires every block of the control plane to its collaborators:
//!
//! ```text
//!   HostPort --AXI-Lite--> LiteRouter --> INTC, DFX
//!   DFX, AudioMaster --AXI4--> AxiMux --> AxiMemory
//!   DFX --ICAP/PCAP--> ConfigPort
//!   cores + INTC control port <--> BusArbiter
//! ```
//!
//! One [`Platform::step`] is one clock cycle:
//! 1. snapshot the registered outputs of every block,
//! 2. build every block's inputs from that snapshot,
//! 3. tick every block.
//!
//! No block observes a value produced in the same step, so the order of the
//! ticks in phase 3 does not matter.
//!
//! # Usage
//!
//! ```ignore
//! let mut platform = Platform::new(&PlatformConfig::default())?;
//! platform.step();          // one cycle
//! platform.run(1000);       // up to 1000 cycles
//! platform.print_summary();
//! ```

use crate::config::{ConfigError, PlatformConfig};
use crate::control::arbiter::{BusArbiter, BusRequest};
use crate::control::dfx::{DfxController, DfxInputs, DfxParams};
use crate::control::intc::{IntcInputs, InterruptController};
use crate::control::interconnect::{AxiMux, LiteRouter};
use crate::device::audio::{AudioMaster, AudioParams};
use crate::device::axi_memory::AxiMemory;
use crate::device::config_port::ConfigPort;
use crate::device::ensemble::{CoreInputs, CoreStatus, CoreTiming, EnsembleCore};
use crate::device::host_memory::HostMemory;

use super::host::HostPort;

/// Interrupt lines leaving the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptLines {
    pub intc: bool,
    pub dfx: bool,
}

impl InterruptLines {
    pub fn any(&self) -> bool {
        self.intc || self.dfx
    }
}

/// The complete control-plane platform.
pub struct Platform {
    config: PlatformConfig,
    host: HostPort,
    router: LiteRouter,
    intc: InterruptController,
    dfx: DfxController,
    arbiter: BusArbiter,
    cores: Vec<EnsembleCore>,
    mux: AxiMux,
    memory: AxiMemory,
    audio: AudioMaster,
    port: ConfigPort,
    /// Causes raised by [`Platform::raise_interrupt`], applied next step
    external_causes: u32,
    cycle: u64,
}

impl Platform {
    /// Build a platform over empty host memory.
    pub fn new(config: &PlatformConfig) -> Result<Self, ConfigError> {
        Self::with_memory(config, HostMemory::new())
    }

    /// Build a platform over pre-loaded host memory.
    pub fn with_memory(config: &PlatformConfig, memory: HostMemory) -> Result<Self, ConfigError> {
        config.validate()?;

        let timing = CoreTiming {
            quiesce_cycles: config.core_quiesce_cycles,
            startup_cycles: config.core_startup_cycles,
        };
        let cores = (0..config.num_cores).map(|id| EnsembleCore::new(id, timing)).collect();

        let dfx = DfxController::new(DfxParams {
            num_partitions: config.num_partitions,
            buffer_words: config.stream_buffer_words,
            port_kind: config.config_port,
            default_timeout: config.default_timeout_cycles,
        });

        let audio = AudioMaster::new(AudioParams {
            period_cycles: config.audio_period_cycles,
            burst_beats: config.audio_burst_beats,
            buffer_addr: config.audio_buffer_addr,
        });

        log::info!("Platform: {}", config);

        Ok(Self {
            config: config.clone(),
            host: HostPort::new(),
            router: LiteRouter::new(),
            intc: InterruptController::new(config.num_cores),
            dfx,
            arbiter: BusArbiter::new(config.num_cores + 1, config.arbiter_priority),
            cores,
            mux: AxiMux::new(),
            memory: AxiMemory::new(memory, config.memory_latency_cycles),
            audio,
            port: ConfigPort::new(config.config_port, config.port_busy_cycles),
            external_causes: 0,
            cycle: 0,
        })
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Arbiter port used by the interrupt controller.
    pub fn control_port(&self) -> usize {
        self.cores.len()
    }

    /// Cycles executed since construction.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Execute one cycle.
    pub fn step(&mut self) {
        // Phase 1: snapshot
        let host = self.host.outputs();
        let intc_out = self.intc.outputs();
        let dfx_out = self.dfx.outputs();
        let mem_out = self.memory.outputs();
        let audio_out = self.audio.outputs();
        let port_busy = self.port.busy();
        let core_out: Vec<_> = self.cores.iter().map(|c| c.outputs()).collect();
        let grant = self.arbiter.grant();
        let message = self.arbiter.message();

        // Phase 2: inputs
        let lite = self.router.route(&host);
        let host_view = self.router.respond(&host, &intc_out.lite, &dfx_out.lite);
        let axi = self.mux.route(&dfx_out.axi, &audio_out, &mem_out);

        let core_status: Vec<CoreStatus> = core_out.iter().map(|o| o.status).collect();
        let mut core_interrupts = 0u32;
        let mut core_active = 0u32;
        for (i, out) in core_out.iter().enumerate() {
            if out.interrupt {
                core_interrupts |= 1 << i;
            }
            if out.status.is_active() {
                core_active |= 1 << i;
            }
        }

        // A request granted last cycle is still on the requester's line in
        // this snapshot; it must not compete again.
        let ctrl = self.control_port();
        let requests: Vec<Option<BusRequest>> = core_out
            .iter()
            .map(|o| o.bus_request)
            .chain(std::iter::once(intc_out.bus_request))
            .enumerate()
            .map(|(port, req)| if self.arbiter.granted(port) { None } else { req })
            .collect();

        // Phase 3: tick
        self.host.tick(&host_view);
        self.router.tick(&host, &intc_out.lite, &dfx_out.lite);
        self.arbiter.tick(&requests);

        self.intc.tick(&IntcInputs {
            lite: lite.intc,
            core_status: &core_status,
            core_interrupts,
            grant: grant & (1 << ctrl) != 0,
            bus_message: message.filter(|m| m.delivers_to(ctrl)),
            external_causes: std::mem::take(&mut self.external_causes),
        });

        self.dfx.tick(&DfxInputs {
            lite: lite.dfx,
            axi: axi.dfx,
            port_busy,
            core_active,
        });

        let lines = dfx_out.lines;
        for (i, core) in self.cores.iter_mut().enumerate() {
            let bit = 1u32 << i;
            core.tick(&CoreInputs {
                pause: lines.pause & bit != 0,
                stop: lines.stop & bit != 0,
                resume: lines.resume & bit != 0,
                decouple: lines.decouple & bit != 0,
                bus: message.filter(|m| m.delivers_to(i)).map(|m| m.instruction),
                grant: grant & bit != 0,
            });
        }
        if let Some((rp, id)) = dfx_out.configured {
            if let Some(core) = self.cores.get_mut(rp) {
                core.set_bitstream(id);
            }
        }

        self.memory.tick(&axi.slave);
        self.audio.tick(&axi.audio);
        self.port.tick(&dfx_out.config);

        self.cycle += 1;
    }

    /// Run for `cycles` cycles.
    pub fn run(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Step until `done` holds, for at most `budget` cycles.
    ///
    /// Returns the cycles executed, or `None` if the budget ran out.
    pub fn run_until(&mut self, budget: u64, mut done: impl FnMut(&Platform) -> bool) -> Option<u64> {
        for n in 0..=budget {
            if done(self) {
                return Some(n);
            }
            if n < budget {
                self.step();
            }
        }
        None
    }

    /// Raise external interrupt causes (bus error, overflow, ...) on the
    /// interrupt controller for the next cycle.
    pub fn raise_interrupt(&mut self, causes: u32) {
        self.external_causes |= causes;
    }

    /// Interrupt lines as of the last cycle.
    pub fn interrupts(&self) -> InterruptLines {
        InterruptLines {
            intc: self.intc.outputs().irq,
            dfx: self.dfx.outputs().irq,
        }
    }

    pub fn host_port(&self) -> &HostPort {
        &self.host
    }

    pub fn host_port_mut(&mut self) -> &mut HostPort {
        &mut self.host
    }

    pub fn intc(&self) -> &InterruptController {
        &self.intc
    }

    pub fn dfx(&self) -> &DfxController {
        &self.dfx
    }

    pub fn dfx_mut(&mut self) -> &mut DfxController {
        &mut self.dfx
    }

    pub fn arbiter(&self) -> &BusArbiter {
        &self.arbiter
    }

    pub fn cores(&self) -> &[EnsembleCore] {
        &self.cores
    }

    pub fn core_mut(&mut self, id: usize) -> Option<&mut EnsembleCore> {
        self.cores.get_mut(id)
    }

    pub fn memory(&self) -> &HostMemory {
        self.memory.memory()
    }

    pub fn memory_mut(&mut self) -> &mut HostMemory {
        self.memory.memory_mut()
    }

    pub fn axi_memory(&self) -> &AxiMemory {
        &self.memory
    }

    pub fn axi_memory_mut(&mut self) -> &mut AxiMemory {
        &mut self.memory
    }

    pub fn config_port(&self) -> &ConfigPort {
        &self.port
    }

    pub fn audio(&self) -> &AudioMaster {
        &self.audio
    }

    pub fn mux(&self) -> &AxiMux {
        &self.mux
    }

    pub fn router(&self) -> &LiteRouter {
        &self.router
    }

    /// Print platform state and statistics.
    pub fn print_summary(&self) {
        println!("Platform: {}", self.config);
        println!("Cycles: {}", self.cycle);
        println!();

        let dfx = self.dfx.stats();
        println!("DFX Controller: {} (error: {})", self.dfx.state(), self.dfx.error());
        println!(
            "  jobs: {} started, {} completed, {} failed, {} aborted",
            dfx.jobs_started, dfx.jobs_completed, dfx.jobs_failed, dfx.aborts
        );
        println!(
            "  streamed {} words in {} bursts, {} loading cycles, {} read errors",
            dfx.words_streamed, dfx.payload_bursts, dfx.loading_cycles, dfx.read_errors
        );
        println!();

        println!("Cores:");
        for core in &self.cores {
            let rp = if core.id() < self.dfx.num_partitions() { "RP" } else { "  " };
            println!(
                "  {} core {:2}: {:?} bitstream=0x{:08x} runs={}",
                rp,
                core.id(),
                core.status(),
                core.bitstream_id(),
                core.runs_completed()
            );
        }
        println!();

        let arb = self.arbiter.stats();
        println!("Bus Arbiter ({}):", self.arbiter.scheme());
        println!(
            "  grants per port: {:?}, {} contended cycles, {} broadcasts, {} unicasts",
            arb.grants, arb.contention_cycles, arb.broadcasts, arb.unicasts
        );

        let intc = self.intc.stats();
        println!(
            "Interrupt Controller: causes=0x{:02x} pending=0x{:08x} commands={} done messages={}",
            self.intc.causes(),
            self.intc.pending_cores(),
            intc.commands_issued,
            intc.done_messages
        );

        let mem = self.memory.stats();
        println!(
            "AXI4 memory: {} read bursts, {} beats, {} error bursts",
            mem.read_bursts, mem.read_beats, mem.error_bursts
        );
        for region in self.memory().regions() {
            println!(
                "  region {:<12} 0x{:010x}+0x{:x}: {} bytes installed, {} read bursts, {} write bursts",
                region.name, region.base, region.size, region.bytes_written, region.read_bursts, region.write_bursts
            );
        }
        if self.audio.enabled() {
            let audio = self.audio.stats();
            println!(
                "Audio: {} frames, {} wait cycles (max {}), {} overruns",
                audio.bursts_completed, audio.wait_cycles, audio.max_wait, audio.overruns
            );
        }
        println!(
            "Config port ({}): {} sessions, {} stall cycles",
            self.port.kind(),
            self.port.sessions().len(),
            self.port.stall_cycles()
        );
    }
}
