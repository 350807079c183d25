//! End-to-end scenarios: host driver, control plane, memory and cores
//! together.

use crate::config::PlatformConfig;
use crate::control::arbiter::{BusInstruction, PriorityScheme};
use crate::control::dfx::{ControlLines, DfxCommand, DfxErrorCode, DfxState};
use crate::device::config_port::ConfigPortKind;
use crate::device::ensemble::CoreStatus;
use crate::device::registers::RegisterModule;
use crate::device::registers_spec::{dfx, intc};
use crate::emu::host::{HostError, LoadJob};
use crate::emu::platform::Platform;

use super::image::BitstreamImage;

const IMAGE_ADDR: u64 = 0x1000_0000;
const BUDGET: u64 = 50_000;

fn platform_with(config: PlatformConfig) -> Platform {
    Platform::new(&config).unwrap()
}

fn platform() -> Platform {
    platform_with(PlatformConfig::default())
}

fn install(p: &mut Platform, image: &BitstreamImage) -> LoadJob {
    image.install(p.memory_mut(), IMAGE_ADDR);
    image.load_job(IMAGE_ADDR, 100_000)
}

#[test]
fn test_load_bitstream() {
    let mut p = platform();
    let image = BitstreamImage::synthetic(2, 0xA5, 300);
    let job = install(&mut p, &image);

    let cycles = p.host(BUDGET).load_bitstream(&job).unwrap();
    assert!(cycles > 300);

    assert_eq!(p.dfx().state(), DfxState::Idle);
    assert_eq!(p.dfx().configured_bitstream(2), Some(0xA5));
    assert_eq!(p.cores()[2].bitstream_id(), 0xA5);
    assert_eq!(p.cores()[2].status(), CoreStatus::Busy);
    assert_eq!(p.cores()[0].bitstream_id(), 0);

    let session = p.config_port().sessions().last().unwrap().clone();
    assert!(session.synced && session.desynced);
    assert_eq!(session.payload_words, 300);
    assert_eq!(session.checksum, image.checksum());
    assert_eq!(p.config_port().last_payload(), image.payload());

    // Control lines are released once the partition is running again
    assert_eq!(p.dfx().outputs().lines, Default::default());

    let mut host = p.host(BUDGET);
    let status = host.read_reg(RegisterModule::DfxController, dfx::STATUS).unwrap();
    assert_ne!(status & dfx::STATUS_DONE, 0);
    let config_id = host.read_reg(RegisterModule::DfxController, dfx::CONFIG_ID).unwrap();
    assert_eq!(config_id, 0xA5);
}

#[test]
fn test_load_over_pcap() {
    let config = PlatformConfig {
        config_port: ConfigPortKind::Pcap,
        port_busy_cycles: 1,
        ..Default::default()
    };
    let mut p = platform_with(config);
    let image = BitstreamImage::synthetic(0, 7, 100);
    let job = install(&mut p, &image);

    p.host(BUDGET).load_bitstream(&job).unwrap();

    assert_eq!(p.config_port().kind(), ConfigPortKind::Pcap);
    assert_eq!(p.config_port().last_payload(), image.payload());
    assert!(p.config_port().stall_cycles() > 0);
}

#[test]
fn test_consecutive_loads() {
    let mut p = platform();
    for (rp, id) in [(0u32, 0x10u32), (3, 0x13), (0, 0x20)] {
        let image = BitstreamImage::synthetic(rp, id, 64);
        let job = install(&mut p, &image);
        p.host(BUDGET).load_bitstream(&job).unwrap();
    }

    assert_eq!(p.dfx().configured_bitstreams(), &[0x20, 0, 0, 0x13]);
    assert_eq!(p.dfx().stats().jobs_completed, 3);
    assert_eq!(p.config_port().sessions().len(), 3);
}

#[test]
fn test_invalid_partition() {
    let mut p = platform();
    let image = BitstreamImage::synthetic(0, 1, 16);
    let job = LoadJob { partition: 7, ..install(&mut p, &image) };

    let err = p.host(BUDGET).load_bitstream(&job).unwrap_err();
    assert_eq!(err, HostError::JobFailed(DfxErrorCode::InvalidPartition));
    assert_eq!(p.axi_memory().stats().read_bursts, 0);
    assert!(p.cores().iter().all(|c| c.status() == CoreStatus::Busy));
}

#[test]
fn test_reset_invalid_partition() {
    let mut p = platform();
    let mut host = p.host(BUDGET);
    host.write_reg(RegisterModule::DfxController, dfx::RP_SELECT, 4).unwrap();
    host.write_reg(
        RegisterModule::DfxController,
        dfx::CTRL,
        dfx::CTRL_START | (DfxCommand::Reset.bits() << dfx::CTRL_COMMAND_SHIFT),
    )
    .unwrap();

    for _ in 0..200 {
        p.step();
        assert_eq!(p.dfx().outputs().lines, ControlLines::default());
    }
    assert_eq!(p.dfx().state(), DfxState::Error);
    assert_eq!(p.dfx().error(), DfxErrorCode::InvalidPartition);
    assert!(p.cores().iter().all(|c| c.status() == CoreStatus::Busy));

    p.host(BUDGET).clear_error().unwrap();
    let err = p.host(BUDGET).reset_partition(4).unwrap_err();
    assert_eq!(err, HostError::JobFailed(DfxErrorCode::InvalidPartition));
}

#[test]
fn test_bad_magic_leaves_core_running() {
    let mut p = platform();
    let image = BitstreamImage::synthetic(1, 2, 16).with_magic(0xDEAD_BEEF);
    let job = install(&mut p, &image);

    let err = p.host(BUDGET).load_bitstream(&job).unwrap_err();
    assert_eq!(err, HostError::JobFailed(DfxErrorCode::InvalidBitstream));
    assert_eq!(p.cores()[1].status(), CoreStatus::Busy);
    assert_eq!(p.cores()[1].bitstream_id(), 0);
    assert!(p.config_port().sessions().is_empty());
}

#[test]
fn test_partition_mismatch() {
    let mut p = platform();
    let image = BitstreamImage::synthetic(1, 2, 16);
    let job = LoadJob { partition: 2, ..install(&mut p, &image) };

    let err = p.host(BUDGET).load_bitstream(&job).unwrap_err();
    assert_eq!(err, HostError::JobFailed(DfxErrorCode::InvalidBitstream));
}

#[test]
fn test_timeout() {
    let config = PlatformConfig { port_busy_cycles: 4, ..Default::default() };
    let mut p = platform_with(config);
    let image = BitstreamImage::synthetic(0, 3, 512);
    let job = LoadJob { timeout: 50, ..install(&mut p, &image) };

    let err = p.host(BUDGET).load_bitstream(&job).unwrap_err();
    assert_eq!(err, HostError::JobFailed(DfxErrorCode::Timeout));
    assert_ne!(p.dfx().int_status() & dfx::INT_TIMEOUT, 0);
    assert_eq!(p.dfx().stats().loading_cycles, 50);

    // Error is sticky until cleared
    let mut host = p.host(BUDGET);
    host.clear_error().unwrap();
    host.platform().run(2);
    assert_eq!(host.platform().dfx().state(), DfxState::Idle);
    assert_eq!(host.read_reg(RegisterModule::DfxController, dfx::ERROR).unwrap(), 0);
}

#[test]
fn test_abort_then_retry() {
    let config = PlatformConfig { port_busy_cycles: 3, ..Default::default() };
    let mut p = platform_with(config);
    let image = BitstreamImage::synthetic(1, 0x77, 1024);
    let job = install(&mut p, &image);

    let mut host = p.host(BUDGET);
    host.start_load(&job).unwrap();
    let loading = host
        .platform()
        .run_until(BUDGET, |p| p.dfx().state() == DfxState::Loading && p.dfx().progress() > 16);
    assert!(loading.is_some());

    host.abort().unwrap();
    assert_eq!(host.wait_idle(), Err(HostError::Aborted));
    assert_eq!(host.platform().dfx().stats().aborts, 1);
    // An aborted job never reaches VERIFY
    assert_eq!(host.platform().dfx().configured_bitstream(1), Some(0));

    host.clear_error().unwrap();
    host.platform().run(2);
    assert_eq!(host.platform().dfx().state(), DfxState::Idle);

    host.load_bitstream(&job).unwrap();
    assert_eq!(p.cores()[1].bitstream_id(), 0x77);
    assert_eq!(p.config_port().last_payload(), image.payload());
}

#[test]
fn test_soft_reset_mid_load() {
    let config = PlatformConfig { port_busy_cycles: 3, ..Default::default() };
    let mut p = platform_with(config);

    let first = BitstreamImage::synthetic(0, 0x11, 32);
    let job = install(&mut p, &first);
    p.host(BUDGET).load_bitstream(&job).unwrap();

    let second = BitstreamImage::synthetic(2, 0x22, 1024);
    let job = install(&mut p, &second);
    let mut host = p.host(BUDGET);
    host.start_load(&job).unwrap();
    host.platform().run_until(BUDGET, |p| p.dfx().state() == DfxState::Loading);

    host.soft_reset().unwrap();
    host.wait_idle().unwrap();
    host.platform().run(2);

    let controller = host.platform().dfx();
    assert_eq!(controller.state(), DfxState::Idle);
    assert_eq!(controller.error(), DfxErrorCode::None);
    assert_eq!(controller.outputs().lines, Default::default());
    assert_eq!(controller.stats().soft_resets, 1);
    // Earlier reconfigurations survive the reset
    assert_eq!(controller.configured_bitstream(0), Some(0x11));
    assert_eq!(controller.configured_bitstream(2), Some(0));
    assert!(!host.platform().config_port().is_active());
}

#[test]
fn test_reset_partition_restarts_core() {
    let mut p = platform();
    let cycles = p.host(BUDGET).reset_partition(3).unwrap();
    assert!(cycles > 0);
    assert_eq!(p.cores()[3].status(), CoreStatus::Busy);
    assert_eq!(p.axi_memory().stats().read_bursts, 0);
    assert_eq!(p.dfx().stats().jobs_completed, 1);
}

#[test]
fn test_dfx_interrupt() {
    let mut p = platform();
    let image = BitstreamImage::synthetic(0, 5, 16);
    let job = install(&mut p, &image);

    let mut host = p.host(BUDGET);
    host.enable_dfx_interrupts(dfx::INT_DONE).unwrap();
    host.load_bitstream(&job).unwrap();
    assert!(host.platform().interrupts().dfx);

    host.write_reg(RegisterModule::DfxController, dfx::INT_STATUS, dfx::INT_DONE).unwrap();
    assert!(!host.platform().interrupts().dfx);
}

#[test]
fn test_global_pause_resume() {
    let mut p = platform();
    let mut host = p.host(BUDGET);

    host.global_command(intc::CTRL_PAUSE_ALL).unwrap();
    let paused = host
        .platform()
        .run_until(100, |p| p.cores().iter().all(|c| c.status() == CoreStatus::Idle));
    assert!(paused.is_some());

    host.global_command(intc::CTRL_RESUME_ALL).unwrap();
    let resumed = host
        .platform()
        .run_until(100, |p| p.cores().iter().all(|c| c.status() == CoreStatus::Busy));
    assert!(resumed.is_some());

    let p = host.platform();
    let ctrl = p.control_port();
    assert_eq!(p.arbiter().stats().grants[ctrl], 2);
    assert_eq!(p.arbiter().stats().broadcasts, 2);
    assert_eq!(p.intc().stats().commands_issued, 2);
}

#[test]
fn test_core_command_targets_one_core() {
    let mut p = platform();
    let mut host = p.host(BUDGET);

    host.core_command(2, intc::CORE_CTRL_STOP).unwrap();
    let stopped = host.platform().run_until(100, |p| p.cores()[2].status() == CoreStatus::Idle);
    assert!(stopped.is_some());

    let p = host.platform();
    assert_eq!(p.arbiter().stats().unicasts, 1);
    for id in [0, 1, 3] {
        assert_eq!(p.cores()[id].status(), CoreStatus::Busy);
    }

    // Status readback packs two bits per core
    let mut host = p.host(BUDGET);
    let packed = host.read_reg(RegisterModule::InterruptController, intc::CORE_STATUS).unwrap();
    assert_eq!(packed, 0b01_00_01_01);
}

#[test]
fn test_core_interrupt_aggregation() {
    let mut p = platform();
    let mut host = p.host(BUDGET);
    host.enable_interrupts(intc::CAUSE_CORE_DONE).unwrap();
    host.platform().core_mut(1).unwrap().set_workload(Some(5));

    let raised = host.platform().run_until(100, |p| p.interrupts().intc);
    assert!(raised.is_some());

    let causes = host.read_reg(RegisterModule::InterruptController, intc::INT_STATUS).unwrap();
    assert_ne!(causes & intc::CAUSE_CORE_DONE, 0);
    let status = host.read_reg(RegisterModule::InterruptController, intc::STATUS).unwrap();
    assert_ne!(status & intc::STATUS_IRQ, 0);
    assert_eq!(status >> intc::STATUS_PENDING_SHIFT, 1 << 1);

    host.clear_interrupts(intc::CAUSE_CORE_DONE | (1 << 1) << intc::CLEAR_PENDING_SHIFT).unwrap();
    assert!(!host.platform().interrupts().intc);
    assert_eq!(host.platform().intc().pending_cores(), 0);
}

#[test]
fn test_masked_cause_does_not_interrupt() {
    let mut p = platform();
    let mut host = p.host(BUDGET);
    host.enable_interrupts(intc::CAUSE_CORE_ERROR).unwrap();

    host.platform().raise_interrupt(intc::CAUSE_TEMPERATURE);
    host.platform().run(3);
    assert!(!host.platform().interrupts().intc);

    host.platform().core_mut(0).unwrap().inject_fault();
    host.platform().run(2);
    assert!(host.platform().interrupts().intc);
    assert_eq!(
        host.platform().intc().causes(),
        intc::CAUSE_TEMPERATURE | intc::CAUSE_CORE_ERROR
    );
}

#[test]
fn test_done_broadcast_order() {
    fn grant_order(scheme: PriorityScheme) -> Vec<usize> {
        let config = PlatformConfig { arbiter_priority: scheme, ..Default::default() };
        let mut p = platform_with(config);
        for id in 0..4 {
            p.core_mut(id).unwrap().set_workload(Some(10));
        }
        let mut order = Vec::new();
        for _ in 0..30 {
            p.step();
            if let Some(msg) = p.arbiter().message() {
                if msg.instruction == BusInstruction::Done {
                    order.push(msg.source);
                }
            }
        }
        assert!(p.arbiter().stats().contention_cycles > 0);
        assert_eq!(p.intc().stats().done_messages, 4);
        order
    }

    assert_eq!(grant_order(PriorityScheme::HighestIndex), vec![3, 2, 1, 0]);
    assert_eq!(grant_order(PriorityScheme::Rotating), vec![0, 1, 2, 3]);
}

#[test]
fn test_load_with_audio_traffic() {
    let config = PlatformConfig { audio_period_cycles: 20, audio_burst_beats: 16, ..Default::default() };
    let mut p = platform_with(config);
    let image = BitstreamImage::synthetic(1, 0x31, 512);
    let job = install(&mut p, &image);

    p.host(BUDGET).load_bitstream(&job).unwrap();
    p.run(100);

    assert_eq!(p.config_port().last_payload(), image.payload());
    assert!(p.audio().stats().bursts_completed > 0);
    assert!(p.mux().stats().dfx_cycles > 0);
    assert_eq!(p.mux().stats().misrouted_beats, 0);
}

#[test]
fn test_unmapped_image_in_strict_memory() {
    let mut p = platform();
    p.axi_memory_mut().set_strict(true);
    let job = BitstreamImage::synthetic(0, 1, 16).load_job(0x7000_0000, 1000);

    let err = p.host(BUDGET).load_bitstream(&job).unwrap_err();
    assert_eq!(err, HostError::JobFailed(DfxErrorCode::InvalidBitstream));
    // Error responses are counted, the zeroed header fails the magic check
    assert_eq!(p.dfx().stats().read_errors, 8);
    assert_eq!(p.axi_memory().stats().error_bursts, 1);
}
