//! ensemble-emu: cycle-level emulator for the ensemble audio platform control plane

use std::env;
use std::path::Path;

use anyhow::{bail, Context};
use ensemble_emu::config::Config;
use ensemble_emu::device::platform_spec::{DFX_NUM_REGISTERS, INTC_NUM_REGISTERS};
use ensemble_emu::device::{ConfigPortKind, LiteAddress, RegisterInfo, RegisterModule};
use ensemble_emu::emu::{LoadJob, Platform};
use ensemble_emu::testing::BitstreamImage;

/// Where images are placed in host memory; partition `i` gets its own slot.
const IMAGE_BASE: u64 = 0x1000_0000;
const IMAGE_STRIDE: u64 = 0x0010_0000;

/// Payload words of the synthesized demo image.
const DEMO_WORDS: usize = 1024;

/// Cycle budget for each host transaction or job.
const HOST_BUDGET: u64 = 10_000_000;

#[derive(Debug, Default)]
struct Options {
    image: Option<String>,
    config: Option<String>,
    rp: Option<u32>,
    id: Option<u32>,
    timeout: Option<u32>,
    port: Option<ConfigPortKind>,
    dump_state: bool,
}

fn parse_number(flag: &str, value: Option<&String>) -> anyhow::Result<u32> {
    let value = value.with_context(|| format!("{} needs a value", flag))?;
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("invalid value {:?} for {}", value, flag))
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut opts = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--rp" => opts.rp = Some(parse_number(arg, iter.next())?),
            "--id" => opts.id = Some(parse_number(arg, iter.next())?),
            "--timeout" => opts.timeout = Some(parse_number(arg, iter.next())?),
            "--config" => {
                opts.config = Some(iter.next().context("--config needs a path")?.clone());
            }
            "--pcap" => opts.port = Some(ConfigPortKind::Pcap),
            "--icap" => opts.port = Some(ConfigPortKind::Icap),
            "--dump-state" => opts.dump_state = true,
            other if other.starts_with('-') => bail!("unknown option {}", other),
            other => opts.image = Some(other.to_string()),
        }
    }
    Ok(opts)
}

fn print_usage() {
    println!("Usage: ensemble-emu [IMAGE] [--rp N] [--id N] [--timeout N] [--pcap|--icap]");
    println!("                    [--dump-state] [--config PATH]");
    println!();
    println!("Without IMAGE a demo bitstream is loaded into every partition.");
    if let Some(path) = Config::user_config_path() {
        println!("User configuration: {}", path.display());
    }
    println!();
    println!("Sample configuration:");
    print!("{}", Config::sample_config());
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let opts = parse_args(&args)?;

    let config = match &opts.config {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::get().clone(),
    };
    let mut platform_config = config.platform();
    if let Some(kind) = opts.port {
        platform_config.config_port = kind;
    }
    let timeout = opts.timeout.unwrap_or(platform_config.default_timeout_cycles);

    let mut platform = Platform::new(&platform_config).context("invalid platform configuration")?;
    let slots = platform_config.num_partitions.max(1) as u64;
    platform.memory_mut().map_region("bitstreams", IMAGE_BASE, IMAGE_STRIDE * slots)?;

    // Build the job list
    let mut jobs = Vec::new();
    match &opts.image {
        Some(path) => {
            println!("Loading: {}", path);
            let data = std::fs::read(path).with_context(|| format!("reading {}", path))?;
            let image = BitstreamImage::from_bytes(&data)
                .with_context(|| format!("parsing bitstream image {}", path))?;
            let rp = opts.rp.unwrap_or_else(|| image.partition());
            if rp != image.partition() {
                log::warn!("image targets partition {}, loading into {}", image.partition(), rp);
            }
            let addr = IMAGE_BASE;
            image.install(platform.memory_mut(), addr);
            let job = LoadJob {
                partition: rp,
                bitstream_id: opts.id.unwrap_or_else(|| image.bitstream_id()),
                ..image.load_job(addr, timeout)
            };
            jobs.push((job, image));
        }
        None => {
            let partitions = platform_config.num_partitions as u32;
            let targets: Vec<u32> = match opts.rp {
                Some(rp) => vec![rp],
                None => (0..partitions).collect(),
            };
            for rp in targets {
                let id = opts.id.unwrap_or(0x100 + rp);
                let image = BitstreamImage::synthetic(rp, id, DEMO_WORDS);
                let addr = IMAGE_BASE + rp as u64 * IMAGE_STRIDE;
                image.install(platform.memory_mut(), addr);
                jobs.push((image.load_job(addr, timeout), image));
            }
        }
    }

    println!("{}", platform_config);
    println!();

    let mut failures = 0;
    for (job, image) in &jobs {
        let result = platform.host(HOST_BUDGET).load_bitstream(job);
        match result {
            Ok(cycles) => {
                let checksum_ok = platform
                    .config_port()
                    .sessions()
                    .last()
                    .is_some_and(|s| s.checksum == image.checksum());
                println!(
                    "RP {}: bitstream 0x{:x} loaded in {} cycles ({} words, checksum {})",
                    job.partition,
                    job.bitstream_id,
                    cycles,
                    image.payload().len(),
                    if checksum_ok { "ok" } else { "MISMATCH" }
                );
                if !checksum_ok {
                    failures += 1;
                }
            }
            Err(e) => {
                log::error!("RP {}: {}", job.partition, e);
                failures += 1;
                if let Err(e) = platform.host(HOST_BUDGET).clear_error() {
                    log::error!("clearing DFX error: {}", e);
                }
            }
        }
    }

    println!();
    platform.print_summary();

    if opts.dump_state {
        println!();
        dump_registers(&mut platform)?;
    }

    if failures > 0 {
        bail!("{} of {} jobs failed", failures, jobs.len());
    }
    Ok(())
}

/// Read back every named register over the host port.
fn dump_registers(platform: &mut Platform) -> anyhow::Result<()> {
    let blocks = [
        (RegisterModule::InterruptController, INTC_NUM_REGISTERS),
        (RegisterModule::DfxController, DFX_NUM_REGISTERS),
    ];

    println!("Register Dump");
    println!("=============");
    let mut host = platform.host(HOST_BUDGET);
    for (module, count) in blocks {
        println!("{}:", module);
        for index in 0..count {
            let Some(info) = RegisterInfo::lookup(module, index) else {
                continue;
            };
            let value = host
                .read_reg(module, index)
                .with_context(|| format!("reading {}", info.name))?;
            println!(
                "  0x{:04x} {:<12} = 0x{:08x}",
                LiteAddress::encode(module, index),
                info.name,
                value
            );
        }
    }
    Ok(())
}
