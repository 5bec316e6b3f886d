use anyhow::{bail, Context};
use blkram::{
    DeviceConfig, DiskHandle, GeometryParams, Registry, SegmentLimitPolicy,
    DEFAULT_CAPACITY_MB, DEFAULT_DISK_NAME, DEFAULT_MAX_HW_SECTORS, DEFAULT_MAX_SEGMENTS,
    DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_NR_HW_QUEUES, DEFAULT_PAGE_SIZE, DEFAULT_QUEUE_DEPTH,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const DEFAULT_TEST_LEN: usize = 4096;

#[derive(Parser, Debug)]
#[command(
    name = "blkram",
    version,
    about = "Bring up a RAM-backed block device, write a test pattern, read it back and tear the device down."
)]
struct Args {
    /// Device capacity in MiB
    #[arg(long, env = "BLKRAM_CAPACITY_MB", default_value_t = DEFAULT_CAPACITY_MB)]
    capacity_mb: u64,

    /// Advisory maximum number of segments per request
    #[arg(long, env = "BLKRAM_MAX_SEGMENTS", default_value_t = DEFAULT_MAX_SEGMENTS)]
    max_segments: u32,

    /// Advisory maximum segment length in bytes
    #[arg(long, env = "BLKRAM_MAX_SEGMENT_SIZE", default_value_t = DEFAULT_MAX_SEGMENT_SIZE)]
    max_segment_size: u32,

    /// Logical block size in bytes
    #[arg(long = "lbs", env = "BLKRAM_LBS", default_value_t = DEFAULT_PAGE_SIZE)]
    logical_block_size: u32,

    /// Physical block size in bytes
    #[arg(long = "pbs", env = "BLKRAM_PBS", default_value_t = DEFAULT_PAGE_SIZE)]
    physical_block_size: u32,

    /// Maximum sectors per hardware request
    #[arg(long, env = "BLKRAM_MAX_HW_SECTORS", default_value_t = DEFAULT_MAX_HW_SECTORS)]
    max_hw_sectors: u32,

    /// Number of hardware dispatch queues
    #[arg(long, env = "BLKRAM_NR_HW_QUEUES", default_value_t = DEFAULT_NR_HW_QUEUES)]
    nr_hw_queues: usize,

    /// In-flight requests allowed per hardware queue
    #[arg(long, env = "BLKRAM_QUEUE_DEPTH", default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: u32,

    /// Reject requests over max_segments / max_segment_size instead of only reporting them
    #[arg(long, env = "BLKRAM_ENFORCE_SEGMENT_LIMITS", action = clap::ArgAction::SetTrue)]
    enforce_segment_limits: bool,

    /// Refuse to allocate an arena larger than this many bytes
    #[arg(long, env = "BLKRAM_MEMORY_LIMIT_BYTES", value_name = "BYTES")]
    memory_limit_bytes: Option<u64>,

    /// Base name devices are published under
    #[arg(long, env = "BLKRAM_NAME", default_value = DEFAULT_DISK_NAME)]
    name: String,

    /// Byte offset of the self-check write
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    offset: u64,

    /// Length of the self-check write
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_TEST_LEN)]
    len: usize,

    /// Fill byte of the self-check pattern
    #[arg(long, default_value_t = b'A')]
    pattern: u8,

    /// Log filter (tracing-subscriber EnvFilter syntax); falls back to RUST_LOG, then "info"
    #[arg(long, env = "BLKRAM_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            capacity_mb: self.capacity_mb,
            geometry: GeometryParams {
                logical_block_size: self.logical_block_size,
                physical_block_size: self.physical_block_size,
                max_segments: self.max_segments,
                max_segment_size: self.max_segment_size,
                max_hw_sectors: self.max_hw_sectors,
            },
            segment_limits: if self.enforce_segment_limits {
                SegmentLimitPolicy::Enforced
            } else {
                SegmentLimitPolicy::Advisory
            },
            nr_hw_queues: self.nr_hw_queues,
            queue_depth: self.queue_depth,
            memory_limit_bytes: self.memory_limit_bytes,
        }
    }
}

fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());
    run(&args)
}

fn run(args: &Args) -> anyhow::Result<()> {
    let registry = Registry::new(args.name.clone());
    let handle = registry
        .bring_up(&args.device_config())
        .context("bring up ram disk")?;

    let geometry = handle.geometry();
    println!(
        "{}: {} sectors ({} MiB), lbs={} pbs={} max_segments={} max_segment_size={} max_hw_sectors={}",
        handle.path().display(),
        geometry.capacity_sectors(),
        args.capacity_mb,
        geometry.logical_block_size(),
        geometry.physical_block_size(),
        geometry.max_segments(),
        geometry.max_segment_size(),
        geometry.max_hw_sectors(),
    );

    let disk = registry
        .lookup(handle.name())
        .with_context(|| format!("{} vanished from the registry", handle.name()))?;
    let result = self_check(&disk, args.offset, args.len, args.pattern);

    let stats = disk.stats();
    println!(
        "requests={} ok={} io_errors={} bytes_read={} bytes_written={}",
        stats.requests, stats.completed_ok, stats.io_errors, stats.bytes_read, stats.bytes_written
    );

    handle.teardown();
    result
}

/// Write a filled buffer, read it back from the same offset and compare.
fn self_check(disk: &DiskHandle, offset: u64, len: usize, pattern: u8) -> anyhow::Result<()> {
    let capacity = disk.capacity_bytes();
    let fits = u64::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .is_some_and(|end| end <= capacity);
    if !fits {
        bail!(
            "{len} bytes at offset {offset} is out of bounds for {} ({capacity} bytes)",
            disk.name()
        );
    }
    let written = vec![pattern; len];

    println!("Writing {len} bytes at offset {offset}...");
    let n = disk
        .write(offset, &written)
        .with_context(|| format!("write {len} bytes at offset {offset} to {}", disk.name()))?;
    println!("Successfully wrote {n} bytes to {}.", disk.name());

    println!("Reading {len} bytes at offset {offset}...");
    let read = disk
        .read(offset, len)
        .with_context(|| format!("read {len} bytes at offset {offset} from {}", disk.name()))?;
    println!("Successfully read {} bytes from {}.", read.len(), disk.name());

    if read != written {
        bail!("data read does not match data written");
    }
    println!("Data read matches data written. Test passed!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library_defaults() {
        let args = Args::parse_from(["blkram"]);
        assert_eq!(args.device_config(), DeviceConfig::default());
        assert_eq!(args.name, "blkram");
        assert_eq!(args.len, 4096);
        assert_eq!(args.pattern, b'A');
    }

    #[test]
    fn enforce_flag_switches_policy() {
        let args = Args::parse_from(["blkram", "--enforce-segment-limits", "--capacity-mb", "2"]);
        let config = args.device_config();
        assert_eq!(config.segment_limits, SegmentLimitPolicy::Enforced);
        assert_eq!(config.capacity_mb, 2);
    }

    #[test]
    fn self_check_passes_and_reports_out_of_range() {
        let registry = Registry::default();
        let handle = registry
            .bring_up(&DeviceConfig::with_capacity_mb(1))
            .unwrap();
        let disk = handle.disk();

        self_check(&disk, 0, 4096, b'A').unwrap();
        let err = self_check(&disk, disk.capacity_bytes() - 4095, 4096, b'A').unwrap_err();
        assert!(format!("{err:#}").contains("out of bounds"));

        let err = self_check(&disk, 0, usize::MAX, b'A').unwrap_err();
        assert!(format!("{err:#}").contains("out of bounds"));
    }
}
