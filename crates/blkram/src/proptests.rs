use crate::{
    Device, DeviceConfig, IoError, Registry, Request, VirtualDisk, MIB, SECTOR_SIZE,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

#[derive(Debug, Clone)]
enum Op {
    Write { offset: u64, data: Vec<u8> },
    Read { offset: u64, len: usize },
    /// Sector-addressed multi-segment write.
    WriteSegments { sector: u64, segments: Vec<Vec<u8>> },
    /// Sector-addressed multi-segment read.
    ReadSegments { sector: u64, lens: Vec<usize> },
}

const DISK_SIZE: u64 = MIB;
const MAX_OPS: usize = 48;
const MAX_RW_LEN: usize = 8 * 1024;
const SECTOR_U64: u64 = SECTOR_SIZE as u64;
const DISK_SECTORS: u64 = DISK_SIZE / SECTOR_U64;

fn offset_strategy() -> BoxedStrategy<u64> {
    let any = 0u64..=DISK_SIZE + 1024;
    let sector_aligned = (0u64..=DISK_SECTORS).prop_map(|lba| lba * SECTOR_U64);
    let near_end = (0u64..=2 * SECTOR_U64).prop_map(|delta| DISK_SIZE.saturating_sub(delta));

    prop_oneof![
        3 => any,
        2 => sector_aligned,
        2 => near_end,
    ]
    .boxed()
}

fn sector_strategy() -> BoxedStrategy<u64> {
    prop_oneof![
        3 => 0u64..DISK_SECTORS,
        2 => (DISK_SECTORS - 32)..=DISK_SECTORS + 4,
    ]
    .boxed()
}

fn segment_len_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![Just(0usize), Just(512), Just(4096), 1usize..=MAX_RW_LEN]
}

fn op_strategy() -> BoxedStrategy<Op> {
    prop_oneof![
        3 => (offset_strategy(), prop::collection::vec(any::<u8>(), 0..=MAX_RW_LEN))
            .prop_map(|(offset, data)| Op::Write { offset, data }),
        3 => (offset_strategy(), 0usize..=MAX_RW_LEN)
            .prop_map(|(offset, len)| Op::Read { offset, len }),
        2 => (
            sector_strategy(),
            prop::collection::vec(
                (segment_len_strategy(), any::<u8>()).prop_map(|(len, fill)| vec![fill; len]),
                0..=4,
            ),
        )
            .prop_map(|(sector, segments)| Op::WriteSegments { sector, segments }),
        2 => (sector_strategy(), prop::collection::vec(segment_len_strategy(), 0..=4))
            .prop_map(|(sector, lens)| Op::ReadSegments { sector, lens }),
    ]
    .boxed()
}

fn ops_strategy() -> BoxedStrategy<Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..=MAX_OPS).boxed()
}

fn in_bounds(offset: u64, len: usize) -> bool {
    offset
        .checked_add(len as u64)
        .is_some_and(|end| end <= DISK_SIZE)
}

/// Applies a segmented write to the reference model with the dispatcher's semantics: segments
/// up to the first one that crosses the end are applied, the rest are dropped.
fn model_write_segments(model: &mut [u8], sector: u64, segments: &[Vec<u8>]) -> bool {
    let mut pos = sector * SECTOR_U64;
    for seg in segments {
        if !in_bounds(pos, seg.len()) {
            return false;
        }
        let start = pos as usize;
        model[start..start + seg.len()].copy_from_slice(seg);
        pos += seg.len() as u64;
    }
    true
}

/// Runs `ops` against `disk` through the byte interface and `dispatch` for segmented requests.
fn run_ops<D, F>(mut disk: D, mut dispatch: F, ops: &[Op]) -> TestCaseResult
where
    D: VirtualDisk,
    F: FnMut(&mut D, Request<'_>) -> crate::Result<u64>,
{
    let mut model = vec![0u8; DISK_SIZE as usize];
    prop_assert_eq!(disk.capacity_bytes(), DISK_SIZE);

    for op in ops {
        match op {
            Op::Write { offset, data } => {
                let res = disk.write_at(*offset, data);
                if in_bounds(*offset, data.len()) {
                    prop_assert!(res.is_ok());
                    let start = *offset as usize;
                    model[start..start + data.len()].copy_from_slice(data);
                } else {
                    prop_assert!(matches!(res, Err(IoError::OutOfBounds { .. })), "expected OutOfBounds");
                }
            }
            Op::Read { offset, len } => {
                let mut buf = vec![0xCCu8; *len];
                let res = disk.read_at(*offset, &mut buf);
                if in_bounds(*offset, *len) {
                    prop_assert!(res.is_ok());
                    let start = *offset as usize;
                    prop_assert_eq!(&buf[..], &model[start..start + len]);
                } else {
                    prop_assert!(matches!(res, Err(IoError::OutOfBounds { .. })), "expected OutOfBounds");
                }
            }
            Op::WriteSegments { sector, segments } => {
                let req = Request::write(*sector, segments.iter().map(|s| &s[..]));
                let res = dispatch(&mut disk, req);
                let ok = model_write_segments(&mut model, *sector, segments);
                prop_assert_eq!(res.is_ok(), ok);
            }
            Op::ReadSegments { sector, lens } => {
                let mut bufs: Vec<Vec<u8>> = lens.iter().map(|len| vec![0xCCu8; *len]).collect();
                let req = Request::read(*sector, bufs.iter_mut().map(|b| &mut b[..]));
                let res = dispatch(&mut disk, req);

                let mut pos = sector * SECTOR_U64;
                let mut ok = true;
                for buf in &bufs {
                    if !in_bounds(pos, buf.len()) {
                        ok = false;
                        // Unprocessed segments are left as the caller filled them.
                        prop_assert!(buf.iter().all(|b| *b == 0xCC));
                        continue;
                    }
                    if ok {
                        let start = pos as usize;
                        prop_assert_eq!(&buf[..], &model[start..start + buf.len()]);
                    } else {
                        prop_assert!(buf.iter().all(|b| *b == 0xCC));
                    }
                    pos += buf.len() as u64;
                }
                prop_assert_eq!(res.is_ok(), ok);
            }
        }
    }

    // Final full comparison.
    let mut all = vec![0u8; DISK_SIZE as usize];
    disk.read_at(0, &mut all).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(all, model);
    Ok(())
}

fn config() -> DeviceConfig {
    DeviceConfig::with_capacity_mb(DISK_SIZE / MIB)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_device_matches_reference(ops in ops_strategy()) {
        let device = Device::create(&config()).unwrap();
        run_ops(device, |device, req| device.dispatch(req), &ops)?;
    }

    #[test]
    fn prop_registered_disk_matches_reference(ops in ops_strategy()) {
        let registry = Registry::default();
        let handle = registry.bring_up(&config()).unwrap();
        let disk = handle.disk();
        run_ops(disk, |disk, req| disk.queue(0)?.submit(req), &ops)?;
        handle.teardown();
        prop_assert!(registry.is_empty());
    }
}
