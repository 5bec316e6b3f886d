use crate::queue::HwQueue;
use crate::registry::DiskState;
use crate::util::{checked_range, sector_to_byte};
use crate::{Arena, Geometry, IoError, Operation, Request, Result, Segment, SegmentLimitPolicy};

/// What happened to one request: how many bytes were copied, and whether it completed.
///
/// `transferred` counts segments copied before a failure; those copies are not undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub transferred: u64,
    pub status: Result<()>,
}

/// Runs `req` to completion against `arena`.
///
/// Segments are processed strictly in order. The first segment that would cross the end of the
/// device fails the request; segments after it are not touched.
pub(crate) fn execute(arena: &mut Arena, geometry: &Geometry, req: &mut Request<'_>) -> Outcome {
    let mut transferred = 0u64;
    let status = run_segments(arena, geometry, req, &mut transferred);
    if let Err(err) = &status {
        tracing::debug!(
            op = %req.op,
            start_sector = req.start_sector,
            segments = req.segments.len(),
            transferred,
            "request failed: {err}"
        );
    }
    Outcome {
        transferred,
        status,
    }
}

fn run_segments(
    arena: &mut Arena,
    geometry: &Geometry,
    req: &mut Request<'_>,
    transferred: &mut u64,
) -> Result<()> {
    let op = req.op;
    if !matches!(op, Operation::Read | Operation::Write) {
        return Err(IoError::UnsupportedOperation(op));
    }
    if geometry.segment_limits() == SegmentLimitPolicy::Enforced {
        check_segment_limits(geometry, &req.segments)?;
    }

    let capacity = geometry.capacity_bytes();
    let mut pos = sector_to_byte(req.start_sector, geometry.sector_size())?;

    for (index, segment) in req.segments.iter_mut().enumerate() {
        let len = segment.len();
        let end = pos
            .checked_add(len as u64)
            .ok_or(IoError::OffsetOverflow)?;
        if end > capacity {
            return Err(IoError::OutOfBounds {
                offset: pos,
                len,
                capacity,
            });
        }

        match (op, segment) {
            (Operation::Read, Segment::Dest(buf)) => arena.read_at(pos, buf)?,
            (Operation::Write, Segment::Src(buf)) => arena.write_at(pos, buf)?,
            _ => return Err(IoError::SegmentDirection { index }),
        }

        pos = end;
        *transferred += len as u64;
    }

    Ok(())
}

fn check_segment_limits(geometry: &Geometry, segments: &[Segment<'_>]) -> Result<()> {
    let max = geometry.max_segments();
    if segments.len() > max as usize {
        return Err(IoError::TooManySegments {
            count: segments.len(),
            max,
        });
    }
    let max_size = geometry.max_segment_size();
    if let Some((index, seg)) = segments
        .iter()
        .enumerate()
        .find(|(_, seg)| seg.len() > max_size as usize)
    {
        return Err(IoError::SegmentTooLarge {
            index,
            len: seg.len(),
            max: max_size,
        });
    }
    Ok(())
}

/// A dispatch session bound to one hardware queue of a registered device.
///
/// Each call to [`Dispatcher::submit`] holds the device's arena lock for the whole request, so
/// concurrent requests never interleave and teardown cannot release the arena underneath one.
pub struct Dispatcher<'a> {
    state: &'a DiskState,
    queue: &'a HwQueue,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(state: &'a DiskState, queue: &'a HwQueue) -> Self {
        Self { state, queue }
    }

    pub fn queue_index(&self) -> usize {
        self.queue.index()
    }

    /// Executes `req` synchronously and returns the number of bytes transferred.
    pub fn submit(&self, mut req: Request<'_>) -> Result<u64> {
        if !self.state.is_online() {
            return Err(IoError::Offline);
        }
        let _slot = self.queue.start()?;

        let outcome = {
            let mut arena = self.state.lock_arena();
            match arena.as_mut() {
                Some(arena) => execute(arena, self.state.geometry(), &mut req),
                None => Outcome {
                    transferred: 0,
                    status: Err(IoError::Offline),
                },
            }
        };

        self.queue
            .account(req.op, outcome.transferred, outcome.status.is_ok());
        outcome.status.map(|()| outcome.transferred)
    }

    /// Byte-granular read, not restricted to sector alignment.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        self.with_arena(Operation::Read, offset, len, |arena| arena.read_at(offset, buf))
    }

    /// Byte-granular write, not restricted to sector alignment.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.with_arena(Operation::Write, offset, buf.len(), |arena| {
            arena.write_at(offset, buf)
        })
    }

    fn with_arena<F>(&self, op: Operation, offset: u64, len: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut Arena) -> Result<()>,
    {
        if !self.state.is_online() {
            return Err(IoError::Offline);
        }
        let _slot = self.queue.start()?;

        let status = checked_range(offset, len, self.state.geometry().capacity_bytes())
            .and_then(|()| match self.state.lock_arena().as_mut() {
                Some(arena) => f(arena),
                None => Err(IoError::Offline),
            });
        if let Err(err) = &status {
            tracing::debug!(%op, offset, len, "byte access failed: {err}");
        }

        let transferred = if status.is_ok() { len as u64 } else { 0 };
        self.queue.account(op, transferred, status.is_ok());
        status
    }
}
