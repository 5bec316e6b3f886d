use thiserror::Error;

use crate::Operation;

pub type Result<T> = std::result::Result<T, IoError>;

/// Failure while bringing a [`crate::Device`] into existence.
///
/// Construction is all-or-nothing: when one of these is returned, nothing allocated along the
/// way is still alive.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("invalid capacity: capacity_mb must be > 0")]
    InvalidCapacity,

    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("out of memory allocating {bytes} byte arena")]
    OutOfMemory { bytes: u64 },
}

/// Failure while publishing a device through a [`crate::Registry`].
///
/// The device passed to `register` is consumed and released before this is returned.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("device index space exhausted (max {max} devices)")]
    IndexExhausted { max: u32 },

    #[error("registry failure: {0}")]
    RegistryFailure(String),
}

/// Per-request failure. The device stays usable after any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: usize,
        capacity: u64,
    },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("unaligned buffer length {len} (expected multiple of {alignment})")]
    UnalignedLength { len: usize, alignment: usize },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(Operation),

    /// A read was given a source buffer, or a write a destination buffer.
    #[error("segment {index} buffer direction does not match the request operation")]
    SegmentDirection { index: usize },

    #[error("request has {count} segments (max {max})")]
    TooManySegments { count: usize, max: u32 },

    #[error("segment {index} is {len} bytes (max {max})")]
    SegmentTooLarge { index: usize, len: usize, max: u32 },

    #[error("hardware queue {queue} is full (depth {depth})")]
    QueueFull { queue: usize, depth: u32 },

    #[error("no such hardware queue {queue} (device has {count})")]
    NoSuchQueue { queue: usize, count: usize },

    /// The device was torn down; the arena is gone.
    #[error("device is offline")]
    Offline,
}

/// Error from [`crate::Registry::bring_up`], which constructs and registers in one step.
#[derive(Debug, Error)]
pub enum BringUpError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
