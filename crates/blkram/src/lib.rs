//! RAM-backed block storage engine.
//!
//! A fixed-capacity byte arena presented as a block device. Requests are addressed in
//! 512-byte sectors, carry one or more caller-owned segments, and complete synchronously.
//!
//! - [`Device`]: a constructed RAM disk (geometry + arena), see [`Device::create`]
//! - [`Registry`]: publishes devices under stable names and owns their teardown
//! - [`Dispatcher`]: executes [`Request`]s on one hardware queue of a published disk
//! - [`DiskHandle`]: byte-level `read`/`write` surface for external callers
//! - [`VirtualDisk`]: byte-addressed disk interface with sector helpers
//!
//! Requests against one disk are serialized by a single lock around its arena.

mod arena;
mod device;
mod disk;
mod dispatch;
mod error;
mod geometry;
mod queue;
mod registry;
mod request;
mod util;

pub use arena::Arena;
pub use device::{Device, DeviceConfig};
pub use disk::VirtualDisk;
pub use dispatch::Dispatcher;
pub use error::{BringUpError, ConstructionError, IoError, RegistrationError, Result};
pub use geometry::{
    Geometry, GeometryParams, SegmentLimitPolicy, DEFAULT_CAPACITY_MB, DEFAULT_MAX_HW_SECTORS,
    DEFAULT_MAX_SEGMENTS, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_PAGE_SIZE, MIB, SECTOR_SHIFT,
    SECTOR_SIZE,
};
pub use queue::{HwQueue, QueueSet, QueueStats, DEFAULT_NR_HW_QUEUES, DEFAULT_QUEUE_DEPTH};
pub use registry::{
    DiskHandle, IndexAllocator, Registry, RegistrationHandle, DEFAULT_DISK_NAME,
    DEFAULT_MAX_DEVICES,
};
pub use request::{Operation, Request, Segment};

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
