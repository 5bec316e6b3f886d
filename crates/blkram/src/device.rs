use crate::dispatch::execute;
use crate::geometry::DEFAULT_CAPACITY_MB;
use crate::queue::{DEFAULT_NR_HW_QUEUES, DEFAULT_QUEUE_DEPTH};
use crate::{
    Arena, ConstructionError, Geometry, GeometryParams, Request, Result, SegmentLimitPolicy,
};

/// Construction-time parameters of a RAM disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Total capacity in MiB.
    pub capacity_mb: u64,
    pub geometry: GeometryParams,
    pub segment_limits: SegmentLimitPolicy,
    /// Number of hardware dispatch queues allocated at registration.
    pub nr_hw_queues: usize,
    /// Maximum in-flight requests per hardware queue.
    pub queue_depth: u32,
    /// Upper bound on the arena allocation. `None` only bounds it by what the allocator can
    /// provide.
    pub memory_limit_bytes: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capacity_mb: DEFAULT_CAPACITY_MB,
            geometry: GeometryParams::default(),
            segment_limits: SegmentLimitPolicy::Advisory,
            nr_hw_queues: DEFAULT_NR_HW_QUEUES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            memory_limit_bytes: None,
        }
    }
}

impl DeviceConfig {
    pub fn with_capacity_mb(capacity_mb: u64) -> Self {
        Self {
            capacity_mb,
            ..Self::default()
        }
    }
}

/// A constructed but not yet published RAM disk.
///
/// The device exclusively owns its arena. Dropping it (or calling [`Device::teardown`])
/// releases the arena; handing it to [`crate::Registry::register`] moves the arena into the
/// published disk.
#[derive(Debug)]
pub struct Device {
    geometry: Geometry,
    arena: Arena,
    nr_hw_queues: usize,
    queue_depth: u32,
}

impl Device {
    /// Validates `config` and allocates the arena.
    ///
    /// Validation happens before any allocation, and the arena is the only resource acquired
    /// here, so a failure never leaves anything behind.
    pub fn create(config: &DeviceConfig) -> std::result::Result<Self, ConstructionError> {
        let device = Self::build(config);
        if let Err(err) = &device {
            tracing::warn!(capacity_mb = config.capacity_mb, "ram disk creation failed: {err}");
        }
        device
    }

    fn build(config: &DeviceConfig) -> std::result::Result<Self, ConstructionError> {
        if config.nr_hw_queues == 0 {
            return Err(ConstructionError::InvalidConfig("nr_hw_queues must be > 0"));
        }
        if config.queue_depth == 0 {
            return Err(ConstructionError::InvalidConfig("queue_depth must be > 0"));
        }

        let geometry = Geometry::new(config.capacity_mb, config.geometry, config.segment_limits)?;
        let arena = Arena::allocate(geometry.capacity_bytes(), config.memory_limit_bytes)?;

        tracing::info!(
            capacity_mb = config.capacity_mb,
            capacity_sectors = geometry.capacity_sectors(),
            logical_block_size = geometry.logical_block_size(),
            "ram disk created"
        );

        Ok(Self {
            geometry,
            arena,
            nr_hw_queues: config.nr_hw_queues,
            queue_depth: config.queue_depth,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn capacity_sectors(&self) -> u64 {
        self.geometry.capacity_sectors()
    }

    pub fn nr_hw_queues(&self) -> usize {
        self.nr_hw_queues
    }

    pub fn queue_depth(&self) -> u32 {
        self.queue_depth
    }

    /// Dispatches a request directly against the unpublished device.
    ///
    /// Exclusive access makes locking unnecessary; the semantics are otherwise identical to
    /// [`crate::Dispatcher::submit`].
    pub fn dispatch(&mut self, mut req: Request<'_>) -> Result<u64> {
        let outcome = execute(&mut self.arena, &self.geometry, &mut req);
        outcome.status.map(|()| outcome.transferred)
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Releases a device that was never registered.
    pub fn teardown(self) {
        tracing::info!(
            capacity_sectors = self.geometry.capacity_sectors(),
            "unregistered ram disk released"
        );
    }

    pub(crate) fn into_parts(self) -> (Geometry, Arena) {
        (self.geometry, self.arena)
    }
}
