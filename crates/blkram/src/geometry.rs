use crate::ConstructionError;

/// Size of the addressing unit used by [`crate::Request::start_sector`].
pub const SECTOR_SIZE: usize = 512;
pub const SECTOR_SHIFT: u32 = 9;

/// Block size reported when none is configured (the usual host page size).
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

pub const MIB: u64 = 1 << 20;

pub const DEFAULT_CAPACITY_MB: u64 = 40;
pub const DEFAULT_MAX_SEGMENTS: u32 = 32;
pub const DEFAULT_MAX_SEGMENT_SIZE: u32 = 64 * 1024;
pub const DEFAULT_MAX_HW_SECTORS: u32 = 64;

/// Whether the dispatcher enforces `max_segments` / `max_segment_size`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmentLimitPolicy {
    /// Limits are reported to callers but never checked on the dispatch path.
    #[default]
    Advisory,
    /// Requests over either limit fail before the arena is touched.
    Enforced,
}

/// Caller-supplied geometry, validated into a [`Geometry`] at device creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryParams {
    pub logical_block_size: u32,
    pub physical_block_size: u32,
    pub max_segments: u32,
    pub max_segment_size: u32,
    pub max_hw_sectors: u32,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            logical_block_size: DEFAULT_PAGE_SIZE,
            physical_block_size: DEFAULT_PAGE_SIZE,
            max_segments: DEFAULT_MAX_SEGMENTS,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_hw_sectors: DEFAULT_MAX_HW_SECTORS,
        }
    }
}

/// Validated, immutable description of how a device is accessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    params: GeometryParams,
    capacity_sectors: u64,
    segment_limits: SegmentLimitPolicy,
}

impl Geometry {
    /// Derives `capacity_sectors` from `capacity_mb` and validates `params` against it.
    ///
    /// A MiB is a whole number of 512-byte sectors, so the derivation never rounds.
    pub fn new(
        capacity_mb: u64,
        params: GeometryParams,
        segment_limits: SegmentLimitPolicy,
    ) -> Result<Self, ConstructionError> {
        if capacity_mb == 0 {
            return Err(ConstructionError::InvalidCapacity);
        }
        let capacity_bytes = capacity_mb
            .checked_mul(MIB)
            .ok_or(ConstructionError::InvalidCapacity)?;

        validate_block_size(params.logical_block_size)?;
        validate_block_size(params.physical_block_size)?;
        if params.physical_block_size < params.logical_block_size {
            return Err(ConstructionError::InvalidGeometry(
                "physical_block_size must be >= logical_block_size",
            ));
        }
        if capacity_bytes % u64::from(params.logical_block_size) != 0 {
            return Err(ConstructionError::InvalidGeometry(
                "capacity must be a multiple of logical_block_size",
            ));
        }
        if params.max_segments == 0 {
            return Err(ConstructionError::InvalidGeometry("max_segments must be > 0"));
        }
        if params.max_segment_size == 0 {
            return Err(ConstructionError::InvalidGeometry(
                "max_segment_size must be > 0",
            ));
        }
        if u64::from(params.max_segment_size) > capacity_bytes {
            return Err(ConstructionError::InvalidGeometry(
                "max_segment_size must not exceed device capacity",
            ));
        }
        if params.max_hw_sectors == 0 {
            return Err(ConstructionError::InvalidGeometry(
                "max_hw_sectors must be > 0",
            ));
        }

        Ok(Self {
            params,
            capacity_sectors: capacity_bytes >> SECTOR_SHIFT,
            segment_limits,
        })
    }

    pub fn capacity_sectors(&self) -> u64 {
        self.capacity_sectors
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_sectors << SECTOR_SHIFT
    }

    pub fn sector_size(&self) -> u64 {
        SECTOR_SIZE as u64
    }

    pub fn logical_block_size(&self) -> u32 {
        self.params.logical_block_size
    }

    pub fn physical_block_size(&self) -> u32 {
        self.params.physical_block_size
    }

    pub fn max_segments(&self) -> u32 {
        self.params.max_segments
    }

    pub fn max_segment_size(&self) -> u32 {
        self.params.max_segment_size
    }

    pub fn max_hw_sectors(&self) -> u32 {
        self.params.max_hw_sectors
    }

    pub fn segment_limits(&self) -> SegmentLimitPolicy {
        self.segment_limits
    }

    pub fn params(&self) -> GeometryParams {
        self.params
    }
}

fn validate_block_size(size: u32) -> Result<(), ConstructionError> {
    if size == 0 {
        return Err(ConstructionError::InvalidGeometry("block sizes must be > 0"));
    }
    if !size.is_power_of_two() {
        return Err(ConstructionError::InvalidGeometry(
            "block sizes must be powers of two",
        ));
    }
    if (size as usize) < SECTOR_SIZE {
        return Err(ConstructionError::InvalidGeometry(
            "block sizes must be >= 512 bytes",
        ));
    }
    Ok(())
}
