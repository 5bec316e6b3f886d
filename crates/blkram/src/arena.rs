use crate::util::{checked_range, to_index};
use crate::{ConstructionError, Result};

/// Owned, zero-initialised backing store of a RAM disk.
///
/// The arena knows nothing about sectors or segments. Every access is bounds checked against its
/// own length, independently of any check the caller has already made.
pub struct Arena {
    data: Vec<u8>,
}

impl Arena {
    /// Allocates `len` zeroed bytes.
    ///
    /// `limit` caps the allocation; a larger request fails exactly like a real allocation
    /// failure.
    pub fn allocate(len: u64, limit: Option<u64>) -> std::result::Result<Self, ConstructionError> {
        let oom = ConstructionError::OutOfMemory { bytes: len };
        if limit.is_some_and(|limit| len > limit) {
            return Err(oom);
        }
        let len_usize = usize::try_from(len).map_err(|_| ConstructionError::OutOfMemory {
            bytes: len,
        })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len_usize).map_err(|_| oom)?;
        data.resize(len_usize, 0);
        Ok(Self { data })
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        checked_range(offset, buf.len(), self.len())?;
        let start = to_index(offset)?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        checked_range(offset, buf.len(), self.len())?;
        let start = to_index(offset)?;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena").field("len", &self.data.len()).finish()
    }
}
