use crate::{IoError, Result};

/// Fails with [`IoError::OutOfBounds`] unless `[offset, offset + len)` lies within `capacity`.
///
/// An empty range ending exactly at `capacity` is in bounds.
pub fn checked_range(offset: u64, len: usize, capacity: u64) -> Result<()> {
    let len_u64 = u64::try_from(len).map_err(|_| IoError::OffsetOverflow)?;
    let end = offset.checked_add(len_u64).ok_or(IoError::OffsetOverflow)?;
    if end > capacity {
        return Err(IoError::OutOfBounds {
            offset,
            len,
            capacity,
        });
    }
    Ok(())
}

pub fn sector_to_byte(sector: u64, sector_size: u64) -> Result<u64> {
    sector.checked_mul(sector_size).ok_or(IoError::OffsetOverflow)
}

/// Converts a byte offset that has already passed [`checked_range`] into a slice index.
pub fn to_index(offset: u64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| IoError::OffsetOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_range_allows_range_ending_at_capacity() {
        assert!(checked_range(0, 4096, 4096).is_ok());
        assert!(checked_range(4096, 0, 4096).is_ok());
        assert!(checked_range(4000, 96, 4096).is_ok());
    }

    #[test]
    fn checked_range_rejects_one_byte_past_capacity() {
        assert_eq!(
            checked_range(4001, 96, 4096).unwrap_err(),
            IoError::OutOfBounds {
                offset: 4001,
                len: 96,
                capacity: 4096
            }
        );
        assert!(matches!(
            checked_range(4097, 0, 4096).unwrap_err(),
            IoError::OutOfBounds { .. }
        ));
    }

    #[test]
    fn checked_range_reports_overflow() {
        assert_eq!(
            checked_range(u64::MAX, 1, u64::MAX).unwrap_err(),
            IoError::OffsetOverflow
        );
    }

    #[test]
    fn sector_to_byte_reports_overflow() {
        assert_eq!(sector_to_byte(3, 512).unwrap(), 1536);
        assert_eq!(
            sector_to_byte(u64::MAX / 2, 512).unwrap_err(),
            IoError::OffsetOverflow
        );
    }
}
