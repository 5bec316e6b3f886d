use crate::util::sector_to_byte;
use crate::{Device, DiskHandle, IoError, Result, SECTOR_SIZE};

/// Byte-addressed disk interface with sector helpers.
pub trait VirtualDisk {
    fn capacity_bytes(&self) -> u64;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    fn capacity_sectors(&self) -> u64 {
        self.capacity_bytes() / SECTOR_SIZE as u64
    }

    fn read_sectors(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        check_sector_multiple(buf.len())?;
        let offset = sector_to_byte(lba, SECTOR_SIZE as u64)?;
        self.read_at(offset, buf)
    }

    fn write_sectors(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        check_sector_multiple(buf.len())?;
        let offset = sector_to_byte(lba, SECTOR_SIZE as u64)?;
        self.write_at(offset, buf)
    }
}

fn check_sector_multiple(len: usize) -> Result<()> {
    if len % SECTOR_SIZE != 0 {
        return Err(IoError::UnalignedLength {
            len,
            alignment: SECTOR_SIZE,
        });
    }
    Ok(())
}

impl VirtualDisk for Device {
    fn capacity_bytes(&self) -> u64 {
        self.geometry().capacity_bytes()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.arena().read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.arena_mut().write_at(offset, buf)
    }
}

/// Goes through hardware queue 0.
impl VirtualDisk for DiskHandle {
    fn capacity_bytes(&self) -> u64 {
        DiskHandle::capacity_bytes(self)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.queue(0)?.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.queue(0)?.write_at(offset, buf)
    }
}
