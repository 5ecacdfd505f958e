//! Block device contract, its in-memory implementation over an
//! [`ImageRegion`], and the `littlefs2` storage driver built on it.
//!
//! Flash semantics: `erase` is block granular and the only way to turn bits
//! back to 1; `program` and `read` are byte addressed inside one block.
//! The adapter does not check that programmed bytes were erased first, that
//! is the filesystem's contract to keep.
//!
//! littlefs addresses storage by absolute byte offset. The driver splits
//! that into `(block, offset)` and goes through [`BlockDevice`], so every
//! access is bounds checked and traced the same way.

use std::path::Path;

use littlefs2::consts::{U256, U4};
use littlefs2::io::{Error as LfsError, Result as LfsResult};
use log::{trace, warn};

use crate::config::{self, BLOCK_COUNT, BLOCK_SIZE};
use crate::error::{DeviceError, ImageError};
use crate::region::{ImageRegion, BLANK};

pub trait BlockDevice {
    fn block_size(&self) -> u32;

    /// Copies `buf.len()` bytes starting at `offset` inside `block`.
    fn read(&self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Overwrites `data.len()` bytes starting at `offset` inside `block`.
    fn program(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), DeviceError>;

    /// Resets every byte of `block` to the blank value.
    fn erase(&mut self, block: u32) -> Result<(), DeviceError>;

    fn sync(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn lock(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Memory-backed flash. Sync, lock and unlock are no-ops: nothing is cached
/// and only one owner ever touches the region.
#[derive(Debug)]
pub struct RegionDevice {
    region: ImageRegion,
}

impl RegionDevice {
    /// Erased region of the reference geometry.
    pub fn blank() -> Self {
        Self {
            region: ImageRegion::blank(BLOCK_SIZE as u32, BLOCK_COUNT as u32),
        }
    }

    /// Image file of the reference geometry.
    pub fn load(path: &Path) -> Result<Self, ImageError> {
        Ok(Self {
            region: ImageRegion::load(BLOCK_SIZE as u32, BLOCK_COUNT as u32, path)?,
        })
    }

    /// Wraps a region of any geometry. Only the [`BlockDevice`] side is
    /// usable unless it matches the reference one.
    pub fn with_region(region: ImageRegion) -> Self {
        Self { region }
    }

    pub fn region(&self) -> &ImageRegion {
        &self.region
    }
}

impl BlockDevice for RegionDevice {
    fn block_size(&self) -> u32 {
        self.region.block_size()
    }

    fn read(&self, block: u32, offset: u32, buf: &mut [u8]) -> Result<(), DeviceError> {
        trace!("F RD {:02x}+{:04x} {:04x}", block, offset, buf.len());
        let range = self.region.span(block, offset, buf.len())?;
        buf.copy_from_slice(self.region.get(range));
        Ok(())
    }

    fn program(&mut self, block: u32, offset: u32, data: &[u8]) -> Result<(), DeviceError> {
        trace!("F WR {:02x}+{:04x} {:04x}", block, offset, data.len());
        let range = self.region.span(block, offset, data.len())?;
        self.region.get_mut(range).copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, block: u32) -> Result<(), DeviceError> {
        trace!("F ER {:02x}", block);
        let range = self.region.span(block, 0, self.block_size() as usize)?;
        self.region.get_mut(range).fill(BLANK);
        Ok(())
    }
}

/// Splits an absolute byte offset into `(block, offset)`.
fn locate(off: usize) -> LfsResult<(u32, u32)> {
    let block = u32::try_from(off / BLOCK_SIZE).map_err(|_| LfsError::Io)?;
    Ok((block, (off % BLOCK_SIZE) as u32))
}

fn refused(e: DeviceError) -> LfsError {
    warn!("flash access refused: {}", e);
    LfsError::Io
}

impl littlefs2::driver::Storage for RegionDevice {
    const READ_SIZE: usize = config::READ_SIZE;
    const WRITE_SIZE: usize = config::PROG_SIZE;
    const BLOCK_SIZE: usize = config::BLOCK_SIZE;
    const BLOCK_COUNT: usize = config::BLOCK_COUNT;
    const BLOCK_CYCLES: isize = config::BLOCK_CYCLES;

    type CACHE_SIZE = U256;
    // 4 x 64 bits: one lookahead bit per block, 256 blocks per scan
    type LOOKAHEAD_SIZE = U4;

    fn read(&mut self, off: usize, buf: &mut [u8]) -> LfsResult<usize> {
        let (block, offset) = locate(off)?;
        BlockDevice::read(self, block, offset, buf).map_err(refused)?;
        Ok(buf.len())
    }

    fn write(&mut self, off: usize, data: &[u8]) -> LfsResult<usize> {
        let (block, offset) = locate(off)?;
        self.program(block, offset, data).map_err(refused)?;
        Ok(data.len())
    }

    fn erase(&mut self, off: usize, len: usize) -> LfsResult<usize> {
        if off % BLOCK_SIZE != 0 || len % BLOCK_SIZE != 0 {
            warn!("unaligned erase {:#x}+{:#x}", off, len);
            return Err(LfsError::Invalid);
        }
        let (first, _) = locate(off)?;
        for block in first..first + (len / BLOCK_SIZE) as u32 {
            BlockDevice::erase(self, block).map_err(refused)?;
        }
        Ok(len)
    }
}
