//! A session owns one image region for the lifetime of a tool run, wrapped
//! in the storage driver the filesystem is mounted over.
//!
//! `littlefs2` borrows its storage for as long as it is mounted, so the
//! session hands out the device and each tool scopes its own mount.

use std::path::Path;

use littlefs2::fs::Filesystem;
use littlefs2::path::{Path as LfsPath, PathBuf as LfsPathBuf};

use crate::device::RegionDevice;
use crate::error::{FsError, ImageError};
use crate::region::ImageRegion;

pub struct Session {
    device: RegionDevice,
}

impl Session {
    /// Fresh session over an erased region, as the builder starts from.
    pub fn blank() -> Self {
        Self {
            device: RegionDevice::blank(),
        }
    }

    /// Session over an existing image file, as the inspector starts from.
    pub fn from_image(path: &Path) -> Result<Self, ImageError> {
        Ok(Self {
            device: RegionDevice::load(path)?,
        })
    }

    /// Writes fresh filesystem metadata over the whole region.
    pub fn format(&mut self) -> Result<(), FsError> {
        Filesystem::format(&mut self.device)?;
        Ok(())
    }

    pub fn device_mut(&mut self) -> &mut RegionDevice {
        &mut self.device
    }

    pub fn region(&self) -> &ImageRegion {
        self.device.region()
    }

    /// Writes the whole region to `path`, which must not exist yet.
    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        self.region().persist(path)
    }
}

/// Converts an absolute path string to a littlefs path, refusing names
/// littlefs cannot store instead of panicking on them.
pub fn lfs_path(path: &str) -> Result<LfsPathBuf, FsError> {
    let mut bytes = Vec::with_capacity(path.len() + 1);
    bytes.extend_from_slice(path.as_bytes());
    bytes.push(0);
    Ok(LfsPathBuf::from(LfsPath::from_bytes_with_nul(&bytes)?))
}
