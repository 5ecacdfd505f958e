//! The image region: one contiguous buffer holding every block of the
//! emulated flash, in block order.
//!
//! Physical offset of `(block, offset)` is `block * block_size + offset`.
//! All access goes through [`ImageRegion::span`], which refuses anything that
//! would leave the addressed block.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;

use crate::error::{DeviceError, ImageError};

/// Value of every byte of an erased block.
pub const BLANK: u8 = 0xFF;

#[derive(Debug, Clone)]
pub struct ImageRegion {
    bytes: Vec<u8>,
    block_size: u32,
    block_count: u32,
}

impl ImageRegion {
    /// Region of `block_count` erased blocks.
    pub fn blank(block_size: u32, block_count: u32) -> Self {
        Self {
            bytes: vec![BLANK; block_size as usize * block_count as usize],
            block_size,
            block_count,
        }
    }

    /// Wraps existing image bytes; the length must be exactly
    /// `block_size * block_count`.
    pub fn from_bytes(block_size: u32, block_count: u32, bytes: Vec<u8>) -> Result<Self, ImageError> {
        let expected = block_size as usize * block_count as usize;
        if bytes.len() != expected {
            return Err(ImageError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes,
            block_size,
            block_count,
        })
    }

    /// Reads an image file. Shorter or longer files are rejected rather than
    /// padded, a truncated image never mounts.
    pub fn load(block_size: u32, block_count: u32, path: &Path) -> Result<Self, ImageError> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let expected = block_size as usize * block_count as usize;
        if len != expected as u64 {
            return Err(ImageError::SizeMismatch {
                expected,
                actual: usize::try_from(len).unwrap_or(usize::MAX),
            });
        }

        let mut bytes = Vec::with_capacity(expected);
        file.read_to_end(&mut bytes)?;
        Self::from_bytes(block_size, block_count, bytes)
    }

    /// Writes the whole region to a new file. Fails if `path` exists.
    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(&self.bytes)?;
        file.sync_all()
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte range backing `len` bytes at `offset` inside `block`.
    pub fn span(&self, block: u32, offset: u32, len: usize) -> Result<Range<usize>, DeviceError> {
        if block >= self.block_count {
            return Err(DeviceError::BlockOutOfRange {
                block,
                block_count: self.block_count,
            });
        }
        let end = (offset as usize).checked_add(len);
        match end {
            Some(end) if end <= self.block_size as usize => {
                let base = block as usize * self.block_size as usize;
                Ok(base + offset as usize..base + end)
            }
            _ => Err(DeviceError::SpanOutOfRange {
                offset,
                len,
                block_size: self.block_size,
            }),
        }
    }

    pub fn get(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }

    pub fn get_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.bytes[range]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ImageRegion {
        ImageRegion::blank(256, 4)
    }

    #[test]
    fn blank_region_is_erased() {
        let region = small();
        assert_eq!(region.as_bytes().len(), 1024);
        assert!(region.as_bytes().iter().all(|b| *b == BLANK));
    }

    #[test]
    fn span_translates_block_and_offset() {
        let region = small();
        assert_eq!(region.span(0, 0, 256).unwrap(), 0..256);
        assert_eq!(region.span(2, 16, 4).unwrap(), 528..532);
        assert_eq!(region.span(3, 256, 0).unwrap(), 1024..1024);
    }

    #[test]
    fn span_rejects_out_of_range() {
        let region = small();
        assert_eq!(
            region.span(4, 0, 1),
            Err(DeviceError::BlockOutOfRange {
                block: 4,
                block_count: 4
            })
        );
        assert_eq!(
            region.span(1, 250, 7),
            Err(DeviceError::SpanOutOfRange {
                offset: 250,
                len: 7,
                block_size: 256
            })
        );
        assert!(region.span(0, u32::MAX, usize::MAX).is_err());
    }

    #[test]
    fn from_bytes_checks_length() {
        assert!(matches!(
            ImageRegion::from_bytes(256, 4, vec![0; 1023]),
            Err(ImageError::SizeMismatch {
                expected: 1024,
                actual: 1023
            })
        ));
        assert!(ImageRegion::from_bytes(256, 4, vec![0; 1024]).is_ok());
    }

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.bin");

        let mut region = small();
        let range = region.span(1, 0, 3).unwrap();
        region.get_mut(range).copy_from_slice(b"abc");
        region.persist(&path).unwrap();

        let loaded = ImageRegion::load(256, 4, &path).unwrap();
        assert_eq!(loaded.as_bytes(), region.as_bytes());
    }

    #[test]
    fn persist_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.bin");
        std::fs::write(&path, b"keep").unwrap();

        let region = small();
        let err = region.persist(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn load_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.bin");
        std::fs::write(&path, vec![BLANK; 100]).unwrap();

        assert!(matches!(
            ImageRegion::load(256, 4, &path),
            Err(ImageError::SizeMismatch { actual: 100, .. })
        ));
    }
}
