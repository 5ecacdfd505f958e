//! Error types shared by the image tools.
//!
//! Three layers:
//!
//! | Layer | Type | Raised by |
//! |-------|------|-----------|
//! | Flash emulation | `DeviceError`, `ImageError` | `region`, `device` |
//! | Filesystem | `FsError` | `littlefs2` calls in `session`, `mkfs`, `info` |
//! | Tools | `ConfigError`, `EntryError`, `MkfsError`, `InspectError` | `config`, `mkfs`, `info` |
//!
//! `FsError` wraps the `littlefs2` error and knows the status code littlefs
//! reports it as (see [`FsError::code`]); the builder prints these codes
//! verbatim in its step diagnostics.

use std::fmt;
use std::io;
use std::path::PathBuf;

use littlefs2::io::Error as LfsError;
use littlefs2::path::Error as PathError;
use thiserror::Error;

/// Out-of-range access against the image region.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("block {block} out of range (block count {block_count})")]
    BlockOutOfRange { block: u32, block_count: u32 },

    #[error("{len} bytes at offset {offset} cross the end of a {block_size}-byte block")]
    SpanOutOfRange {
        offset: u32,
        len: usize,
        block_size: u32,
    },
}

/// Failure to bring an image file into (or out of) memory.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image i/o: {0}")]
    Io(#[from] io::Error),

    #[error("image is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// A failed littlefs call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsError(pub LfsError);

impl FsError {
    /// Negative status code as the littlefs API reports it.
    #[allow(unreachable_patterns)]
    pub fn code(&self) -> i32 {
        -match self.0 {
            LfsError::Io => libc::EIO,
            LfsError::Corruption => libc::EILSEQ,
            LfsError::NoSuchEntry => libc::ENOENT,
            LfsError::EntryAlreadyExisted => libc::EEXIST,
            LfsError::PathNotDir => libc::ENOTDIR,
            LfsError::PathIsDir => libc::EISDIR,
            LfsError::DirNotEmpty => libc::ENOTEMPTY,
            LfsError::BadFileDescriptor => libc::EBADF,
            LfsError::FileTooBig => libc::EFBIG,
            LfsError::Invalid => libc::EINVAL,
            LfsError::NoSpace => libc::ENOSPC,
            LfsError::NoMemory => libc::ENOMEM,
            LfsError::NoAttribute => libc::ENODATA,
            LfsError::FilenameTooLong => libc::ENAMETOOLONG,
            LfsError::Unknown(code) => return code,
            _ => libc::EIO,
        }
    }
}

impl From<LfsError> for FsError {
    fn from(e: LfsError) -> Self {
        FsError(e)
    }
}

/// A name that cannot become a littlefs path never reaches the filesystem.
impl From<PathError> for FsError {
    fn from(e: PathError) -> Self {
        match e {
            PathError::TooLarge => FsError(LfsError::FilenameTooLong),
            _ => FsError(LfsError::Invalid),
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.0, self.code())
    }
}

impl std::error::Error for FsError {}

/// Status of a filesystem call: the success value mapped by `ok`, or the
/// negative error code.
pub fn status<T>(result: &Result<T, FsError>, ok: impl FnOnce(&T) -> i32) -> i32 {
    match result {
        Ok(v) => ok(v),
        Err(e) => e.code(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("invalid value for {section}.{key}: {reason}")]
    Value {
        section: &'static str,
        key: &'static str,
        reason: String,
    },

    #[error("geometry is fixed at build time: {0}")]
    Geometry(String),

    #[error("invalid layout: {0}")]
    Layout(String),
}

/// Why a single layout entry was left out of the image.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("cannot read source {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source {path} is larger than the {capacity}-byte copy buffer")]
    SourceTooLarge { path: PathBuf, capacity: usize },

    #[error("{path}: {source}")]
    Fs {
        path: String,
        #[source]
        source: FsError,
    },
}

/// Fatal builder failures.
#[derive(Debug, Error)]
pub enum MkfsError {
    #[error("output {0} already exists")]
    OutputExists(PathBuf),

    #[error("cannot write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Inspector phase a fatal failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Mount,
    DirOpen,
    DirRead,
    DirClose,
    Unmount,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Mount => "mount",
            Phase::DirOpen => "dirO",
            Phase::DirRead => "dirR",
            Phase::DirClose => "dirC",
            Phase::Unmount => "unmount",
        })
    }
}

/// Fatal inspector failures.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error("mount {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("{phase} {path} {}", .source.code())]
    Fs {
        phase: Phase,
        path: String,
        #[source]
        source: FsError,
    },

    #[error("cannot write listing: {0}")]
    Output(#[from] io::Error),
}

impl InspectError {
    pub fn phase(&self) -> Option<Phase> {
        match self {
            InspectError::Load { .. } => Some(Phase::Mount),
            InspectError::Fs { phase, .. } => Some(*phase),
            InspectError::Output(_) => None,
        }
    }
}
