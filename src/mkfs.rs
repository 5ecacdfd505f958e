//! Image builder: formats a blank region, creates the layout's directory
//! tree, copies one source file into each entry directory and writes the
//! region out as a new image file.
//!
//! Only the output file is fatal. Every filesystem call is recorded as a
//! [`Step`] with its status code, and a failing entry is skipped while the
//! rest of the layout is still built.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use littlefs2::driver::Storage;
use littlefs2::fs::Filesystem;
use log::{debug, warn};

use crate::config::{ImageConfig, Layout};
use crate::error::{status, EntryError, FsError, MkfsError};
use crate::session::{lfs_path, Session};

/// Size of the copy buffer. Larger sources are refused, never truncated.
pub const SOURCE_CAPACITY: usize = 4096;

/// One filesystem call and the status it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub label: String,
    pub code: i32,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} done, ret: {}", self.label, self.code)
    }
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub steps: Vec<Step>,
    /// Entries left out of the image, in layout order.
    pub skipped: Vec<EntryError>,
}

impl BuildReport {
    fn record<T>(
        &mut self,
        label: impl Into<String>,
        result: &Result<T, FsError>,
        ok: impl FnOnce(&T) -> i32,
    ) {
        let step = Step {
            label: label.into(),
            code: status(result, ok),
        };
        debug!("{}", step);
        self.steps.push(step);
    }

    /// Status of the first step labelled `label`.
    pub fn code(&self, label: &str) -> Option<i32> {
        self.steps.iter().find(|s| s.label == label).map(|s| s.code)
    }

    fn skip(&mut self, err: EntryError) {
        warn!("skipping entry: {}", err);
        self.skipped.push(err);
    }
}

/// Reads a whole source file, refusing anything over `capacity` bytes.
pub fn read_source(path: &Path, capacity: usize) -> Result<Vec<u8>, EntryError> {
    let source = |source| EntryError::Source {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(source)?;

    // one byte past capacity tells an exact fit from an oversized file
    let mut buf = Vec::with_capacity(capacity + 1);
    file.take(capacity as u64 + 1)
        .read_to_end(&mut buf)
        .map_err(source)?;
    if buf.len() > capacity {
        return Err(EntryError::SourceTooLarge {
            path: path.to_path_buf(),
            capacity,
        });
    }
    Ok(buf)
}

/// Formats and mounts the session's filesystem, builds `layout` in it and
/// unmounts again.
///
/// If mounting fails nothing else can be issued: every entry is skipped with
/// the mount error and no unmount step is recorded.
pub fn populate(session: &mut Session, layout: &Layout) -> BuildReport {
    let mut report = BuildReport::default();

    let r = session.format();
    report.record("format", &r, |_| 0);

    let mut alloc = Filesystem::allocate();
    let mounted = Filesystem::mount(&mut alloc, session.device_mut()).map_err(FsError::from);
    report.record("mount", &mounted, |_| 0);
    let fs = match mounted {
        Ok(fs) => fs,
        Err(source) => {
            for entry in &layout.entries {
                report.skip(EntryError::Fs {
                    path: layout.file_path(entry),
                    source,
                });
            }
            return report;
        }
    };

    let dirs = std::iter::once(layout.root_path())
        .chain(layout.entries.iter().map(|e| layout.dir_path(e)));
    for dir in dirs {
        let r = lfs_path(&dir).and_then(|p| Ok(fs.create_dir(&p)?));
        report.record(format!("mkdir {}", dir), &r, |_| 0);
    }

    for entry in &layout.entries {
        let path = layout.file_path(entry);

        let data = match read_source(&entry.source, SOURCE_CAPACITY) {
            Ok(data) => data,
            Err(err) => {
                report.skip(err);
                continue;
            }
        };

        if let Err(source) = write_file(&fs, &path, &data, &mut report) {
            report.skip(EntryError::Fs { path, source });
        }
    }

    // dropping the mount is littlefs's unmount, which only frees state
    drop(fs);
    report.record("unmount", &Ok::<(), FsError>(()), |_| 0);
    report
}

/// Creates (or truncates) `path` and writes `data` into it, recording the
/// open, write and close steps. A failed open records only itself.
fn write_file<S: Storage>(
    fs: &Filesystem<'_, S>,
    path: &str,
    data: &[u8],
    report: &mut BuildReport,
) -> Result<(), FsError> {
    let mut written = None;
    let closed = lfs_path(path).and_then(|p| {
        fs.open_file_with_options_and_then(
            |o| o.write(true).create(true).truncate(true),
            &p,
            |file| {
                written = Some(file.write(data).map_err(FsError::from));
                Ok(())
            },
        )
        .map_err(FsError::from)
    });

    let open = format!("open {}", path);
    let written = match written {
        Some(written) => written,
        None => {
            report.record(open, &closed, |_| 0);
            return closed;
        }
    };
    report.record(open, &Ok::<(), FsError>(()), |_| 0);
    report.record("file write", &written, |n| {
        i32::try_from(*n).unwrap_or(i32::MAX)
    });
    report.record("file close", &closed, |_| 0);

    written.map(|_| ()).and(closed)
}

/// Fails if `output` exists. Checked before any work so an existing image
/// is never touched.
pub fn check_output(output: &Path) -> Result<(), MkfsError> {
    if output.symlink_metadata().is_ok() {
        return Err(MkfsError::OutputExists(output.to_path_buf()));
    }
    Ok(())
}

/// Builds the layout in a blank region.
pub fn build(config: &ImageConfig) -> (Session, BuildReport) {
    let mut session = Session::blank();
    let report = populate(&mut session, &config.layout);
    (session, report)
}

/// Writes the built region to `output` in one piece, creating the file.
pub fn write_image(session: &Session, output: &Path) -> Result<(), MkfsError> {
    session.persist(output).map_err(|source| match source.kind() {
        ErrorKind::AlreadyExists => MkfsError::OutputExists(output.to_path_buf()),
        _ => MkfsError::Output {
            path: output.to_path_buf(),
            source,
        },
    })?;
    debug!(
        "wrote {} bytes to {}",
        session.region().as_bytes().len(),
        output.display()
    );
    Ok(())
}

/// Builds a complete image at `output`.
///
/// `output` must not exist; it is checked before any work and again when the
/// file is created, and an existing file is never modified.
pub fn run_mkfs(output: &Path, config: &ImageConfig) -> Result<BuildReport, MkfsError> {
    check_output(output)?;
    let (session, report) = build(config);
    write_image(&session, output)?;
    Ok(report)
}
