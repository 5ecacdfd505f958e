//! Image inspector: mounts an image and prints its tree without writing to it.
//!
//! Output is one line per entry, depth first, parents before children:
//!
//! ```text
//! + d 000000 fido
//!   + d 000000 x5c
//!     + f 0002a1 00
//! ```
//!
//! Sizes are six hex digits and directories always show 0. The "." and ".."
//! entries are neither printed nor followed.

use std::io::Write;
use std::path::Path;

use littlefs2::driver::Storage;
use littlefs2::fs::{Filesystem, ReadDir};

use crate::error::{FsError, InspectError, Phase};
use crate::session::{lfs_path, Session};

fn fs_error(phase: Phase, path: &str) -> impl FnOnce(FsError) -> InspectError + '_ {
    move |source| InspectError::Fs {
        phase,
        path: path.to_string(),
        source,
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Prints the whole tree of a mounted filesystem, starting at `/`.
pub fn print_tree<S: Storage>(
    fs: &Filesystem<'_, S>,
    out: &mut impl Write,
) -> Result<(), InspectError> {
    walk(fs, out, "/", 0)
}

/// Lists one directory level. littlefs closes the handle on both paths and
/// reports a failed close over a listing error.
fn walk<S: Storage>(
    fs: &Filesystem<'_, S>,
    out: &mut impl Write,
    path: &str,
    depth: usize,
) -> Result<(), InspectError> {
    let dir = lfs_path(path).map_err(fs_error(Phase::DirOpen, path))?;
    let mut opened = false;
    let listed = fs.read_dir_and_then(&dir, |entries| {
        opened = true;
        Ok(list_entries(fs, out, entries, path, depth))
    });
    match listed {
        Ok(listed) => listed,
        Err(e) if opened => Err(fs_error(Phase::DirClose, path)(e.into())),
        Err(e) => Err(fs_error(Phase::DirOpen, path)(e.into())),
    }
}

fn list_entries<S: Storage>(
    fs: &Filesystem<'_, S>,
    out: &mut impl Write,
    entries: &mut ReadDir<'_, '_, S>,
    path: &str,
    depth: usize,
) -> Result<(), InspectError> {
    for entry in entries {
        let entry = entry.map_err(|e| fs_error(Phase::DirRead, path)(e.into()))?;
        let name = entry.file_name().to_string();
        let is_dir = entry.file_type().is_dir();
        if is_dir && (name == "." || name == "..") {
            continue;
        }

        let size = if is_dir { 0 } else { entry.metadata().len() };
        writeln!(
            out,
            "{:indent$}+ {} {:06x} {}",
            "",
            if is_dir { 'd' } else { 'f' },
            size,
            name,
            indent = depth * 2
        )?;

        if is_dir {
            walk(fs, out, &join(path, &name), depth + 1)?;
        }
    }
    Ok(())
}

/// Loads `image`, mounts it, prints its tree to `out` and unmounts.
///
/// Nothing is written back: the image file is only read, and the region the
/// filesystem mounts over is dropped at the end.
pub fn run_info(image: &Path, out: &mut impl Write) -> Result<(), InspectError> {
    let image_name = image.display().to_string();

    let mut session = Session::from_image(image).map_err(|source| InspectError::Load {
        path: image.to_path_buf(),
        source,
    })?;

    let mut alloc = Filesystem::allocate();
    let fs = Filesystem::mount(&mut alloc, session.device_mut())
        .map_err(|e| fs_error(Phase::Mount, &image_name)(e.into()))?;
    let listed = print_tree(&fs, out);
    // dropping the mount is littlefs's unmount, which only frees state
    drop(fs);
    listed?;

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;

    fn listing(session: &mut Session) -> String {
        let mut out = Vec::<u8>::new();
        Filesystem::mount_and_then(session.device_mut(), |fs| {
            print_tree(fs, &mut out).unwrap();
            Ok(())
        })
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    fn formatted_with(build: impl FnOnce(&Filesystem<'_, crate::device::RegionDevice>)) -> Session {
        let mut session = Session::blank();
        session.format().unwrap();
        Filesystem::mount_and_then(session.device_mut(), |fs| {
            build(fs);
            Ok(())
        })
        .unwrap();
        session
    }

    fn mkdir(fs: &Filesystem<'_, impl Storage>, path: &str) {
        fs.create_dir(&lfs_path(path).unwrap()).unwrap();
    }

    fn touch(fs: &Filesystem<'_, impl Storage>, path: &str, len: usize) {
        fs.open_file_with_options_and_then(
            |o| o.write(true).create(true),
            &lfs_path(path).unwrap(),
            |file| file.write(&vec![0x5a; len]),
        )
        .unwrap();
    }

    #[test]
    fn prints_nested_tree_depth_first() {
        let mut session = formatted_with(|fs| {
            mkdir(fs, "/a");
            mkdir(fs, "/a/b");
            touch(fs, "/a/b/deep", 0x1234);
            touch(fs, "/a/top", 1);
            mkdir(fs, "/z");
        });

        assert_eq!(
            listing(&mut session),
            "+ d 000000 a\n\
             \x20 + d 000000 b\n\
             \x20   + f 001234 deep\n\
             \x20 + f 000001 top\n\
             + d 000000 z\n"
        );
    }

    #[test]
    fn empty_filesystem_prints_nothing() {
        let mut session = formatted_with(|_| {});
        assert_eq!(listing(&mut session), "");
    }

    #[test]
    fn missing_directory_fails_at_dir_open() {
        let mut session = formatted_with(|_| {});
        let err = Filesystem::mount_and_then(session.device_mut(), |fs| {
            Ok(walk(fs, &mut Vec::<u8>::new(), "/fido", 0))
        })
        .unwrap()
        .unwrap_err();
        assert_eq!(err.phase(), Some(Phase::DirOpen));
        assert_eq!(err.to_string(), "dirO /fido -2");
    }

    #[test]
    fn blank_image_fails_at_mount() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.bin");
        Session::blank().persist(&path).unwrap();

        let err = run_info(&path, &mut Vec::<u8>::new()).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Mount));
        assert!(matches!(
            err,
            InspectError::Fs { source, .. } if source.code() == -84
        ));
    }

    #[test]
    fn scrambled_metadata_fails_at_mount() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrambled.bin");
        let mut session = formatted_with(|fs| mkdir(fs, "/fido"));

        // overwrite both superblock copies with a pattern that is no commit
        let mut bytes = session.device_mut().region().as_bytes().to_vec();
        for (i, b) in bytes[..2 * crate::config::BLOCK_SIZE].iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37) ^ 0x5c;
        }
        std::fs::write(&path, &bytes).unwrap();

        let mut out = Vec::<u8>::new();
        let err = run_info(&path, &mut out).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Mount));
        assert!(matches!(
            err,
            InspectError::Fs { source, .. } if source.code() == -84
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn truncated_image_fails_at_mount() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, vec![0xff; 4096]).unwrap();

        let mut out = Vec::<u8>::new();
        let err = run_info(&path, &mut out).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Mount));
        assert!(matches!(
            err,
            InspectError::Load {
                source: ImageError::SizeMismatch { actual: 4096, .. },
                ..
            }
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn join_avoids_double_slash() {
        assert_eq!(join("/", "fido"), "/fido");
        assert_eq!(join("/fido", "x5c"), "/fido/x5c");
    }
}
