//! Configuration loader for initfs.
//!
//! Both tools read an optional `config.ini` describing the directory layout
//! the builder creates. Every key is optional; a missing key keeps the
//! reference value.
//!
//! ```ini
//! [layout]
//! root = fido
//! file_name = 00
//! entries = x5c:./fido.crt, sec:./fido.key
//! ```
//!
//! The flash geometry is not configurable. It is compiled into the storage
//! driver (see [`crate::device`]) so builder and inspector always agree on
//! it, and a `[geometry]` section is refused.

use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use littlefs2::consts::PATH_MAX;

use crate::error::ConfigError;

/// Minimum read unit in bytes.
pub const READ_SIZE: usize = 4;

/// Minimum program unit in bytes.
pub const PROG_SIZE: usize = 4;

/// Erase unit of the reference flash region.
pub const BLOCK_SIZE: usize = 0x1000;

/// Size of the reference filesystem region in bytes.
pub const FILESYSTEM_SIZE: usize = 0x20000;

pub const BLOCK_COUNT: usize = FILESYSTEM_SIZE / BLOCK_SIZE;

/// Erase cycles before metadata is relocated; -1 disables wear leveling.
pub const BLOCK_CYCLES: isize = -1;

/// One subdirectory of the layout and the file that seeds its single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub dir: String,
    pub source: PathBuf,
}

/// Directory tree the builder creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Working directory created under `/`.
    pub root: String,
    /// Name of the file created inside every entry directory.
    pub file_name: String,
    pub entries: Vec<LayoutEntry>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            root: "fido".into(),
            file_name: "00".into(),
            entries: vec![
                LayoutEntry {
                    dir: "x5c".into(),
                    source: PathBuf::from("./fido.crt"),
                },
                LayoutEntry {
                    dir: "sec".into(),
                    source: PathBuf::from("./fido.key"),
                },
            ],
        }
    }
}

impl Layout {
    /// Absolute path of the working directory.
    pub fn root_path(&self) -> String {
        format!("/{}", self.root)
    }

    pub fn dir_path(&self, entry: &LayoutEntry) -> String {
        format!("/{}/{}", self.root, entry.dir)
    }

    pub fn file_path(&self, entry: &LayoutEntry) -> String {
        format!("/{}/{}/{}", self.root, entry.dir, self.file_name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let plain = |name: &str| !name.is_empty() && !name.contains('/') && name != "." && name != "..";

        if !plain(&self.root) {
            return Err(ConfigError::Layout(format!("bad root name {:?}", self.root)));
        }
        if !plain(&self.file_name) {
            return Err(ConfigError::Layout(format!(
                "bad file name {:?}",
                self.file_name
            )));
        }
        if self.entries.is_empty() {
            return Err(ConfigError::Layout("no entries".into()));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if !plain(&entry.dir) {
                return Err(ConfigError::Layout(format!("bad entry name {:?}", entry.dir)));
            }
            let path = self.file_path(entry);
            if !path.is_ascii() || path.len() > PATH_MAX {
                return Err(ConfigError::Layout(format!(
                    "{:?} is not an ascii path of at most {} bytes",
                    path, PATH_MAX
                )));
            }
            if self.entries[..i].iter().any(|e| e.dir == entry.dir) {
                return Err(ConfigError::Layout(format!("duplicate entry {:?}", entry.dir)));
            }
        }
        Ok(())
    }
}

/// Everything read from `config.ini`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageConfig {
    pub layout: Layout,
}

/// Loads and validates `config.ini` from `path`.
pub fn load_config(path: &Path) -> Result<ImageConfig, ConfigError> {
    let mut ini = Ini::new();
    ini.load(path).map_err(|reason| ConfigError::Load {
        path: path.to_path_buf(),
        reason,
    })?;
    from_ini(&ini)
}

/// Parses and validates INI text.
pub fn parse_config(text: &str) -> Result<ImageConfig, ConfigError> {
    let mut ini = Ini::new();
    ini.read(text.to_string()).map_err(|reason| ConfigError::Load {
        path: PathBuf::from("<inline>"),
        reason,
    })?;
    from_ini(&ini)
}

fn from_ini(ini: &Ini) -> Result<ImageConfig, ConfigError> {
    if ini.sections().iter().any(|s| s == "geometry") {
        return Err(ConfigError::Geometry(format!(
            "images are always {} blocks of {} bytes",
            BLOCK_COUNT, BLOCK_SIZE
        )));
    }

    // [layout]
    let mut layout = Layout::default();
    if let Some(root) = ini.get("layout", "root") {
        layout.root = root;
    }
    if let Some(file_name) = ini.get("layout", "file_name") {
        layout.file_name = file_name;
    }
    if let Some(raw) = ini.get("layout", "entries") {
        layout.entries = parse_list(&raw)
            .into_iter()
            .map(|item| parse_entry(&item))
            .collect::<Result<_, _>>()?;
    }
    layout.validate()?;

    Ok(ImageConfig { layout })
}

/// Parses `dir:source` as one layout entry.
fn parse_entry(item: &str) -> Result<LayoutEntry, ConfigError> {
    match item.split_once(':') {
        Some((dir, source)) if !dir.trim().is_empty() && !source.trim().is_empty() => {
            Ok(LayoutEntry {
                dir: dir.trim().to_string(),
                source: PathBuf::from(source.trim()),
            })
        }
        _ => Err(ConfigError::Value {
            section: "layout",
            key: "entries",
            reason: format!("expected dir:source, got {:?}", item),
        }),
    }
}

/// Parses a comma separated list like `"x5c:a.crt, sec:a.key"` into
/// `["x5c:a.crt", "sec:a.key"]`.
fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
