//! Narrow filesystem interface consumed by the evaluator and pruner.
//!
//! The core never touches `std::fs` directly: it sees the tree through four
//! primitives (stat, list, remove_file, remove_dir), which keeps the decision
//! algorithm testable against injected failures.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::errors::{Result, StpError};

/// Kind of a filesystem entry as the pruner sees it.
///
/// Symlinks are reported as `File` leaves carrying the link's own metadata;
/// targets are never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata returned by the probe: entry kind plus the two age timestamps.
#[derive(Debug, Clone, Copy)]
pub struct EntryStat {
    pub kind: EntryKind,
    pub mtime: SystemTime,
    pub atime: SystemTime,
}

/// The four primitives the core consumes.
pub trait Filesystem {
    /// Probe one entry's kind and timestamps.
    fn stat(&self, path: &Path) -> Result<EntryStat>;
    /// List a directory's immediate children.
    fn list(&self, path: &Path) -> Result<Vec<PathBuf>>;
    /// Remove a single file (or symlink).
    fn remove_file(&self, path: &Path) -> Result<()>;
    /// Remove a single, empty directory. Non-recursive on purpose: the pruner
    /// deletes children first, so a non-empty failure here is a race signal.
    fn remove_dir(&self, path: &Path) -> Result<()>;
}

/// Production implementation over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl Filesystem for RealFs {
    fn stat(&self, path: &Path) -> Result<EntryStat> {
        // symlink_metadata: links are classified by their own inode, never
        // by the target.
        let meta = fs::symlink_metadata(path).map_err(|source| StpError::Probe {
            path: path.to_path_buf(),
            source,
        })?;
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let mtime = meta.modified().map_err(|source| StpError::Probe {
            path: path.to_path_buf(),
            source,
        })?;
        // Platforms without atime (or noatime mounts reporting epoch) still
        // return a value; accessed() only errors where the platform has no
        // concept of it at all.
        let atime = meta.accessed().unwrap_or(mtime);
        Ok(EntryStat { kind, mtime, atime })
    }

    fn list(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(path).map_err(|source| StpError::List {
            path: path.to_path_buf(),
            source,
        })?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StpError::List {
                path: path.to_path_buf(),
                source,
            })?;
            children.push(entry.path());
        }
        // Listing order is filesystem-dependent; sort for deterministic
        // verdict traversal and reporting.
        children.sort();
        Ok(children)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            // Vanished between evaluation and pruning: the goal state holds.
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StpError::Removal {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        match fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => Err(StpError::RaceNotEmpty {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(StpError::Removal {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
