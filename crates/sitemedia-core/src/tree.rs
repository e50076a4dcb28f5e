//! The batch tree as the pipeline sees it.
//!
//! A live run reads and mutates the filesystem directly. A dry run never
//! touches it; instead every would-be move, write and removal is recorded in an
//! in-memory overlay that later existence checks and directory listings
//! consult. Both modes go through the same calls, so collision probing and
//! enumeration give the same answers either way.
//!
//! With an output root, DateBuckets and staging live there instead and the
//! batch root is only read.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use sha2::{Digest, Sha256};

/// Hidden directory under the batch root holding interchange conversions
pub const STAGING_DIR: &str = ".sitemedia-staging";

/// A directory entry, real or planned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl TreeEntry {
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct Planned {
    path: PathBuf,
    /// Real file holding the content; `None` when it only exists in memory
    backing: Option<PathBuf>,
}

#[derive(Debug)]
pub struct BatchTree {
    root: PathBuf,
    output: Option<PathBuf>,
    dry_run: bool,
    planned: Vec<Planned>,
    vacated: HashSet<PathBuf>,
}

impl BatchTree {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            output: None,
            dry_run,
            planned: Vec::new(),
            vacated: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Place DateBuckets under `output` and leave the batch root untouched.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Where DateBuckets are created
    pub fn destination_root(&self) -> &Path {
        self.output.as_deref().unwrap_or(&self.root)
    }

    /// Sources are copied, never moved or removed
    pub fn keeps_sources(&self) -> bool {
        self.output.is_some()
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.destination_root().join(STAGING_DIR)
    }

    fn planned(&self, path: &Path) -> Option<&Planned> {
        self.planned.iter().rev().find(|p| p.path == path)
    }

    /// Whether `path` exists, taking planned changes into account.
    pub fn exists(&self, path: &Path) -> bool {
        if self.planned(path).is_some() {
            return true;
        }
        if self.vacated.contains(path) {
            return false;
        }
        path.symlink_metadata().is_ok()
    }

    /// The real file holding the content of `path`.
    pub fn backing(&self, path: &Path) -> PathBuf {
        match self.planned(path) {
            Some(Planned {
                backing: Some(real),
                ..
            }) => real.clone(),
            _ => path.to_path_buf(),
        }
    }

    /// Entries directly inside `dir`, in filesystem order followed by planned
    /// arrivals in the order they were planned. A missing directory is empty.
    pub fn entries(&self, dir: &Path) -> io::Result<Vec<TreeEntry>> {
        let mut out = Vec::new();
        match fs::read_dir(dir) {
            Ok(read) => {
                for entry in read {
                    let entry = entry?;
                    let path = entry.path();
                    if self.vacated.contains(&path) || self.planned(&path).is_some() {
                        continue;
                    }
                    let is_dir = entry.file_type()?.is_dir();
                    out.push(TreeEntry { path, is_dir });
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        for planned in &self.planned {
            if planned.path.parent() == Some(dir) {
                out.push(TreeEntry {
                    path: planned.path.clone(),
                    is_dir: false,
                });
            }
        }
        Ok(out)
    }

    /// Read the content behind `path`.
    pub fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some(planned) = self.planned(path) {
            return match &planned.backing {
                Some(real) => fs::read(real),
                None => Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} only exists in the dry-run plan", path.display()),
                )),
            };
        }
        fs::read(path)
    }

    /// Byte-preserving move. Falls back to copy + verify + delete when a plain
    /// rename is not possible (e.g. across devices).
    pub fn move_file(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        if self.dry_run {
            let backing = match self.planned(from) {
                Some(planned) => planned.backing.clone(),
                None => Some(from.to_path_buf()),
            };
            self.forget(from);
            self.planned.push(Planned {
                path: to.to_path_buf(),
                backing,
            });
            return Ok(());
        }
        ensure_parent(to)?;
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(err) => {
                log::debug!(
                    "rename {} -> {} failed ({}), copying instead",
                    from.display(),
                    to.display(),
                    err
                );
                copy_verified(from, to)?;
                if let Err(err) = fs::remove_file(from) {
                    log::warn!("Copied but could not remove {}: {}", from.display(), err);
                }
                Ok(())
            }
        }
    }

    /// Verified copy to a new file `to`; the source stays where it is.
    pub fn copy_file(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        if self.dry_run {
            let backing = match self.planned(from) {
                Some(planned) => planned.backing.clone(),
                None => Some(from.to_path_buf()),
            };
            self.vacated.remove(to);
            self.planned.push(Planned {
                path: to.to_path_buf(),
                backing,
            });
            return Ok(());
        }
        copy_verified(from, to)
    }

    /// Write `bytes` to a new file at `path`. The write goes to a temporary
    /// sibling first, is read back and hash-checked, and only then takes the
    /// final name. `path` must not exist. On failure nothing is left behind.
    pub fn write_file(&mut self, path: &Path, bytes: &[u8], mtime: Option<FileTime>) -> io::Result<()> {
        if self.dry_run {
            self.vacated.remove(path);
            self.planned.push(Planned {
                path: path.to_path_buf(),
                backing: None,
            });
            return Ok(());
        }
        let dir = ensure_parent(path)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".sitemedia-")
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        let expected = hex::encode(Sha256::digest(bytes));
        let written = sha256_file(tmp.path())?;
        if written != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("verification of {} failed", path.display()),
            ));
        }
        if let Some(mtime) = mtime {
            filetime::set_file_mtime(tmp.path(), mtime).ok();
        }
        tmp.persist_noclobber(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        if self.dry_run {
            self.forget(path);
            return Ok(());
        }
        fs::remove_file(path)
    }

    /// Remove an empty directory.
    pub fn remove_dir(&mut self, path: &Path) -> io::Result<()> {
        if self.dry_run {
            if !self.entries(path)?.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not empty", path.display()),
                ));
            }
            self.vacated.insert(path.to_path_buf());
            return Ok(());
        }
        fs::remove_dir(path)
    }

    fn forget(&mut self, path: &Path) {
        self.planned.retain(|p| p.path != path);
        self.vacated.insert(path.to_path_buf());
    }
}

fn ensure_parent(path: &Path) -> io::Result<&Path> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    fs::create_dir_all(dir)?;
    Ok(dir)
}

/// Copy `from` to a new file `to`, verifying the copy's SHA-256 against the
/// source before it takes its final name. Keeps the source modify-time.
pub fn copy_verified(from: &Path, to: &Path) -> io::Result<()> {
    let dir = ensure_parent(to)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".sitemedia-")
        .tempfile_in(dir)?;
    io::copy(&mut File::open(from)?, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;

    if sha256_file(from)? != sha256_file(tmp.path())? {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("copy of {} does not match its source", from.display()),
        ));
    }
    let meta = fs::metadata(from)?;
    filetime::set_file_mtime(tmp.path(), FileTime::from_last_modification_time(&meta)).ok();
    tmp.persist_noclobber(to).map_err(|e| e.error)?;
    Ok(())
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
