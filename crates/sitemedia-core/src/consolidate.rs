//! Phase 1: flatten every folder that is not a DateBucket into the batch root.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::audit::{AuditLog, AuditRecord, Method};
use crate::destination;
use crate::error::MediaError;
use crate::folder_classify::{is_date_bucket, is_hidden};
use crate::media::is_eligible;
use crate::tree::{BatchTree, TreeEntry};
use crate::ThrottledProgress;

/// What happened to a consolidated folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOutcome {
    Removed,
    /// Something other than media was left inside
    Retained,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub moved: usize,
    pub failed: usize,
    pub folders_removed: usize,
    pub folders_retained: usize,
}

/// Path order, not read_dir order, so dry and live runs pick the same suffixes
fn sorted(mut entries: Vec<TreeEntry>) -> Vec<TreeEntry> {
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// Folders directly under the root that Phase 1 empties.
pub fn folders_to_consolidate(tree: &BatchTree) -> Result<Vec<PathBuf>> {
    Ok(sorted(tree.entries(tree.root())?)
        .into_iter()
        .filter(|e| e.is_dir && !is_hidden(e.name()) && !is_date_bucket(e.name()))
        .map(|e| e.path)
        .collect())
}

/// Move the media directly inside each non-bucket folder to the root, then
/// remove folders left empty. Files already inside a DateBucket are never
/// touched. Only a failure to write the audit log is returned as an error.
pub fn consolidate(
    tree: &mut BatchTree,
    audit: &mut AuditLog,
    progress: &ThrottledProgress,
) -> Result<ConsolidationReport> {
    let mut report = ConsolidationReport::default();
    let folders = folders_to_consolidate(tree)?;
    let total = folders.len() as u64;

    for (i, folder) in folders.iter().enumerate() {
        let name = folder.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        progress.report("consolidate", i as u64, total, name);

        consolidate_folder(tree, audit, folder, &mut report)?;
        let outcome = finish_folder(tree, folder);
        settle_folder(audit, folder, outcome, &mut report)?;
    }
    progress.finish("consolidate", total);

    log::info!(
        "Consolidation: {} moved, {} failed, {} folders removed, {} kept",
        report.moved,
        report.failed,
        report.folders_removed,
        report.folders_retained
    );
    Ok(report)
}

fn consolidate_folder(
    tree: &mut BatchTree,
    audit: &mut AuditLog,
    folder: &Path,
    report: &mut ConsolidationReport,
) -> Result<()> {
    let entries = match tree.entries(folder) {
        Ok(entries) => sorted(entries),
        Err(err) => {
            log::warn!("Could not list {}: {}", folder.display(), err);
            audit.append(&AuditRecord::new(folder, Method::Consolidate).failed(err))?;
            report.failed += 1;
            return Ok(());
        }
    };

    let root = tree.root().to_path_buf();
    for entry in entries {
        if entry.is_dir || is_hidden(entry.name()) || !is_eligible(&entry.path) {
            continue;
        }
        let record = AuditRecord::new(&entry.path, Method::Consolidate);
        let moved = destination::resolve(tree, &root, entry.name(), None).and_then(|to| {
            tree.move_file(&entry.path, &to)
                .map(|()| to)
                .map_err(|e| MediaError::io(&entry.path, e))
        });
        match moved {
            Ok(to) => {
                log::debug!("{} -> {}", entry.path.display(), to.display());
                audit.append(&record.moved_to(&to))?;
                report.moved += 1;
            }
            Err(err) => {
                log::warn!("Could not move {}: {}", entry.path.display(), err);
                audit.append(&record.failed(err))?;
                report.failed += 1;
            }
        }
    }
    Ok(())
}

/// Record what became of a folder. A folder that could not be removed is
/// simply retained; only the log hears about it.
fn settle_folder(
    audit: &mut AuditLog,
    folder: &Path,
    outcome: std::io::Result<FolderOutcome>,
    report: &mut ConsolidationReport,
) -> Result<()> {
    match outcome {
        Ok(FolderOutcome::Removed) => {
            log::info!("Removed empty folder {}", folder.display());
            audit.append(&AuditRecord::new(folder, Method::RemoveFolder))?;
            report.folders_removed += 1;
        }
        Ok(FolderOutcome::Retained) => {
            log::debug!("{} still has other content, kept", folder.display());
            report.folders_retained += 1;
        }
        Err(err) => {
            log::warn!("Could not remove {}, kept: {}", folder.display(), err);
            report.folders_retained += 1;
        }
    }
    Ok(())
}

fn finish_folder(tree: &mut BatchTree, folder: &Path) -> std::io::Result<FolderOutcome> {
    if !tree.entries(folder)?.is_empty() {
        return Ok(FolderOutcome::Retained);
    }
    tree.remove_dir(folder)?;
    Ok(FolderOutcome::Removed)
}
