pub mod audit;
pub mod codec;
pub mod consolidate;
pub mod date;
pub mod destination;
pub mod error;
pub mod folder_classify;
pub mod media;
pub mod naming;
pub mod tagging;
pub mod transact;
pub mod tree;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::audit::AuditLog;
use crate::codec::{Codec, ImageCodec};
use crate::folder_classify::is_hidden;
use crate::media::is_eligible;
use crate::tagging::ranker::{LabelRanker, NoRanker};
use crate::tagging::ContentTagger;
use crate::transact::{MediaTransactor, Outcome};
use crate::tree::BatchTree;

/// Output format for still images
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Keep the source format (legacy containers still become JPEG)
    #[default]
    #[value(aliases = ["source", "original"])]
    Auto,
    #[value(alias = "jpeg")]
    Jpg,
    Png,
}

impl FromStr for TargetFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" | "source" | "original" => Ok(TargetFormat::Auto),
            "jpg" | "jpeg" => Ok(TargetFormat::Jpg),
            "png" => Ok(TargetFormat::Png),
            other => bail!("Unknown target format: {}", other),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetFormat::Auto => "auto",
            TargetFormat::Jpg => "jpg",
            TargetFormat::Png => "png",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Batch root, organized in place
    pub root: PathBuf,
    #[serde(default)]
    pub target_format: TargetFormat,
    /// Candidate labels for the classifier; empty means the built-in list
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    /// Only organize media directly inside this folder of the root
    #[serde(default)]
    pub folder: Option<String>,
    /// Only organize these files
    #[serde(default)]
    pub files: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
    /// Build DateBuckets here by copying, leaving the batch root untouched
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Stop after this many files
    #[serde(default)]
    pub max_files: Option<usize>,
}

impl ProcessOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            target_format: TargetFormat::Auto,
            tags: Vec::new(),
            dry_run: false,
            folder: None,
            files: None,
            audit_log: None,
            output: None,
            max_files: None,
        }
    }

    /// Where the audit trail goes: next to the DateBuckets unless given. Dry
    /// runs get their own file by default.
    pub fn audit_log_path(&self) -> PathBuf {
        let dir = self.output.as_ref().unwrap_or(&self.root);
        match &self.audit_log {
            Some(path) => path.clone(),
            None if self.dry_run => dir.join("sitemedia_audit.dry-run.csv"),
            None => dir.join("sitemedia_audit.csv"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Files that went through the per-file pipeline
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Succeeded without moving
    pub unchanged: u64,
    pub converted: u64,
    /// Files moved to the root by folder consolidation
    pub consolidated: u64,
    pub folders_removed: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Relocated { converted, .. } => {
                self.succeeded += 1;
                if *converted {
                    self.converted += 1;
                }
            }
            Outcome::Unchanged => {
                self.succeeded += 1;
                self.unchanged += 1;
            }
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Callback type for progress reporting: (stage, current, total, message)
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: Option<&'a ProgressCallback<'a>>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: Option<&'a ProgressCallback<'a>>) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let Some(inner) = self.inner else {
            return;
        };
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed() < Duration::from_millis(200) {
                return;
            }
            *last = Instant::now();
        }
        inner(stage, current, total, message);
    }

    pub fn finish(&self, stage: &str, total: u64) {
        if let Some(inner) = self.inner {
            inner(stage, total, total, "");
        }
    }
}

/// The pluggable collaborators of a run, built once by the caller.
pub struct Capabilities {
    pub codec: Box<dyn Codec>,
    pub ranker: Box<dyn LabelRanker>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            codec: Box::new(ImageCodec),
            ranker: Box::new(NoRanker),
        }
    }
}

impl Capabilities {
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn with_ranker(mut self, ranker: impl LabelRanker + 'static) -> Self {
        self.ranker = Box::new(ranker);
        self
    }
}

/// `path` with its directory resolved, so it compares equal to the paths
/// built from the canonical root. The file itself is left as named, since it
/// may be a symlink or missing.
fn anchor(path: &Path) -> PathBuf {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    match dir.canonicalize() {
        Ok(dir) => dir.join(name),
        Err(_) => path.to_path_buf(),
    }
}

/// Eligible media directly inside `dir`, by name.
fn media_in(tree: &BatchTree, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = tree
        .entries(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    // read_dir order differs between runs and filesystems; sorting keeps dry
    // runs, live runs and reruns on the same collision suffixes
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries
        .into_iter()
        .filter(|e| !e.is_dir && !is_hidden(e.name()) && is_eligible(&e.path))
        .map(|e| e.path)
        .collect())
}

/// Organize a batch: consolidate stray folders, then move every media file
/// of the root into its DateBucket under a composed name. With an output root
/// the files are copied there instead and the batch is left as it was.
///
/// Per-file problems end up in the audit log and the summary. Only problems
/// with the run itself (unusable root, unwritable audit log) are errors.
pub fn process(
    options: &ProcessOptions,
    capabilities: &Capabilities,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<RunSummary> {
    let tp = ThrottledProgress::new(Some(progress_callback));
    if !options.root.is_dir() {
        bail!("Batch root {} is not a directory", options.root.display());
    }
    let root = options
        .root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", options.root.display()))?;
    let root = root.as_path();

    let mut tree = BatchTree::new(root, options.dry_run);
    if let Some(output) = &options.output {
        if !options.dry_run {
            std::fs::create_dir_all(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
        }
        let output = anchor(output);
        if output != root {
            tree = tree.with_output(output);
        }
    }

    let labels = tagging::prepare_tags(&options.tags);
    let mut audit = AuditLog::open(&options.audit_log_path())?;
    let mut summary = RunSummary::default();
    log::info!(
        "Organizing {}{} (audit log {})",
        root.display(),
        if options.dry_run { " [dry run]" } else { "" },
        audit.path().display()
    );

    let mut files: Vec<PathBuf> = if let Some(files) = &options.files {
        files.iter().map(|f| anchor(f)).collect()
    } else if let Some(folder) = &options.folder {
        let dir = root.join(folder);
        if !dir.is_dir() {
            bail!("Folder {} not found", dir.display());
        }
        media_in(&tree, &dir)?
    } else if tree.keeps_sources() {
        // nothing is flattened; stray folders are read where they are
        let mut files = media_in(&tree, root)?;
        for folder in consolidate::folders_to_consolidate(&tree)? {
            files.extend(media_in(&tree, &folder)?);
        }
        files
    } else {
        let report = consolidate::consolidate(&mut tree, &mut audit, &tp)?;
        summary.consolidated = report.moved as u64;
        summary.folders_removed = report.folders_removed as u64;
        summary.failed += report.failed as u64;
        media_in(&tree, root)?
    };
    if let Some(max) = options.max_files {
        files.truncate(max);
    }

    let tagger = ContentTagger::new(capabilities.ranker.as_ref(), &labels);
    let transactor = MediaTransactor::new(capabilities.codec.as_ref(), tagger, options.target_format);
    let total = files.len() as u64;
    log::info!("{} files to organize", total);

    for (i, path) in files.iter().enumerate() {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        tp.report("organize", i as u64, total, name);

        let report = transactor.process(&mut tree, path);
        audit.append(&report.record)?;
        summary.record(&report.outcome);
    }
    tp.finish("organize", total);

    if !options.dry_run {
        let staging = tree.staging_dir();
        if staging.is_dir() && tree.entries(&staging)?.is_empty() {
            if let Err(err) = tree.remove_dir(&staging) {
                log::warn!("Could not remove {}: {}", staging.display(), err);
            }
        }
    }

    log::info!(
        "Done: {} processed, {} succeeded, {} failed, {} skipped",
        summary.processed,
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    Ok(summary)
}
