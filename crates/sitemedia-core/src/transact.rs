//! Per-file state machine: inspect, convert, tag, name, relocate.
//!
//! Every stage returns `Result<_, StageFailure>`. A failure ends processing of
//! that one file and becomes exactly one failed audit record; the batch moves
//! on.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use image::DynamicImage;

use crate::audit::{AuditRecord, Method};
use crate::codec::Codec;
use crate::destination;
use crate::error::MediaError;
use crate::folder_classify::bucket_name;
use crate::media::{MediaFile, MediaFormat};
use crate::naming;
use crate::tagging::{ContentTagger, TagSet};
use crate::tree::BatchTree;
use crate::TargetFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Converting,
    Tagging,
    Naming,
    Relocating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Pending => "pending",
            Stage::Converting => "converting",
            Stage::Tagging => "tagging",
            Stage::Naming => "naming",
            Stage::Relocating => "relocating",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage}: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: MediaError,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(MediaError) -> Self {
        move |error| StageFailure { stage, error }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Relocated { to: PathBuf, converted: bool },
    /// Already at its computed destination
    Unchanged,
    Skipped,
    Failed(StageFailure),
}

/// Result of one file: what happened and the audit row describing it
#[derive(Debug)]
pub struct FileReport {
    pub outcome: Outcome,
    pub record: AuditRecord,
}

/// The file as it moves through the stages. After an interchange conversion
/// it points at the staged copy.
struct Working {
    path: PathBuf,
    format: MediaFormat,
    /// Content when already in memory
    bytes: Option<Vec<u8>>,
    staged: bool,
}

impl Working {
    fn bytes(&mut self, tree: &BatchTree) -> Result<&[u8], MediaError> {
        if self.bytes.is_none() {
            let bytes = tree
                .read(&self.path)
                .map_err(|e| MediaError::io(&self.path, e))?;
            self.bytes = Some(bytes);
        }
        Ok(self.bytes.as_deref().unwrap_or_default())
    }
}

pub struct MediaTransactor<'a> {
    codec: &'a dyn Codec,
    tagger: ContentTagger<'a>,
    target_format: TargetFormat,
}

impl<'a> MediaTransactor<'a> {
    pub fn new(codec: &'a dyn Codec, tagger: ContentTagger<'a>, target_format: TargetFormat) -> Self {
        Self {
            codec,
            tagger,
            target_format,
        }
    }

    /// Run one file through every stage. Never fails; the report says how it
    /// went.
    pub fn process(&self, tree: &mut BatchTree, path: &Path) -> FileReport {
        let record = AuditRecord::new(path, Method::Skip);
        let source = tree.backing(path);

        let media = match MediaFile::inspect(path, &source) {
            Ok(media) => media,
            Err(err) if err.is_skip() => {
                log::info!("Skipping {}: {}", path.display(), err);
                return FileReport {
                    outcome: Outcome::Skipped,
                    record: record.failed(err),
                };
            }
            Err(err) => return failed(record, StageFailure::at(Stage::Pending)(err)),
        };
        if media.size == 0 {
            log::info!("Skipping {}: zero-byte file", path.display());
            return FileReport {
                outcome: Outcome::Skipped,
                record: record.failed("zero-byte file"),
            };
        }

        let mut record = AuditRecord::new(path, media.timestamp.source.into()).at(media.timestamp.iso());
        log::debug!(
            "{}: {} via {:?}",
            path.display(),
            media.timestamp.iso(),
            media.timestamp.source
        );

        let mtime = fs::metadata(&source)
            .ok()
            .map(|m| FileTime::from_last_modification_time(&m));

        let mut working = match self.convert_interchange(tree, &media, mtime) {
            Ok(working) => working,
            Err(failure) => return failed(record, failure),
        };
        record = record.converted(working.staged);

        let tags = self.tag(tree, &mut working);
        let ext = naming::target_extension(media.format, &media.extension, self.target_format);
        let name = naming::compose(&media.timestamp, &tags, &ext);

        match self.relocate(tree, &media, &mut working, &name, &ext, mtime) {
            Ok(None) => {
                log::debug!("{} already in place", path.display());
                FileReport {
                    outcome: Outcome::Unchanged,
                    record: record.moved_to(path),
                }
            }
            Ok(Some((to, converted))) => {
                if working.staged && !tree.keeps_sources() {
                    // the staged copy is placed, the original can go
                    if let Err(err) = tree.remove_file(path) {
                        log::warn!("Converted but could not remove {}: {}", path.display(), err);
                    }
                }
                let converted = converted || working.staged;
                log::info!("{} -> {}", path.display(), to.display());
                FileReport {
                    record: record.moved_to(&to).converted(converted),
                    outcome: Outcome::Relocated { to, converted },
                }
            }
            Err(failure) => {
                if working.staged {
                    if let Err(err) = tree.remove_file(&working.path) {
                        log::warn!("Could not remove staged {}: {}", working.path.display(), err);
                    }
                }
                failed(record, failure)
            }
        }
    }

    /// Re-encode legacy containers to JPEG in the staging directory. Other
    /// files pass through untouched.
    fn convert_interchange(
        &self,
        tree: &mut BatchTree,
        media: &MediaFile,
        mtime: Option<FileTime>,
    ) -> Result<Working, StageFailure> {
        let mut working = Working {
            path: media.path.clone(),
            format: media.format,
            bytes: None,
            staged: false,
        };
        if !media.format.needs_interchange() {
            return Ok(working);
        }

        let fail = StageFailure::at(Stage::Converting);
        let jpeg = {
            let bytes = working.bytes(tree).map_err(fail)?;
            self.codec
                .convert(bytes, media.format, MediaFormat::Jpeg, media.capture.raw.as_deref())
                .map_err(|e| StageFailure::at(Stage::Converting)(MediaError::conversion(&media.path, e)))?
        };

        let staging = tree.staging_dir();
        let staged = destination::resolve(tree, &staging, &format!("{}.jpg", media.stem()), None)
            .map_err(StageFailure::at(Stage::Converting))?;
        tree.write_file(&staged, &jpeg, mtime)
            .map_err(|e| StageFailure::at(Stage::Converting)(MediaError::io(&staged, e)))?;
        log::debug!("{} converted to {}", media.path.display(), staged.display());

        Ok(Working {
            path: staged,
            format: MediaFormat::Jpeg,
            bytes: Some(jpeg),
            staged: true,
        })
    }

    /// Tagging never fails: unreadable or undecodable stills get the fallback
    /// tag like videos do.
    fn tag(&self, tree: &BatchTree, working: &mut Working) -> TagSet {
        let image = self.decode_for_tagging(tree, working);
        self.tagger.tag(image.as_ref())
    }

    fn decode_for_tagging(&self, tree: &BatchTree, working: &mut Working) -> Option<DynamicImage> {
        if !working.format.is_still() {
            return None;
        }
        let format = working.format;
        let path = working.path.clone();
        let bytes = match working.bytes(tree) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("Could not read {} for tagging: {}", path.display(), err);
                return None;
            }
        };
        match self.codec.decode(bytes, format) {
            Ok(image) => Some(image),
            Err(err) => {
                log::debug!("{} not decodable for tagging: {}", path.display(), err);
                None
            }
        }
    }

    /// Move (or convert) the working file into its DateBucket. `None` means it
    /// is already there.
    fn relocate(
        &self,
        tree: &mut BatchTree,
        media: &MediaFile,
        working: &mut Working,
        name: &str,
        ext: &str,
        mtime: Option<FileTime>,
    ) -> Result<Option<(PathBuf, bool)>, StageFailure> {
        let fail = StageFailure::at(Stage::Relocating);
        let dir = tree.destination_root().join(bucket_name(&media.timestamp.value));
        let dest = destination::resolve(tree, &dir, name, Some(&working.path)).map_err(fail)?;
        if dest == working.path {
            return Ok(None);
        }

        // staged conversions are ours to move even when sources are kept
        let consume = working.staged || !tree.keeps_sources();
        let dest_format = MediaFormat::from_extension(ext).unwrap_or(working.format);
        if dest_format == working.format {
            let placed = if consume {
                tree.move_file(&working.path, &dest)
            } else {
                tree.copy_file(&working.path, &dest)
            };
            placed.map_err(|e| StageFailure::at(Stage::Relocating)(MediaError::io(&working.path, e)))?;
            return Ok(Some((dest, false)));
        }

        let from = working.format;
        let out = {
            let bytes = working
                .bytes(tree)
                .map_err(StageFailure::at(Stage::Relocating))?;
            self.codec
                .convert(bytes, from, dest_format, media.capture.raw.as_deref())
                .map_err(|e| StageFailure::at(Stage::Relocating)(MediaError::conversion(&working.path, e)))?
        };
        tree.write_file(&dest, &out, mtime)
            .map_err(|e| StageFailure::at(Stage::Relocating)(MediaError::io(&dest, e)))?;
        if consume {
            if let Err(err) = tree.remove_file(&working.path) {
                log::warn!("Converted but could not remove {}: {}", working.path.display(), err);
            }
        }
        Ok(Some((dest, true)))
    }
}

fn failed(record: AuditRecord, failure: StageFailure) -> FileReport {
    log::warn!("Failed {}: {}", record.original_path, failure);
    FileReport {
        record: record.failed(&failure),
        outcome: Outcome::Failed(failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, ImageCodec};
    use crate::tagging::prepare_tags;
    use crate::tagging::ranker::NoRanker;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes(rgb: [u8; 3]) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, Rgb(rgb)));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Treats HEIF payloads as PNG so the conversion path runs without a
    /// HEIF decoder.
    struct HeifAsPng;

    impl Codec for HeifAsPng {
        fn decode(&self, bytes: &[u8], format: MediaFormat) -> Result<DynamicImage, CodecError> {
            let format = if format == MediaFormat::Heif { MediaFormat::Png } else { format };
            ImageCodec.decode(bytes, format)
        }

        fn encode(
            &self,
            image: &DynamicImage,
            format: MediaFormat,
            metadata: Option<&[u8]>,
        ) -> Result<Vec<u8>, CodecError> {
            ImageCodec.encode(image, format, metadata)
        }
    }

    fn run(codec: &dyn Codec, target: TargetFormat, tree: &mut BatchTree, path: &Path) -> FileReport {
        let labels = prepare_tags::<&str>(&[]);
        let tagger = ContentTagger::new(&NoRanker, &labels);
        MediaTransactor::new(codec, tagger, target).process(tree, path)
    }

    #[test]
    fn test_stage_failure_display() {
        let failure = StageFailure {
            stage: Stage::Converting,
            error: MediaError::CollisionExhausted {
                dir: PathBuf::from("/site"),
                name: "a.jpg".to_string(),
            },
        };
        assert_eq!(failure.to_string(), "converting: no free file name left in /site for a.jpg");
    }

    #[test]
    fn test_relocates_into_bucket() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let src = root.join("IMG_20240115_091500.png");
        fs::write(&src, png_bytes([128, 128, 128])).unwrap();

        let mut tree = BatchTree::new(root, false);
        let report = run(&ImageCodec, TargetFormat::Auto, &mut tree, &src);

        let want = root.join("20240115/20240115_0915_construction.png");
        assert!(matches!(report.outcome, Outcome::Relocated { ref to, converted: false } if *to == want));
        assert!(want.exists());
        assert!(!src.exists());
        assert_eq!(report.record.method, Method::EmbeddedPattern);
        assert_eq!(report.record.timestamp, "2024-01-15T09:15:00");
        assert!(report.record.success);

        // second pass over the placed file changes nothing
        let report = run(&ImageCodec, TargetFormat::Auto, &mut tree, &want);
        assert!(matches!(report.outcome, Outcome::Unchanged));
        assert_eq!(report.record.new_path, want.display().to_string());
    }

    #[test]
    fn test_target_format_converts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let src = root.join("IMG_20240115_091500.png");
        fs::write(&src, png_bytes([20, 60, 220])).unwrap();

        let mut tree = BatchTree::new(root, false);
        let report = run(&ImageCodec, TargetFormat::Jpg, &mut tree, &src);

        let want = root.join("20240115/20240115_0915_blue_water_pipe.jpg");
        assert!(matches!(report.outcome, Outcome::Relocated { converted: true, .. }));
        assert!(report.record.converted);
        assert_eq!(&fs::read(&want).unwrap()[..2], &[0xFF, 0xD8]);
        assert!(!src.exists());
    }

    #[test]
    fn test_heif_conversion_removes_original() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let src = root.join("PXL_20240301_120000.heic");
        fs::write(&src, png_bytes([128, 128, 128])).unwrap();

        let mut tree = BatchTree::new(root, false);
        let report = run(&HeifAsPng, TargetFormat::Auto, &mut tree, &src);

        let want = root.join("20240301/20240301_1200_construction.jpg");
        assert!(matches!(report.outcome, Outcome::Relocated { converted: true, .. }), "{:?}", report);
        assert!(want.exists());
        assert!(!src.exists());
        // nothing left behind in staging
        assert!(tree.entries(&tree.staging_dir()).unwrap().is_empty());
    }

    #[test]
    fn test_failed_conversion_leaves_original() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let src = root.join("PXL_20240301_120000.heic");
        fs::write(&src, b"not an image at all").unwrap();

        let mut tree = BatchTree::new(root, false);
        let report = run(&ImageCodec, TargetFormat::Auto, &mut tree, &src);

        assert!(matches!(
            report.outcome,
            Outcome::Failed(StageFailure {
                stage: Stage::Converting,
                ..
            })
        ));
        assert_eq!(report.record.method, Method::Error);
        assert!(!report.record.success);
        assert_eq!(report.record.timestamp, "2024-03-01T12:00:00");
        assert_eq!(fs::read(&src).unwrap(), b"not an image at all");
        assert!(!root.join("20240301").exists());
    }

    #[test]
    fn test_zero_byte_and_missing_are_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let empty = root.join("IMG_20240115_091500.jpg");
        fs::write(&empty, b"").unwrap();

        let mut tree = BatchTree::new(root, false);
        let report = run(&ImageCodec, TargetFormat::Auto, &mut tree, &empty);
        assert!(matches!(report.outcome, Outcome::Skipped));
        assert_eq!(report.record.method, Method::Skip);
        assert_eq!(report.record.error, "zero-byte file");
        assert!(empty.exists());

        let report = run(&ImageCodec, TargetFormat::Auto, &mut tree, &root.join("gone.jpg"));
        assert!(matches!(report.outcome, Outcome::Skipped));
    }

    #[test]
    fn test_output_root_leaves_sources() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("in");
        let out = dir.path().join("out");
        fs::create_dir(&root).unwrap();
        let png = root.join("IMG_20240115_091500.png");
        let heic = root.join("PXL_20240301_120000.heic");
        fs::write(&png, png_bytes([128, 128, 128])).unwrap();
        fs::write(&heic, png_bytes([128, 128, 128])).unwrap();

        let mut tree = BatchTree::new(&root, false).with_output(&out);
        let report = run(&HeifAsPng, TargetFormat::Auto, &mut tree, &png);
        let want = out.join("20240115/20240115_0915_construction.png");
        assert!(matches!(report.outcome, Outcome::Relocated { ref to, converted: false } if *to == want));
        assert_eq!(fs::read(&want).unwrap(), fs::read(&png).unwrap());

        let report = run(&HeifAsPng, TargetFormat::Auto, &mut tree, &heic);
        assert!(matches!(report.outcome, Outcome::Relocated { converted: true, .. }), "{:?}", report);
        assert!(out.join("20240301/20240301_1200_construction.jpg").exists());
        assert!(heic.exists());
        assert!(tree.entries(&tree.staging_dir()).unwrap().is_empty());
        // only the original two files remain in the input
        assert_eq!(fs::read_dir(&root).unwrap().count(), 2);
    }

    #[test]
    fn test_video_is_moved_untagged() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let src = root.join("walkthrough.MP4");
        fs::write(&src, b"fake video").unwrap();
        let when = FileTime::from_unix_time(1_705_310_100, 0);
        filetime::set_file_mtime(&src, when).unwrap();

        let mut tree = BatchTree::new(root, false);
        let report = run(&ImageCodec, TargetFormat::Jpg, &mut tree, &src);

        let Outcome::Relocated { to, converted } = &report.outcome else {
            panic!("expected relocation, got {:?}", report.outcome);
        };
        assert!(!converted);
        let name = to.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_construction.mp4"), "{name}");
        assert_eq!(fs::read(to).unwrap(), b"fake video");
    }
}
