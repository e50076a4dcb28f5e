use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};

use crate::date::{self, exif::CaptureMetadata, ResolvedTimestamp};
use crate::error::MediaError;

/// Recognized media containers. Anything else is not eligible for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    Jpeg,
    Png,
    Heif,
    Mov,
    Mp4,
    Hevc,
    Avi,
}

impl MediaFormat {
    /// Map an extension (with or without the leading dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(MediaFormat::Jpeg),
            "png" => Some(MediaFormat::Png),
            "heic" | "heif" => Some(MediaFormat::Heif),
            "mov" => Some(MediaFormat::Mov),
            "mp4" => Some(MediaFormat::Mp4),
            "hevc" => Some(MediaFormat::Hevc),
            "avi" => Some(MediaFormat::Avi),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn is_video(self) -> bool {
        matches!(
            self,
            MediaFormat::Mov | MediaFormat::Mp4 | MediaFormat::Hevc | MediaFormat::Avi
        )
    }

    pub fn is_still(self) -> bool {
        !self.is_video()
    }

    /// Legacy still containers that are re-encoded to JPEG before relocation.
    pub fn needs_interchange(self) -> bool {
        matches!(self, MediaFormat::Heif)
    }
}

/// Whether a path carries one of the recognized media extensions.
pub fn is_eligible(path: &Path) -> bool {
    MediaFormat::from_path(path).is_some()
}

/// Convert a filesystem time to local wall-clock time without zone information.
pub fn to_local(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// A media file as seen by one run. Built once by [`MediaFile::inspect`] and
/// not changed afterwards.
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Location inside the batch tree (may be a planned location in a dry run)
    pub path: PathBuf,
    /// Lower-cased extension including the leading dot
    pub extension: String,
    pub format: MediaFormat,
    /// File size in bytes
    pub size: u64,
    pub modified: NaiveDateTime,
    /// Birth time, when the platform reports one
    pub created: Option<NaiveDateTime>,
    /// Embedded capture metadata (stills only)
    pub capture: CaptureMetadata,
    pub timestamp: ResolvedTimestamp,
}

impl MediaFile {
    /// Stat `source` (the real file backing `path`), read its capture metadata
    /// and resolve the authoritative timestamp.
    pub fn inspect(path: &Path, source: &Path) -> Result<Self, MediaError> {
        let format = MediaFormat::from_path(path)
            .ok_or_else(|| MediaError::UnsupportedExtension(path.to_path_buf()))?;

        let meta = match fs::metadata(source) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(MediaError::SourceMissing(path.to_path_buf())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(MediaError::SourceMissing(path.to_path_buf()))
            }
            Err(err) => return Err(MediaError::io(path, err)),
        };

        let modified = meta
            .modified()
            .map(to_local)
            .map_err(|e| MediaError::io(path, e))?;
        let created = meta.created().ok().map(to_local);

        let capture = if format.is_still() {
            CaptureMetadata::read(source)
        } else {
            CaptureMetadata::default()
        };

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let timestamp = date::resolve(filename, format, &capture, created, modified);

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            extension,
            format,
            size: meta.len(),
            modified,
            created,
            capture,
            timestamp,
        })
    }

    pub fn filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::TimestampSource;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(MediaFormat::from_extension(".JPG"), Some(MediaFormat::Jpeg));
        assert_eq!(MediaFormat::from_extension("jpeg"), Some(MediaFormat::Jpeg));
        assert_eq!(MediaFormat::from_extension("HEIC"), Some(MediaFormat::Heif));
        assert_eq!(MediaFormat::from_extension(".mov"), Some(MediaFormat::Mov));
        assert_eq!(MediaFormat::from_extension(".gif"), None);
        assert!(MediaFormat::Heif.needs_interchange());
        assert!(!MediaFormat::Png.needs_interchange());
        assert!(MediaFormat::Avi.is_video());
    }

    #[test]
    fn test_inspect_missing_and_unsupported() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("IMG_20240115_091500.jpg");
        assert!(matches!(
            MediaFile::inspect(&missing, &missing),
            Err(MediaError::SourceMissing(_))
        ));

        let notes = dir.path().join("notes.txt");
        fs::write(&notes, b"hello").unwrap();
        assert!(matches!(
            MediaFile::inspect(&notes, &notes),
            Err(MediaError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn test_inspect_uses_filename_pattern() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("IMG_20240115_091500.JPG");
        fs::write(&path, b"not really a jpeg").unwrap();

        let media = MediaFile::inspect(&path, &path).unwrap();
        assert_eq!(media.extension, ".jpg");
        assert_eq!(media.size, 17);
        assert_eq!(media.timestamp.source, TimestampSource::EmbeddedPattern);
        assert_eq!(
            media.timestamp.value.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-15 09:15:00"
        );
    }
}
