use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Capture metadata embedded in a still image. Fields are resolved at parse
/// time; anything absent or malformed is simply `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureMetadata {
    /// DateTimeOriginal in the fixed `YYYY:MM:DD HH:MM:SS` layout
    pub date_time_original: Option<NaiveDateTime>,
    /// Raw EXIF (TIFF) block, carried through conversions unchanged
    pub raw: Option<Vec<u8>>,
}

impl CaptureMetadata {
    /// Read capture metadata from a file on disk.
    pub fn read(path: &Path) -> Self {
        let Ok(file) = File::open(path) else {
            return Self::default();
        };
        match Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(exif) => Self::from_exif(&exif),
            Err(err) => {
                log::debug!("no capture metadata in {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    fn from_exif(exif: &Exif) -> Self {
        Self {
            date_time_original: date_time_original(exif),
            raw: Some(exif.buf().to_vec()),
        }
    }
}

fn date_time_original(exif: &Exif) -> Option<NaiveDateTime> {
    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .and_then(|p| std::str::from_utf8(p).ok())
            .and_then(parse_exif_datetime),
        _ => None,
    }
}

/// EXIF datetimes have no timezone info - they are local time as-is.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s.trim_end_matches('\0').trim();
    NaiveDateTime::parse_from_str(cleaned, "%Y:%m:%d %H:%M:%S").ok()
}
