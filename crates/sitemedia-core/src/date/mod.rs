pub mod exif;
pub mod guess;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::media::MediaFormat;
use self::exif::CaptureMetadata;

/// Where a resolved timestamp came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampSource {
    EmbeddedPattern,
    Metadata,
    BirthTime,
    ModifyTime,
}

/// The single authoritative capture time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimestamp {
    pub value: NaiveDateTime,
    pub source: TimestampSource,
}

impl ResolvedTimestamp {
    /// ISO-8601 rendering used in the audit log
    pub fn iso(&self) -> String {
        self.value.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Resolve a timestamp using all sources in priority order. Never fails: the
/// modify-time is always available as the last resort.
///
/// Videos skip the filename and capture-metadata sources.
pub fn resolve(
    filename: &str,
    format: MediaFormat,
    capture: &CaptureMetadata,
    created: Option<NaiveDateTime>,
    modified: NaiveDateTime,
) -> ResolvedTimestamp {
    if format.is_still() {
        // 1. Filename pattern
        if let Some(value) = guess::guess_date_from_filename(filename) {
            return ResolvedTimestamp {
                value,
                source: TimestampSource::EmbeddedPattern,
            };
        }

        // 2. DateTimeOriginal
        if let Some(value) = capture.date_time_original {
            return ResolvedTimestamp {
                value,
                source: TimestampSource::Metadata,
            };
        }
    }

    // 3. Birth time
    if let Some(value) = created {
        return ResolvedTimestamp {
            value,
            source: TimestampSource::BirthTime,
        };
    }

    // 4. Modify time
    ResolvedTimestamp {
        value: modified,
        source: TimestampSource::ModifyTime,
    }
}
