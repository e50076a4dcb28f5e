use chrono::{NaiveDate, NaiveDateTime};

/// Directory names that are never descended into
const SKIP_DIR_NAMES: &[&str] = &["@eaDir"];

/// File names that are never treated as media
const SKIP_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Check if a folder name is a DateBucket: exactly 8 digits forming a real
/// calendar date (`YYYYMMDD`).
pub fn is_date_bucket(name: &str) -> bool {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (Ok(year), Ok(month), Ok(day)) = (
        name[0..4].parse::<i32>(),
        name[4..6].parse::<u32>(),
        name[6..8].parse::<u32>(),
    ) else {
        return false;
    };
    NaiveDate::from_ymd_opt(year, month, day).is_some()
}

/// DateBucket folder name for a timestamp
pub fn bucket_name(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y%m%d").to_string()
}

/// Hidden and system entries are skipped by every phase.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIR_NAMES.contains(&name) || SKIP_FILE_NAMES.contains(&name)
}
