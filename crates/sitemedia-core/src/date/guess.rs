use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

struct DatePattern {
    regex: &'static LazyLock<Regex>,
    /// Applied to "<date> <time>"
    format: &'static str,
    /// Right-pad the time group with zeros to six digits
    pad_time: bool,
}

static RE_PXL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"PXL_(?P<date>\d{8})_(?P<time>\d{6})").unwrap());
static RE_IMG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"IMG_(?P<date>\d{8})_(?P<time>\d{6})").unwrap());
static RE_PAIR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>\d{8})_(?P<time>\d{6})").unwrap());
static RE_WHATSAPP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"IMG-(?P<date>\d{8})-WA(?P<time>\d{4})").unwrap());
static RE_DASH_PAIR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19|18)\d{2}(0[1-9]|1[0-2])[0-3]\d)-(?P<time>\d{6})").unwrap());
static RE_DASHED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19|18)\d{2}-(0[1-9]|1[0-2])-[0-3]\d)-(?P<time>\d{2}-\d{2}-\d{2})").unwrap());
static RE_DASHED_COMPACT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19|18)\d{2}-(0[1-9]|1[0-2])-[0-3]\d)-(?P<time>\d{6})").unwrap());
static RE_COMPACT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\D)(?P<date>(20|19|18)\d{2}(0[1-9]|1[0-2])[0-3]\d)(?P<time>\d{6})(?:\D|$)").unwrap());
static RE_UNDERSCORED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<date>(20|19|18)\d{2}_(0[1-9]|1[0-2])_[0-3]\d)_(?P<time>\d{2}_\d{2}_\d{2})").unwrap());
// Our own output layout: YYYYMMDD_HHmm_<tags>
static RE_COMPOSED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?P<date>\d{8})_(?P<time>\d{4})_").unwrap());

static PATTERNS: &[DatePattern] = &[
    DatePattern { regex: &RE_PXL, format: "%Y%m%d %H%M%S", pad_time: false },
    DatePattern { regex: &RE_IMG, format: "%Y%m%d %H%M%S", pad_time: false },
    DatePattern { regex: &RE_PAIR, format: "%Y%m%d %H%M%S", pad_time: false },
    DatePattern { regex: &RE_WHATSAPP, format: "%Y%m%d %H%M%S", pad_time: true },
    DatePattern { regex: &RE_DASH_PAIR, format: "%Y%m%d %H%M%S", pad_time: false },
    DatePattern { regex: &RE_DASHED, format: "%Y-%m-%d %H-%M-%S", pad_time: false },
    DatePattern { regex: &RE_DASHED_COMPACT, format: "%Y-%m-%d %H%M%S", pad_time: false },
    DatePattern { regex: &RE_COMPACT, format: "%Y%m%d %H%M%S", pad_time: false },
    DatePattern { regex: &RE_UNDERSCORED, format: "%Y_%m_%d %H_%M_%S", pad_time: false },
    DatePattern { regex: &RE_COMPOSED, format: "%Y%m%d %H%M%S", pad_time: true },
];

/// First pattern that matches and parses to a real date wins.
pub fn guess_date_from_filename(filename: &str) -> Option<NaiveDateTime> {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    for pat in PATTERNS {
        let Some(caps) = pat.regex.captures(basename) else {
            continue;
        };
        let (Some(date), Some(time)) = (caps.name("date"), caps.name("time")) else {
            continue;
        };
        let time = if pat.pad_time {
            format!("{:0<6}", time.as_str())
        } else {
            time.as_str().to_string()
        };
        let s = format!("{} {}", date.as_str(), time);
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, pat.format) {
            return Some(dt);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guess(name: &str) -> Option<String> {
        guess_date_from_filename(name).map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
    }

    #[test]
    fn test_guess_patterns() {
        assert_eq!(guess("IMG_20240115_091500.jpg").as_deref(), Some("2024-01-15 09:15:00"));
        assert_eq!(guess("PXL_20250708_052126.jpg").as_deref(), Some("2025-07-08 05:21:26"));
        assert_eq!(guess("20250708_052126.png").as_deref(), Some("2025-07-08 05:21:26"));
        assert_eq!(guess("Screenshot_20190919-053857.jpg").as_deref(), Some("2019-09-19 05:38:57"));
        assert_eq!(guess("signal-2020-10-26-163832.jpg").as_deref(), Some("2020-10-26 16:38:32"));
        assert_eq!(guess("2016_01_30_11_49_15.jpg").as_deref(), Some("2016-01-30 11:49:15"));
        assert_eq!(guess("capture-2021-03-04-05-06-07.png").as_deref(), Some("2021-03-04 05:06:07"));
        assert_eq!(guess("20210304050607.jpg").as_deref(), Some("2021-03-04 05:06:07"));
        assert!(guess("random_photo.jpg").is_none());
    }

    #[test]
    fn test_whatsapp_counter_is_padded() {
        assert_eq!(guess("IMG-20250808-WA0001.jpg").as_deref(), Some("2025-08-08 00:01:00"));
        // "9999" pads to 99:99:00, which is not a time
        assert!(guess("IMG-20250808-WA9999.jpg").is_none());
    }

    #[test]
    fn test_composed_names_round_trip_to_the_minute() {
        assert_eq!(
            guess("20240115_0915_excavator_digging_trench.jpg").as_deref(),
            Some("2024-01-15 09:15:00")
        );
        assert_eq!(
            guess("/site/20240115/20240115_0915_construction_1.jpg").as_deref(),
            Some("2024-01-15 09:15:00")
        );
    }

    #[test]
    fn test_invalid_date_falls_through() {
        // 8+6 digits that are not a calendar date
        assert!(guess("IMG_20241345_091500.jpg").is_none());
    }
}
