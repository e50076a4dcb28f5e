use crate::date::ResolvedTimestamp;
use crate::media::MediaFormat;
use crate::tagging::TagSet;
use crate::TargetFormat;

/// Extension (with dot) a file will carry after processing.
///
/// An explicit target format applies to stills only. Containers that need an
/// interchange conversion become `.jpg`; everything else keeps its extension.
pub fn target_extension(format: MediaFormat, source_ext: &str, target: TargetFormat) -> String {
    if format.is_still() {
        match target {
            TargetFormat::Jpg => return ".jpg".to_string(),
            TargetFormat::Png => return ".png".to_string(),
            TargetFormat::Auto => {}
        }
    }
    if format.needs_interchange() {
        return ".jpg".to_string();
    }
    source_ext.to_ascii_lowercase()
}

/// `YYYYMMDD_HHmm_<tag1>[_<tag2>][_<tag3>]<ext>`
pub fn compose(timestamp: &ResolvedTimestamp, tags: &TagSet, ext: &str) -> String {
    format!(
        "{}_{}{}",
        timestamp.value.format("%Y%m%d_%H%M"),
        tags.joined(),
        ext
    )
}
