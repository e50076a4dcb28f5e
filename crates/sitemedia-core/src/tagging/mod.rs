pub mod color;
pub mod ranker;

use image::DynamicImage;
use unicode_normalization::UnicodeNormalization;

use self::ranker::{ClassifierError, LabelRanker, LabelScore};

/// Most tags a file name carries
pub const MAX_TAGS: usize = 3;

/// Model scores at or below this are not considered relevant
pub const RELEVANCE_THRESHOLD: f32 = 0.15;

/// Used when no other tag could be found
pub const FALLBACK_TAG: &str = "construction";

/// Candidate labels used when none are configured
pub const DEFAULT_TAGS: &[&str] = &[
    // services
    "yellow trench protection mesh",
    "orange conduit bundle",
    "blue water pipe in trench",
    "green sewer pipe in trench",
    "concrete stormwater pipe installation",
    "pit lid and riser",
    // earthworks
    "open trench excavation",
    "backfilling trench",
    "bulk earthworks stockpile",
    "benching or batter slope",
    // pavements
    "asphalt paving",
    "road base preparation",
    "concrete footpath pour",
    // plant
    "excavator digging trench",
    "roller compaction",
    "grader on road subgrade",
    // landscaping
    "turf installation",
    "irrigation installation",
    "landscape planting beds",
];

/// Ordered, de-duplicated tags of one file. Never empty, never more than
/// [`MAX_TAGS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet(Vec<String>);

impl TagSet {
    /// Heuristic labels first, then model labels. Duplicates are dropped and
    /// the result truncated; nothing at all yields the fallback tag.
    pub fn merge<H, M>(heuristic: H, model: M) -> Self
    where
        H: IntoIterator<Item = String>,
        M: IntoIterator<Item = String>,
    {
        let mut tags: Vec<String> = Vec::with_capacity(MAX_TAGS);
        for tag in heuristic.into_iter().chain(model) {
            let tag = normalize_label(&tag);
            if tag.is_empty() || tags.contains(&tag) {
                continue;
            }
            tags.push(tag);
            if tags.len() == MAX_TAGS {
                break;
            }
        }
        if tags.is_empty() {
            tags.push(FALLBACK_TAG.to_string());
        }
        TagSet(tags)
    }

    pub fn fallback() -> Self {
        TagSet(vec![FALLBACK_TAG.to_string()])
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Tags joined for use in a file name
    pub fn joined(&self) -> String {
        self.0.join("_")
    }
}

/// Make a label safe for a file name: NFC, trimmed, with spaces and path
/// separators replaced by underscores.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .nfc()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

/// Clean a user-supplied candidate list: trimmed, NFC, no empties or
/// duplicates. An empty result means the default list.
pub fn prepare_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag: String = tag.as_ref().trim().nfc().collect();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    if out.is_empty() {
        out = DEFAULT_TAGS.iter().map(|t| t.to_string()).collect();
    }
    out
}

/// Keep the relevant scores, best first, at most [`MAX_TAGS`].
pub fn select_top(mut scores: Vec<LabelScore>) -> Vec<String> {
    scores.retain(|s| s.score > RELEVANCE_THRESHOLD);
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores.into_iter().take(MAX_TAGS).map(|s| s.label).collect()
}

/// Combines the colour heuristic with a label ranker.
pub struct ContentTagger<'a> {
    ranker: &'a dyn LabelRanker,
    labels: &'a [String],
}

impl<'a> ContentTagger<'a> {
    pub fn new(ranker: &'a dyn LabelRanker, labels: &'a [String]) -> Self {
        Self { ranker, labels }
    }

    /// Tag a decoded image, or a file that has none (videos). Never fails.
    pub fn tag(&self, image: Option<&DynamicImage>) -> TagSet {
        let Some(image) = image else {
            return TagSet::fallback();
        };

        let heuristic = color::color_tags(image);
        let model = match self.ranker.rank(image, self.labels) {
            Ok(scores) => select_top(scores),
            Err(ClassifierError::Unavailable) => Vec::new(),
            Err(err) => {
                log::warn!("Classifier {} failed: {}", self.ranker.name(), err);
                Vec::new()
            }
        };
        log::debug!("tags: heuristic {:?}, model {:?}", heuristic, model);

        TagSet::merge(heuristic, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::ranker::NoRanker;
    use image::{Rgb, RgbImage};

    struct FixedRanker(Vec<LabelScore>);

    impl LabelRanker for FixedRanker {
        fn name(&self) -> &str {
            "fixed"
        }

        fn rank(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenRanker;

    impl LabelRanker for BrokenRanker {
        fn name(&self) -> &str {
            "broken"
        }

        fn rank(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
            Err(ClassifierError::Io(std::io::Error::other("model crashed")))
        }
    }

    fn score(label: &str, score: f32) -> LabelScore {
        LabelScore {
            label: label.to_string(),
            score,
        }
    }

    fn solid(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb(rgb)))
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_order_dedupe_and_cap() {
        let tags = TagSet::merge(
            strings(&["yellow_trench_protection"]),
            strings(&["excavator digging trench", "yellow trench protection", "asphalt paving", "turf installation"]),
        );
        assert_eq!(
            tags.as_slice(),
            &strings(&["yellow_trench_protection", "excavator_digging_trench", "asphalt_paving"])
        );
        assert_eq!(tags.joined(), "yellow_trench_protection_excavator_digging_trench_asphalt_paving");
    }

    #[test]
    fn test_merge_nothing_gives_fallback() {
        let tags = TagSet::merge(Vec::new(), Vec::new());
        assert_eq!(tags, TagSet::fallback());
        assert_eq!(tags.joined(), "construction");
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label(" pit lid and riser "), "pit_lid_and_riser");
        assert_eq!(normalize_label("cut/fill"), "cut_fill");
        assert_eq!(normalize_label("a\\b"), "a_b");
        // decomposed e + combining acute becomes a single code point
        assert_eq!(normalize_label("cafe\u{301}"), "caf\u{e9}");
    }

    #[test]
    fn test_prepare_tags() {
        let tags = prepare_tags(&["  asphalt paving ", "", "asphalt paving", "turf installation"]);
        assert_eq!(tags, strings(&["asphalt paving", "turf installation"]));

        let empty: [&str; 1] = ["   "];
        assert_eq!(prepare_tags(&empty).len(), DEFAULT_TAGS.len());
        assert_eq!(DEFAULT_TAGS.len(), 19);
    }

    #[test]
    fn test_select_top_thresholds_and_sorts() {
        let top = select_top(vec![
            score("a", 0.10),
            score("b", 0.30),
            score("c", 0.15),
            score("d", 0.50),
            score("e", 0.20),
            score("f", 0.16),
        ]);
        assert_eq!(top, strings(&["d", "b", "e"]));
    }

    #[test]
    fn test_tagger_without_classifier() {
        let labels = prepare_tags::<&str>(&[]);
        let tagger = ContentTagger::new(&NoRanker, &labels);
        assert_eq!(tagger.tag(Some(&solid([128, 128, 128]))), TagSet::fallback());
        assert_eq!(
            tagger.tag(Some(&solid([20, 60, 220]))).as_slice(),
            &strings(&["blue_water_pipe"])
        );
        assert_eq!(tagger.tag(None), TagSet::fallback());
    }

    #[test]
    fn test_tagger_heuristic_first() {
        let labels = prepare_tags::<&str>(&[]);
        let ranker = FixedRanker(vec![
            score("open trench excavation", 0.6),
            score("blue water pipe in trench", 0.3),
        ]);
        let tagger = ContentTagger::new(&ranker, &labels);
        let tags = tagger.tag(Some(&solid([20, 60, 220])));
        assert_eq!(
            tags.as_slice(),
            &strings(&["blue_water_pipe", "open_trench_excavation", "blue_water_pipe_in_trench"])
        );
    }

    #[test]
    fn test_classifier_failure_degrades() {
        let labels = prepare_tags::<&str>(&[]);
        let tagger = ContentTagger::new(&BrokenRanker, &labels);
        assert_eq!(
            tagger.tag(Some(&solid([255, 120, 0]))).as_slice(),
            &strings(&["orange_conduit"])
        );
    }
}
