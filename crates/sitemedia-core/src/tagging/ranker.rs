//! Zero-shot label ranking, the model half of tagging.
//!
//! Rankers score an image against an arbitrary list of candidate labels. The
//! pipeline never requires one: [`NoRanker`] is used when nothing is
//! configured and the tagger falls back to the colour heuristic.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use image::{DynamicImage, ImageFormat};
use serde::Deserialize;

/// Longest edge of the rendition handed to an external ranker
const THUMBNAIL_EDGE: u32 = 512;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("no classifier configured")]
    Unavailable,

    #[error("could not run classifier {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("classifier {program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("could not read classifier output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("could not prepare image for classifier: {0}")]
    Image(#[from] image::ImageError),

    #[error("classifier I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// A candidate label and the confidence the ranker gave it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

pub trait LabelRanker: Send + Sync {
    fn name(&self) -> &str;

    /// Score `image` against `labels`. Scores may come back in any order.
    fn rank(&self, image: &DynamicImage, labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Stand-in when no classifier is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRanker;

impl LabelRanker for NoRanker {
    fn name(&self) -> &str {
        "none"
    }

    fn rank(&self, _image: &DynamicImage, _labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
        Err(ClassifierError::Unavailable)
    }
}

/// Runs an external program as the classifier.
///
/// The program receives the path of a PNG rendition of the image as its last
/// argument and the candidate labels as a JSON array on stdin. It must print a
/// JSON array of `{"label": ..., "score": ...}` objects on stdout.
#[derive(Debug, Clone)]
pub struct CommandRanker {
    program: PathBuf,
    args: Vec<String>,
    display: String,
}

impl CommandRanker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let display = program.display().to_string();
        Self {
            program,
            args: Vec::new(),
            display,
        }
    }

    /// Extra arguments placed before the image path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl LabelRanker for CommandRanker {
    fn name(&self) -> &str {
        &self.display
    }

    fn rank(&self, image: &DynamicImage, labels: &[String]) -> Result<Vec<LabelScore>, ClassifierError> {
        let thumb = tempfile::Builder::new()
            .prefix("sitemedia-")
            .suffix(".png")
            .tempfile()?;
        image
            .thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE)
            .to_rgb8()
            .save_with_format(thumb.path(), ImageFormat::Png)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(thumb.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ClassifierError::Spawn {
                program: self.display.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(labels)?;
            // a program that ignores stdin may close it early
            if let Err(err) = stdin.write_all(&payload) {
                log::debug!("classifier {} closed stdin: {}", self.display, err);
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ClassifierError::Failed {
                program: self.display.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let scores: Vec<LabelScore> = serde_json::from_slice(&output.stdout)?;
        Ok(scores
            .into_iter()
            .filter(|s| labels.contains(&s.label))
            .collect())
    }
}
