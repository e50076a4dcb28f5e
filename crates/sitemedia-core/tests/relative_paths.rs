//! Runs from inside the batch root, so it lives in its own test binary: the
//! working directory is process-wide.

use std::env;
use std::fs;

use image::{DynamicImage, Rgb, RgbImage};
use tempfile::tempdir;

use sitemedia_core::codec::{Codec, ImageCodec};
use sitemedia_core::media::MediaFormat;
use sitemedia_core::{process, Capabilities, ProcessOptions};

#[test]
fn test_relative_file_already_in_place_is_unchanged() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("site");
    fs::create_dir_all(root.join("20240115")).unwrap();
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([128, 128, 128])));
    let bytes = ImageCodec.encode(&img, MediaFormat::Png, None).unwrap();
    fs::write(root.join("20240115/20240115_0915_construction.png"), &bytes).unwrap();

    env::set_current_dir(&root).unwrap();
    let mut opts = ProcessOptions::new(".");
    opts.audit_log = Some(dir.path().join("audit.csv"));
    opts.files = Some(vec!["20240115/20240115_0915_construction.png".into()]);

    for _ in 0..2 {
        let summary = process(&opts, &Capabilities::default(), &|_, _, _, _| {}).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.unchanged, 1);
    }

    let names: Vec<String> = fs::read_dir(root.join("20240115"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["20240115_0915_construction.png"]);
}
