use image::imageops::FilterType;
use image::DynamicImage;

/// Edge length images are resampled to before counting pixels
const SAMPLE_EDGE: u32 = 320;

/// Share of pixels a band must exceed to contribute its label
const BAND_THRESHOLD: f64 = 0.02;

/// An HSV window on the 8-bit scale (hue 0-180, saturation and value 0-255).
/// Bounds are inclusive.
#[derive(Debug, Clone, Copy)]
struct HsvRange {
    hue: (u8, u8),
    min_saturation: u8,
    min_value: u8,
}

impl HsvRange {
    const fn new(hue_lo: u8, hue_hi: u8, min_saturation: u8, min_value: u8) -> Self {
        Self {
            hue: (hue_lo, hue_hi),
            min_saturation,
            min_value,
        }
    }

    fn contains(&self, (h, s, v): (u8, u8, u8)) -> bool {
        (self.hue.0..=self.hue.1).contains(&h) && s >= self.min_saturation && v >= self.min_value
    }
}

struct ColorBand {
    label: &'static str,
    ranges: &'static [HsvRange],
}

/// Field markers by colour. Emission follows this order.
static BANDS: &[ColorBand] = &[
    ColorBand {
        label: "yellow_trench_protection",
        ranges: &[HsvRange::new(20, 35, 80, 80)],
    },
    ColorBand {
        label: "orange_conduit",
        ranges: &[HsvRange::new(10, 19, 80, 80)],
    },
    ColorBand {
        label: "blue_water_pipe",
        ranges: &[HsvRange::new(90, 130, 80, 60)],
    },
    ColorBand {
        label: "green_sewer_pipe",
        ranges: &[HsvRange::new(40, 85, 60, 40)],
    },
    // red wraps around the hue circle
    ColorBand {
        label: "red_electrical_marker",
        ranges: &[HsvRange::new(0, 8, 80, 60), HsvRange::new(170, 180, 80, 60)],
    },
];

/// Labels for every colour band covering more than 2% of the image.
pub fn color_tags(image: &DynamicImage) -> Vec<String> {
    let sample = image
        .resize_exact(SAMPLE_EDGE, SAMPLE_EDGE, FilterType::Triangle)
        .to_rgb8();
    let total = (sample.width() * sample.height()) as f64;
    if total == 0.0 {
        return Vec::new();
    }

    let mut counts = vec![0u32; BANDS.len()];
    for pixel in sample.pixels() {
        let hsv = rgb_to_hsv(pixel.0);
        for (count, band) in counts.iter_mut().zip(BANDS) {
            if band.ranges.iter().any(|r| r.contains(hsv)) {
                *count += 1;
            }
        }
    }

    BANDS
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count as f64 / total > BAND_THRESHOLD)
        .map(|(band, _)| band.label.to_string())
        .collect()
}

/// 8-bit RGB to HSV with hue halved into 0-180.
fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { delta * 255.0 / max } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    ((h / 2.0).round() as u8, s.round() as u8, max as u8)
}
