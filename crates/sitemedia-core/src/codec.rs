//! Still-image decoding and re-encoding.
//!
//! The pipeline only talks to the [`Codec`] trait so that the legacy HEIF
//! decoder can live outside this crate. [`ImageCodec`] covers JPEG and PNG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat};

use crate::media::MediaFormat;

/// Quality used for every JPEG the pipeline writes
pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no codec available for {0:?}")]
    Unsupported(MediaFormat),

    #[error("could not decode {format:?}: {source}")]
    Decode {
        format: MediaFormat,
        #[source]
        source: image::ImageError,
    },

    #[error("could not encode {format:?}: {source}")]
    Encode {
        format: MediaFormat,
        #[source]
        source: image::ImageError,
    },
}

pub trait Codec: Send + Sync {
    fn decode(&self, bytes: &[u8], format: MediaFormat) -> Result<DynamicImage, CodecError>;

    /// Encode `image` as `format`, embedding `metadata` (a raw EXIF/TIFF
    /// block) when given.
    fn encode(
        &self,
        image: &DynamicImage,
        format: MediaFormat,
        metadata: Option<&[u8]>,
    ) -> Result<Vec<u8>, CodecError>;

    fn convert(
        &self,
        bytes: &[u8],
        from: MediaFormat,
        to: MediaFormat,
        metadata: Option<&[u8]>,
    ) -> Result<Vec<u8>, CodecError> {
        let image = self.decode(bytes, from)?;
        self.encode(&image, to, metadata)
    }
}

/// JPEG and PNG through the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

fn image_format(format: MediaFormat) -> Option<ImageFormat> {
    match format {
        MediaFormat::Jpeg => Some(ImageFormat::Jpeg),
        MediaFormat::Png => Some(ImageFormat::Png),
        _ => None,
    }
}

impl Codec for ImageCodec {
    fn decode(&self, bytes: &[u8], format: MediaFormat) -> Result<DynamicImage, CodecError> {
        let fmt = image_format(format).ok_or(CodecError::Unsupported(format))?;
        image::load_from_memory_with_format(bytes, fmt)
            .map_err(|source| CodecError::Decode { format, source })
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: MediaFormat,
        metadata: Option<&[u8]>,
    ) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        let encoded = match format {
            MediaFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))
            }
            MediaFormat::Png => image.write_with_encoder(PngEncoder::new(Cursor::new(&mut buf))),
            other => return Err(CodecError::Unsupported(other)),
        };
        encoded.map_err(|source| CodecError::Encode { format, source })?;

        Ok(match (format, metadata) {
            (MediaFormat::Jpeg, Some(tiff)) => embed_jpeg_exif(buf, tiff),
            (MediaFormat::Png, Some(tiff)) => embed_png_exif(buf, tiff),
            _ => buf,
        })
    }
}

/// Insert an APP1 Exif segment after SOI (and after APP0/JFIF when present).
/// Blocks too large for one segment are dropped with a warning.
pub fn embed_jpeg_exif(jpeg: Vec<u8>, tiff: &[u8]) -> Vec<u8> {
    const HEADER: &[u8] = b"Exif\0\0";
    let len = 2 + HEADER.len() + tiff.len();
    if len > u16::MAX as usize {
        log::warn!("EXIF block of {} bytes does not fit an APP1 segment, dropped", tiff.len());
        return jpeg;
    }
    if jpeg.len() < 2 || jpeg[0..2] != [0xFF, 0xD8] {
        return jpeg;
    }

    let mut at = 2;
    if jpeg.len() >= 6 && jpeg[2..4] == [0xFF, 0xE0] {
        let app0 = u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        at = (4 + app0).min(jpeg.len());
    }

    let mut out = Vec::with_capacity(jpeg.len() + len + 2);
    out.extend_from_slice(&jpeg[..at]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[at..]);
    out
}

/// Insert an `eXIf` chunk right after IHDR.
pub fn embed_png_exif(png: Vec<u8>, tiff: &[u8]) -> Vec<u8> {
    // signature (8) + IHDR length/type/data/crc (4 + 4 + 13 + 4)
    const AFTER_IHDR: usize = 33;
    if png.len() < AFTER_IHDR || &png[12..16] != b"IHDR" {
        return png;
    }
    let Ok(len) = u32::try_from(tiff.len()) else {
        return png;
    };

    let mut crc = crc32fast::Hasher::new();
    crc.update(b"eXIf");
    crc.update(tiff);

    let mut out = Vec::with_capacity(png.len() + tiff.len() + 12);
    out.extend_from_slice(&png[..AFTER_IHDR]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(b"eXIf");
    out.extend_from_slice(tiff);
    out.extend_from_slice(&crc.finalize().to_be_bytes());
    out.extend_from_slice(&png[AFTER_IHDR..]);
    out
}
