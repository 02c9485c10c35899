use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits, imageops::FilterType};
use img_parts::{ImageEXIF, jpeg::Jpeg};

use crate::error::TranscodeError;

pub const CANONICAL_MIME_TYPE: &str = "image/jpeg";
pub const CANONICAL_EXTENSION: &str = "jpg";

/// Largest width or height the decoder will allocate for.
const MAX_DECODE_DIMENSION: u32 = 16384;

const EXIF_ORIENTATION_TAG: u16 = 0x0112;
const EXIF_TYPE_SHORT: u16 = 3;

/// Image types the pipeline knows how to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
}

impl ImageKind {
    pub const ALL: [ImageKind; 3] = [ImageKind::Jpeg, ImageKind::Png, ImageKind::WebP];

    /// Maps a client-supplied MIME type, ignoring case and parameters.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type.split(';').next().unwrap_or(mime_type).trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/webp" => Some(ImageKind::WebP),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::WebP => "image/webp",
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
            ImageKind::WebP => ImageFormat::WebP,
        }
    }
}

/// Identifies the real encoding of a payload from its leading bytes.
///
/// Recognizes more than the accepted image types so that rejections can name
/// what was actually uploaded.
pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Some("image/tiff");
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        match &bytes[8..12] {
            b"avif" | b"avis" => return Some("image/avif"),
            b"heic" | b"heix" | b"mif1" => return Some("image/heic"),
            _ => {}
        }
    }
    if bytes.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Some("application/zip");
    }
    if bytes.starts_with(b"\x7FELF") {
        return Some("application/x-elf");
    }
    if bytes.starts_with(b"MZ") {
        return Some("application/x-msdownload");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

#[derive(Clone, Copy, Debug)]
pub struct TranscodeOptions {
    pub max_width: u32,
    pub quality: u8,
}

#[derive(Debug)]
pub struct TranscodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub orientation: Option<u16>,
}

/// Decodes `bytes` as `kind` and re-encodes it as a progressive JPEG no wider
/// than `options.max_width`, keeping only the EXIF orientation.
pub fn transcode(
    bytes: &[u8],
    kind: ImageKind,
    options: TranscodeOptions,
) -> Result<TranscodedImage, TranscodeError> {
    let orientation = read_orientation(bytes);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), kind.format());
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    reader.limits(limits);
    let image = reader.decode().map_err(TranscodeError::Decode)?;

    let (width, height) = image.dimensions();
    let (target_width, target_height) = fit_within_width(width, height, options.max_width);
    let image = if target_width == width {
        image
    } else {
        image.resize_exact(target_width, target_height, FilterType::Lanczos3)
    };

    let encoded = encode_progressive_jpeg(&image, options.quality)?;
    let bytes = match orientation {
        Some(orientation) => attach_orientation(encoded, orientation)?,
        None => encoded,
    };

    Ok(TranscodedImage {
        bytes,
        width: target_width,
        height: target_height,
        orientation,
    })
}

/// Output dimensions for a "fit within width" resize that never enlarges.
pub fn fit_within_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (height as u64 * max_width as u64 + width as u64 / 2) / width as u64;
    (max_width, scaled.max(1) as u32)
}

fn encode_progressive_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut compress = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    compress.set_size(width as usize, height as usize);
    compress.set_quality(quality.clamp(1, 100) as f32);
    compress.set_progressive_mode();
    compress.set_optimize_coding(true);

    let mut started = compress
        .start_compress(Vec::new())
        .map_err(TranscodeError::Encode)?;
    started
        .write_scanlines(rgb.as_raw())
        .map_err(TranscodeError::Encode)?;
    started.finish().map_err(TranscodeError::Encode)
}

/// Reads the EXIF orientation (1..=8) from any container kamadak-exif understands.
pub fn read_orientation(bytes: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    (1..=8).contains(&value).then_some(value as u16)
}

fn attach_orientation(jpeg_bytes: Vec<u8>, orientation: u16) -> Result<Vec<u8>, TranscodeError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_bytes))
        .map_err(|err| TranscodeError::Metadata(err.to_string()))?;
    jpeg.set_exif(Some(Bytes::from(orientation_exif(orientation))));
    Ok(jpeg.encoder().bytes().to_vec())
}

/// Big-endian TIFF block holding a single IFD0 entry: the orientation tag.
pub fn orientation_exif(orientation: u16) -> Vec<u8> {
    let mut tiff = Vec::with_capacity(26);
    tiff.extend_from_slice(b"MM");
    tiff.extend_from_slice(&42u16.to_be_bytes());
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&EXIF_ORIENTATION_TAG.to_be_bytes());
    tiff.extend_from_slice(&EXIF_TYPE_SHORT.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());
    tiff
}
