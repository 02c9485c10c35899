//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::io::Cursor;

use cellar_images::{ImagePipeline, ImageStore, UploadConfig};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use tempfile::TempDir;

pub async fn test_pipeline(max_file_size: usize, max_width: u32) -> (TempDir, ImagePipeline) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = UploadConfig {
        max_file_size,
        max_width,
        upload_dir: dir.path().to_path_buf(),
        ..UploadConfig::default()
    };
    let store = ImageStore::open(dir.path()).await.expect("open store");
    (dir, ImagePipeline::new(config, store))
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90])
    }))
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut output = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut output), format)
        .expect("encode fixture");
    output
}

pub fn encode_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

pub fn encode_png(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

pub fn encode_webp(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::WebP)
}
