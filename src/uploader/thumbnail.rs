use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::errors::{AppError, AppResult};
use crate::uploader::media_upload::Blob;

pub const THUMBNAIL_SIZE: u32 = 256;

/// Produces the preview image stored next to an uploaded asset.
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn generate_file_thumbnail(&self, file: &Blob) -> AppResult<Blob>;
}

/// Downscales image files; anything else gets a flat placeholder tile.
#[derive(Debug, Clone)]
pub struct ImageThumbnailer {
    max_dimension: u32,
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self::new(THUMBNAIL_SIZE)
    }
}

impl ImageThumbnailer {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

#[async_trait]
impl ThumbnailGenerator for ImageThumbnailer {
    async fn generate_file_thumbnail(&self, file: &Blob) -> AppResult<Blob> {
        let max_dimension = self.max_dimension;
        let is_image = file.is_image();
        let data = file.data.clone();
        let name = file.name.clone().unwrap_or_else(|| "file".to_string());

        let png = tokio::task::spawn_blocking(move || render_thumbnail(&data, is_image, max_dimension))
            .await
            .map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        Ok(Blob::named(&format!("{}.thumbnail.png", name), "image/png", png))
    }
}

fn render_thumbnail(data: &[u8], is_image: bool, max_dimension: u32) -> AppResult<Vec<u8>> {
    let thumbnail = if is_image {
        match image::load_from_memory(data) {
            Ok(img) => {
                let thumbnail = img.thumbnail(max_dimension, max_dimension);
                log::debug!(
                    "Resized from {}x{} to {}x{}",
                    img.width(),
                    img.height(),
                    thumbnail.width(),
                    thumbnail.height()
                );
                thumbnail
            }
            Err(e) => {
                log::warn!("Could not decode image for thumbnail, using placeholder: {}", e);
                placeholder(max_dimension)
            }
        }
    } else {
        placeholder(max_dimension)
    };

    let mut output = Vec::new();
    thumbnail.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

fn placeholder(size: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, Rgba([0x31, 0x34, 0x3A, 0xFF])))
}
