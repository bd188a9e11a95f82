use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::MediaCommand;
use crate::config::{MediaConfig, ThumbnailConfig};
use crate::error::{BridgeError, Result};

/// Host capability that produces a representative still frame of a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThumbnailExtractor: Send + Sync {
    async fn extract(&self, video_path: &Path) -> Result<DynamicImage>;
}

/// Grabs the first frame through the media binary, scaled to fit the configured box
pub struct FfmpegThumbnailExtractor {
    binary_path: String,
    max_width: u32,
    max_height: u32,
}

impl FfmpegThumbnailExtractor {
    pub fn new(media: &MediaConfig, thumbnail: &ThumbnailConfig) -> Self {
        Self {
            binary_path: media.binary_path.clone(),
            max_width: thumbnail.max_width,
            max_height: thumbnail.max_height,
        }
    }

    fn frame_command(&self, video_path: &Path) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Thumbnail extraction")
            .arg("-v")
            .arg("error")
            .input(video_path)
            .arg("-frames:v")
            .arg("1")
            .video_filter(format!(
                "scale={}:{}:force_original_aspect_ratio=decrease",
                self.max_width, self.max_height
            ))
            .arg("-f")
            .arg("image2pipe")
            .video_codec("png")
            .arg("-")
    }
}

#[async_trait]
impl ThumbnailExtractor for FfmpegThumbnailExtractor {
    async fn extract(&self, video_path: &Path) -> Result<DynamicImage> {
        debug!("Extracting thumbnail frame from {}", video_path.display());

        let png = self.frame_command(video_path).capture_stdout().await?;
        if png.is_empty() {
            return Err(BridgeError::Thumbnail(format!(
                "no frame could be read from {}",
                video_path.display()
            )));
        }

        image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|e| BridgeError::Thumbnail(format!("undecodable frame: {}", e)))
    }
}

/// Write `image` as a JPEG of the given quality
pub fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| BridgeError::Thumbnail(format!("Could not save thumbnail {}: {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);

    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(&rgb)
        .map_err(|e| BridgeError::Thumbnail(format!("JPEG encoding failed: {}", e)))?;
    writer.flush()?;

    info!("Thumbnail written to {}", path.display());
    Ok(())
}
