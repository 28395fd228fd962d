/// Image transformation pipeline
///
/// Downscales and recompresses large raster images and renders small inline
/// previews. Everything here is pure: bytes in, bytes (or a data URL) out.
use crate::{
    config::PipelineConfig,
    error::{VaultError, VaultResult},
    resource_store::ImageDimensions,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    },
    imageops::FilterType,
    DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat,
};
use std::io::Cursor;

/// Output of the pipeline for one image
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub payload: Vec<u8>,
    pub thumbnail_url: String,
    pub dimensions: ImageDimensions,
    /// Whether `payload` differs from the input bytes
    pub recompressed: bool,
}

/// Output of `downscale_and_recompress`
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub data: Vec<u8>,
    pub dimensions: ImageDimensions,
}

/// Applies the configured transformation policy to image payloads
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    config: PipelineConfig,
}

impl ImagePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// SVG is the only image type stored untouched; there is no vector decoder
    pub fn is_vector(mime_type: &str) -> bool {
        essence(mime_type).eq_ignore_ascii_case("image/svg+xml")
    }

    /// Thumbnail every image; downscale and recompress only above the threshold
    pub fn process(&self, mime_type: &str, payload: Vec<u8>) -> VaultResult<ProcessedImage> {
        let source = decode(&payload)?;
        let thumbnail_url =
            render_thumbnail(&source, self.config.thumbnail_size, self.config.thumbnail_quality)?;

        if payload.len() <= self.config.compression_threshold {
            return Ok(ProcessedImage {
                payload,
                thumbnail_url,
                dimensions: dimensions_of(&source),
                recompressed: false,
            });
        }

        let format = output_format(mime_type, &payload)?;
        let resized = downscale(source, self.config.max_width);
        let data = encode(&resized, format, self.config.quality)?;

        tracing::debug!(
            "Recompressed {} image from {} to {} bytes",
            mime_type,
            payload.len(),
            data.len()
        );

        Ok(ProcessedImage {
            payload: data,
            thumbnail_url,
            dimensions: dimensions_of(&resized),
            recompressed: true,
        })
    }
}

/// Scale an image down to `max_width` (aspect preserved) and re-encode it in
/// its original format at `quality` (1-100)
pub fn downscale_and_recompress(
    data: &[u8],
    mime_type: &str,
    max_width: u32,
    quality: u8,
) -> VaultResult<TransformedImage> {
    let format = output_format(mime_type, data)?;
    let resized = downscale(decode(data)?, max_width);
    let data = encode(&resized, format, quality)?;

    Ok(TransformedImage {
        data,
        dimensions: dimensions_of(&resized),
    })
}

/// Render a JPEG preview whose longer side is `max_dimension`, as a `data:` URL
pub fn thumbnail(data: &[u8], max_dimension: u32, quality: u8) -> VaultResult<String> {
    render_thumbnail(&decode(data)?, max_dimension, quality)
}

fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or_default().trim()
}

/// Encoder for the recompressed payload: the declared MIME type when the codec
/// knows it, otherwise whatever the bytes themselves turn out to be
fn output_format(mime_type: &str, data: &[u8]) -> VaultResult<ImageFormat> {
    match ImageFormat::from_mime_type(essence(mime_type).to_ascii_lowercase()) {
        Some(format) => Ok(format),
        None => Ok(image::guess_format(data)?),
    }
}

fn decode(data: &[u8]) -> VaultResult<DynamicImage> {
    let img = image::load_from_memory(data)?;

    if img.width() == 0 || img.height() == 0 {
        return Err(VaultError::Transform("Image has no pixels".to_string()));
    }

    Ok(img)
}

fn dimensions_of(img: &DynamicImage) -> ImageDimensions {
    ImageDimensions {
        width: img.width(),
        height: img.height(),
    }
}

/// `side * target / reference`, never below one pixel
fn scale_side(side: u32, target: u32, reference: u32) -> u32 {
    ((side as u64 * target as u64) / reference as u64).max(1) as u32
}

fn downscale(img: DynamicImage, max_width: u32) -> DynamicImage {
    if img.width() <= max_width {
        return img;
    }

    let height = scale_side(img.height(), max_width, img.width());
    img.resize_exact(max_width, height, FilterType::CatmullRom)
}

fn render_thumbnail(img: &DynamicImage, max_dimension: u32, quality: u8) -> VaultResult<String> {
    let (width, height) = if img.width() >= img.height() {
        (max_dimension, scale_side(img.height(), max_dimension, img.width()))
    } else {
        (scale_side(img.width(), max_dimension, img.height()), max_dimension)
    };

    // JPEG has no alpha channel; transparent sources are flattened
    let thumb = img.resize_exact(width, height, FilterType::Triangle).to_rgb8();

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(thumb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| VaultError::Transform(format!("Failed to encode thumbnail: {}", e)))?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&buf)))
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> VaultResult<Vec<u8>> {
    let mut buf = Vec::new();
    let (width, height) = (img.width(), img.height());

    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        // PNG is lossless; quality maps to the strongest compression setting
        ImageFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilterType::Adaptive);
            if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                encoder.write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
            } else {
                let rgb = img.to_rgb8();
                encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            }
        }
        other => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut Cursor::new(&mut buf), other),
    };

    result?;

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, _| image::Rgb([(x % 256) as u8, 64, 128]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg).unwrap();
        buf
    }

    fn decode_data_url(url: &str) -> DynamicImage {
        let encoded = url.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap()
    }

    #[test]
    fn test_downscale_preserves_aspect_ratio() {
        let data = png_bytes(3000, 1500);

        let transformed = downscale_and_recompress(&data, "image/png", 1920, 80).unwrap();

        assert_eq!(transformed.dimensions, ImageDimensions { width: 1920, height: 960 });
        let decoded = image::load_from_memory_with_format(&transformed.data, ImageFormat::Png).unwrap();
        assert_eq!(decoded.width(), 1920);
        assert_eq!(decoded.height(), 960);
    }

    #[test]
    fn test_narrow_image_keeps_dimensions() {
        let data = jpeg_bytes(640, 480);

        let transformed = downscale_and_recompress(&data, "image/jpeg", 1920, 80).unwrap();

        assert_eq!(transformed.dimensions, ImageDimensions { width: 640, height: 480 });
        assert!(image::load_from_memory_with_format(&transformed.data, ImageFormat::Jpeg).is_ok());
    }

    #[test]
    fn test_thumbnail_longer_side_matches_target() {
        let url = thumbnail(&png_bytes(400, 100), 200, 70).unwrap();
        let thumb = decode_data_url(&url);
        assert_eq!((thumb.width(), thumb.height()), (200, 50));

        let url = thumbnail(&jpeg_bytes(90, 300), 200, 70).unwrap();
        let thumb = decode_data_url(&url);
        assert_eq!((thumb.width(), thumb.height()), (60, 200));
    }

    #[test]
    fn test_thumbnail_flattens_transparent_png() {
        let img = image::RgbaImage::from_pixel(50, 50, image::Rgba([255, 0, 0, 0]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();

        let url = thumbnail(&buf, 20, 70).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_corrupt_image_is_a_transform_error() {
        let garbage = b"\x89PNG\r\n\x1a\nthis is not really a png".to_vec();

        assert!(matches!(thumbnail(&garbage, 200, 70), Err(VaultError::Transform(_))));
        assert!(matches!(
            downscale_and_recompress(&garbage, "image/png", 1920, 80),
            Err(VaultError::Transform(_))
        ));
    }

    #[test]
    fn test_only_svg_is_vector() {
        assert!(ImagePipeline::is_vector("image/svg+xml"));
        assert!(ImagePipeline::is_vector("Image/SVG+XML; charset=utf-8"));
        assert!(!ImagePipeline::is_vector("image/png"));
        assert!(!ImagePipeline::is_vector("image/heic"));
        assert!(!ImagePipeline::is_vector("image/x-foo"));
    }

    #[test]
    fn test_unknown_mime_type_is_decoded_from_content() {
        let pipeline = ImagePipeline::new(PipelineConfig::default());

        let processed = pipeline.process("image/x-foo", png_bytes(40, 20)).unwrap();
        assert_eq!(processed.dimensions, ImageDimensions { width: 40, height: 20 });
        assert!(processed.thumbnail_url.starts_with("data:image/jpeg;base64,"));

        let err = pipeline
            .process("image/heic", b"garbage not an image".to_vec())
            .unwrap_err();
        assert!(matches!(err, VaultError::Transform(_)));
    }

    #[test]
    fn test_unknown_mime_type_recompresses_in_detected_format() {
        let pipeline = ImagePipeline::new(PipelineConfig {
            compression_threshold: 1024,
            max_width: 100,
            ..PipelineConfig::default()
        });
        let data = png_bytes(400, 200);
        assert!(data.len() > 1024);

        let processed = pipeline.process("image/x-foo", data).unwrap();

        assert!(processed.recompressed);
        assert_eq!(image::guess_format(&processed.payload).unwrap(), ImageFormat::Png);
        assert_eq!(processed.dimensions, ImageDimensions { width: 100, height: 50 });
    }

    #[test]
    fn test_process_below_threshold_is_byte_identical() {
        let pipeline = ImagePipeline::new(PipelineConfig::default());
        let data = png_bytes(300, 200);

        let processed = pipeline.process("image/png", data.clone()).unwrap();

        assert!(!processed.recompressed);
        assert_eq!(processed.payload, data);
        assert_eq!(processed.dimensions, ImageDimensions { width: 300, height: 200 });
        assert!(!processed.thumbnail_url.is_empty());
    }

    #[test]
    fn test_process_above_threshold_recompresses() {
        let pipeline = ImagePipeline::new(PipelineConfig {
            compression_threshold: 1024,
            max_width: 100,
            ..PipelineConfig::default()
        });
        let data = jpeg_bytes(400, 200);
        assert!(data.len() > 1024);

        let processed = pipeline.process("image/jpeg", data.clone()).unwrap();

        assert!(processed.recompressed);
        assert_ne!(processed.payload, data);
        assert_eq!(processed.dimensions, ImageDimensions { width: 100, height: 50 });
    }
}
