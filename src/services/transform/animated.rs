use super::canvas::{background_blur, extent};
use super::options::{ResizeMode, ResizeOptions, TargetFormat};
use super::{encode, ImageTransformer, Rendition, RenditionMeta};
use crate::services::error::MediaError;
use anyhow::Context;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, Frame};
use std::io::Cursor;

/// Multi-frame-capable backend; every GIF source lands here so animations
/// survive the transform.
pub struct AnimatedBackend;

impl ImageTransformer for AnimatedBackend {
    fn transform(&self, source: &[u8], options: &ResizeOptions) -> Result<Rendition, MediaError> {
        let decoder = GifDecoder::new(Cursor::new(source))
            .context("cannot decode gif")
            .map_err(MediaError::Other)?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .context("cannot read gif frames")
            .map_err(MediaError::Other)?;
        let first = frames
            .first()
            .ok_or_else(|| MediaError::InvalidType("gif without frames".to_string()))?;

        let (sw, sh) = first.buffer().dimensions();
        let (tw, th) = options.target_box(sw, sh);

        let transformed: Vec<Frame> = frames
            .iter()
            .map(|frame| {
                let img = DynamicImage::ImageRgba8(frame.buffer().clone());
                let out = render_frame(&img, options, tw, th).to_rgba8();
                Frame::from_parts(out, 0, 0, frame.delay())
            })
            .collect();

        if options.format != TargetFormat::Gif {
            // Non-animated target formats keep only the first frame.
            let flat = DynamicImage::ImageRgba8(transformed[0].buffer().clone());
            return encode(&flat, options.format);
        }

        let (width, height) = transformed[0].buffer().dimensions();
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            encoder
                .set_repeat(Repeat::Infinite)
                .context("cannot configure gif encoder")
                .map_err(MediaError::Other)?;
            encoder
                .encode_frames(transformed)
                .context("cannot encode gif frames")
                .map_err(MediaError::Other)?;
        }

        let size = bytes.len() as i64;
        Ok(Rendition {
            bytes,
            meta: RenditionMeta {
                width: width as i64,
                height: height as i64,
                duration: 0,
                mimetype: TargetFormat::Gif.mimetype().to_string(),
                format: TargetFormat::Gif.name().to_string(),
                size,
            },
        })
    }
}

fn render_frame(img: &DynamicImage, options: &ResizeOptions, tw: u32, th: u32) -> DynamicImage {
    match options.mode {
        ResizeMode::Keep => img.resize(tw, th, FilterType::Lanczos3),
        ResizeMode::Stretch => img.resize_exact(tw, th, FilterType::Lanczos3),
        ResizeMode::Crop => img.resize_to_fill(tw, th, FilterType::Lanczos3),
        ResizeMode::Extent => extent(img, tw, th, options.background),
        ResizeMode::BackgroundBlur => background_blur(img, tw, th),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::params;
    use super::*;
    use image::{Delay, Rgba, RgbaImage};
    use std::time::Duration;

    fn test_gif(width: u32, height: u32, frames: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            for i in 0..frames {
                let shade = (i * 40) as u8;
                let buffer =
                    RgbaImage::from_pixel(width, height, Rgba([shade, 255 - shade, 0, 255]));
                let frame = Frame::from_parts(
                    buffer,
                    0,
                    0,
                    Delay::from_saturating_duration(Duration::from_millis(100)),
                );
                encoder.encode_frames(std::iter::once(frame)).unwrap();
            }
        }
        bytes
    }

    fn run(source: &[u8], pairs: &[(&str, &str)]) -> Rendition {
        let options = ResizeOptions::from_params(&params(pairs)).unwrap();
        AnimatedBackend.transform(source, &options).unwrap()
    }

    #[test]
    fn test_resize_keeps_all_frames() {
        let source = test_gif(40, 20, 3);
        let rendition = run(
            &source,
            &[("size", "20x20"), ("resizetype", "keep"), ("format", "gif")],
        );
        assert_eq!((rendition.meta.width, rendition.meta.height), (20, 10));
        assert_eq!(rendition.meta.mimetype, "image/gif");

        let decoder = GifDecoder::new(Cursor::new(&rendition.bytes[..])).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_non_gif_target_flattens_first_frame() {
        let source = test_gif(40, 20, 2);
        let rendition = run(
            &source,
            &[("size", "10x10"), ("resizetype", "stretch"), ("format", "png")],
        );
        assert_eq!(rendition.meta.mimetype, "image/png");
        assert_eq!((rendition.meta.width, rendition.meta.height), (10, 10));
    }

    #[test]
    fn test_crop_hits_exact_box_per_frame() {
        let source = test_gif(40, 20, 2);
        let rendition = run(
            &source,
            &[("size", "16x16"), ("resizetype", "crop"), ("format", "gif")],
        );
        assert_eq!((rendition.meta.width, rendition.meta.height), (16, 16));
    }
}
