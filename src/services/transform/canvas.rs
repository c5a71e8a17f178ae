use super::options::{fit_size, ResizeMode, ResizeOptions};
use super::{decode_oriented, encode, ImageTransformer, Rendition};
use crate::services::error::MediaError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

const BLUR_SIGMA: f32 = 10.0;

/// Full-featured backend for the compositing modes (`extent`,
/// `backgroundblur`).
pub struct CanvasBackend;

impl ImageTransformer for CanvasBackend {
    fn transform(&self, source: &[u8], options: &ResizeOptions) -> Result<Rendition, MediaError> {
        let img = decode_oriented(source)?;
        let (tw, th) = options.target_box(img.width(), img.height());

        let out = match options.mode {
            ResizeMode::Extent => extent(&img, tw, th, options.background),
            ResizeMode::BackgroundBlur => background_blur(&img, tw, th),
            other => {
                return Err(MediaError::InvalidAction(format!(
                    "resize type {other:?} belongs to the raster backend"
                )))
            }
        };
        encode(&out, options.format)
    }
}

/// Fit the source inside the box, then pad to exactly the box, centered,
/// filled with the background color (transparent when none is given).
pub(super) fn extent(
    img: &DynamicImage,
    tw: u32,
    th: u32,
    background: Option<Rgba<u8>>,
) -> DynamicImage {
    let (fw, fh) = fit_size(img.width(), img.height(), tw, th);
    let fitted = img.resize_exact(fw, fh, FilterType::Lanczos3).to_rgba8();

    let fill = background.unwrap_or(Rgba([0, 0, 0, 0]));
    let mut canvas = RgbaImage::from_pixel(tw, th, fill);
    let x = (tw as i64 - fw as i64) / 2;
    let y = (th as i64 - fh as i64) / 2;
    imageops::overlay(&mut canvas, &fitted, x, y);
    DynamicImage::ImageRgba8(canvas)
}

/// Stretch the source over the whole box, blur it, then composite a sharp
/// fitted copy centered on top. Fills a target aspect ratio without cropping
/// or letterboxing artifacts.
pub(super) fn background_blur(img: &DynamicImage, tw: u32, th: u32) -> DynamicImage {
    let mut backdrop = img
        .resize_exact(tw, th, FilterType::Lanczos3)
        .blur(BLUR_SIGMA)
        .to_rgba8();

    let (fw, fh) = fit_size(img.width(), img.height(), tw, th);
    let foreground = img.resize_exact(fw, fh, FilterType::Lanczos3).to_rgba8();
    let x = (tw as i64 - fw as i64) / 2;
    let y = (th as i64 - fh as i64) / 2;
    imageops::overlay(&mut backdrop, &foreground, x, y);
    DynamicImage::ImageRgba8(backdrop)
}
