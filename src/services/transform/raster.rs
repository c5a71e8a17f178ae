use super::options::{ResizeMode, ResizeOptions};
use super::{decode_oriented, encode, ImageTransformer, Rendition};
use crate::services::error::MediaError;
use image::imageops::FilterType;

/// Fast single-frame backend for the plain geometric modes.
pub struct RasterBackend;

impl ImageTransformer for RasterBackend {
    fn transform(&self, source: &[u8], options: &ResizeOptions) -> Result<Rendition, MediaError> {
        let img = decode_oriented(source)?;
        let (tw, th) = options.target_box(img.width(), img.height());

        let out = match options.mode {
            ResizeMode::Keep => img.resize(tw, th, FilterType::Lanczos3),
            ResizeMode::Stretch => img.resize_exact(tw, th, FilterType::Lanczos3),
            ResizeMode::Crop => img.resize_to_fill(tw, th, FilterType::Lanczos3),
            other => {
                return Err(MediaError::InvalidAction(format!(
                    "resize type {other:?} needs the compositing backend"
                )))
            }
        };
        encode(&out, options.format)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{params, test_image};
    use super::super::options::TargetFormat;
    use super::*;

    fn run(source: &[u8], pairs: &[(&str, &str)]) -> Rendition {
        let options = ResizeOptions::from_params(&params(pairs)).unwrap();
        RasterBackend.transform(source, &options).unwrap()
    }

    #[test]
    fn test_keep_fits_inside_box() {
        let rendition = run(&test_image(200, 100), &[("size", "100x100"), ("resizetype", "keep")]);
        assert!(rendition.meta.width <= 100 && rendition.meta.height <= 100);
        assert_eq!((rendition.meta.width, rendition.meta.height), (100, 50));
    }

    #[test]
    fn test_crop_hits_exact_box() {
        let rendition = run(&test_image(200, 100), &[("size", "100x100"), ("resizetype", "crop")]);
        assert_eq!((rendition.meta.width, rendition.meta.height), (100, 100));
    }

    #[test]
    fn test_stretch_hits_exact_box() {
        let rendition = run(
            &test_image(200, 100),
            &[("size", "30x90"), ("resizetype", "stretch")],
        );
        assert_eq!((rendition.meta.width, rendition.meta.height), (30, 90));
    }

    #[test]
    fn test_zero_size_keeps_source_dimensions() {
        let rendition = run(&test_image(64, 48), &[("resizetype", "keep")]);
        assert_eq!((rendition.meta.width, rendition.meta.height), (64, 48));
    }

    #[test]
    fn test_aspect_derived_from_single_dimension() {
        // source 200x50, height 100 -> width 400
        let rendition = run(
            &test_image(200, 50),
            &[("size", "x100"), ("resizetype", "stretch")],
        );
        assert_eq!((rendition.meta.width, rendition.meta.height), (400, 100));
    }

    #[test]
    fn test_jpeg_output_mimetype() {
        let options = ResizeOptions {
            width: 10,
            height: 10,
            mode: ResizeMode::Stretch,
            format: TargetFormat::Jpeg,
            background: None,
        };
        let rendition = RasterBackend
            .transform(&test_image(20, 20), &options)
            .unwrap();
        assert_eq!(rendition.meta.mimetype, "image/jpeg");
        assert_eq!(rendition.meta.format, "jpeg");
    }
}
