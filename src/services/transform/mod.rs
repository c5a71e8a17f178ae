mod animated;
mod canvas;
pub mod options;
mod raster;

pub use options::{ResizeMode, ResizeOptions, TargetFormat};

use crate::services::error::MediaError;
use anyhow::Context;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::io::Cursor;

/// Descriptive metadata of a generated derivative.
#[derive(Debug, Clone)]
pub struct RenditionMeta {
    pub width: i64,
    pub height: i64,
    /// Seconds; zero for still images.
    pub duration: i64,
    pub mimetype: String,
    pub format: String,
    pub size: i64,
}

/// A generated derivative: the bytes plus their descriptive metadata. The
/// engine never writes durable storage itself.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub bytes: Vec<u8>,
    pub meta: RenditionMeta,
}

/// Capability interface of one image-processing backend.
pub trait ImageTransformer: Send + Sync {
    fn transform(&self, source: &[u8], options: &ResizeOptions) -> Result<Rendition, MediaError>;
}

/// Backend classes the registry dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Fast single-frame path for plain geometric modes.
    Raster,
    /// Full-featured compositing path (padding, blur).
    Canvas,
    /// Multi-frame-capable path; forced for GIF sources.
    Animated,
}

/// Selects the backend class for a source mimetype and resize mode.
pub fn backend_kind(mimetype: &str, mode: ResizeMode) -> BackendKind {
    if mimetype.eq_ignore_ascii_case("image/gif") {
        return BackendKind::Animated;
    }
    match mode {
        ResizeMode::Keep | ResizeMode::Stretch | ResizeMode::Crop => BackendKind::Raster,
        ResizeMode::Extent | ResizeMode::BackgroundBlur => BackendKind::Canvas,
    }
}

/// Resolves an action name plus canonical parameters into a concrete
/// transform and drives the appropriate backend.
pub struct TransformEngine {
    raster: Box<dyn ImageTransformer>,
    canvas: Box<dyn ImageTransformer>,
    animated: Box<dyn ImageTransformer>,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self {
            raster: Box::new(raster::RasterBackend),
            canvas: Box::new(canvas::CanvasBackend),
            animated: Box::new(animated::AnimatedBackend),
        }
    }
}

impl TransformEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(
        &self,
        mimetype: &str,
        action: &str,
        params: &BTreeMap<String, String>,
        source: &[u8],
    ) -> Result<Rendition, MediaError> {
        let supertype = mimetype
            .split('/')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if supertype != "image" {
            return Err(MediaError::InvalidType(format!(
                "cannot transform mimetype {mimetype}"
            )));
        }
        if action != "resize" {
            return Err(MediaError::InvalidAction(format!(
                "action {action} not defined for {mimetype}"
            )));
        }

        let options = ResizeOptions::from_params(params)?;
        let backend = match backend_kind(mimetype, options.mode) {
            BackendKind::Raster => &self.raster,
            BackendKind::Canvas => &self.canvas,
            BackendKind::Animated => &self.animated,
        };
        backend.transform(source, &options)
    }
}

/// Decodes an image and normalizes its EXIF orientation so all geometric
/// operations see an upright source.
pub(crate) fn decode_oriented(source: &[u8]) -> Result<DynamicImage, MediaError> {
    let img = image::load_from_memory(source)
        .context("cannot decode source image")
        .map_err(MediaError::Other)?;
    Ok(apply_orientation(img, read_orientation(source)))
}

fn read_orientation(source: &[u8]) -> u32 {
    let reader = exif::Reader::new();
    let Ok(meta) = reader.read_from_container(&mut Cursor::new(source)) else {
        return 1;
    };
    meta.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Encodes to the target format and assembles the rendition metadata.
pub(crate) fn encode(img: &DynamicImage, format: TargetFormat) -> Result<Rendition, MediaError> {
    // JPEG has no alpha channel, and the WebP encoder only accepts 8-bit
    // buffers.
    let encodable = match format {
        TargetFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        TargetFormat::Webp => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => img.clone(),
    };

    let mut bytes = Vec::new();
    encodable
        .write_to(&mut Cursor::new(&mut bytes), format.image_format())
        .with_context(|| format!("cannot encode to {}", format.name()))
        .map_err(MediaError::Other)?;

    let size = bytes.len() as i64;
    Ok(Rendition {
        bytes,
        meta: RenditionMeta {
            width: encodable.width() as i64,
            height: encodable.height() as i64,
            duration: 0,
            mimetype: format.mimetype().to_string(),
            format: format.name().to_string(),
            size,
        },
    })
}
