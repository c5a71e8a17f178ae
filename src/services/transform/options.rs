use crate::services::error::MediaError;
use image::Rgba;
use std::collections::BTreeMap;

/// Resize placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Fit entirely inside the target box, aspect ratio preserved.
    Keep,
    /// Independent horizontal/vertical scaling; aspect ratio not preserved.
    Stretch,
    /// Scale to cover the box, then center-crop to exactly the box.
    Crop,
    /// Fit, then pad to the exact box with a background color.
    Extent,
    /// Fit as sharp foreground over a stretched, blurred copy of the source.
    BackgroundBlur,
}

impl ResizeMode {
    pub fn parse(value: &str) -> Result<Self, MediaError> {
        match value {
            "keep" => Ok(Self::Keep),
            "stretch" => Ok(Self::Stretch),
            "crop" => Ok(Self::Crop),
            "extent" => Ok(Self::Extent),
            "backgroundblur" => Ok(Self::BackgroundBlur),
            other => Err(MediaError::InvalidAction(format!(
                "unknown resize type {other}"
            ))),
        }
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Jpeg,
    Png,
    Webp,
    Ptiff,
    Gif,
}

impl TargetFormat {
    pub fn parse(value: &str) -> Result<Self, MediaError> {
        match value {
            "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "ptiff" => Ok(Self::Ptiff),
            "gif" => Ok(Self::Gif),
            other => Err(MediaError::InvalidFormat(format!(
                "invalid format {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Ptiff => "ptiff",
            Self::Gif => "gif",
        }
    }

    pub fn mimetype(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Ptiff => "image/tiff",
            Self::Gif => "image/gif",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Webp => image::ImageFormat::WebP,
            Self::Ptiff => image::ImageFormat::Tiff,
            Self::Gif => image::ImageFormat::Gif,
        }
    }
}

/// Options of one resize request, built from the canonical parameter
/// dictionary.
#[derive(Debug, Clone)]
pub struct ResizeOptions {
    /// Requested box; zero means "derive from the source" (see
    /// [`ResizeOptions::target_box`]).
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
    pub format: TargetFormat,
    /// Fill color for `extent`; `None` is transparent.
    pub background: Option<Rgba<u8>>,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            mode: ResizeMode::Keep,
            format: TargetFormat::Png,
            background: None,
        }
    }
}

impl ResizeOptions {
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self, MediaError> {
        let mut options = Self::default();

        for (key, value) in params {
            match key.as_str() {
                "size" => {
                    let (w, h) = value.split_once('x').ok_or_else(|| {
                        MediaError::InvalidAction(format!("cannot parse size {value}"))
                    })?;
                    if !w.is_empty() {
                        options.width = w.parse().map_err(|_| {
                            MediaError::InvalidAction(format!("cannot parse width {w}"))
                        })?;
                    }
                    if !h.is_empty() {
                        options.height = h.parse().map_err(|_| {
                            MediaError::InvalidAction(format!("cannot parse height {h}"))
                        })?;
                    }
                }
                "resizetype" => options.mode = ResizeMode::parse(value)?,
                "format" => options.format = TargetFormat::parse(value)?,
                "background" => {
                    options.background = if value == "none" {
                        None
                    } else {
                        Some(parse_color(value)?)
                    };
                }
                // Recognized by the canonicalizer but not by this engine
                // (e.g. overlay); ignored here.
                _ => {}
            }
        }
        Ok(options)
    }

    /// Resolves the requested box against the source dimensions: both zero
    /// means the source size; a single zero is derived by preserving the
    /// source aspect ratio against the supplied dimension.
    pub fn target_box(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        match (self.width, self.height) {
            (0, 0) => (source_width, source_height),
            (0, h) => {
                let w = (h as f64 * source_width as f64 / source_height as f64).round();
                (w as u32, h)
            }
            (w, 0) => {
                let h = (w as f64 * source_height as f64 / source_width as f64).round();
                (w, h as u32)
            }
            (w, h) => (w, h),
        }
    }
}

/// Scaled size fitting entirely inside the target box (scale factor
/// `min(tw/sw, th/sh)`).
pub fn fit_size(sw: u32, sh: u32, tw: u32, th: u32) -> (u32, u32) {
    let scale = (tw as f64 / sw as f64).min(th as f64 / sh as f64);
    scaled(sw, sh, scale)
}

/// Scaled size covering the target box (scale factor `max(tw/sw, th/sh)`).
pub fn fill_size(sw: u32, sh: u32, tw: u32, th: u32) -> (u32, u32) {
    let scale = (tw as f64 / sw as f64).max(th as f64 / sh as f64);
    scaled(sw, sh, scale)
}

fn scaled(sw: u32, sh: u32, scale: f64) -> (u32, u32) {
    let w = (sw as f64 * scale).round().max(1.0) as u32;
    let h = (sh as f64 * scale).round().max(1.0) as u32;
    (w, h)
}

/// Parses `rgb`/`rrggbb`/`rrggbbaa` hex colors.
fn parse_color(value: &str) -> Result<Rgba<u8>, MediaError> {
    let invalid = || MediaError::InvalidAction(format!("cannot parse background color {value}"));

    let expanded = match value.len() {
        3 => {
            let mut doubled: String = value.chars().flat_map(|c| [c, c]).collect();
            doubled.push_str("ff");
            doubled
        }
        6 => format!("{value}ff"),
        8 => value.to_string(),
        _ => return Err(invalid()),
    };
    let bytes = hex::decode(&expanded).map_err(|_| invalid())?;
    Ok(Rgba([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
