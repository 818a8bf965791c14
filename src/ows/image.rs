//! Error reports rendered as map images.
//!
//! Only the map service may answer a failed request with an image: an
//! "in-image" report draws the exception code and message onto the
//! requested canvas, a "blank" report returns the bare background so a map
//! client can keep compositing layers.

use std::io::Cursor;

use font8x8::UnicodeFonts;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

pub const DEFAULT_WIDTH: u32 = 600;
pub const DEFAULT_HEIGHT: u32 = 400;

const TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);
const GLYPH_SIZE: i64 = 8;

/// Raster encodings an error image can be delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Gif,
    Jpeg,
}

impl ImageEncoding {
    /// Map a `FORMAT` value (MIME type or bare name) to an encoding.
    pub fn from_format(format: &str) -> Option<Self> {
        let format = format.trim().to_ascii_lowercase();
        let base = format.split(';').next().unwrap_or_default().trim();
        match base {
            "image/png" | "png" => Some(Self::Png),
            "image/gif" | "gif" => Some(Self::Gif),
            "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Jpeg => "image/jpeg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Canvas settings taken from the failed map request.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub background: Rgba<u8>,
    pub transparent: bool,
    pub encoding: ImageEncoding,
}

impl Canvas {
    /// Build from raw request values; missing or malformed values use defaults,
    /// sizes are clamped to `max`.
    pub fn from_request(
        width: Option<&str>,
        height: Option<&str>,
        bgcolor: Option<&str>,
        transparent: Option<&str>,
        encoding: ImageEncoding,
        max: (u32, u32),
    ) -> Self {
        let dimension = |value: Option<&str>, default: u32, limit: u32| {
            value
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
                .min(limit.max(1))
        };
        Self {
            width: dimension(width, DEFAULT_WIDTH, max.0),
            height: dimension(height, DEFAULT_HEIGHT, max.1),
            background: bgcolor.and_then(parse_color).unwrap_or(Rgba([255, 255, 255, 255])),
            transparent: transparent.is_some_and(|t| t.trim().eq_ignore_ascii_case("true")),
            encoding,
        }
    }
}

/// Parse `0xRRGGBB` or `#RRGGBB`.
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim();
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .or_else(|| value.strip_prefix('#'))?;
    if hex.len() != 6 {
        return None;
    }
    let rgb = u32::from_str_radix(hex, 16).ok()?;
    Some(Rgba([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, 255]))
}

/// Render an in-image report: code, then the message split at its first colon.
pub fn render_in_image(canvas: &Canvas, code: &str, message: &str) -> Result<Vec<u8>, image::ImageError> {
    let mut img = background(canvas);
    let (head, tail) = match message.find(':') {
        Some(pos) => message.split_at(pos + 1),
        None => ("", message),
    };
    draw_text(&mut img, code, 5, 20);
    draw_text(&mut img, head, 5, 50);
    draw_text(&mut img, tail, 5, 80);
    encode(img, canvas.encoding)
}

/// Render a blank report: just the background.
pub fn render_blank(canvas: &Canvas) -> Result<Vec<u8>, image::ImageError> {
    encode(background(canvas), canvas.encoding)
}

fn background(canvas: &Canvas) -> RgbaImage {
    let fill = if canvas.transparent {
        Rgba([0, 0, 0, 0])
    } else {
        canvas.background
    };
    RgbaImage::from_pixel(canvas.width, canvas.height, fill)
}

/// Draw `text` with its baseline at `y`.
fn draw_text(img: &mut RgbaImage, text: &str, x: i64, y: i64) {
    let top = y - GLYPH_SIZE + 1;
    for (index, c) in text.chars().enumerate() {
        let glyph = font8x8::BASIC_FONTS
            .get(c)
            .or_else(|| font8x8::BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let left = x + index as i64 * GLYPH_SIZE;
        if left >= i64::from(img.width()) {
            break;
        }
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let px = left + col;
                let py = top + row as i64;
                if px >= 0 && py >= 0 && px < i64::from(img.width()) && py < i64::from(img.height()) {
                    img.put_pixel(px as u32, py as u32, TEXT_COLOR);
                }
            }
        }
    }
}

fn encode(img: RgbaImage, encoding: ImageEncoding) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    let image = match encoding {
        // JPEG has no alpha channel
        ImageEncoding::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
        _ => DynamicImage::ImageRgba8(img),
    };
    image.write_to(&mut out, encoding.image_format())?;
    Ok(out.into_inner())
}
