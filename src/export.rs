//! Redraws the overlay text onto the background and writes the poster PNG.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cosmic_text::{Attrs, Buffer, Color, FontSystem, Metrics, Shaping, SwashCache};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::overlay::Position;

pub const POSTER_FILE_NAME: &str = "ergebnis_poster.png";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    /// Vertical advance per line.
    pub line_step: f32,
    pub color: [u8; 4],
    pub box_color: [u8; 4],
    pub padding: i32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 32.0,
            line_step: 40.0,
            color: [255, 255, 255, 255],
            box_color: [0, 0, 0, 128],
            padding: 5,
        }
    }
}

/// Writes `<out_dir>/ergebnis_poster.png`.
///
/// Returns `Ok(None)` without touching the disk when there is no background.
pub fn export_poster(
    background: Option<&DynamicImage>,
    text: &str,
    origin: Position,
    style: &TextStyle,
    out_dir: &Path,
) -> Result<Option<PathBuf>> {
    let Some(background) = background else {
        tracing::debug!("export skipped, no background image");
        return Ok(None);
    };

    let mut fonts = FontSystem::new();
    let mut cache = SwashCache::new();
    let canvas = render_poster(&mut fonts, &mut cache, background, text, origin, style);

    let path = out_dir.join(POSTER_FILE_NAME);
    canvas
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "poster exported");
    Ok(Some(path))
}

/// Draws at the background's natural resolution. `text` is drawn as given,
/// one line per `\n`; markup is the caller's business.
pub fn render_poster(
    fonts: &mut FontSystem,
    cache: &mut SwashCache,
    background: &DynamicImage,
    text: &str,
    origin: Position,
    style: &TextStyle,
) -> RgbaImage {
    let mut canvas = background.to_rgba8();
    if text.trim().is_empty() {
        return canvas;
    }

    let metrics = Metrics::new(style.font_size, style.line_step);
    let lines: Vec<Buffer> = text
        .lines()
        .map(|line| {
            let mut buffer = Buffer::new(fonts, metrics);
            buffer.set_size(fonts, None, None);
            buffer.set_text(fonts, line, &Attrs::new(), Shaping::Advanced, None);
            buffer.shape_until_scroll(fonts, false);
            buffer
        })
        .collect();

    let widest = lines
        .iter()
        .flat_map(|b| b.layout_runs().map(|run| run.line_w))
        .fold(0.0_f32, f32::max);
    let box_width = widest.ceil() as i32 + 2 * style.padding;
    let box_height = (lines.len() as f32 * style.line_step).ceil() as i32 + 2 * style.padding;
    fill_rect(
        &mut canvas,
        origin.x,
        origin.y,
        box_width,
        box_height,
        Rgba(style.box_color),
    );

    let [r, g, b, a] = style.color;
    let color = Color::rgba(r, g, b, a);
    for (i, buffer) in lines.iter().enumerate() {
        let x0 = origin.x + style.padding;
        let y0 = origin.y + style.padding + (i as f32 * style.line_step).round() as i32;
        buffer.draw(fonts, cache, color, |x, y, w, h, c| {
            fill_rect(
                &mut canvas,
                x0 + x,
                y0 + y,
                w as i32,
                h as i32,
                Rgba([c.r(), c.g(), c.b(), c.a()]),
            );
        });
    }

    canvas
}

/// Source-over blend of a solid rectangle, clipped to the canvas.
fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, w: i32, h: i32, color: Rgba<u8>) {
    if color.0[3] == 0 || w <= 0 || h <= 0 {
        return;
    }
    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + w).min(canvas.width() as i32);
    let y_end = (y + h).min(canvas.height() as i32);
    for py in y_start..y_end {
        for px in x_start..x_end {
            blend(canvas.get_pixel_mut(px as u32, py as u32), color);
        }
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src.0[3] as f32 / 255.0;
    let inv = 1.0 - sa;
    for i in 0..3 {
        dst.0[i] = (src.0[i] as f32 * sa + dst.0[i] as f32 * inv).round() as u8;
    }
    let da = dst.0[3] as f32 / 255.0;
    dst.0[3] = ((sa + da * inv) * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn no_background_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_poster(
            None,
            "01.05.2024 | TVM 1 | 70:65 | BBC",
            Position::new(20, 40),
            &TextStyle::default(),
            dir.path(),
        )
        .unwrap();
        assert!(written.is_none());
        assert!(!dir.path().join(POSTER_FILE_NAME).exists());
    }

    #[test]
    fn writes_png_at_natural_size() {
        let dir = tempfile::tempdir().unwrap();
        let background = white(320, 200);
        let path = export_poster(
            Some(&background),
            "line one\nline two",
            Position::new(20, 40),
            &TextStyle::default(),
            dir.path(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(path.file_name().unwrap(), POSTER_FILE_NAME);
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (320, 200));
    }

    #[test]
    fn box_is_drawn_at_overlay_position() {
        let mut fonts = FontSystem::new();
        let mut cache = SwashCache::new();
        let canvas = render_poster(
            &mut fonts,
            &mut cache,
            &white(200, 200),
            "x",
            Position::new(50, 60),
            &TextStyle::default(),
        );
        // box corner is inside the padding, so only the translucent box covers it
        let inside = canvas.get_pixel(51, 61);
        assert!(inside.0[0] < 200, "expected darkened pixel, got {inside:?}");
        assert_eq!(canvas.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
        assert_eq!(canvas.get_pixel(49, 59), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn overlay_outside_image_is_clipped() {
        let mut fonts = FontSystem::new();
        let mut cache = SwashCache::new();
        let canvas = render_poster(
            &mut fonts,
            &mut cache,
            &white(64, 64),
            "far away",
            Position::new(-1000, 5000),
            &TextStyle::default(),
        );
        assert!(canvas.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn empty_text_leaves_background_untouched() {
        let mut fonts = FontSystem::new();
        let mut cache = SwashCache::new();
        let canvas = render_poster(
            &mut fonts,
            &mut cache,
            &white(16, 16),
            "",
            Position::new(0, 0),
            &TextStyle::default(),
        );
        assert!(canvas.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }
}
