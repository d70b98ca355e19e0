//! Drawing primitives shared by the animated renderer and the screenshot
//! variant: a tiny-skia canvas with an optional clip, and a glyph painter that
//! walks the font fallback chain.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use image::RgbaImage;
use tiny_skia::{
    Color, FillRule, FilterQuality, IntSize, LineCap, LineJoin, Mask, Paint, Path, PathBuilder,
    Pattern, Pixmap, Rect, SpreadMode, Stroke, Transform,
};

use crate::assets::FontSet;
use crate::error::Result;
use crate::layout::TextMeasure;
use crate::theme::Rgb;

/// Control-point factor for quarter circles built from cubic curves.
const KAPPA: f32 = 0.552_284_8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClipRect {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

pub struct Canvas {
    pixmap: Pixmap,
    mask: Option<Mask>,
    clip: Option<ClipRect>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, fill: Rgb) -> Result<Self> {
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate a {width}x{height} canvas"))?;
        pixmap.fill(Color::from_rgba8(fill[0], fill[1], fill[2], 255));
        Ok(Self {
            pixmap,
            mask: None,
            clip: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Restrict shapes and glyphs to a rectangle until [`Canvas::clear_clip`].
    pub fn set_clip(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let Some(rect) = Rect::from_xywh(x, y, width.max(1.0), height.max(1.0)) else {
            return;
        };
        let Some(mut mask) = Mask::new(self.width(), self.height()) else {
            return;
        };
        mask.fill_path(
            &PathBuilder::from_rect(rect),
            FillRule::Winding,
            false,
            Transform::identity(),
        );
        self.mask = Some(mask);
        self.clip = Some(ClipRect {
            x0: x.floor() as i32,
            y0: y.floor() as i32,
            x1: (x + width).ceil() as i32,
            y1: (y + height).ceil() as i32,
        });
    }

    pub fn clear_clip(&mut self) {
        self.mask = None;
        self.clip = None;
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        if let Some(rect) = Rect::from_xywh(x, y, width, height) {
            self.fill(&PathBuilder::from_rect(rect), color);
        }
    }

    pub fn fill_round_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
        color: Rgb,
    ) {
        if let Some(path) = round_rect_path(x, y, width, height, radius) {
            self.fill(&path, color);
        }
    }

    pub fn stroke_round_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
        color: Rgb,
        line_width: f32,
    ) {
        if let Some(path) = round_rect_path(x, y, width, height, radius) {
            self.stroke(&path, color, line_width);
        }
    }

    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgb) {
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            self.fill(&path, color);
        }
    }

    pub fn fill_polygon(&mut self, points: &[(f32, f32)], color: Rgb) {
        if let Some(path) = polyline_path(points, true) {
            self.fill(&path, color);
        }
    }

    pub fn stroke_polyline(&mut self, points: &[(f32, f32)], color: Rgb, line_width: f32) {
        if let Some(path) = polyline_path(points, false) {
            self.stroke(&path, color, line_width);
        }
    }

    /// Draw a square image clipped to a circle at `(x, y)`.
    pub fn fill_circle_image(&mut self, x: f32, y: f32, image: &Pixmap) {
        let radius = image.width() as f32 / 2.0;
        let Some(path) = PathBuilder::from_circle(x + radius, y + radius, radius) else {
            return;
        };
        let paint = Paint {
            shader: Pattern::new(
                image.as_ref(),
                SpreadMode::Pad,
                FilterQuality::Bilinear,
                1.0,
                Transform::from_translate(x, y),
            ),
            anti_alias: true,
            ..Paint::default()
        };
        self.pixmap.fill_path(
            &path,
            &paint,
            FillRule::Winding,
            Transform::identity(),
            self.mask.as_ref(),
        );
    }

    /// Copy `other` onto this canvas with its top-left at `(x, y)`.
    pub fn draw_canvas(&mut self, x: i32, y: i32, other: &Canvas) {
        self.pixmap.draw_pixmap(
            x,
            y,
            other.pixmap.as_ref(),
            &tiny_skia::PixmapPaint::default(),
            Transform::identity(),
            self.mask.as_ref(),
        );
    }

    /// Straight RGBA bytes. Every canvas starts opaque, so premultiplied and
    /// straight alpha coincide.
    pub fn into_rgba(self) -> Result<RgbaImage> {
        let width = self.pixmap.width();
        let height = self.pixmap.height();
        let data = self.pixmap.take();
        let image = RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("pixel buffer does not match a {width}x{height} canvas"))?;
        Ok(image)
    }

    fn fill(&mut self, path: &Path, color: Rgb) {
        self.pixmap.fill_path(
            path,
            &solid(color),
            FillRule::Winding,
            Transform::identity(),
            self.mask.as_ref(),
        );
    }

    fn stroke(&mut self, path: &Path, color: Rgb, line_width: f32) {
        let stroke = Stroke {
            width: line_width.max(1.0),
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        self.pixmap.stroke_path(
            path,
            &solid(color),
            &stroke,
            Transform::identity(),
            self.mask.as_ref(),
        );
    }

    fn blend_glyph(&mut self, x: i32, y: i32, glyph: &GlyphBitmap, color: Rgb) {
        let frame_width = self.pixmap.width() as i32;
        let frame_height = self.pixmap.height() as i32;
        let clip = self.clip.unwrap_or(ClipRect {
            x0: 0,
            y0: 0,
            x1: frame_width,
            y1: frame_height,
        });
        let frame = self.pixmap.data_mut();

        for row in 0..glyph.height {
            let py = y + row as i32;
            if py < clip.y0.max(0) || py >= clip.y1.min(frame_height) {
                continue;
            }
            for col in 0..glyph.width {
                let px = x + col as i32;
                if px < clip.x0.max(0) || px >= clip.x1.min(frame_width) {
                    continue;
                }
                let mask = glyph.bitmap[row * glyph.width + col];
                if mask == 0 {
                    continue;
                }
                let idx = ((py * frame_width + px) * 4) as usize;
                blend_pixel(frame, idx, [color[0], color[1], color[2], mask]);
            }
        }
    }
}

fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    let inv_alpha = 255_u16 - alpha;
    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}

fn solid(color: Rgb) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], 255);
    paint.anti_alias = true;
    paint
}

pub fn round_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<Path> {
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);
    let k = r * KAPPA;
    let (right, bottom) = (x + width, y + height);

    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn polyline_path(points: &[(f32, f32)], close: bool) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.0, first.1);
    for (x, y) in rest {
        pb.line_to(*x, *y);
    }
    if close {
        pb.close();
    }
    pb.finish()
}

/// Square-crop, resize and premultiply a decoded image for circular drawing.
pub fn avatar_pixmap(image: &RgbaImage, size: u32) -> Option<Pixmap> {
    let side = image.width().min(image.height());
    if side == 0 || size == 0 {
        return None;
    }
    let x = (image.width() - side) / 2;
    let y = (image.height() - side) / 2;
    let square = image::imageops::crop_imm(image, x, y, side, side).to_image();
    let resized =
        image::imageops::resize(&square, size, size, image::imageops::FilterType::Lanczos3);

    let mut data = resized.into_raw();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = u16::from(pixel[3]);
        for channel in &mut pixel[..3] {
            *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, IntSize::from_wh(size, size)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GlyphKey {
    font: usize,
    ch: char,
    px_bits: u32,
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    xmin: i32,
    ymin: i32,
    bitmap: Vec<u8>,
}

/// Rasterizes text with the font fallback chain. Advances come from the same
/// [`FontSet`] the layout engine measures with, so drawn lines match wrapped
/// widths. Characters no font covers advance without drawing.
pub struct TextPainter {
    fonts: Arc<FontSet>,
    glyph_cache: HashMap<GlyphKey, GlyphBitmap>,
}

impl TextPainter {
    pub fn new(fonts: Arc<FontSet>) -> Self {
        Self {
            fonts,
            glyph_cache: HashMap::new(),
        }
    }

    pub fn fonts(&self) -> &FontSet {
        &self.fonts
    }

    pub fn measure(&self, text: &str, px: f32) -> f32 {
        self.fonts.measure(text, px)
    }

    /// Draw `text` with its em box top at `top`. Returns the pen position.
    pub fn draw_text(
        &mut self,
        canvas: &mut Canvas,
        x: f32,
        top: f32,
        text: &str,
        px: f32,
        color: Rgb,
    ) -> f32 {
        let Self {
            fonts,
            glyph_cache,
        } = self;
        let baseline = top + fonts.ascent(px);
        let mut pen = x;

        for ch in text.chars() {
            if !ch.is_whitespace() {
                if let Some(font_idx) = fonts.font_for(ch) {
                    let key = GlyphKey {
                        font: font_idx,
                        ch,
                        px_bits: px.to_bits(),
                    };
                    let glyph = match glyph_cache.entry(key) {
                        Entry::Occupied(entry) => Some(entry.into_mut()),
                        Entry::Vacant(entry) => fonts.font(font_idx).map(|font| {
                            let (metrics, bitmap) = font.rasterize(ch, px);
                            entry.insert(GlyphBitmap {
                                width: metrics.width,
                                height: metrics.height,
                                xmin: metrics.xmin,
                                ymin: metrics.ymin,
                                bitmap,
                            })
                        }),
                    };
                    if let Some(glyph) = glyph {
                        if glyph.width > 0 && glyph.height > 0 {
                            let rise = (glyph.height as i32 + glyph.ymin) as f32;
                            let gx = (pen + glyph.xmin as f32).round() as i32;
                            let gy = (baseline - rise).round() as i32;
                            canvas.blend_glyph(gx, gy, &*glyph, color);
                        }
                    }
                }
            }
            pen += fonts.advance(ch, px);
        }
        pen
    }

    pub fn draw_text_centered(
        &mut self,
        canvas: &mut Canvas,
        center_x: f32,
        top: f32,
        text: &str,
        px: f32,
        color: Rgb,
    ) {
        let width = self.measure(text, px);
        self.draw_text(canvas, center_x - width / 2.0, top, text, px, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(canvas: Canvas, x: u32, y: u32) -> [u8; 4] {
        canvas.into_rgba().unwrap().get_pixel(x, y).0
    }

    #[test]
    fn canvas_starts_filled_and_opaque() {
        let canvas = Canvas::new(8, 4, [10, 20, 30]).unwrap();
        assert_eq!(pixel(canvas, 7, 3), [10, 20, 30, 255]);
    }

    #[test]
    fn rgba_export_keeps_canvas_size() {
        let canvas = Canvas::new(3, 5, [1, 2, 3]).unwrap();
        let image = canvas.into_rgba().unwrap();
        assert_eq!(image.dimensions(), (3, 5));
        assert_eq!(image.as_raw().len(), 3 * 5 * 4);
    }

    #[test]
    fn clip_blocks_shapes_outside() {
        let mut canvas = Canvas::new(20, 20, [0, 0, 0]).unwrap();
        canvas.set_clip(0.0, 0.0, 10.0, 20.0);
        canvas.fill_rect(0.0, 0.0, 20.0, 20.0, [255, 255, 255]);
        let image = canvas.into_rgba().unwrap();
        assert_eq!(image.get_pixel(5, 5).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(15, 5).0, [0, 0, 0, 255]);
    }

    #[test]
    fn round_rect_leaves_corners_empty() {
        let mut canvas = Canvas::new(40, 40, [0, 0, 0]).unwrap();
        canvas.fill_round_rect(0.0, 0.0, 40.0, 40.0, 16.0, [255, 0, 0]);
        let image = canvas.into_rgba().unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(20, 20).0, [255, 0, 0, 255]);
    }

    #[test]
    fn degenerate_round_rect_has_no_path() {
        assert!(round_rect_path(0.0, 0.0, 0.0, 10.0, 4.0).is_none());
    }

    #[test]
    fn avatar_pixmap_is_square() {
        let image = RgbaImage::from_pixel(30, 10, image::Rgba([1, 2, 3, 255]));
        let pixmap = avatar_pixmap(&image, 16).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (16, 16));
    }

    #[test]
    fn painter_without_fonts_only_advances() {
        let mut canvas = Canvas::new(100, 40, [255, 255, 255]).unwrap();
        let mut painter = TextPainter::new(Arc::new(FontSet::empty()));
        let pen = painter.draw_text(&mut canvas, 0.0, 0.0, "ab", 20.0, [0, 0, 0]);
        assert!((pen - 22.0).abs() < 1e-4);
        assert_eq!(pixel(canvas, 5, 10), [255, 255, 255, 255]);
    }
}
