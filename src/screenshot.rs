use std::io::Cursor;
use std::ops::Range;
use std::sync::Arc;

use base64::Engine;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assets::FontSet;
use crate::error::Result;
use crate::raster::Canvas;
use crate::renderer::{downsample, output_px, FrameRenderer, RenderContext};
use crate::schema::Conversation;
use crate::viewport::paginate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotMode {
    Long,
    Paginated,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenshotImage {
    pub width: u32,
    pub height: u32,
    /// First and one-past-last message index drawn on this image.
    pub messages: [usize; 2],
    pub png_base64: String,
    #[serde(skip)]
    pub png: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenshotOutput {
    pub mode: ScreenshotMode,
    pub page_count: usize,
    pub images: Vec<ScreenshotImage>,
}

/// Static renders of the whole conversation. Both modes share the animated
/// renderer's layout and viewport, so a page shows exactly what a video frame
/// would fit.
#[tracing::instrument(skip_all, fields(mode = ?mode, messages = conversation.messages().len()))]
pub fn render_screenshots(
    conversation: Conversation,
    fonts: Arc<FontSet>,
    mode: ScreenshotMode,
) -> Result<ScreenshotOutput> {
    let ctx = Arc::new(screenshot_context(conversation, fonts)?);
    let mut renderer = FrameRenderer::new(Arc::clone(&ctx));

    let images = match mode {
        ScreenshotMode::Long => vec![render_long(&mut renderer)?],
        ScreenshotMode::Paginated => page_ranges(&ctx)
            .into_iter()
            .map(|range| render_page(&mut renderer, range))
            .collect::<Result<Vec<_>>>()?,
    };
    info!(images = images.len(), "screenshots rendered");

    Ok(ScreenshotOutput {
        mode,
        page_count: images.len(),
        images,
    })
}

/// Context with the same message area the video uses for this document.
pub fn screenshot_context(
    conversation: Conversation,
    fonts: Arc<FontSet>,
) -> Result<RenderContext> {
    let show_keyboard = conversation.spec.toggles.show_keyboard;
    RenderContext::new(conversation, fonts, show_keyboard)
}

/// Page boundaries cut against the video viewport.
pub fn page_ranges(ctx: &RenderContext) -> Vec<Range<usize>> {
    paginate(&ctx.heights, ctx.frame.viewport_height())
}

fn render_long(renderer: &mut FrameRenderer) -> Result<ScreenshotImage> {
    let ctx = renderer.context();
    let frame = ctx.frame;
    let (top, _) = frame.message_area();
    let content: u32 = ctx.heights.iter().sum();
    let height = top + content + frame.pt(20.0);
    let count = ctx.heights.len();
    let screen = ctx.palette.screen;

    let mut canvas = Canvas::new(frame.phone_width, height, screen)?;
    renderer.draw_header(&mut canvas);
    renderer.draw_messages(&mut canvas, 0..count, top as f32);
    debug!(height, "long screenshot composed");
    encode(canvas, 0..count)
}

fn render_page(renderer: &mut FrameRenderer, range: Range<usize>) -> Result<ScreenshotImage> {
    let ctx = renderer.context();
    let frame = ctx.frame;
    let (top, bottom) = frame.message_area();
    let screen = ctx.palette.screen;
    // Keyboard chrome is not drawn; the page ends below the message area.
    let height = (bottom + frame.pt(20.0)).min(frame.phone_height);

    let mut canvas = Canvas::new(frame.phone_width, height, screen)?;
    renderer.draw_header(&mut canvas);
    canvas.set_clip(0.0, top as f32, frame.phone_width as f32, (bottom - top) as f32);
    renderer.draw_messages(&mut canvas, range.clone(), top as f32);
    canvas.clear_clip();
    encode(canvas, range)
}

fn encode(canvas: Canvas, messages: Range<usize>) -> Result<ScreenshotImage> {
    let width = output_px(canvas.width());
    let height = output_px(canvas.height());
    let image: RgbaImage = downsample(canvas, width, height)?;

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|error| anyhow::anyhow!("failed to encode PNG: {error}"))?;
    Ok(ScreenshotImage {
        width,
        height,
        messages: [messages.start, messages.end],
        png_base64: base64::engine::general_purpose::STANDARD.encode(&png),
        png,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RenderSpec;

    fn conversation(texts: &[&str]) -> Conversation {
        let mut yaml = String::from(
            r##"
format: instagram
characters:
  - { id: me, name: Me, is_self: true, color: "#007AFF" }
  - { id: jo, name: Jo, color: "#FF9500" }
messages:
"##,
        );
        for (idx, text) in texts.iter().enumerate() {
            let who = if idx % 2 == 0 { "me" } else { "jo" };
            yaml.push_str(&format!("  - {{ id: m{idx}, text: \"{text}\", character_id: {who} }}\n"));
        }
        let spec: RenderSpec = serde_yaml::from_str(&yaml).unwrap();
        Conversation::new(spec).unwrap()
    }

    #[test]
    fn long_mode_is_one_tall_image() {
        let output = render_screenshots(
            conversation(&["hi", "hello", "how are you"]),
            Arc::new(FontSet::empty()),
            ScreenshotMode::Long,
        )
        .unwrap();
        assert_eq!(output.page_count, 1);
        let image = &output.images[0];
        assert_eq!(image.messages, [0, 3]);
        assert_eq!(image.width, 1080 * 9 / 16);
        let decoded = image::load_from_memory(&image.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (image.width, image.height));
        assert!(!image.png_base64.is_empty());
    }

    #[test]
    fn pages_cover_every_message_once() {
        let texts = vec!["message"; 30];
        let output = render_screenshots(
            conversation(&texts),
            Arc::new(FontSet::empty()),
            ScreenshotMode::Paginated,
        )
        .unwrap();
        assert!(output.page_count > 1);
        let mut next = 0;
        for image in &output.images {
            assert_eq!(image.messages[0], next);
            assert!(image.messages[1] > image.messages[0]);
            next = image.messages[1];
        }
        assert_eq!(next, 30);
    }

    #[test]
    fn pages_fit_the_video_viewport() {
        let texts = vec!["short note"; 40];
        let conv = conversation(&texts);
        assert!(conv.spec.toggles.show_keyboard);
        let video = RenderContext::new(conv.clone(), Arc::new(FontSet::empty()), true).unwrap();
        let viewport = video.frame.viewport_height();

        let output =
            render_screenshots(conv, Arc::new(FontSet::empty()), ScreenshotMode::Paginated)
                .unwrap();
        assert!(output.page_count > 1);
        for image in &output.images {
            let used: u32 = video.heights[image.messages[0]..image.messages[1]].iter().sum();
            assert!(used <= viewport, "page {:?} holds {used} > {viewport}", image.messages);
            assert!(image.height < video.frame.output_height);
        }
    }

    #[test]
    fn hidden_keyboard_pages_are_phone_sized() {
        let mut conv = conversation(&["hi", "hello"]);
        conv.spec.toggles.show_keyboard = false;
        let ctx = screenshot_context(conv.clone(), Arc::new(FontSet::empty())).unwrap();
        assert!(!ctx.frame.show_keyboard);

        let output =
            render_screenshots(conv, Arc::new(FontSet::empty()), ScreenshotMode::Paginated)
                .unwrap();
        assert_eq!(output.images[0].height, 1080);
    }
}
