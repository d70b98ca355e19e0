use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tiny_skia::Pixmap;
use tracing::{debug, warn};

use crate::assets::{decode_avatar, FontSet};
use crate::error::Result;
use crate::layout::{heights, layout_conversation, BubbleStyle, LayoutMetrics};
use crate::phone_frame::{PhoneFrame, SUPERSAMPLE};
use crate::raster::{avatar_pixmap, Canvas, TextPainter};
use crate::schema::{Avatar, Character, Conversation};
use crate::theme::{
    Palette, Rgb, IOS_BLUE, IOS_GRAY, IOS_SEPARATOR, LETTERBOX, PLACEHOLDER_AVATAR, WHITE,
};
use crate::timeline::FrameState;
use crate::viewport::visible_window;

const KEY_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// One output-resolution RGBA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl From<RgbaImage> for Frame {
    fn from(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.into_raw(),
        }
    }
}

/// How a character's avatar is drawn, resolved once per render.
#[derive(Debug, Clone)]
enum AvatarArt {
    Image(RgbaImage),
    Emoji(String),
    Initial(String),
}

/// Immutable per-render state shared by every renderer instance: resolved
/// conversation, geometry, colors, layout and decoded avatars.
pub struct RenderContext {
    pub conversation: Conversation,
    pub frame: PhoneFrame,
    pub style: BubbleStyle,
    pub palette: Palette,
    pub layouts: Vec<LayoutMetrics>,
    pub heights: Vec<u32>,
    fonts: Arc<FontSet>,
    character_colors: Vec<Rgb>,
    avatars: Vec<AvatarArt>,
    clock_label: String,
}

impl RenderContext {
    pub fn new(
        conversation: Conversation,
        fonts: Arc<FontSet>,
        show_keyboard: bool,
    ) -> Result<Self> {
        let spec = &conversation.spec;
        let frame = PhoneFrame::new(spec.format, conversation.group_chat, show_keyboard);
        let style = BubbleStyle::for_frame(&frame);
        let palette = Palette::resolve(spec.theme, spec.toggles.dark_mode);
        let layouts = layout_conversation(&conversation, &style, fonts.as_ref());
        let heights = heights(&layouts);

        let character_colors = spec
            .characters
            .iter()
            .map(|character| character.color_rgb())
            .collect::<Result<Vec<_>>>()?;
        let avatars = spec
            .characters
            .iter()
            .map(|character| resolve_avatar(character, &fonts))
            .collect();
        let clock_label = format!("Today {}", spec.clock()?.format("%-I:%M %p"));

        debug!(
            width = frame.output_width,
            height = frame.output_height,
            scale = frame.scale,
            viewport = frame.viewport_height(),
            "render context ready"
        );
        Ok(Self {
            conversation,
            frame,
            style,
            palette,
            layouts,
            heights,
            fonts,
            character_colors,
            avatars,
            clock_label,
        })
    }

    pub fn fonts(&self) -> &Arc<FontSet> {
        &self.fonts
    }
}

/// Draws frames for one worker. Holds caches only; every call to
/// [`FrameRenderer::render`] depends on nothing but its [`FrameState`].
pub struct FrameRenderer {
    ctx: Arc<RenderContext>,
    painter: TextPainter,
    avatar_cache: HashMap<(usize, u32), Option<Pixmap>>,
}

impl FrameRenderer {
    pub fn new(ctx: Arc<RenderContext>) -> Self {
        let painter = TextPainter::new(Arc::clone(ctx.fonts()));
        Self {
            ctx,
            painter,
            avatar_cache: HashMap::new(),
        }
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn render(&mut self, state: &FrameState) -> Result<Frame> {
        let ctx = Arc::clone(&self.ctx);
        let frame = &ctx.frame;
        let mut phone = Canvas::new(frame.phone_width, frame.phone_height, ctx.palette.screen)?;

        self.draw_header(&mut phone);
        if frame.show_keyboard {
            self.draw_keyboard(&mut phone, state.draft.as_deref(), state.pressed_key);
        }

        let visible = state.visible_count.min(ctx.heights.len());
        let indicator = state
            .typing
            .map(|_| frame.typing_indicator_row())
            .unwrap_or(0);
        let window = visible_window(&ctx.heights[..visible], indicator, frame.viewport_height());

        let (top, bottom) = frame.message_area();
        phone.set_clip(0.0, top as f32, frame.phone_width as f32, (bottom - top) as f32);
        let y = self.draw_messages(&mut phone, window.range(), top as f32);
        if let Some(typer) = state.typing {
            self.draw_typing_indicator(&mut phone, y, typer);
        }
        phone.clear_clip();

        let canvas = if frame.phone_width == frame.render_width
            && frame.phone_height == frame.render_height
        {
            phone
        } else {
            let mut full = Canvas::new(frame.render_width, frame.render_height, LETTERBOX)?;
            full.draw_canvas(frame.phone_x as i32, frame.phone_y as i32, &phone);
            full
        };

        Ok(downsample(canvas, frame.output_width, frame.output_height)?.into())
    }

    /// Draw messages in `range` stacked from `top`. Returns the y below the last.
    pub(crate) fn draw_messages(
        &mut self,
        canvas: &mut Canvas,
        range: Range<usize>,
        top: f32,
    ) -> f32 {
        let mut y = top;
        for idx in range {
            y = self.draw_message(canvas, idx, y);
        }
        y
    }

    fn draw_message(&mut self, canvas: &mut Canvas, idx: usize, top: f32) -> f32 {
        let ctx = Arc::clone(&self.ctx);
        let layout = &ctx.layouts[idx];
        let style = &ctx.style;
        let speaker = ctx.conversation.speakers[idx];
        let phone_width = ctx.frame.phone_width as f32;
        let mut y = top;

        if layout.shows_sender {
            let name = &ctx.conversation.spec.characters[speaker].name;
            let x = style.received_bubble_x(true) as f32;
            self.painter
                .draw_text(canvas, x, y, name, style.name_px, IOS_GRAY);
            y += layout.name_row_height as f32;
        }

        let width = layout.bubble_width as f32;
        let height = layout.bubble_height as f32;
        let x = if layout.is_self {
            phone_width - width - style.edge_margin as f32
        } else {
            style.received_bubble_x(ctx.conversation.group_chat) as f32
        };

        if layout.shows_sender {
            let avatar_y = y + height - style.avatar_size as f32;
            let avatar_x = style.edge_margin as f32;
            self.draw_avatar(canvas, speaker, avatar_x, avatar_y, style.avatar_size);
        }

        let (fill, text) = if layout.is_self {
            (ctx.palette.theme.sender_bubble, ctx.palette.theme.sender_text)
        } else {
            (ctx.palette.received_bubble, ctx.palette.received_text)
        };
        self.draw_bubble(canvas, x, y, width, height, fill, layout.is_self);

        let text_x = x + style.text_inset_x as f32;
        let line_height = style.line_height as f32;
        let baseline_pad = (line_height - style.font_px).max(0.0) / 2.0;
        let mut line_top = y + style.text_inset_y as f32 + baseline_pad;
        for line in &layout.lines {
            self.painter
                .draw_text(canvas, text_x, line_top, line, style.font_px, text);
            line_top += line_height;
        }

        y + height + layout.spacing as f32
    }

    fn draw_bubble(
        &mut self,
        canvas: &mut Canvas,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
        is_self: bool,
    ) {
        let frame = &self.ctx.frame;
        let style = &self.ctx.style;
        let radius = style.corner_radius as f32;
        let tail = style.tail_size as f32;
        canvas.fill_round_rect(x, y, width, height, radius, color);

        let inset = frame.pt(2.0) as f32;
        let drop = frame.pt(4.0) as f32;
        let tail_y = y + height - radius;
        let (tail_x, tip_x) = if is_self {
            let tail_x = x + width - inset;
            (tail_x, tail_x + tail)
        } else {
            let tail_x = x + inset;
            (tail_x, tail_x - tail)
        };
        canvas.fill_polygon(
            &[
                (tail_x, tail_y),
                (tip_x, tail_y + tail + drop),
                (tail_x, tail_y + tail),
            ],
            color,
        );
    }

    fn draw_typing_indicator(&mut self, canvas: &mut Canvas, y: f32, typer: usize) {
        let ctx = Arc::clone(&self.ctx);
        let frame = &ctx.frame;
        let style = &ctx.style;
        let width = frame.pt(60.0) as f32;
        let height = frame.pt(36.0) as f32;

        if ctx.conversation.group_chat {
            let avatar_y = y + height - style.avatar_size as f32;
            self.draw_avatar(canvas, typer, style.edge_margin as f32, avatar_y, style.avatar_size);
        }
        let x = style.received_bubble_x(ctx.conversation.group_chat) as f32;
        self.draw_bubble(canvas, x, y, width, height, ctx.palette.received_bubble, false);

        let dot_radius = frame.pt(8.0) as f32 / 2.0;
        let first = x + frame.pt(15.0) as f32;
        let step = frame.pt(12.0) as f32;
        let cy = y + height / 2.0;
        for i in 0..3 {
            canvas.fill_circle(first + step * i as f32, cy, dot_radius, ctx.palette.typing_dots);
        }
    }

    fn draw_avatar(&mut self, canvas: &mut Canvas, character: usize, x: f32, y: f32, size: u32) {
        let ctx = Arc::clone(&self.ctx);
        let half = size as f32 / 2.0;
        let (cx, cy) = (x + half, y + half);

        match &ctx.avatars[character] {
            AvatarArt::Image(image) => {
                let pixmap = self
                    .avatar_cache
                    .entry((character, size))
                    .or_insert_with(|| avatar_pixmap(image, size));
                if let Some(pixmap) = pixmap {
                    canvas.fill_circle_image(x, y, pixmap);
                } else {
                    canvas.fill_circle(cx, cy, half, ctx.character_colors[character]);
                }
            }
            AvatarArt::Emoji(emoji) => {
                canvas.fill_circle(cx, cy, half, ctx.character_colors[character]);
                let px = size as f32 * 0.55;
                self.painter
                    .draw_text_centered(canvas, cx, cy - px / 2.0, emoji, px, WHITE);
            }
            AvatarArt::Initial(initial) => {
                canvas.fill_circle(cx, cy, half, ctx.character_colors[character]);
                let px = size as f32 * 0.45;
                self.painter
                    .draw_text_centered(canvas, cx, cy - px / 2.0, initial, px, WHITE);
            }
        }
    }

    pub(crate) fn draw_header(&mut self, canvas: &mut Canvas) {
        let ctx = Arc::clone(&self.ctx);
        let frame = &ctx.frame;
        let palette = &ctx.palette;
        let width = frame.phone_width as f32;
        let center = width / 2.0;
        let label_px = frame.pt(11.0) as f32;
        let hairline = frame.pt(0.5).max(1) as f32;

        canvas.fill_rect(0.0, 0.0, width, frame.header_height() as f32, palette.screen);

        if ctx.conversation.group_chat {
            let label_y = frame.pt(8.0) as f32;
            self.painter
                .draw_text_centered(canvas, center, label_y, "iMessage", label_px, IOS_GRAY);
            let time_y = label_y + frame.pt(16.0) as f32;
            self.painter
                .draw_text_centered(canvas, center, time_y, &ctx.clock_label, label_px, IOS_GRAY);
            let separator_y = frame.header_height().saturating_sub(1) as f32;
            canvas.fill_rect(0.0, separator_y, width, hairline, IOS_SEPARATOR);
            return;
        }

        let avatar_size = frame.pt(40.0);
        let avatar_x = (frame.phone_width.saturating_sub(avatar_size) / 2) as f32;
        let avatar_y = frame.pt(8.0) as f32;
        let contact = ctx
            .conversation
            .spec
            .characters
            .iter()
            .position(|character| !character.is_self);
        let name = match contact {
            Some(idx) => {
                self.draw_avatar(canvas, idx, avatar_x, avatar_y, avatar_size);
                ctx.conversation.spec.characters[idx].name.as_str()
            }
            None => {
                let half = avatar_size as f32 / 2.0;
                canvas.fill_circle(avatar_x + half, avatar_y + half, half, PLACEHOLDER_AVATAR);
                ctx.conversation.spec.conversation_title.as_str()
            }
        };

        // Back chevron and video glyph share the avatar's center line.
        let icon_y = avatar_y + avatar_size as f32 / 2.0;
        let stroke = frame.pt(3.0) as f32;
        let arm = frame.pt(10.0) as f32;
        let back_x = frame.pt(12.0) as f32;
        canvas.stroke_polyline(
            &[
                (back_x + arm, icon_y - arm),
                (back_x, icon_y),
                (back_x + arm, icon_y + arm),
            ],
            IOS_BLUE,
            stroke,
        );

        let body_w = frame.pt(20.0) as f32;
        let body_h = frame.pt(14.0) as f32;
        let lens = frame.pt(8.0) as f32;
        let body_x = width - frame.pt(16.0) as f32 - body_w - lens;
        canvas.fill_round_rect(
            body_x,
            icon_y - body_h / 2.0,
            body_w,
            body_h,
            frame.pt(3.0) as f32,
            IOS_BLUE,
        );
        canvas.fill_polygon(
            &[
                (body_x + body_w + frame.pt(1.0) as f32, icon_y),
                (body_x + body_w + lens, icon_y - body_h / 2.0),
                (body_x + body_w + lens, icon_y + body_h / 2.0),
            ],
            IOS_BLUE,
        );

        let name_y = avatar_y + avatar_size as f32 + frame.pt(2.0) as f32;
        let name_px = frame.pt(13.0) as f32;
        self.painter.draw_text_centered(
            canvas,
            center,
            name_y,
            &format!("{name} \u{203A}"),
            name_px,
            palette.header_text,
        );

        let separator_y = name_y + frame.pt(20.0) as f32;
        canvas.fill_rect(0.0, separator_y, width, hairline, IOS_SEPARATOR);

        let label_y = separator_y + frame.pt(8.0) as f32;
        self.painter
            .draw_text_centered(canvas, center, label_y, "iMessage", label_px, IOS_GRAY);
        let time_y = label_y + frame.pt(14.0) as f32;
        self.painter
            .draw_text_centered(canvas, center, time_y, &ctx.clock_label, label_px, IOS_GRAY);
    }

    fn draw_keyboard(&mut self, canvas: &mut Canvas, draft: Option<&str>, pressed: Option<char>) {
        let ctx = Arc::clone(&self.ctx);
        let frame = &ctx.frame;
        let colors = &ctx.palette.keyboard;
        let width = frame.phone_width as f32;
        let pt = |points: f32| frame.pt(points) as f32;
        let keyboard_y = frame.keyboard_top() as f32;

        // Input field and send button above the keys.
        let input_h = pt(32.0);
        let input_margin = pt(8.0);
        let input_y = keyboard_y - input_h - pt(10.0);
        let input_w = (frame.phone_width.saturating_sub(frame.pt(54.0))) as f32;
        let radius = pt(16.0);
        canvas.fill_round_rect(input_margin, input_y, input_w, input_h, radius, colors.input_fill);
        canvas.stroke_round_rect(
            input_margin,
            input_y,
            input_w,
            input_h,
            radius,
            colors.input_border,
            frame.pt(1.0).max(1) as f32,
        );

        let input_px = pt(15.0);
        let text_x = input_margin + pt(12.0);
        let text_y = input_y + (input_h - input_px) / 2.0;
        match draft.filter(|draft| !draft.is_empty()) {
            Some(draft) => {
                let shown = visible_tail(
                    &format!("{draft}|"),
                    input_w - pt(24.0),
                    input_px,
                    &self.painter,
                );
                self.painter
                    .draw_text(canvas, text_x, text_y, &shown, input_px, colors.label);
            }
            None => {
                self.painter
                    .draw_text(canvas, text_x, text_y, "iMessage", input_px, IOS_GRAY);
            }
        }

        let send = pt(28.0);
        let send_x = width - send - pt(12.0);
        let send_y = input_y + (input_h - send) / 2.0;
        let (scx, scy) = (send_x + send / 2.0, send_y + send / 2.0);
        canvas.fill_circle(scx, scy, send / 2.0, IOS_BLUE);
        let arrow = send * 0.28;
        let arrow_stroke = pt(2.5);
        canvas.stroke_polyline(&[(scx, scy + arrow), (scx, scy - arrow)], WHITE, arrow_stroke);
        canvas.stroke_polyline(
            &[
                (scx - arrow * 0.8, scy - arrow * 0.2),
                (scx, scy - arrow),
                (scx + arrow * 0.8, scy - arrow * 0.2),
            ],
            WHITE,
            arrow_stroke,
        );

        let keyboard_h = frame.keyboard_height() as f32;
        canvas.fill_rect(0.0, keyboard_y, width, keyboard_h, colors.background);

        let key_h = pt(38.0);
        let key_gap = pt(5.0);
        let row_gap = pt(8.0);
        let side = pt(3.0);
        let key_radius = pt(5.0);
        let special = pt(38.0);
        let keys_width = width - side * 2.0;
        let key_px = pt(16.0);
        let small_px = pt(11.0);
        let mut y = keyboard_y + row_gap;

        let draw_key = |painter: &mut TextPainter,
                            canvas: &mut Canvas,
                            x: f32,
                            y: f32,
                            w: f32,
                            fill: Rgb,
                            label: &str,
                            px: f32| {
            canvas.fill_round_rect(x, y, w, key_h, key_radius, fill);
            if !label.is_empty() {
                let label_y = y + (key_h - px) / 2.0;
                painter.draw_text_centered(canvas, x + w / 2.0, label_y, label, px, colors.label);
            }
        };
        let key_fill = |ch: char| {
            if pressed == Some(ch) {
                colors.pressed
            } else {
                colors.key
            }
        };

        for (row_idx, row) in KEY_ROWS.iter().enumerate() {
            let count = row.chars().count() as f32;
            let (mut x, key_w) = match row_idx {
                0 => (side, (keys_width - (count - 1.0) * key_gap) / count),
                1 => {
                    let indent = pt(16.0);
                    (side + indent / 2.0, (keys_width - (count - 1.0) * key_gap - indent) / count)
                }
                _ => (
                    side + special + key_gap,
                    (keys_width - (count - 1.0) * key_gap - special * 2.0 - key_gap * 2.0) / count,
                ),
            };

            if row_idx == 2 {
                let (mid_y, glyph_stroke) = (y + key_h / 2.0, pt(1.5));
                let shift_fill = colors.special_key;
                draw_key(&mut self.painter, canvas, side, y, special, shift_fill, "", small_px);
                let shift_x = side + special / 2.0;
                draw_shift_glyph(canvas, shift_x, mid_y, pt(7.0), colors.label, glyph_stroke);

                let back_x = width - side - special;
                draw_key(&mut self.painter, canvas, back_x, y, special, shift_fill, "", small_px);
                let back_cx = back_x + special / 2.0;
                draw_backspace_glyph(canvas, back_cx, mid_y, pt(8.0), colors.label, glyph_stroke);
            }

            for ch in row.chars() {
                let mut buf = [0_u8; 4];
                let label = &*ch.encode_utf8(&mut buf);
                draw_key(&mut self.painter, canvas, x, y, key_w, key_fill(ch), label, key_px);
                x += key_w + key_gap;
            }
            y += key_h + row_gap;
        }

        let numbers = pt(38.0);
        let emoji = pt(36.0);
        let ret = pt(60.0);
        let space = width - numbers - emoji - ret - key_gap * 3.0 - side * 2.0;
        let mut x = side;
        draw_key(&mut self.painter, canvas, x, y, numbers, colors.special_key, "123", small_px);
        x += numbers + key_gap;
        draw_key(&mut self.painter, canvas, x, y, emoji, colors.special_key, "", small_px);
        canvas.fill_circle(x + emoji / 2.0, y + key_h / 2.0, pt(8.0), colors.label);
        canvas.fill_circle(x + emoji / 2.0, y + key_h / 2.0, pt(6.5), colors.special_key);
        x += emoji + key_gap;
        draw_key(&mut self.painter, canvas, x, y, space, key_fill(' '), "space", small_px);
        x += space + key_gap;
        let return_w = width - side - x;
        draw_key(&mut self.painter, canvas, x, y, return_w, colors.special_key, "return", small_px);
    }
}

fn resolve_avatar(character: &Character, fonts: &FontSet) -> AvatarArt {
    match &character.avatar {
        Some(avatar @ Avatar::ImageBase64(_)) => {
            match avatar.image_bytes().and_then(|bytes| decode_avatar(&bytes)) {
                Some(image) => AvatarArt::Image(image),
                None => {
                    warn!(character = %character.id, "avatar image unusable; drawing initial");
                    AvatarArt::Initial(character.initial())
                }
            }
        }
        Some(avatar @ Avatar::Emoji(_)) => match avatar.emoji() {
            Some(emoji) if fonts.has_glyphs(emoji) => AvatarArt::Emoji(emoji.to_owned()),
            _ => {
                debug!(character = %character.id, "no font covers avatar emoji");
                AvatarArt::Initial(character.initial())
            }
        },
        None => AvatarArt::Initial(character.initial()),
    }
}

fn draw_shift_glyph(canvas: &mut Canvas, cx: f32, cy: f32, size: f32, color: Rgb, stroke: f32) {
    canvas.stroke_polyline(
        &[
            (cx - size * 0.4, cy + size),
            (cx - size * 0.4, cy + size * 0.1),
            (cx - size, cy + size * 0.1),
            (cx, cy - size),
            (cx + size, cy + size * 0.1),
            (cx + size * 0.4, cy + size * 0.1),
            (cx + size * 0.4, cy + size),
            (cx - size * 0.4, cy + size),
        ],
        color,
        stroke,
    );
}

fn draw_backspace_glyph(canvas: &mut Canvas, cx: f32, cy: f32, size: f32, color: Rgb, stroke: f32) {
    let half_h = size * 0.7;
    canvas.stroke_polyline(
        &[
            (cx - size * 0.5, cy - half_h),
            (cx + size, cy - half_h),
            (cx + size, cy + half_h),
            (cx - size * 0.5, cy + half_h),
            (cx - size * 1.2, cy),
            (cx - size * 0.5, cy - half_h),
        ],
        color,
        stroke,
    );
    let arm = size * 0.35;
    let x_center = cx + size * 0.25;
    for dy in [arm, -arm] {
        let points = [(x_center - arm, cy - dy), (x_center + arm, cy + dy)];
        canvas.stroke_polyline(&points, color, stroke);
    }
}

/// Longest suffix of `text` that fits `max_width`, so the caret stays visible.
fn visible_tail(text: &str, max_width: f32, px: f32, painter: &TextPainter) -> String {
    let mut start = 0;
    let boundaries = text.char_indices().map(|(idx, _)| idx).collect::<Vec<_>>();
    while start < boundaries.len() && painter.measure(&text[boundaries[start]..], px) > max_width {
        start += 1;
    }
    boundaries
        .get(start)
        .map(|idx| text[*idx..].to_owned())
        .unwrap_or_default()
}

/// Lanczos3 downsample from the supersampled canvas.
pub(crate) fn downsample(canvas: Canvas, width: u32, height: u32) -> Result<RgbaImage> {
    let image = canvas.into_rgba()?;
    if image.width() == width && image.height() == height {
        return Ok(image);
    }
    Ok(imageops::resize(&image, width, height, FilterType::Lanczos3))
}

/// Output size of a supersampled dimension.
pub(crate) fn output_px(render_px: u32) -> u32 {
    (render_px / SUPERSAMPLE).max(1)
}
