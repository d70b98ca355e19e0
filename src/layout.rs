use serde::Serialize;

use crate::phone_frame::PhoneFrame;
use crate::schema::Conversation;

/// Text width oracle. The renderer and the layout engine share one
/// implementation so measured and drawn widths agree.
pub trait TextMeasure {
    fn measure(&self, text: &str, px: f32) -> f32;
}

/// Bubble metrics in supersampled pixels for one phone frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BubbleStyle {
    pub font_px: f32,
    pub line_height: u32,
    pub max_bubble_width: u32,
    pub max_text_width: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    pub text_inset_x: u32,
    pub text_inset_y: u32,
    pub name_row: u32,
    pub name_px: f32,
    pub spacing: u32,
    pub edge_margin: u32,
    pub avatar_size: u32,
    pub avatar_gap: u32,
    pub corner_radius: u32,
    pub tail_size: u32,
}

impl BubbleStyle {
    pub fn for_frame(frame: &PhoneFrame) -> Self {
        let max_bubble_width = frame.max_bubble_width();
        let padding_x = frame.pt(24.0);
        Self {
            font_px: frame.pt(17.0) as f32,
            line_height: frame.pt(22.0),
            max_bubble_width,
            max_text_width: max_bubble_width.saturating_sub(padding_x),
            padding_x,
            padding_y: frame.pt(14.0),
            text_inset_x: frame.pt(12.0),
            text_inset_y: frame.pt(7.0),
            name_row: frame.pt(18.0),
            name_px: frame.pt(12.0) as f32,
            spacing: frame.pt(8.0),
            edge_margin: frame.pt(16.0),
            avatar_size: frame.pt(28.0),
            avatar_gap: frame.pt(6.0),
            corner_radius: frame.pt(18.0),
            tail_size: frame.pt(8.0),
        }
    }

    /// Left edge of a received bubble; group chats leave room for the avatar.
    pub fn received_bubble_x(&self, group_chat: bool) -> u32 {
        if group_chat {
            self.edge_margin + self.avatar_size + self.avatar_gap
        } else {
            self.edge_margin
        }
    }
}

/// Derived geometry of one message. Built once and shared by the animated
/// renderer and the screenshot variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutMetrics {
    pub lines: Vec<String>,
    pub bubble_width: u32,
    pub bubble_height: u32,
    /// Name row above the bubble; zero unless received inside a group chat.
    pub name_row_height: u32,
    pub spacing: u32,
    pub is_self: bool,
    /// Avatar and name row are drawn.
    pub shows_sender: bool,
}

impl LayoutMetrics {
    /// Height the message occupies in the message column.
    pub fn total_height(&self) -> u32 {
        self.name_row_height + self.bubble_height + self.spacing
    }
}

/// Greedy word wrap. A word wider than `max_width` sits alone on its line.
pub fn wrap_words(text: &str, max_width: f32, px: f32, measure: &dyn TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{current} {word}");
        if measure.measure(&candidate, px) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

pub fn layout_message(
    text: &str,
    is_self: bool,
    group_chat: bool,
    style: &BubbleStyle,
    measure: &dyn TextMeasure,
) -> LayoutMetrics {
    let lines = wrap_words(text, style.max_text_width as f32, style.font_px, measure);
    let widest = lines
        .iter()
        .map(|line| measure.measure(line, style.font_px))
        .fold(0.0_f32, f32::max);
    let line_count = lines.len().max(1) as u32;
    let shows_sender = group_chat && !is_self;

    LayoutMetrics {
        lines,
        bubble_width: widest.ceil() as u32 + style.padding_x,
        bubble_height: line_count * style.line_height + style.padding_y,
        name_row_height: if shows_sender { style.name_row } else { 0 },
        spacing: style.spacing,
        is_self,
        shows_sender,
    }
}

pub fn layout_conversation(
    conversation: &Conversation,
    style: &BubbleStyle,
    measure: &dyn TextMeasure,
) -> Vec<LayoutMetrics> {
    conversation
        .messages()
        .iter()
        .enumerate()
        .map(|(idx, message)| {
            layout_message(
                &message.text,
                conversation.is_self_message(idx),
                conversation.group_chat,
                style,
                measure,
            )
        })
        .collect()
}

pub fn heights(layouts: &[LayoutMetrics]) -> Vec<u32> {
    layouts.iter().map(LayoutMetrics::total_height).collect()
}
