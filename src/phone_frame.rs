use serde::Serialize;

use crate::schema::ExportFormat;

pub const SUPERSAMPLE: u32 = 2;
/// Reference width (points) the scale factor is measured against.
pub const REFERENCE_WIDTH_PT: f32 = 390.0;
const PHONE_ASPECT_W: u32 = 9;
const PHONE_ASPECT_H: u32 = 16;

/// Geometry of the simulated phone inside one export format.
///
/// Everything except `output_*` is in supersampled pixels. All chrome metrics are
/// derived from `scale`, so the same layout holds at every resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhoneFrame {
    pub output_width: u32,
    pub output_height: u32,
    pub render_width: u32,
    pub render_height: u32,
    pub phone_x: u32,
    pub phone_y: u32,
    pub phone_width: u32,
    pub phone_height: u32,
    pub scale: f32,
    pub group_chat: bool,
    pub show_keyboard: bool,
}

impl PhoneFrame {
    pub fn new(format: ExportFormat, group_chat: bool, show_keyboard: bool) -> Self {
        let (output_width, output_height) = format.dimensions_px();
        let render_width = output_width * SUPERSAMPLE;
        let render_height = output_height * SUPERSAMPLE;

        // Narrower than 9:16 fits to width, wider fits to height.
        let (phone_width, phone_height) =
            if render_width * PHONE_ASPECT_H <= render_height * PHONE_ASPECT_W {
                (render_width, render_width * PHONE_ASPECT_H / PHONE_ASPECT_W)
            } else {
                (render_height * PHONE_ASPECT_W / PHONE_ASPECT_H, render_height)
            };

        // Odd remainders keep the extra pixel on the right/bottom.
        let phone_x = render_width.saturating_sub(phone_width) / 2;
        let phone_y = render_height.saturating_sub(phone_height) / 2;

        Self {
            output_width,
            output_height,
            render_width,
            render_height,
            phone_x,
            phone_y,
            phone_width,
            phone_height,
            scale: phone_width as f32 / REFERENCE_WIDTH_PT,
            group_chat,
            show_keyboard,
        }
    }

    /// Points to supersampled pixels, truncating.
    pub fn pt(&self, points: f32) -> u32 {
        (points * self.scale).max(0.0) as u32
    }

    pub fn header_height(&self) -> u32 {
        if self.group_chat {
            self.pt(50.0)
        } else {
            self.pt(120.0)
        }
    }

    pub fn keyboard_height(&self) -> u32 {
        self.pt(216.0)
    }

    pub fn input_bar_height(&self) -> u32 {
        self.pt(52.0)
    }

    pub fn keyboard_top(&self) -> u32 {
        self.phone_height.saturating_sub(self.keyboard_height())
    }

    /// Top and bottom of the message area, phone-relative.
    pub fn message_area(&self) -> (u32, u32) {
        let top = self.header_height() + self.pt(10.0);
        let bottom = if self.show_keyboard {
            self.keyboard_top()
                .saturating_sub(self.input_bar_height())
                .saturating_sub(self.pt(10.0))
        } else {
            self.phone_height.saturating_sub(self.pt(20.0))
        };
        (top, bottom.max(top))
    }

    pub fn viewport_height(&self) -> u32 {
        let (top, bottom) = self.message_area();
        bottom - top
    }

    /// Row height reserved for the typing indicator in the viewport scan.
    pub fn typing_indicator_row(&self) -> u32 {
        self.pt(50.0)
    }

    pub fn max_bubble_width(&self) -> u32 {
        (self.phone_width as f32 * 0.70) as u32
    }

    pub fn with_keyboard(mut self, show_keyboard: bool) -> Self {
        self.show_keyboard = show_keyboard;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiktok_phone_fills_the_canvas() {
        let frame = PhoneFrame::new(ExportFormat::Tiktok, false, true);
        assert_eq!((frame.render_width, frame.render_height), (2160, 3840));
        assert_eq!((frame.phone_width, frame.phone_height), (2160, 3840));
        assert_eq!((frame.phone_x, frame.phone_y), (0, 0));
        assert!((frame.scale - 2160.0 / 390.0).abs() < 1e-4);
    }

    #[test]
    fn wide_formats_are_pillarboxed() {
        let frame = PhoneFrame::new(ExportFormat::Youtube, false, true);
        assert_eq!(frame.phone_height, frame.render_height);
        assert_eq!(frame.phone_width, 2160 * 9 / 16);
        assert_eq!(
            frame.phone_x,
            (frame.render_width - frame.phone_width) / 2
        );

        let square = PhoneFrame::new(ExportFormat::Instagram, false, true);
        assert_eq!(square.phone_height, 2160);
        assert!(square.phone_x > 0);
        assert_eq!(square.phone_y, 0);
    }

    #[test]
    fn tall_formats_are_letterboxed() {
        let frame = PhoneFrame::new(ExportFormat::Iphone, false, true);
        assert_eq!(frame.phone_width, frame.render_width);
        assert!(frame.phone_height <= frame.render_height);
        assert_eq!(frame.phone_x, 0);
    }

    #[test]
    fn keyboard_shrinks_the_viewport() {
        let with = PhoneFrame::new(ExportFormat::Tiktok, false, true);
        let without = with.with_keyboard(false);
        assert!(with.viewport_height() < without.viewport_height());

        let group = PhoneFrame::new(ExportFormat::Tiktok, true, true);
        assert!(group.header_height() < with.header_height());
    }
}
