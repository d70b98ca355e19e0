use crate::schema::Theme;

pub type Rgb = [u8; 3];

pub const IOS_BLUE: Rgb = [0, 122, 255];
pub const IOS_GRAY: Rgb = [142, 142, 147];
pub const IOS_SEPARATOR: Rgb = [198, 198, 200];
pub const PLACEHOLDER_AVATAR: Rgb = [199, 199, 204];
pub const LETTERBOX: Rgb = [0, 0, 0];
pub const WHITE: Rgb = [255, 255, 255];
pub const BLACK: Rgb = [0, 0, 0];

/// The five fixed colors every theme defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeColors {
    pub sender_bubble: Rgb,
    pub receiver_bubble: Rgb,
    pub background: Rgb,
    pub sender_text: Rgb,
    pub receiver_text: Rgb,
}

impl Theme {
    pub fn colors(self) -> ThemeColors {
        match self {
            Self::Imessage => ThemeColors {
                sender_bubble: [0x00, 0x7A, 0xFF],
                receiver_bubble: [0xE5, 0xE5, 0xEA],
                background: [0xFF, 0xFF, 0xFF],
                sender_text: [0xFF, 0xFF, 0xFF],
                receiver_text: [0x00, 0x00, 0x00],
            },
            Self::Whatsapp => ThemeColors {
                sender_bubble: [0xDC, 0xF8, 0xC6],
                receiver_bubble: [0xFF, 0xFF, 0xFF],
                background: [0xEC, 0xE5, 0xDD],
                sender_text: [0x00, 0x00, 0x00],
                receiver_text: [0x00, 0x00, 0x00],
            },
            Self::Messenger => ThemeColors {
                sender_bubble: [0x00, 0x84, 0xFF],
                receiver_bubble: [0xE4, 0xE6, 0xEB],
                background: [0xFF, 0xFF, 0xFF],
                sender_text: [0xFF, 0xFF, 0xFF],
                receiver_text: [0x00, 0x00, 0x00],
            },
            Self::Discord => ThemeColors {
                sender_bubble: [0x58, 0x65, 0xF2],
                receiver_bubble: [0x2F, 0x31, 0x36],
                background: [0x36, 0x39, 0x3F],
                sender_text: [0xFF, 0xFF, 0xFF],
                receiver_text: [0xDC, 0xDD, 0xDE],
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyboardColors {
    pub background: Rgb,
    pub key: Rgb,
    pub special_key: Rgb,
    pub label: Rgb,
    pub input_fill: Rgb,
    pub input_border: Rgb,
    pub pressed: Rgb,
}

/// Resolved colors for one render, dark mode already applied.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub theme: ThemeColors,
    pub screen: Rgb,
    pub header_text: Rgb,
    pub received_bubble: Rgb,
    pub received_text: Rgb,
    pub typing_dots: Rgb,
    pub keyboard: KeyboardColors,
}

impl Palette {
    pub fn resolve(theme: Theme, dark_mode: bool) -> Self {
        let colors = theme.colors();
        if dark_mode {
            Self {
                theme: colors,
                screen: BLACK,
                header_text: WHITE,
                received_bubble: [0x3A, 0x3A, 0x3C],
                received_text: WHITE,
                typing_dots: [155, 155, 155],
                keyboard: KeyboardColors {
                    background: [30, 30, 30],
                    key: [89, 89, 89],
                    special_key: [64, 64, 64],
                    label: WHITE,
                    input_fill: [51, 51, 51],
                    input_border: [100, 100, 100],
                    pressed: [128, 128, 128],
                },
            }
        } else {
            Self {
                theme: colors,
                screen: colors.background,
                header_text: if is_dark(colors.background) { WHITE } else { BLACK },
                received_bubble: colors.receiver_bubble,
                received_text: colors.receiver_text,
                typing_dots: [128, 128, 128],
                keyboard: KeyboardColors {
                    background: [209, 213, 219],
                    key: WHITE,
                    special_key: [173, 176, 182],
                    label: BLACK,
                    input_fill: WHITE,
                    input_border: [200, 200, 200],
                    pressed: [128, 128, 128],
                },
            }
        }
    }
}

/// Rec. 601 luma below mid-gray.
pub fn is_dark(color: Rgb) -> bool {
    let luma = 299 * u32::from(color[0]) + 587 * u32::from(color[1]) + 114 * u32::from(color[2]);
    luma < 128_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dark_mode_overrides_received_bubble() {
        let light = Palette::resolve(Theme::Imessage, false);
        assert_eq!(light.received_bubble, [0xE5, 0xE5, 0xEA]);
        assert_eq!(light.screen, WHITE);

        let dark = Palette::resolve(Theme::Imessage, true);
        assert_eq!(dark.received_bubble, [0x3A, 0x3A, 0x3C]);
        assert_eq!(dark.received_text, WHITE);
        assert_eq!(dark.screen, BLACK);
    }

    #[test]
    fn discord_header_text_stays_readable() {
        let palette = Palette::resolve(Theme::Discord, false);
        assert_eq!(palette.screen, [0x36, 0x39, 0x3F]);
        assert_eq!(palette.header_text, WHITE);
        assert!(!is_dark(Palette::resolve(Theme::Whatsapp, false).screen));
    }
}
