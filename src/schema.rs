use std::collections::{HashMap, HashSet};

use base64::Engine;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{ChatReelError, Result};

pub const FPS: u32 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderSpec {
    pub messages: Vec<Message>,
    pub characters: Vec<Character>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub typing_speed: TypingSpeed,
    #[serde(default)]
    pub toggles: Toggles,
    #[serde(default = "default_title")]
    pub conversation_title: String,
    #[serde(default)]
    pub is_group_chat: bool,
    #[serde(default = "default_clock")]
    pub header_clock: String,
}

fn default_title() -> String {
    "Chat".to_owned()
}

fn default_clock() -> String {
    "09:41".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_self: bool,
    pub color: String,
    #[serde(default)]
    pub avatar: Option<Avatar>,
}

impl Character {
    /// Upper-cased first letter of the name, `?` for an empty name.
    pub fn initial(&self) -> String {
        self.name
            .chars()
            .next()
            .map(|ch| ch.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_owned())
    }

    pub fn color_rgb(&self) -> Result<[u8; 3]> {
        parse_hex_color(&self.color).ok_or_else(|| {
            ChatReelError::validation(format!(
                "character '{}' color '{}' is not #RRGGBB",
                self.id, self.color
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Avatar {
    Emoji(String),
    ImageBase64(String),
}

impl Avatar {
    /// Raw image bytes for image avatars. `None` for emoji avatars and for
    /// payloads that are not valid base64.
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Emoji(_) => None,
            Self::ImageBase64(data) => base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .ok(),
        }
    }

    pub fn emoji(&self) -> Option<&str> {
        match self {
            Self::Emoji(emoji) if !emoji.trim().is_empty() => Some(emoji.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub character_id: String,
}

impl Message {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Imessage,
    Whatsapp,
    Messenger,
    Discord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Tiktok,
    Instagram,
    Youtube,
    Iphone,
}

impl ExportFormat {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Tiktok => "tiktok",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Iphone => "iphone",
        }
    }

    pub fn dimensions_px(self) -> (u32, u32) {
        match self {
            Self::Tiktok => (1080, 1920),
            Self::Instagram => (1080, 1080),
            Self::Youtube => (1920, 1080),
            Self::Iphone => (1284, 2778),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl TypingSpeed {
    pub fn seconds_per_char(self) -> f64 {
        match self {
            Self::Slow => 0.20,
            Self::Normal => 0.12,
            Self::Fast => 0.06,
        }
    }

    /// `max(1, round(seconds_per_char * fps))`
    pub fn frames_per_char(self, fps: u32) -> u32 {
        let frames = (self.seconds_per_char() * f64::from(fps)).round() as u32;
        frames.max(1)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Toggles {
    #[serde(default = "enabled")]
    pub show_keyboard: bool,
    #[serde(default = "enabled")]
    pub show_typing_indicator: bool,
    #[serde(default = "enabled")]
    pub enable_sound: bool,
    #[serde(default)]
    pub dark_mode: bool,
}

fn enabled() -> bool {
    true
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            show_keyboard: true,
            show_typing_indicator: true,
            enable_sound: true,
            dark_mode: false,
        }
    }
}

impl RenderSpec {
    /// Group layout is forced on when more than two characters take part.
    pub fn group_chat(&self) -> bool {
        self.is_group_chat || self.characters.len() > 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.characters.is_empty() {
            return Err(ChatReelError::validation(
                "conversation must define at least one character",
            ));
        }
        if self.messages.is_empty() {
            return Err(ChatReelError::validation(
                "conversation must contain at least one message",
            ));
        }

        let mut character_ids = HashSet::with_capacity(self.characters.len());
        for character in &self.characters {
            if character.id.trim().is_empty() {
                return Err(ChatReelError::validation("character id cannot be empty"));
            }
            if !character_ids.insert(character.id.as_str()) {
                return Err(ChatReelError::validation(format!(
                    "duplicate character id '{}'",
                    character.id
                )));
            }
            character.color_rgb()?;
        }

        let mut message_ids = HashSet::with_capacity(self.messages.len());
        for message in &self.messages {
            if message.id.trim().is_empty() {
                return Err(ChatReelError::validation("message id cannot be empty"));
            }
            if !message_ids.insert(message.id.as_str()) {
                return Err(ChatReelError::validation(format!(
                    "duplicate message id '{}'",
                    message.id
                )));
            }
            if !character_ids.contains(message.character_id.as_str()) {
                return Err(ChatReelError::validation(format!(
                    "message '{}' references unknown character '{}'",
                    message.id, message.character_id
                )));
            }
        }

        self.clock()?;
        Ok(())
    }

    pub fn clock(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.header_clock.trim(), "%H:%M").map_err(|error| {
            ChatReelError::validation(format!(
                "header_clock '{}' must be HH:MM: {error}",
                self.header_clock
            ))
        })
    }
}

/// Validated conversation with every message resolved to its speaker.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub spec: RenderSpec,
    /// Character index for each message, in message order.
    pub speakers: Vec<usize>,
    pub group_chat: bool,
}

impl Conversation {
    pub fn new(spec: RenderSpec) -> Result<Self> {
        spec.validate()?;
        let index = spec
            .characters
            .iter()
            .enumerate()
            .map(|(idx, character)| (character.id.as_str(), idx))
            .collect::<HashMap<_, _>>();
        let speakers = spec
            .messages
            .iter()
            .map(|message| {
                index
                    .get(message.character_id.as_str())
                    .copied()
                    .ok_or_else(|| {
                        ChatReelError::validation(format!(
                            "message '{}' references unknown character '{}'",
                            message.id, message.character_id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let group_chat = spec.group_chat();
        Ok(Self {
            spec,
            speakers,
            group_chat,
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.spec.messages
    }

    pub fn speaker(&self, message_index: usize) -> &Character {
        &self.spec.characters[self.speakers[message_index]]
    }

    pub fn is_self_message(&self, message_index: usize) -> bool {
        self.speaker(message_index).is_self
    }

    /// First non-self character; the contact shown in a 1:1 header.
    pub fn main_contact(&self) -> Option<&Character> {
        self.spec.characters.iter().find(|character| !character.is_self)
    }
}

pub fn parse_hex_color(raw: &str) -> Option<[u8; 3]> {
    let hex = raw.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
