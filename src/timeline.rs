use serde::Serialize;
use tracing::debug;

use crate::schema::Conversation;

/// Full-text hold after a self message finishes typing.
pub const REVEAL_COMPLETE_FRAMES: u32 = 10;
/// Final-state hold after the last message.
pub const TRAILING_HOLD_FRAMES: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    CharReveal,
    TypingHold,
    RevealComplete,
    ReadingPause,
    TrailingHold,
}

/// Everything the frame renderer needs to draw one tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FrameState {
    /// Messages `0..visible_count` are on screen as bubbles.
    pub visible_count: usize,
    /// Character index of the speaker whose typing indicator is shown.
    pub typing: Option<usize>,
    /// Draft text in the input field.
    pub draft: Option<String>,
    /// Key drawn as pressed on the keyboard mock.
    pub pressed_key: Option<char>,
}

impl FrameState {
    fn idle(visible_count: usize) -> Self {
        Self {
            visible_count,
            typing: None,
            draft: None,
            pressed_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub kind: TimelineEventKind,
    /// Owning message; `None` for the trailing hold.
    pub message_index: Option<usize>,
    pub start_frame: u64,
    pub duration_frames: u32,
    pub state: FrameState,
}

impl TimelineEvent {
    pub fn end_frame(&self) -> u64 {
        self.start_frame + u64::from(self.duration_frames)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundKind {
    Send,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioCue {
    pub kind: SoundKind,
    pub message_id: String,
    pub frame: u64,
    /// `frame / fps`
    pub time_sec: f64,
}

/// Canonical tick sequence and cue list for one render.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub fps: u32,
    pub frames_per_char: u32,
    pub events: Vec<TimelineEvent>,
    pub cues: Vec<AudioCue>,
    pub total_frames: u64,
}

/// Typing-indicator hold: `clamp(len / 20, 1.5, 2.5)` seconds.
pub fn typing_hold_frames(char_len: usize, fps: u32) -> u32 {
    seconds_to_frames((char_len as f64 / 20.0).clamp(1.5, 2.5), fps)
}

/// Reading pause: `clamp(len / 25, 1.5, 3.0)` seconds.
pub fn reading_pause_frames(char_len: usize, fps: u32) -> u32 {
    seconds_to_frames((char_len as f64 / 25.0).clamp(1.5, 3.0), fps)
}

/// Holds truncate to whole frames; only per-character typing rounds.
fn seconds_to_frames(seconds: f64, fps: u32) -> u32 {
    (seconds * f64::from(fps)) as u32
}

struct TimelineBuilder {
    fps: u32,
    cursor: u64,
    events: Vec<TimelineEvent>,
    cues: Vec<AudioCue>,
}

impl TimelineBuilder {
    fn push(
        &mut self,
        kind: TimelineEventKind,
        message_index: Option<usize>,
        duration_frames: u32,
        state: FrameState,
    ) {
        self.events.push(TimelineEvent {
            kind,
            message_index,
            start_frame: self.cursor,
            duration_frames,
            state,
        });
        self.cursor += u64::from(duration_frames);
    }

    fn cue(&mut self, kind: SoundKind, message_id: &str) {
        self.cues.push(AudioCue {
            kind,
            message_id: message_id.to_owned(),
            frame: self.cursor,
            time_sec: self.cursor as f64 / f64::from(self.fps),
        });
    }
}

impl Timeline {
    #[tracing::instrument(skip(conversation), fields(messages = conversation.messages().len()))]
    pub fn build(conversation: &Conversation, fps: u32, show_typing_indicator: bool) -> Self {
        let frames_per_char = conversation.spec.typing_speed.frames_per_char(fps);
        let mut builder = TimelineBuilder {
            fps,
            cursor: 0,
            events: Vec::new(),
            cues: Vec::new(),
        };

        for (idx, message) in conversation.messages().iter().enumerate() {
            let char_len = message.char_len();

            if conversation.is_self_message(idx) {
                let mut draft = String::with_capacity(message.text.len());
                for ch in message.text.chars() {
                    draft.push(ch);
                    builder.push(
                        TimelineEventKind::CharReveal,
                        Some(idx),
                        frames_per_char,
                        FrameState {
                            visible_count: idx,
                            typing: None,
                            draft: Some(draft.clone()),
                            pressed_key: ch.to_lowercase().next(),
                        },
                    );
                }
                builder.cue(SoundKind::Send, &message.id);
                builder.push(
                    TimelineEventKind::RevealComplete,
                    Some(idx),
                    REVEAL_COMPLETE_FRAMES,
                    FrameState {
                        visible_count: idx,
                        typing: None,
                        draft: Some(message.text.clone()),
                        pressed_key: None,
                    },
                );
            } else {
                let typing = show_typing_indicator.then_some(conversation.speakers[idx]);
                builder.push(
                    TimelineEventKind::TypingHold,
                    Some(idx),
                    typing_hold_frames(char_len, fps),
                    FrameState {
                        typing,
                        ..FrameState::idle(idx)
                    },
                );
                builder.cue(SoundKind::Receive, &message.id);
            }

            builder.push(
                TimelineEventKind::ReadingPause,
                Some(idx),
                reading_pause_frames(char_len, fps),
                FrameState::idle(idx + 1),
            );
        }

        builder.push(
            TimelineEventKind::TrailingHold,
            None,
            TRAILING_HOLD_FRAMES,
            FrameState::idle(conversation.messages().len()),
        );

        let total_frames = builder.cursor;
        debug!(
            events = builder.events.len(),
            cues = builder.cues.len(),
            total_frames,
            "timeline built"
        );
        Self {
            fps,
            frames_per_char,
            events: builder.events,
            cues: builder.cues,
            total_frames,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / f64::from(self.fps)
    }

    /// Event covering `frame`, if the frame lies inside the timeline.
    pub fn event_at(&self, frame: u64) -> Option<&TimelineEvent> {
        let idx = self
            .events
            .partition_point(|event| event.end_frame() <= frame);
        self.events.get(idx).filter(|event| event.start_frame <= frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Message, RenderSpec};

    fn conversation(messages: &[(&str, &str)]) -> Conversation {
        let yaml = r##"
characters:
  - { id: me, name: Me, is_self: true, color: "#007AFF" }
  - { id: them, name: Them, color: "#FF9500" }
messages: []
"##;
        let mut spec: RenderSpec = serde_yaml::from_str(yaml).unwrap();
        spec.messages = messages
            .iter()
            .enumerate()
            .map(|(idx, (who, text))| Message {
                id: format!("m{idx}"),
                text: (*text).to_owned(),
                character_id: (*who).to_owned(),
            })
            .collect();
        Conversation::new(spec).unwrap()
    }

    #[test]
    fn hold_durations_clamp() {
        assert_eq!(typing_hold_frames(0, 30), 45);
        assert_eq!(typing_hold_frames(40, 30), 60);
        assert_eq!(typing_hold_frames(500, 30), 75);
        assert_eq!(reading_pause_frames(5, 30), 45);
        assert_eq!(reading_pause_frames(40, 30), 48);
        assert_eq!(reading_pause_frames(500, 30), 90);
    }

    #[test]
    fn hold_durations_truncate_partial_frames() {
        assert_eq!(typing_hold_frames(31, 30), 46);
        assert_eq!(typing_hold_frames(37, 30), 55);
        assert_eq!(typing_hold_frames(39, 30), 58);
        assert_eq!(reading_pause_frames(39, 30), 46);
        assert_eq!(reading_pause_frames(44, 30), 52);
    }

    #[test]
    fn self_message_reveals_per_character() {
        let conv = conversation(&[("me", "Hey!")]);
        let timeline = Timeline::build(&conv, 30, true);
        let reveals = timeline
            .events
            .iter()
            .filter(|event| event.kind == TimelineEventKind::CharReveal)
            .collect::<Vec<_>>();
        assert_eq!(reveals.len(), 4);
        assert_eq!(reveals[0].state.draft.as_deref(), Some("H"));
        assert_eq!(reveals[0].state.pressed_key, Some('h'));
        assert_eq!(reveals[3].state.draft.as_deref(), Some("Hey!"));
        assert_eq!(reveals[3].state.pressed_key, Some('!'));
        assert!(reveals.iter().all(|event| event.state.visible_count == 0));

        let pause = timeline
            .events
            .iter()
            .find(|event| event.kind == TimelineEventKind::ReadingPause)
            .unwrap();
        assert_eq!(pause.state.visible_count, 1);
        assert_eq!(pause.state.draft, None);
    }

    #[test]
    fn typing_indicator_toggle_keeps_timing() {
        let conv = conversation(&[("them", "hello there")]);
        let shown = Timeline::build(&conv, 30, true);
        let hidden = Timeline::build(&conv, 30, false);
        assert_eq!(shown.total_frames, hidden.total_frames);
        assert_eq!(shown.events[0].state.typing, Some(1));
        assert_eq!(hidden.events[0].state.typing, None);
    }

    #[test]
    fn event_lookup_by_frame() {
        let conv = conversation(&[("me", "ok")]);
        let timeline = Timeline::build(&conv, 30, true);
        assert_eq!(
            timeline.event_at(0).map(|event| event.kind),
            Some(TimelineEventKind::CharReveal)
        );
        assert_eq!(
            timeline.event_at(8).map(|event| event.kind),
            Some(TimelineEventKind::RevealComplete)
        );
        assert_eq!(
            timeline.event_at(timeline.total_frames - 1).map(|event| event.kind),
            Some(TimelineEventKind::TrailingHold)
        );
        assert!(timeline.event_at(timeline.total_frames).is_none());
    }

    #[test]
    fn single_char_message_cues_after_reveal() {
        let conv = conversation(&[("me", "a")]);
        assert!(conv.speaker(0).is_self);
        let timeline = Timeline::build(&conv, 30, true);
        assert_eq!(timeline.cues.len(), 1);
        assert_eq!(timeline.cues[0].frame, 4);
    }
}
