use chatreel::loader::parse_spec;
use chatreel::schema::{Conversation, FPS};
use chatreel::timeline::{SoundKind, Timeline, TimelineEventKind};

fn conversation(yaml: &str) -> Conversation {
    let spec = parse_spec(yaml).expect("document should parse");
    Conversation::new(spec).expect("document should validate")
}

fn three_message_exchange() -> Conversation {
    conversation(
        r##"
typing_speed: normal
characters:
  - { id: me, name: Sam, is_self: true, color: "#007AFF" }
  - { id: ana, name: Ana, color: "#34C759" }
messages:
  - { id: m1, text: "hello", character_id: me }
  - { id: m2, text: "this reply is exactly forty chars long!!", character_id: ana }
  - { id: m3, text: "twelve chars", character_id: me }
"##,
    )
}

#[test]
fn three_message_exchange_has_expected_cues_and_length() {
    let conv = three_message_exchange();
    assert_eq!(conv.messages()[1].char_len(), 40);
    assert_eq!(conv.messages()[2].char_len(), 12);

    let timeline = Timeline::build(&conv, FPS, true);
    assert_eq!(timeline.frames_per_char, 4);

    let cues = timeline
        .cues
        .iter()
        .map(|cue| (cue.kind, cue.message_id.as_str(), cue.frame))
        .collect::<Vec<_>>();
    assert_eq!(
        cues,
        vec![
            (SoundKind::Send, "m1", 20),
            (SoundKind::Receive, "m2", 135),
            (SoundKind::Send, "m3", 231),
        ]
    );
    assert_eq!(timeline.total_frames, 346);
    assert!((timeline.cues[1].time_sec - 4.5).abs() < 1e-9);
}

#[test]
fn timeline_is_deterministic() {
    let conv = three_message_exchange();
    let first = serde_json::to_string(&Timeline::build(&conv, FPS, true)).expect("serialize");
    let second = serde_json::to_string(&Timeline::build(&conv, FPS, true)).expect("serialize");
    assert_eq!(first, second);
}

#[test]
fn events_tile_the_timeline_without_gaps() {
    let timeline = Timeline::build(&three_message_exchange(), FPS, true);
    let mut cursor = 0_u64;
    for event in &timeline.events {
        assert_eq!(event.start_frame, cursor, "gap before {:?}", event.kind);
        assert!(event.duration_frames > 0);
        cursor += u64::from(event.duration_frames);
    }
    assert_eq!(cursor, timeline.total_frames);
    assert_eq!(
        timeline.events.last().map(|event| event.kind),
        Some(TimelineEventKind::TrailingHold)
    );
}

#[test]
fn visible_count_never_decreases_and_reaches_all_messages() {
    let conv = three_message_exchange();
    let timeline = Timeline::build(&conv, FPS, true);
    let counts = timeline
        .events
        .iter()
        .map(|event| event.state.visible_count)
        .collect::<Vec<_>>();
    assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(counts.last().copied(), Some(conv.messages().len()));
}

#[test]
fn cues_are_ordered_and_one_per_message() {
    let conv = conversation(
        r##"
typing_speed: fast
characters:
  - { id: a, name: A, is_self: true, color: "#007AFF" }
  - { id: b, name: B, color: "#FF2D55" }
  - { id: c, name: C, color: "#5856D6" }
messages:
  - { id: m1, text: "first", character_id: b }
  - { id: m2, text: "second", character_id: c }
  - { id: m3, text: "third one", character_id: a }
  - { id: m4, text: "fourth", character_id: b }
"##,
    );
    let timeline = Timeline::build(&conv, FPS, true);
    assert_eq!(timeline.cues.len(), conv.messages().len());
    assert!(timeline
        .cues
        .windows(2)
        .all(|pair| pair[0].frame < pair[1].frame));
    let kinds = timeline.cues.iter().map(|cue| cue.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            SoundKind::Receive,
            SoundKind::Receive,
            SoundKind::Send,
            SoundKind::Receive
        ]
    );
}

#[test]
fn slower_typing_lengthens_only_self_messages() {
    let base = r##"
characters:
  - { id: me, name: Me, is_self: true, color: "#007AFF" }
  - { id: jo, name: Jo, color: "#FF9500" }
messages:
  - { id: m1, text: "typed by me", character_id: me }
  - { id: m2, text: "sent by jo", character_id: jo }
"##;
    let fast = Timeline::build(
        &conversation(&format!("typing_speed: fast\n{base}")),
        FPS,
        true,
    );
    let slow = Timeline::build(
        &conversation(&format!("typing_speed: slow\n{base}")),
        FPS,
        true,
    );
    let typed = "typed by me".chars().count() as u64;
    assert_eq!(fast.frames_per_char, 2);
    assert_eq!(slow.frames_per_char, 6);
    assert_eq!(slow.total_frames - fast.total_frames, typed * 4);
}
