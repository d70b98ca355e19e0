use chatreel::assets::{AssetPaths, SAMPLE_RATE};
use chatreel::audio::{compose_track, frame_to_sample, SoundBank};
use chatreel::loader::parse_spec;
use chatreel::schema::{Conversation, FPS};
use chatreel::timeline::{SoundKind, Timeline};
use tempfile::tempdir;

fn exchange() -> Conversation {
    let spec = parse_spec(
        r##"
characters:
  - { id: me, name: Sam, is_self: true, color: "#007AFF" }
  - { id: ana, name: Ana, color: "#34C759" }
messages:
  - { id: m1, text: "hello", character_id: me }
  - { id: m2, text: "this reply is exactly forty chars long!!", character_id: ana }
  - { id: m3, text: "twelve chars", character_id: me }
"##,
    )
    .expect("document should parse");
    Conversation::new(spec).expect("document should validate")
}

#[test]
fn track_length_matches_video_duration() {
    let timeline = Timeline::build(&exchange(), FPS, true);
    let track = compose_track(
        &timeline.cues,
        timeline.total_frames,
        FPS,
        &SoundBank::synthesized(),
    );
    assert_eq!(track.len() as u64, timeline.total_frames * 1470);
    assert!(track.iter().all(|sample| (-1.0..=1.0).contains(sample)));
}

#[test]
fn first_sound_starts_exactly_on_first_cue() {
    let timeline = Timeline::build(&exchange(), FPS, true);
    let track = compose_track(
        &timeline.cues,
        timeline.total_frames,
        FPS,
        &SoundBank::synthesized(),
    );
    let cue_sample = frame_to_sample(timeline.cues[0].frame, FPS, SAMPLE_RATE) as usize;
    assert_eq!(cue_sample, 20 * 1470);
    let first_audible = track.iter().position(|sample| *sample != 0.0);
    assert_eq!(first_audible, Some(cue_sample));
}

#[test]
fn cue_times_equal_frame_over_fps() {
    let timeline = Timeline::build(&exchange(), FPS, true);
    for cue in &timeline.cues {
        assert!((cue.time_sec - cue.frame as f64 / f64::from(FPS)).abs() < 1e-12);
    }
    assert!(timeline
        .cues
        .windows(2)
        .all(|pair| pair[0].time_sec <= pair[1].time_sec));
}

#[test]
fn missing_assets_fall_back_to_distinct_tones() {
    let dir = tempdir().expect("tempdir should create");
    let bank = SoundBank::load(&AssetPaths::new(dir.path()));
    let send = bank.clip(SoundKind::Send);
    let receive = bank.clip(SoundKind::Receive);
    assert!(!send.is_empty());
    assert!(!receive.is_empty());
    assert_ne!(send.len(), receive.len());
}

#[test]
fn wav_assets_are_downmixed_and_resampled() {
    let dir = tempdir().expect("tempdir should create");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 22_050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(dir.path().join("send.wav"), spec).expect("wav should create");
    for _ in 0..2_205 {
        writer.write_sample(i16::MAX / 2).expect("left sample");
        writer.write_sample(0_i16).expect("right sample");
    }
    writer.finalize().expect("wav should finalize");

    let bank = SoundBank::load(&AssetPaths::new(dir.path()));
    let send = bank.clip(SoundKind::Send);
    assert_eq!(send.len(), 4_410);
    assert!((send[100] - 0.25).abs() < 0.01);
    assert!(!bank.clip(SoundKind::Receive).is_empty());
}

#[test]
fn mp3_assets_take_precedence_over_wav() {
    const FRAME_LEN: usize = 144 * 128_000 / 44_100;
    let dir = tempdir().expect("tempdir should create");
    let mut mp3 = Vec::new();
    for _ in 0..8 {
        mp3.extend_from_slice(&[0xFF, 0xFB, 0x90, 0xC0]);
        mp3.resize(mp3.len() + FRAME_LEN - 4, 0);
    }
    std::fs::write(dir.path().join("send.mp3"), mp3).expect("mp3 should write");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(dir.path().join("send.wav"), spec).expect("wav should create");
    for _ in 0..441 {
        writer.write_sample(i16::MAX / 2).expect("sample");
    }
    writer.finalize().expect("wav should finalize");

    let bank = SoundBank::load(&AssetPaths::new(dir.path()));
    let send = bank.clip(SoundKind::Send);
    assert!(!send.is_empty());
    assert_ne!(send.len(), 441, "wav should not be picked over mp3");
    assert!(send.iter().all(|sample| sample.abs() < 1e-3));
}
