use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

const EXCHANGE: &str = r##"
typing_speed: normal
conversation_title: Weekend
characters:
  - { id: me, name: Sam, is_self: true, color: "#007AFF" }
  - { id: ana, name: Ana, color: "#34C759", avatar: { emoji: "🦊" } }
messages:
  - { id: m1, text: "hello", character_id: me }
  - { id: m2, text: "this reply is exactly forty chars long!!", character_id: ana }
  - { id: m3, text: "twelve chars", character_id: me }
"##;

fn write_document(path: &Path, yaml: &str) {
    fs::write(path, yaml).expect("document should write");
}

fn run_chatreel(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_chatreel"))
        .current_dir(cwd)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("chatreel command should run")
}

fn command_available(name: &str, version_arg: &str) -> bool {
    Command::new(name)
        .arg(version_arg)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[test]
fn check_json_reports_timeline_totals() {
    let dir = tempdir().expect("tempdir should create");
    write_document(&dir.path().join("chat.yaml"), EXCHANGE);

    let output = run_chatreel(
        dir.path(),
        &["check", "chat.yaml", "--no-system-fonts", "--json"],
    );
    assert!(output.status.success(), "check should succeed");
    let report: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    assert_eq!(report["ok"], true);
    assert_eq!(report["format"], "tiktok");
    assert_eq!(report["width"], 1080);
    assert_eq!(report["height"], 1920);
    assert_eq!(report["frames"], 346);
    assert_eq!(report["cues"], 3);
    assert_eq!(report["pages"], 1);
    assert_eq!(report["fingerprint"].as_str().map(str::len), Some(64));
}

#[test]
fn timeline_json_is_stable() {
    let dir = tempdir().expect("tempdir should create");
    write_document(&dir.path().join("chat.yaml"), EXCHANGE);

    let first = run_chatreel(dir.path(), &["timeline", "chat.yaml", "--json"]);
    let second = run_chatreel(dir.path(), &["timeline", "chat.yaml", "--json"]);
    assert!(first.status.success(), "timeline --json should succeed");
    assert_eq!(first.stdout, second.stdout, "json output should be stable");

    let parsed: Value = serde_json::from_slice(&first.stdout).expect("json should parse");
    let cues = parsed["cues"].as_array().expect("cues should be an array");
    let frames = cues
        .iter()
        .map(|cue| cue["frame"].as_u64().expect("frame"))
        .collect::<Vec<_>>();
    assert_eq!(frames, vec![20, 135, 231]);
    assert_eq!(cues[1]["kind"], "receive");
    assert_eq!(parsed["total_frames"], 346);
}

#[test]
fn unknown_character_yields_json_error_envelope() {
    let dir = tempdir().expect("tempdir should create");
    write_document(
        &dir.path().join("bad.yaml"),
        r##"
characters:
  - { id: me, name: Me, is_self: true, color: "#007AFF" }
messages:
  - { id: m1, text: "hi", character_id: ghost }
"##,
    );

    let output = run_chatreel(dir.path(), &["check", "bad.yaml", "--json"]);
    assert!(!output.status.success(), "invalid document should fail");
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    assert_eq!(envelope["ok"], false);
    assert_eq!(envelope["error"]["code"], "INVALID_CONVERSATION");
    assert!(envelope["error"]["message"]
        .as_str()
        .expect("message")
        .contains("ghost"));
}

#[test]
fn empty_conversation_is_rejected() {
    let dir = tempdir().expect("tempdir should create");
    write_document(
        &dir.path().join("empty.yaml"),
        r##"
characters:
  - { id: me, name: Me, is_self: true, color: "#007AFF" }
messages: []
"##,
    );

    let output = run_chatreel(dir.path(), &["timeline", "empty.yaml", "--json"]);
    assert!(!output.status.success());
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    assert_eq!(envelope["error"]["code"], "INVALID_CONVERSATION");
}

#[test]
fn missing_document_is_an_io_error() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_chatreel(dir.path(), &["check", "nope.yaml", "--json"]);
    assert!(!output.status.success());
    let envelope: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    assert_eq!(envelope["error"]["code"], "IO_ERROR");
}

#[test]
fn plain_errors_go_to_stderr() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_chatreel(dir.path(), &["check", "nope.yaml"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "stderr was: {stderr}");
}

#[test]
fn paginated_screenshots_write_png_files() {
    let dir = tempdir().expect("tempdir should create");
    write_document(&dir.path().join("chat.yaml"), EXCHANGE);

    let output = run_chatreel(
        dir.path(),
        &[
            "screenshot",
            "chat.yaml",
            "--mode",
            "paginated",
            "--out-dir",
            "shots",
            "--no-system-fonts",
            "--json",
        ],
    );
    assert!(output.status.success(), "screenshot should succeed");
    let report: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    assert_eq!(report["mode"], "paginated");
    let images = report["images"].as_array().expect("images");
    assert_eq!(report["page_count"].as_u64(), Some(images.len() as u64));
    assert!(images[0].get("png_base64").is_none());

    for image in images {
        let path = dir.path().join(image["path"].as_str().expect("path"));
        let bytes = fs::read(&path).expect("png should exist");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(image["width"], 1080);
    }
}

#[test]
fn long_screenshot_can_embed_base64() {
    let dir = tempdir().expect("tempdir should create");
    write_document(&dir.path().join("chat.yaml"), EXCHANGE);

    let output = run_chatreel(
        dir.path(),
        &[
            "screenshot",
            "chat.yaml",
            "--out-dir",
            "shots",
            "--no-system-fonts",
            "--embed",
            "--json",
        ],
    );
    assert!(output.status.success(), "screenshot should succeed");
    let report: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    assert_eq!(report["page_count"], 1);
    let encoded = report["images"][0]["png_base64"]
        .as_str()
        .expect("base64 payload");
    assert!(encoded.starts_with("iVBORw0KGgo"));
}

#[test]
fn render_writes_mp4_when_ffmpeg_is_available() {
    if !command_available("ffmpeg", "-version") {
        eprintln!("skipping: ffmpeg not found");
        return;
    }
    let dir = tempdir().expect("tempdir should create");
    write_document(
        &dir.path().join("chat.yaml"),
        r##"
format: instagram
typing_speed: fast
characters:
  - { id: me, name: Me, is_self: true, color: "#007AFF" }
  - { id: jo, name: Jo, color: "#FF9500" }
messages:
  - { id: m1, text: "yo", character_id: me }
  - { id: m2, text: "hey", character_id: jo }
"##,
    );

    let output = run_chatreel(
        dir.path(),
        &[
            "render",
            "chat.yaml",
            "-o",
            "out/chat.mp4",
            "--no-system-fonts",
            "--threads",
            "2",
            "--json",
        ],
    );
    assert!(
        output.status.success(),
        "render should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_slice(&output.stdout).expect("json should parse");
    assert_eq!(report["video"]["width"], 1080);
    assert_eq!(report["video"]["has_audio"], true);
    assert_eq!(report["video"]["artifact"]["published"], false);

    let mp4 = fs::read(dir.path().join("out/chat.mp4")).expect("mp4 should exist");
    assert!(mp4.len() > 1024);
    assert_eq!(&mp4[4..8], b"ftyp");
}
