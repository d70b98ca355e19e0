use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatreel::artifact::{ArtifactSink, LocalDirSink};
use chatreel::assets::{AssetPaths, FontSet};
use chatreel::encoding::FfmpegMode;
use chatreel::error::find_chatreel_error;
use chatreel::loader::{load_and_validate_spec, LoadedSpec};
use chatreel::progress::progress_channel;
use chatreel::schema::FPS;
use chatreel::screenshot::{page_ranges, render_screenshots, screenshot_context, ScreenshotMode};
use chatreel::timeline::Timeline;
use chatreel::video::{render_video, RenderThreading, VideoOptions, VideoSummary};

const PROGRESS_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "chatreel")]
#[command(about = "Render chat conversations to phone-mockup videos and screenshots")]
#[command(version = env!("CHATREEL_VERSION"))]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render an MP4 with typing animation and message sounds.
    Render {
        document: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[command(flatten)]
        assets: AssetArgs,
        /// Render worker threads (default: one per core).
        #[arg(long)]
        threads: Option<usize>,
        /// Timeline events per parallel batch.
        #[arg(long, default_value_t = RenderThreading::default().chunk_size)]
        chunk: usize,
        #[arg(long, value_enum, default_value_t = FfmpegArg::System)]
        ffmpeg: FfmpegArg,
        /// Copy the finished video into this directory.
        #[arg(long)]
        publish_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Render static PNG screenshots of the whole conversation.
    Screenshot {
        document: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::Long)]
        mode: ModeArg,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        assets: AssetArgs,
        /// Include base64 PNG data in the JSON report.
        #[arg(long, requires = "json")]
        embed: bool,
        #[arg(long)]
        json: bool,
    },
    /// Validate a document and report what a render would produce.
    Check {
        document: PathBuf,
        #[command(flatten)]
        assets: AssetArgs,
        #[arg(long)]
        json: bool,
    },
    /// Print the frame timeline and audio cues.
    Timeline {
        document: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, clap::Args)]
struct AssetArgs {
    /// Directory holding `fonts/` and `send`/`receive` sounds (mp3, wav or m4a).
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Do not probe system font locations.
    #[arg(long)]
    no_system_fonts: bool,
}

impl AssetArgs {
    fn paths(&self) -> AssetPaths {
        AssetPaths {
            root: self.assets.clone(),
            probe_system_fonts: !self.no_system_fonts,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FfmpegArg {
    System,
    Sidecar,
}

impl From<FfmpegArg> for FfmpegMode {
    fn from(value: FfmpegArg) -> Self {
        match value {
            FfmpegArg::System => Self::System,
            FfmpegArg::Sidecar => Self::Sidecar,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Long,
    Paginated,
}

impl From<ModeArg> for ScreenshotMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Long => Self::Long,
            ModeArg::Paginated => Self::Paginated,
        }
    }
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Self::Render { json, .. }
            | Self::Screenshot { json, .. }
            | Self::Check { json, .. }
            | Self::Timeline { json, .. } => *json,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.command.json();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if json {
                print_error_envelope(&error);
            } else {
                eprintln!("error: {error:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "chatreel=info",
        1 => "chatreel=debug",
        _ => "chatreel=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_error_envelope(error: &anyhow::Error) {
    let envelope = match find_chatreel_error(error) {
        Some(known) => serde_json::to_value(known.envelope()).unwrap_or_default(),
        None => json!({
            "ok": false,
            "error": { "code": "INTERNAL", "message": format!("{error:#}") },
        }),
    };
    println!("{envelope}");
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Render {
            document,
            output,
            assets,
            threads,
            chunk,
            ffmpeg,
            publish_dir,
            json,
        } => {
            let options = VideoOptions {
                output_path: PathBuf::new(),
                assets: assets.paths(),
                ffmpeg: ffmpeg.into(),
                threading: RenderThreading {
                    threads,
                    chunk_size: chunk,
                },
            };
            run_render(&document, output, options, publish_dir, json)
        }
        Commands::Screenshot {
            document,
            mode,
            out_dir,
            assets,
            embed,
            json,
        } => run_screenshot(&document, mode.into(), &out_dir, &assets.paths(), embed, json),
        Commands::Check {
            document,
            assets,
            json,
        } => run_check(&document, &assets.paths(), json),
        Commands::Timeline { document, json } => run_timeline(&document, json),
    }
}

fn run_render(
    document: &Path,
    output: Option<PathBuf>,
    mut options: VideoOptions,
    publish_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let loaded = load_and_validate_spec(document)?;
    options.output_path =
        output.unwrap_or_else(|| PathBuf::from(format!("{}.mp4", loaded.artifact_stem())));
    let sink = publish_dir.map(LocalDirSink::new);
    let sink_ref = sink.as_ref().map(|sink| sink as &dyn ArtifactSink);

    let (reporter, mut receiver) = progress_channel();
    let conversation = loaded.conversation;
    let options_ref = &options;
    let summary = thread::scope(|scope| {
        let job = scope.spawn(move || render_video(conversation, options_ref, sink_ref, reporter));
        let mut logged = 0.0_f32;
        while !job.is_finished() {
            let update = receiver.poll_latest();
            if update.fraction - logged >= 0.1 {
                logged = update.fraction;
                info!(
                    stage = update.stage.unwrap_or("-"),
                    percent = (update.fraction * 100.0).round(),
                    "progress"
                );
            }
            thread::sleep(PROGRESS_POLL);
        }
        job.join()
            .map_err(|_| anyhow::anyhow!("render thread panicked"))
    })??;

    report_video(&summary, json)
}

fn report_video(summary: &VideoSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "ok": true, "video": summary }))?
        );
    } else {
        println!(
            "Wrote {} ({}x{}, {} fps, {} frames, {:.2}s, {} cues{})",
            summary.artifact.path.display(),
            summary.width,
            summary.height,
            summary.fps,
            summary.frames,
            summary.duration_secs,
            summary.cues,
            if summary.has_audio { "" } else { ", silent" }
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ScreenshotFile {
    path: PathBuf,
    width: u32,
    height: u32,
    messages: [usize; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    png_base64: Option<String>,
}

fn run_screenshot(
    document: &Path,
    mode: ScreenshotMode,
    out_dir: &Path,
    assets: &AssetPaths,
    embed: bool,
    json: bool,
) -> Result<()> {
    let loaded = load_and_validate_spec(document)?;
    let stem = loaded.artifact_stem();
    let fonts = Arc::new(FontSet::discover(assets));
    let output = render_screenshots(loaded.conversation, fonts, mode)?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let mut files = Vec::with_capacity(output.images.len());
    for (idx, image) in output.images.into_iter().enumerate() {
        let name = match mode {
            ScreenshotMode::Long => format!("{stem}.png"),
            ScreenshotMode::Paginated => format!("{stem}-page-{:02}.png", idx + 1),
        };
        let path = out_dir.join(name);
        fs::write(&path, &image.png)
            .with_context(|| format!("failed to write {}", path.display()))?;
        files.push(ScreenshotFile {
            path,
            width: image.width,
            height: image.height,
            messages: image.messages,
            png_base64: embed.then_some(image.png_base64),
        });
    }

    if json {
        let report = json!({
            "ok": true,
            "mode": output.mode,
            "page_count": output.page_count,
            "images": files,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for file in &files {
            println!(
                "Wrote {} ({}x{}, messages {}..{})",
                file.path.display(),
                file.width,
                file.height,
                file.messages[0],
                file.messages[1]
            );
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckReport {
    ok: bool,
    fingerprint: String,
    format: &'static str,
    width: u32,
    height: u32,
    fps: u32,
    messages: usize,
    characters: usize,
    group_chat: bool,
    frames: u64,
    duration_secs: f64,
    cues: usize,
    pages: usize,
}

fn run_check(document: &Path, assets: &AssetPaths, json: bool) -> Result<()> {
    let LoadedSpec {
        conversation,
        fingerprint,
    } = load_and_validate_spec(document)?;
    let spec = &conversation.spec;
    let timeline = Timeline::build(&conversation, FPS, spec.toggles.show_typing_indicator);
    let (width, height) = spec.format.dimensions_px();
    let mut report = CheckReport {
        ok: true,
        fingerprint,
        format: spec.format.keyword(),
        width,
        height,
        fps: FPS,
        messages: spec.messages.len(),
        characters: spec.characters.len(),
        group_chat: conversation.group_chat,
        frames: timeline.total_frames,
        duration_secs: timeline.duration_secs(),
        cues: timeline.cues.len(),
        pages: 0,
    };

    let fonts = Arc::new(FontSet::discover(assets));
    let ctx = screenshot_context(conversation, fonts)?;
    report.pages = page_ranges(&ctx).len();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "OK: {} ({}, {}x{}, {} fps, {} frames, {:.2}s)",
            document.display(),
            report.format,
            report.width,
            report.height,
            report.fps,
            report.frames,
            report.duration_secs
        );
        println!(
            "Messages: {}  Characters: {}  Cues: {}  Screenshot pages: {}",
            report.messages, report.characters, report.cues, report.pages
        );
    }
    Ok(())
}

fn run_timeline(document: &Path, json: bool) -> Result<()> {
    let loaded = load_and_validate_spec(document)?;
    let conversation = &loaded.conversation;
    let timeline = Timeline::build(
        conversation,
        FPS,
        conversation.spec.toggles.show_typing_indicator,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&timeline)?);
        return Ok(());
    }
    for event in &timeline.events {
        let message = event
            .message_index
            .map(|idx| conversation.messages()[idx].id.as_str())
            .unwrap_or("-");
        println!(
            "{:>7} +{:<4} {:<15} {}",
            event.start_frame,
            event.duration_frames,
            format!("{:?}", event.kind),
            message
        );
    }
    for cue in &timeline.cues {
        println!(
            "cue {:>7} {:>8.3}s {:?} {}",
            cue.frame, cue.time_sec, cue.kind, cue.message_id
        );
    }
    println!(
        "{} frames, {:.2}s",
        timeline.total_frames,
        timeline.duration_secs()
    );
    Ok(())
}
