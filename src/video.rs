use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::artifact::{publish_or_keep_local, ArtifactHandle, ArtifactSink};
use crate::assets::{AssetPaths, FontSet, SAMPLE_RATE};
use crate::audio::{compose_track, write_f32le, SoundBank};
use crate::encoding::{AudioInput, EncodeSettings, FfmpegMode, FfmpegPipe};
use crate::error::{ChatReelError, Result};
use crate::progress::ProgressReporter;
use crate::renderer::{Frame, FrameRenderer, RenderContext};
use crate::schema::{Conversation, FPS};
use crate::timeline::{FrameState, Timeline, TimelineEvent};

const RENDER_START: f32 = 0.05;
const RENDER_END: f32 = 0.90;
const ENCODE_DONE: f32 = 0.95;

/// Threading and chunking for the frame renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderThreading {
    /// Worker count; `None` uses rayon's default.
    pub threads: Option<usize>,
    /// Timeline events rendered per parallel batch. Bounds peak memory.
    pub chunk_size: usize,
}

impl Default for RenderThreading {
    fn default() -> Self {
        Self {
            threads: None,
            chunk_size: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub output_path: PathBuf,
    pub assets: AssetPaths,
    pub ffmpeg: FfmpegMode,
    pub threading: RenderThreading,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoSummary {
    pub artifact: ArtifactHandle,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frames: u64,
    pub duration_secs: f64,
    pub cues: usize,
    /// Frames actually rasterized; the rest repeat an identical state.
    pub rendered_states: usize,
    pub has_audio: bool,
}

/// Render `conversation` to an MP4 and hand it to `sink`.
///
/// `progress` always ends in a terminal state: `completed` on success,
/// `failed` with the error message otherwise. Once started, a render runs to
/// completion; there is no cancellation.
#[tracing::instrument(skip_all, fields(output = %options.output_path.display()))]
pub fn render_video(
    conversation: Conversation,
    options: &VideoOptions,
    sink: Option<&dyn ArtifactSink>,
    mut progress: ProgressReporter,
) -> Result<VideoSummary> {
    match run_pipeline(conversation, options, sink, &mut progress) {
        Ok(summary) => {
            progress.complete();
            Ok(summary)
        }
        Err(error) => {
            progress.fail(error.to_string());
            Err(error)
        }
    }
}

fn run_pipeline(
    conversation: Conversation,
    options: &VideoOptions,
    sink: Option<&dyn ArtifactSink>,
    progress: &mut ProgressReporter,
) -> Result<VideoSummary> {
    progress.report("prepare", 0.02);
    if options.threading.threads == Some(0) {
        return Err(ChatReelError::validation("--threads must be >= 1 when set"));
    }

    let toggles = conversation.spec.toggles;
    let fonts = Arc::new(FontSet::discover(&options.assets));
    let ctx = Arc::new(RenderContext::new(conversation, fonts, toggles.show_keyboard)?);
    let timeline = Timeline::build(&ctx.conversation, FPS, toggles.show_typing_indicator);
    info!(
        frames = timeline.total_frames,
        duration_secs = timeline.duration_secs(),
        cues = timeline.cues.len(),
        "timeline ready"
    );
    progress.report("timeline", RENDER_START);

    if let Some(parent) = options.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| {
            ChatReelError::io(format!("failed to create {}", parent.display()), source)
        })?;
    }

    let mut audio_tmp = TempFileGuard(None);
    let audio = if toggles.enable_sound && !timeline.cues.is_empty() {
        let bank = SoundBank::load(&options.assets);
        let track = compose_track(&timeline.cues, timeline.total_frames, FPS, &bank);
        let path = std::env::temp_dir().join(format!(
            "chatreel_audio_{}_{}.f32le",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        write_f32le(&track, &path)?;
        audio_tmp.0 = Some(path.clone());
        Some(AudioInput {
            path,
            sample_rate: SAMPLE_RATE,
            channels: 1,
        })
    } else {
        debug!("encoding without an audio stream");
        None
    };
    let has_audio = audio.is_some();

    let frame = ctx.frame;
    let settings = EncodeSettings {
        width: frame.output_width,
        height: frame.output_height,
        fps: FPS,
        audio,
        output_path: options.output_path.clone(),
    };
    let encoder = FfmpegPipe::spawn(&settings, options.ffmpeg)
        .map_err(|error| ChatReelError::encoding(format!("{error:#}")))?;

    let pool = build_thread_pool(options.threading.threads)?;
    let chunk_size = options.threading.chunk_size.max(1);
    let total_frames = timeline.total_frames.max(1);
    let mut frames_written = 0_u64;
    let mut rendered_states = 0_usize;

    for chunk in timeline.events.chunks(chunk_size) {
        let (unique, event_to_unique) = unique_states(chunk);
        let rendered = render_states_parallel(&pool, &ctx, &unique)?;
        rendered_states += rendered.len();
        debug!(events = chunk.len(), unique = rendered.len(), "chunk rendered");

        for (event, slot) in chunk.iter().zip(event_to_unique) {
            let pixels = &rendered[slot].data;
            for _ in 0..event.duration_frames {
                if let Err(error) = encoder.write_frame(pixels.clone()) {
                    let error = encoder.abort(error);
                    return Err(ChatReelError::encoding(format!("{error:#}")));
                }
            }
            frames_written += u64::from(event.duration_frames);
        }
        let done = frames_written as f32 / total_frames as f32;
        progress.report("render", RENDER_START + (RENDER_END - RENDER_START) * done);
    }

    encoder
        .finish()
        .map_err(|error| ChatReelError::encoding(format!("{error:#}")))?;
    progress.report("encode", ENCODE_DONE);
    info!(
        frames = frames_written,
        rendered_states,
        path = %options.output_path.display(),
        "video encoded"
    );

    let artifact = publish_or_keep_local(sink, &options.output_path);
    Ok(VideoSummary {
        artifact,
        width: frame.output_width,
        height: frame.output_height,
        fps: FPS,
        frames: frames_written,
        duration_secs: timeline.duration_secs(),
        cues: timeline.cues.len(),
        rendered_states,
        has_audio,
    })
}

/// Distinct states in a chunk plus, per event, the index of its state.
fn unique_states(events: &[TimelineEvent]) -> (Vec<&FrameState>, Vec<usize>) {
    let mut first = HashMap::<&FrameState, usize>::new();
    let mut unique = Vec::new();
    let mut event_to_unique = Vec::with_capacity(events.len());
    for event in events {
        let slot = *first.entry(&event.state).or_insert_with(|| {
            unique.push(&event.state);
            unique.len() - 1
        });
        event_to_unique.push(slot);
    }
    (unique, event_to_unique)
}

/// Render states on the pool with one [`FrameRenderer`] per worker. Output
/// order matches `states`.
fn render_states_parallel(
    pool: &rayon::ThreadPool,
    ctx: &Arc<RenderContext>,
    states: &[&FrameState],
) -> Result<Vec<Frame>> {
    pool.install(|| {
        states
            .par_iter()
            .map_init(
                || FrameRenderer::new(Arc::clone(ctx)),
                |renderer, state| renderer.render(state),
            )
            .collect::<Result<Vec<_>>>()
    })
}

fn build_thread_pool(threads: Option<usize>) -> Result<rayon::ThreadPool> {
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(|idx| format!("chatreel-render-{idx}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|error| anyhow::anyhow!("failed to build rayon thread pool: {error}").into())
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = fs::remove_file(path);
        }
    }
}
