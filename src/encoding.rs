use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

/// Frames buffered between the render loop and the ffmpeg writer thread.
const PIPE_DEPTH: usize = 8;
const VIDEO_BITRATE: &str = "12M";
const VIDEO_BUFSIZE: &str = "24M";
const VIDEO_CRF: &str = "18";
const VIDEO_PRESET: &str = "slow";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FfmpegMode {
    #[default]
    System,
    Sidecar,
}

/// Mixed track written to disk beforehand, read by ffmpeg as raw `f32le`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio: Option<AudioInput>,
    pub output_path: PathBuf,
}

impl EncodeSettings {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Streams RGBA frames to an ffmpeg child process on a dedicated writer thread.
pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
    frame_bytes: usize,
}

trait VideoEncoderBackend: Send {
    fn mode_label(&self) -> &'static str;
    fn ffmpeg_path(&self) -> Result<PathBuf>;
}

struct SystemFfmpegBackend;

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend;

impl FfmpegPipe {
    pub fn spawn(settings: &EncodeSettings, mode: FfmpegMode) -> Result<Self> {
        if settings.width == 0 || settings.height == 0 || settings.fps == 0 {
            bail!(
                "invalid encode settings {}x{} @ {} fps",
                settings.width,
                settings.height,
                settings.fps
            );
        }
        let backend = select_backend(mode)?;
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(PIPE_DEPTH);
        let worker_name = format!("chatreel-ffmpeg-{}", backend.mode_label());
        let settings_owned = settings.clone();

        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || {
                let ffmpeg_path = backend.ffmpeg_path()?;
                run_ffmpeg_process(&ffmpeg_path, receiver, &settings_owned, backend.mode_label())
            })
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            frame_bytes: settings.frame_bytes(),
        })
    }

    pub fn write_frame(&self, rgba_frame: Vec<u8>) -> Result<()> {
        if rgba_frame.len() != self.frame_bytes {
            bail!(
                "frame size mismatch: expected {} bytes, got {}",
                self.frame_bytes,
                rgba_frame.len()
            );
        }
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        sender
            .send(rgba_frame)
            .map_err(|_| anyhow!("ffmpeg writer stopped accepting frames"))
    }

    /// Close stdin and wait for ffmpeg. A writer that stopped early reports its
    /// own error here.
    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());
        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }

    /// Surface the writer's failure after a `write_frame` error, falling back to
    /// the send error itself.
    pub fn abort(self, send_error: anyhow::Error) -> anyhow::Error {
        match self.finish() {
            Err(worker_error) => worker_error,
            Ok(()) => send_error,
        }
    }
}

fn select_backend(mode: FfmpegMode) -> Result<Box<dyn VideoEncoderBackend>> {
    match mode {
        FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend)),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                Err(anyhow!(
                    "ffmpeg sidecar mode requested but chatreel was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                ))
            }
        }
    }
}

impl VideoEncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn ffmpeg_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("ffmpeg"))
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl VideoEncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn ffmpeg_path(&self) -> Result<PathBuf> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        Ok(path)
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    receiver: mpsc::Receiver<Vec<u8>>,
    settings: &EncodeSettings,
    mode_label: &str,
) -> Result<()> {
    let args = ffmpeg_args(settings);
    debug!(mode = mode_label, args = %args.join(" "), "spawning ffmpeg");
    let mut child = Command::new(ffmpeg_path)
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                    ffmpeg_path.display()
                )
            } else {
                anyhow!(
                    "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}): {error}",
                    ffmpeg_path.display()
                )
            }
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    let mut write_error = None;
    while let Ok(frame) = receiver.recv() {
        if let Err(error) = stdin.write_all(&frame) {
            write_error = Some(error);
            break;
        }
    }
    if write_error.is_none() {
        if let Err(error) = stdin.flush() {
            write_error = Some(error);
        }
    }
    drop(stdin);
    drop(receiver);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        bail!(
            "ffmpeg failed with status {status} (mode={mode_label}, stderr_tail='{stderr_tail}')"
        );
    }
    if let Some(error) = write_error {
        return Err(anyhow::Error::new(error).context("failed to write frame to ffmpeg stdin"));
    }
    Ok(())
}

pub fn ffmpeg_args(settings: &EncodeSettings) -> Vec<String> {
    let mut args = ffmpeg_rawvideo_input_args(settings.width, settings.height, settings.fps);
    match &settings.audio {
        Some(audio) => {
            args.extend(ffmpeg_audio_input_args(audio));
            args.extend(ffmpeg_h264_output_args());
            args.extend(
                ["-c:a", "aac", "-b:a", "192k", "-shortest"]
                    .into_iter()
                    .map(str::to_owned),
            );
        }
        None => {
            args.push("-an".to_owned());
            args.extend(ffmpeg_h264_output_args());
        }
    }
    args.push("-movflags".to_owned());
    args.push("+faststart".to_owned());
    args.push(settings.output_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(width: u32, height: u32, fps: u32) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        format!("{width}x{height}"),
        "-r".to_owned(),
        fps.to_string(),
        "-i".to_owned(),
        "pipe:0".to_owned(),
    ]
}

fn ffmpeg_audio_input_args(audio: &AudioInput) -> Vec<String> {
    vec![
        "-f".to_owned(),
        "f32le".to_owned(),
        "-ar".to_owned(),
        audio.sample_rate.to_string(),
        "-ac".to_owned(),
        audio.channels.to_string(),
        "-i".to_owned(),
        audio.path.to_string_lossy().into_owned(),
    ]
}

/// H.264 at CRF 18 with a 12 Mbit/s ceiling.
fn ffmpeg_h264_output_args() -> Vec<String> {
    [
        "-c:v",
        "libx264",
        "-preset",
        VIDEO_PRESET,
        "-crf",
        VIDEO_CRF,
        "-maxrate",
        VIDEO_BITRATE,
        "-bufsize",
        VIDEO_BUFSIZE,
        "-pix_fmt",
        "yuv420p",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    s.chars()
        .skip(count.saturating_sub(max_chars))
        .collect::<String>()
        .trim()
        .to_owned()
}
