use std::collections::HashMap;
use std::f32::consts::TAU;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::assets::{load_sound_mono, AssetPaths, SAMPLE_RATE};
use crate::error::{ChatReelError, Result};
use crate::timeline::{AudioCue, SoundKind};

const SEND_TONE_SECS: f32 = 0.15;
const RECEIVE_TONE_SECS: f32 = 0.2;

impl SoundKind {
    fn asset_stem(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
        }
    }
}

/// Decoded clips for one render. Loaded once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SoundBank {
    clips: HashMap<SoundKind, Arc<Vec<f32>>>,
}

impl SoundBank {
    /// Load `send.*` / `receive.*` from the asset directory, synthesizing a
    /// tone for each one that is missing or unreadable. The first candidate
    /// extension that decodes wins.
    pub fn load(paths: &AssetPaths) -> Self {
        let mut clips = HashMap::new();
        for kind in [SoundKind::Send, SoundKind::Receive] {
            let loaded = paths
                .sound_candidates(kind.asset_stem())
                .into_iter()
                .filter(|path| path.is_file())
                .find_map(|path| load_sound_mono(&path));
            let samples = match loaded {
                Some(samples) if !samples.is_empty() => {
                    debug!(sound = kind.asset_stem(), samples = samples.len(), "loaded sound");
                    samples
                }
                _ => {
                    warn!(sound = kind.asset_stem(), "sound asset missing; using synthesized tone");
                    synthesize(kind)
                }
            };
            clips.insert(kind, Arc::new(samples));
        }
        Self { clips }
    }

    pub fn synthesized() -> Self {
        Self {
            clips: [SoundKind::Send, SoundKind::Receive]
                .into_iter()
                .map(|kind| (kind, Arc::new(synthesize(kind))))
                .collect(),
        }
    }

    pub fn clip(&self, kind: SoundKind) -> &[f32] {
        self.clips.get(&kind).map(|clip| clip.as_slice()).unwrap_or(&[])
    }
}

pub fn synthesize(kind: SoundKind) -> Vec<f32> {
    match kind {
        SoundKind::Send => send_tone(),
        SoundKind::Receive => receive_tone(),
    }
}

/// 800 to 1200 Hz sweep with an `exp(-3t/d)` decay.
fn send_tone() -> Vec<f32> {
    let count = (SEND_TONE_SECS * SAMPLE_RATE as f32).round() as usize;
    let mut phase = 0.0_f32;
    (0..count)
        .map(|idx| {
            let t = idx as f32 / SAMPLE_RATE as f32;
            let freq = 800.0 + 400.0 * (t / SEND_TONE_SECS);
            phase += TAU * freq / SAMPLE_RATE as f32;
            0.3 * phase.sin() * (-3.0 * t / SEND_TONE_SECS).exp()
        })
        .collect()
}

/// 1200 + 1500 Hz chord with an `exp(-5t/d)` decay.
fn receive_tone() -> Vec<f32> {
    let count = (RECEIVE_TONE_SECS * SAMPLE_RATE as f32).round() as usize;
    (0..count)
        .map(|idx| {
            let t = idx as f32 / SAMPLE_RATE as f32;
            let chord = 0.2 * (TAU * 1200.0 * t).sin() + 0.15 * (TAU * 1500.0 * t).sin();
            chord * (-5.0 * t / RECEIVE_TONE_SECS).exp()
        })
        .collect()
}

pub fn frame_to_sample(frame: u64, fps: u32, sample_rate: u32) -> u64 {
    if fps == 0 {
        return 0;
    }
    frame * u64::from(sample_rate) / u64::from(fps)
}

/// Mix every cue's clip into one mono track of exactly
/// `total_frames / fps` seconds. Clips running past the end are truncated.
pub fn compose_track(cues: &[AudioCue], total_frames: u64, fps: u32, bank: &SoundBank) -> Vec<f32> {
    let total = frame_to_sample(total_frames, fps, SAMPLE_RATE) as usize;
    let mut out = vec![0.0_f32; total];

    for cue in cues {
        let start = frame_to_sample(cue.frame, fps, SAMPLE_RATE) as usize;
        if start >= total {
            continue;
        }
        for (dst, sample) in out[start..].iter_mut().zip(bank.clip(cue.kind)) {
            *dst += *sample;
        }
    }

    for sample in &mut out {
        *sample = sample.clamp(-1.0, 1.0);
    }
    debug!(cues = cues.len(), samples = total, "audio track composed");
    out
}

/// Raw little-endian `f32` mono, the format the encoder reads with `-f f32le`.
pub fn write_f32le(samples: &[f32], out_path: &Path) -> Result<()> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|source| {
        ChatReelError::io(format!("failed to write audio track '{}'", out_path.display()), source)
    })
}
