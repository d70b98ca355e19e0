//! Asset loaders. Nothing here fails a render: each loader reports "not found"
//! through `Option` and the caller picks the fallback.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use fontdue::{Font, FontSettings};
use image::RgbaImage;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::layout::TextMeasure;

pub const SAMPLE_RATE: u32 = 44_100;

/// Sound file extensions, in lookup order.
pub const SOUND_EXTENSIONS: [&str; 3] = ["mp3", "wav", "m4a"];

/// System fonts probed after the bundled asset directory.
const SYSTEM_FONT_PATHS: [&str; 6] = [
    "/System/Library/Fonts/SFNS.ttf",
    "/System/Library/Fonts/SFNSText.ttf",
    "/Library/Fonts/SF-Pro-Text-Regular.otf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

/// Where optional assets live. Fonts are read from `<root>/fonts`, sounds from
/// `<root>/send.*` and `<root>/receive.*` (see [`SOUND_EXTENSIONS`]).
#[derive(Debug, Clone, Default)]
pub struct AssetPaths {
    pub root: Option<PathBuf>,
    pub probe_system_fonts: bool,
}

impl AssetPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            probe_system_fonts: true,
        }
    }

    /// No asset directory and no system fonts: fully synthetic fallbacks.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fonts_dir(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join("fonts"))
    }

    pub fn sound_candidates(&self, stem: &str) -> Vec<PathBuf> {
        let Some(root) = self.root.as_ref() else {
            return Vec::new();
        };
        SOUND_EXTENSIONS
            .iter()
            .map(|ext| root.join(format!("{stem}.{ext}")))
            .collect()
    }

    /// First existing sound file for `stem`.
    pub fn sound_path(&self, stem: &str) -> Option<PathBuf> {
        self.sound_candidates(stem)
            .into_iter()
            .find(|path| path.is_file())
    }
}

/// Ordered font fallback chain. A glyph is drawn with the first font that has it.
pub struct FontSet {
    fonts: Vec<Font>,
}

impl FontSet {
    pub fn empty() -> Self {
        Self { fonts: Vec::new() }
    }

    pub fn from_fonts(fonts: Vec<Font>) -> Self {
        Self { fonts }
    }

    pub fn discover(paths: &AssetPaths) -> Self {
        let mut candidates = Vec::new();
        if let Some(dir) = paths.fonts_dir() {
            candidates.extend(font_files_in(&dir));
        }
        if paths.probe_system_fonts {
            candidates.extend(SYSTEM_FONT_PATHS.iter().map(PathBuf::from));
        }

        let fonts = candidates
            .iter()
            .filter(|path| path.is_file())
            .filter_map(|path| load_font(path))
            .collect::<Vec<_>>();
        if fonts.is_empty() {
            warn!("no usable font found; text falls back to fixed-advance metrics");
        } else {
            debug!(count = fonts.len(), "loaded font fallback chain");
        }
        Self { fonts }
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn font(&self, index: usize) -> Option<&Font> {
        self.fonts.get(index)
    }

    /// Index of the first font that maps `ch` to a real glyph.
    pub fn font_for(&self, ch: char) -> Option<usize> {
        self.fonts
            .iter()
            .position(|font| font.lookup_glyph_index(ch) != 0)
    }

    pub fn has_glyphs(&self, text: &str) -> bool {
        text.chars()
            .filter(|ch| !ch.is_whitespace())
            .all(|ch| self.font_for(ch).is_some())
    }

    pub fn advance(&self, ch: char, px: f32) -> f32 {
        match self.font_for(ch).and_then(|idx| self.fonts.get(idx)) {
            Some(font) => font.metrics(ch, px).advance_width,
            None => fallback_advance(ch, px),
        }
    }

    /// Distance from the top of a line box to the baseline.
    pub fn ascent(&self, px: f32) -> f32 {
        self.fonts
            .first()
            .and_then(|font| font.horizontal_line_metrics(px))
            .map(|metrics| metrics.ascent)
            .unwrap_or(px * 0.8)
    }
}

impl TextMeasure for FontSet {
    fn measure(&self, text: &str, px: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, px)).sum()
    }
}

fn fallback_advance(ch: char, px: f32) -> f32 {
    if ch.is_whitespace() {
        px * 0.3
    } else {
        px * 0.55
    }
}

fn font_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    files.sort();
    files
}

pub fn load_font(path: &Path) -> Option<Font> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to read font");
            return None;
        }
    };
    match Font::from_bytes(bytes, FontSettings::default()) {
        Ok(font) => Some(font),
        Err(error) => {
            warn!(path = %path.display(), error, "failed to parse font");
            None
        }
    }
}

/// Decode a sound file to mono `f32` at [`SAMPLE_RATE`]. WAV goes through
/// hound, everything else through symphonia.
pub fn load_sound_mono(path: &Path) -> Option<Vec<f32>> {
    let bytes = fs::read(path).ok()?;
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let decoded = if ext == "wav" {
        decode_wav_mono(&bytes)
    } else {
        decode_compressed_mono(bytes, &ext)
    };
    match decoded {
        Ok(samples) => Some(samples),
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to decode sound");
            None
        }
    }
}

pub fn decode_wav_mono(bytes: &[u8]) -> anyhow::Result<Vec<f32>> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let full_scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / full_scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(resample_linear(
        &downmix(&samples, channels),
        spec.sample_rate,
        SAMPLE_RATE,
    ))
}

/// Decode MP3/AAC/M4A bytes. `ext` is only a probe hint; the container is
/// detected from the data.
pub fn decode_compressed_mono(bytes: Vec<u8>, ext: &str) -> anyhow::Result<Vec<f32>> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if !ext.is_empty() {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error))
                if error.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(error) => return Err(error.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped, as players do.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(error) => return Err(error.into()),
        };
        let spec = *decoded.spec();
        if sample_rate.is_none() {
            sample_rate = Some(spec.rate);
        }
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        mono.extend(downmix(buffer.samples(), spec.channels.count().max(1)));
    }

    let rate = sample_rate.ok_or_else(|| anyhow!("unknown sample rate"))?;
    Ok(resample_linear(&mono, rate, SAMPLE_RATE))
}

fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler for short UI sounds.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|idx| {
            let pos = idx as f64 * ratio;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let frac = (pos - i0 as f64) as f32;
            samples[i0] + (samples[i1] - samples[i0]) * frac
        })
        .collect()
}

/// Decode avatar image bytes. Unknown or corrupt data yields `None`.
pub fn decode_avatar(bytes: &[u8]) -> Option<RgbaImage> {
    match image::load_from_memory(bytes) {
        Ok(decoded) => Some(decoded.to_rgba8()),
        Err(error) => {
            warn!(%error, "failed to decode avatar image");
            None
        }
    }
}
