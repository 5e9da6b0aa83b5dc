//! Synthetic upload fixture
//!
//! A short mono sine tone as 16-bit PCM WAV, so every engine receives the
//! same input through the file picker.

use std::f64::consts::PI;
use std::path::Path;

use crate::common::{Error, Result};

/// Parameters of the generated tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub frequency: f64,
    pub amplitude: f64,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            duration_secs: 0.5,
            sample_rate: 44_100,
            frequency: 440.0,
            amplitude: 1600.0,
        }
    }
}

impl ToneSpec {
    /// Number of frames in the rendered tone
    pub fn frame_count(&self) -> u32 {
        (self.sample_rate as f64 * self.duration_secs) as u32
    }
}

/// Render the tone as a complete WAV file
pub fn render_wav(spec: &ToneSpec) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;

    let frames = spec.frame_count();
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = spec.sample_rate * u32::from(block_align);
    let data_len = frames * u32::from(block_align);

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&spec.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..frames {
        let t = f64::from(i) / f64::from(spec.sample_rate);
        let sample = (spec.amplitude * (2.0 * PI * spec.frequency * t).sin()) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }

    out
}

/// Write the default tone to `path` unless a file is already there
///
/// Returns whether a new fixture was written.
pub fn ensure_fixture(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_fixture(path, &ToneSpec::default())?;
    Ok(true)
}

/// Write a tone to `path`, replacing any existing file
pub fn write_fixture(path: &Path, spec: &ToneSpec) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_wav(spec)).map_err(|e| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    tracing::info!(
        path = %path.display(),
        frames = spec.frame_count(),
        "Wrote {} Hz test tone",
        spec.frequency
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn test_default_tone_layout() {
        let wav = render_wav(&ToneSpec::default());
        assert_eq!(ToneSpec::default().frame_count(), 22_050);
        assert_eq!(wav.len(), 44 + 22_050 * 2);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4) as usize, wav.len() - 8);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u16_at(&wav, 22), 1); // mono
        assert_eq!(u32_at(&wav, 24), 44_100);
        assert_eq!(u32_at(&wav, 28), 88_200);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 44_100);
    }

    #[test]
    fn test_samples_follow_sine() {
        let wav = render_wav(&ToneSpec::default());
        let sample = |i: usize| i16::from_le_bytes([wav[44 + 2 * i], wav[45 + 2 * i]]);

        assert_eq!(sample(0), 0);
        let peak = (0..22_050).map(|i| sample(i).unsigned_abs()).max().unwrap();
        assert!(peak <= 1600 && peak >= 1590, "peak {peak}");
        // 440 Hz at 44.1 kHz: the first quarter period ends near frame 25
        assert!(sample(25) > 1500);
        assert!(sample(75) < -1500);
    }

    #[test]
    fn test_ensure_fixture_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_local.wav");

        assert!(ensure_fixture(&path).unwrap());
        let first = std::fs::read(&path).unwrap();
        assert_eq!(&first[0..4], b"RIFF");

        std::fs::write(&path, b"user supplied").unwrap();
        assert!(!ensure_fixture(&path).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"user supplied");
    }
}
