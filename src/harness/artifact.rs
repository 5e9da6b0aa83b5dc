//! Artifact extraction bridge and persistence
//!
//! The mix blob crosses the automation boundary as base64 text; it is decoded
//! exactly once here and written as `<prefix>-<engine>.<ext>`.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::common::{Error, Result};

use super::engine::Engine;
use super::page::BridgePayload;

/// Extension used when the page suggests nothing usable
pub const DEFAULT_EXTENSION: &str = "wav";

/// Decode the bridge payload into the artifact bytes
pub fn decode_payload(payload: BridgePayload) -> Result<Vec<u8>> {
    if let Some(error) = payload.error {
        return Err(Error::Artifact(format!("page could not read mixBlob: {}", error)));
    }
    let data = payload
        .data
        .ok_or_else(|| Error::Artifact("bridge returned no data".to_string()))?;

    let bytes = STANDARD.decode(data.trim())?;
    if bytes.is_empty() {
        return Err(Error::Artifact("mixBlob is empty".to_string()));
    }
    Ok(bytes)
}

/// Reduce a page-supplied extension to a safe file extension
///
/// Anything that is not 1 to 8 ASCII alphanumerics falls back to `wav`.
pub fn sanitize_extension(raw: &str) -> String {
    let ext = raw.trim().to_ascii_lowercase();
    if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        DEFAULT_EXTENSION.to_string()
    }
}

/// `<dir>/<prefix>-<engine>.<ext>`
pub fn output_path(dir: &Path, prefix: &str, engine: Engine, ext: &str) -> PathBuf {
    dir.join(format!("{}-{}.{}", prefix, engine, ext))
}

/// Write the artifact, creating the output directory if needed
pub async fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await.map_err(|e| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

/// Audio containers the mixer can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Wav,
    Mp3,
    Ogg,
    Flac,
    WebM,
    Mp4,
}

impl Container {
    /// Identify a container from its leading bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(Self::Wav),
            [b'I', b'D', b'3', ..] => Some(Self::Mp3),
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(Self::Mp3),
            [b'O', b'g', b'g', b'S', ..] => Some(Self::Ogg),
            [b'f', b'L', b'a', b'C', ..] => Some(Self::Flac),
            [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(Self::WebM),
            [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some(Self::Mp4),
            _ => None,
        }
    }

    /// File extensions this container is normally saved under
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Wav => &["wav", "wave"],
            Self::Mp3 => &["mp3"],
            Self::Ogg => &["ogg", "oga", "opus"],
            Self::Flac => &["flac"],
            Self::WebM => &["webm", "mka"],
            Self::Mp4 => &["mp4", "m4a", "aac"],
        }
    }

    pub fn matches_extension(self, ext: &str) -> bool {
        self.extensions().contains(&ext)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wav => "WAV",
            Self::Mp3 => "MP3",
            Self::Ogg => "Ogg",
            Self::Flac => "FLAC",
            Self::WebM => "WebM",
            Self::Mp4 => "MP4",
        };
        f.write_str(name)
    }
}
