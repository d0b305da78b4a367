//! Upload validation and storage for reference/output audio.
//!
//! Uploads are sniffed by magic bytes before anything touches the registry,
//! so a non-audio payload never creates a profile row. WAV payloads get a
//! deeper header check through `hound`.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Wav,
    Mp3,
    Flac,
    Ogg,
}

impl AudioKind {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioKind::Wav => "wav",
            AudioKind::Mp3 => "mp3",
            AudioKind::Flac => "flac",
            AudioKind::Ogg => "ogg",
        }
    }
}

/// Identify an audio container from its leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<AudioKind> {
    if bytes.len() < 12 {
        return None;
    }
    if &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(AudioKind::Wav);
    }
    if &bytes[0..4] == b"fLaC" {
        return Some(AudioKind::Flac);
    }
    if &bytes[0..4] == b"OggS" {
        return Some(AudioKind::Ogg);
    }
    // MP3: ID3 tag, or a bare MPEG frame sync.
    if &bytes[0..3] == b"ID3" || (bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        return Some(AudioKind::Mp3);
    }
    None
}

/// Validate an uploaded payload: non-empty, within the size limit, and a
/// recognized audio container. WAV files must also parse as WAV.
pub fn validate_upload(bytes: &[u8], max_bytes: u64) -> Result<AudioKind, AppError> {
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Audio file is empty".into()));
    }
    if bytes.len() as u64 > max_bytes {
        return Err(AppError::BadRequest(format!(
            "File too large: {:.1}MB (max {}MB)",
            bytes.len() as f64 / (1024.0 * 1024.0),
            max_bytes / (1024 * 1024)
        )));
    }
    let kind = sniff(bytes).ok_or_else(|| {
        AppError::BadRequest("Unsupported file format (expected wav, mp3, flac or ogg)".into())
    })?;
    if kind == AudioKind::Wav {
        hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| AppError::BadRequest(format!("Malformed WAV file: {}", e)))?;
    }
    Ok(kind)
}

/// Write audio bytes under `dir` with a fresh UUID filename.
pub fn save_audio(dir: &Path, kind: AudioKind, bytes: &[u8]) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", Uuid::new_v4(), kind.extension()));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Best-effort removal of a stored audio file. Missing files are not errors;
/// the registry row is the source of truth.
pub fn remove_audio(path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove audio file {}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    pub(crate) fn tiny_wav() -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buffer = Vec::new();
        {
            let cursor = Cursor::new(&mut buffer);
            let mut writer = WavWriter::new(cursor, spec).unwrap();
            for i in 0..100i16 {
                writer.write_sample(i * 100).unwrap();
            }
            writer.finalize().unwrap();
        }
        buffer
    }

    #[test]
    fn test_sniff_wav() {
        assert_eq!(sniff(&tiny_wav()), Some(AudioKind::Wav));
    }

    #[test]
    fn test_sniff_known_magics() {
        let mut flac = b"fLaC".to_vec();
        flac.extend_from_slice(&[0u8; 16]);
        assert_eq!(sniff(&flac), Some(AudioKind::Flac));

        let mut ogg = b"OggS".to_vec();
        ogg.extend_from_slice(&[0u8; 16]);
        assert_eq!(sniff(&ogg), Some(AudioKind::Ogg));

        let mut mp3 = b"ID3".to_vec();
        mp3.extend_from_slice(&[0u8; 16]);
        assert_eq!(sniff(&mp3), Some(AudioKind::Mp3));
    }

    #[test]
    fn test_sniff_rejects_non_audio() {
        assert_eq!(sniff(b"<!DOCTYPE html><html></html>"), None);
        assert_eq!(sniff(b"short"), None);
    }

    #[test]
    fn test_validate_upload_rejects_empty_and_oversize() {
        assert!(matches!(
            validate_upload(&[], 1024).unwrap_err(),
            AppError::BadRequest(_)
        ));
        let wav = tiny_wav();
        assert!(matches!(
            validate_upload(&wav, 10).unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn test_validate_upload_rejects_truncated_wav() {
        // Valid RIFF/WAVE magic but nothing behind it.
        let mut bytes = b"RIFF\x00\x00\x00\x00WAVE".to_vec();
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            validate_upload(&bytes, 1024).unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn test_validate_upload_accepts_wav() {
        let wav = tiny_wav();
        assert_eq!(validate_upload(&wav, 1024 * 1024).unwrap(), AudioKind::Wav);
    }

    #[test]
    fn test_save_and_remove_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_audio(dir.path(), AudioKind::Wav, &tiny_wav()).unwrap();
        assert!(path.exists());
        remove_audio(&path.to_string_lossy());
        assert!(!path.exists());
        // Removing twice is fine.
        remove_audio(&path.to_string_lossy());
    }
}
