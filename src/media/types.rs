use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, ValidationError};

/// A single decoded or composited video frame
///
/// This is a thin wrapper around an RGB image buffer; the surface, the
/// decoders and the encoders all exchange frames in this layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self { buffer: ImageBuffer::new(width, height) }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    /// Raw packed RGB24 bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }
}

/// A user-supplied source video. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    name: String,
    path: PathBuf,
}

impl SourceFile {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, path: P) -> Self {
        Self { name: name.into(), path: path.into() }
    }

    /// Use the file name as the identifier
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension()?.to_str()
    }

    /// Check the extension against the container formats ffmpeg reliably opens
    pub fn is_supported(&self) -> bool {
        match self.extension() {
            Some(ext) => matches!(
                ext.to_lowercase().as_str(),
                "mp4" | "avi" | "mov" | "mkv" | "webm" | "m4v" | "flv"
            ),
            None => false,
        }
    }
}

/// What a decoder reports once a source's metadata is available
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Playable duration in seconds
    pub duration: f64,

    /// Intrinsic frame width
    pub width: u32,

    /// Intrinsic frame height
    pub height: u32,

    /// Native frame rate, if the container declares one
    pub fps: Option<f64>,
}

impl MediaInfo {
    pub fn new(duration: f64, width: u32, height: u32) -> Self {
        Self { duration, width, height, fps: None }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Expand the given paths into source files.
///
/// Files are taken as-is; directories are scanned one level deep, skipping
/// hidden files and unsupported extensions. The result is sorted by name
/// within each directory so runs with the same seed pick the same files.
pub fn collect_sources<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::new();

    for input in inputs {
        let input = input.as_ref();

        if input.is_dir() {
            let mut found = Vec::new();
            for entry in std::fs::read_dir(input)? {
                let path = entry?.path();
                if !path.is_file() || is_hidden_file(&path) {
                    continue;
                }

                let source = SourceFile::from_path(&path);
                if source.is_supported() {
                    found.push(source);
                } else {
                    debug!("Skipping unsupported file {:?}", path);
                }
            }
            found.sort_by(|a, b| a.name().cmp(b.name()));
            sources.extend(found);
        } else if input.is_file() {
            let source = SourceFile::from_path(input);
            if !source.is_supported() {
                warn!("{} has an unrecognised extension, trying it anyway", source.name());
            }
            sources.push(source);
        } else {
            return Err(ValidationError::InvalidValue {
                key: "input".to_string(),
                value: input.display().to_string(),
            }
            .into());
        }
    }

    if sources.is_empty() {
        return Err(ValidationError::NoSources.into());
    }

    Ok(sources)
}

fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_frame_from_rgb_bytes_checks_length() {
        assert!(Frame::from_rgb_bytes(2, 2, vec![0; 12]).is_some());
        assert!(Frame::from_rgb_bytes(2, 2, vec![0; 11]).is_none());
    }

    #[test]
    fn test_source_name_from_path() {
        let source = SourceFile::from_path("/videos/holiday.MOV");
        assert_eq!(source.name(), "holiday.MOV");
        assert!(source.is_supported());
        assert!(!SourceFile::from_path("notes.txt").is_supported());
    }

    #[test]
    fn test_collect_sources_scans_directories() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("a.webm"), b"x").unwrap();
        std::fs::write(dir.path().join(".hidden.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let sources = collect_sources(&[dir.path()]).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a.webm", "b.mp4"]);
    }

    #[test]
    fn test_collect_sources_rejects_empty_input() {
        let dir = tempdir().unwrap();
        let err = collect_sources(&[dir.path()]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ShufflerError::Validation(ValidationError::NoSources)
        ));
    }
}
