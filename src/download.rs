// Download artifact for the encoded narration
// Wraps the WAV bytes with a filename derived from the document title

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// MIME type of every narration download.
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Longest filename stem derived from a document title.
const MAX_STEM_LEN: usize = 60;

const FALLBACK_STEM: &str = "narration";

/// The downloadable result of one narration: immutable WAV bytes plus the
/// metadata the surrounding application needs to offer them to the user.
#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    file_name: String,
    bytes: Vec<u8>,
}

impl DownloadArtifact {
    /// Bundle encoded WAV bytes under a filename derived from `title`.
    pub fn new(title: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: format!("{}.wav", file_stem(title)),
            bytes,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &'static str {
        WAV_MIME_TYPE
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write the artifact into `dir`, returning the full path.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create download directory {:?}", dir))?;

        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)
            .with_context(|| format!("Failed to write narration to {:?}", path))?;

        log::debug!("Saved narration to {:?}", path);
        Ok(path)
    }
}

/// Reduce a document title to a safe filename stem: strip characters that
/// are hostile to any filesystem, collapse whitespace, truncate.
fn file_stem(title: &str) -> String {
    let mut stem = String::with_capacity(title.len().min(MAX_STEM_LEN));

    for word in title.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
            .collect();
        if cleaned.is_empty() {
            continue;
        }
        if !stem.is_empty() {
            stem.push(' ');
        }
        stem.push_str(&cleaned);
    }

    if stem.is_empty() {
        return FALLBACK_STEM.to_string();
    }

    if stem.len() > MAX_STEM_LEN {
        let mut cut = MAX_STEM_LEN;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        stem.truncate(cut);
        stem = stem.trim_end().to_string();
    }

    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_title() {
        let artifact = DownloadArtifact::new("Quarterly Report", vec![0; 4]);
        assert_eq!(artifact.file_name(), "Quarterly Report.wav");
        assert_eq!(artifact.mime_type(), "audio/wav");
    }

    #[test]
    fn test_filename_strips_hostile_characters() {
        let artifact = DownloadArtifact::new("a/b\\c: d*e?\"f\"", vec![]);
        assert_eq!(artifact.file_name(), "abc def.wav");
    }

    #[test]
    fn test_filename_truncated() {
        let title = "x".repeat(200);
        let artifact = DownloadArtifact::new(&title, vec![]);
        assert_eq!(artifact.file_name().len(), MAX_STEM_LEN + 4);
    }

    #[test]
    fn test_empty_title_falls_back() {
        assert_eq!(DownloadArtifact::new("", vec![]).file_name(), "narration.wav");
        assert_eq!(
            DownloadArtifact::new("///", vec![]).file_name(),
            "narration.wav"
        );
    }

    #[test]
    fn test_whitespace_collapsed() {
        let artifact = DownloadArtifact::new("  two   words  ", vec![]);
        assert_eq!(artifact.file_name(), "two words.wav");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = std::env::temp_dir().join("papervoice-test-download");
        let artifact = DownloadArtifact::new("saved", vec![1, 2, 3, 4]);

        let path = artifact.save_to(&dir).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3, 4]);

        fs::remove_file(path).ok();
    }
}
