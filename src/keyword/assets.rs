//! Keyword spotter asset bundle

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Default boost applied to keyword token paths during decoding
pub const DEFAULT_BOOST_SCORE: f32 = 2.0;

/// Default acceptance threshold for keyword candidates
pub const DEFAULT_THRESHOLD: f32 = 0.15;

/// File bundle a keyword spotter is built from.
///
/// Every file must be present at startup; recognition cannot run without
/// the model.
#[derive(Debug, Clone)]
pub struct SpotterAssets {
    pub tokens: PathBuf,
    pub encoder: PathBuf,
    pub decoder: PathBuf,
    pub joiner: PathBuf,
    pub keywords: PathBuf,
    pub boost_score: f32,
    pub threshold: f32,
}

impl SpotterAssets {
    /// Conventional bundle layout under one directory.
    #[must_use]
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            tokens: dir.join("tokens.txt"),
            encoder: dir.join("encoder.onnx"),
            decoder: dir.join("decoder.onnx"),
            joiner: dir.join("joiner.onnx"),
            keywords: dir.join("keywords.txt"),
            boost_score: DEFAULT_BOOST_SCORE,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Verify every bundle file exists.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing file. Missing assets are
    /// fatal at startup, never discovered mid-stream.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("tokens", &self.tokens),
            ("encoder", &self.encoder),
            ("decoder", &self.decoder),
            ("joiner", &self.joiner),
            ("keywords", &self.keywords),
        ] {
            if !path.exists() {
                return Err(Error::Keyword(format!(
                    "missing {name} file: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Parse the keywords file into entries.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or defines no keywords.
    pub fn load_keywords(&self) -> Result<Vec<KeywordEntry>> {
        let raw = std::fs::read_to_string(&self.keywords)?;
        let entries: Vec<KeywordEntry> = raw
            .lines()
            .filter_map(|line| KeywordEntry::parse(line, self.boost_score, self.threshold))
            .collect();

        if entries.is_empty() {
            return Err(Error::Keyword(format!(
                "no keywords defined in {}",
                self.keywords.display()
            )));
        }
        Ok(entries)
    }
}

/// One keyword definition.
///
/// Line format: decoding tokens separated by spaces, then optional
/// annotations `@label`, `:boost`, and `#threshold`, e.g.
/// `x iǎo ài @小爱同学 :2.5 #0.2`. Without a label the joined tokens are
/// the label.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordEntry {
    pub label: String,
    pub tokens: Vec<String>,
    pub boost: f32,
    pub threshold: f32,
}

impl KeywordEntry {
    fn parse(line: &str, default_boost: f32, default_threshold: f32) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut label = None;
        let mut boost = default_boost;
        let mut threshold = default_threshold;
        let mut tokens = Vec::new();

        for piece in line.split_whitespace() {
            if let Some(rest) = piece.strip_prefix('@') {
                label = Some(rest.to_string());
            } else if let Some(rest) = piece.strip_prefix(':') {
                if let Ok(value) = rest.parse() {
                    boost = value;
                }
            } else if let Some(rest) = piece.strip_prefix('#') {
                if let Ok(value) = rest.parse() {
                    threshold = value;
                }
            } else {
                tokens.push(piece.to_string());
            }
        }

        if tokens.is_empty() && label.is_none() {
            return None;
        }

        let label = label.unwrap_or_else(|| tokens.concat());
        Some(Self {
            label,
            tokens,
            boost,
            threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_bundle(dir: &Path) {
        for name in [
            "tokens.txt",
            "encoder.onnx",
            "decoder.onnx",
            "joiner.onnx",
        ] {
            std::fs::write(dir.join(name), b"stub").unwrap();
        }
        std::fs::write(dir.join("keywords.txt"), "n ǐ h ǎo @你好 :2.5 #0.2\n").unwrap();
    }

    #[test]
    fn validate_passes_with_complete_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path());
        let assets = SpotterAssets::from_dir(dir.path());
        assert!(assets.validate().is_ok());
    }

    #[test]
    fn validate_names_the_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path());
        std::fs::remove_file(dir.path().join("joiner.onnx")).unwrap();
        let assets = SpotterAssets::from_dir(dir.path());
        let err = assets.validate().unwrap_err().to_string();
        assert!(err.contains("joiner"), "unexpected error: {err}");
    }

    #[test]
    fn keywords_parse_with_annotations() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path());
        let assets = SpotterAssets::from_dir(dir.path());
        let entries = assets.load_keywords().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label, "你好");
        assert_eq!(entries[0].tokens, vec!["n", "ǐ", "h", "ǎo"]);
        assert!((entries[0].boost - 2.5).abs() < f32::EPSILON);
        assert!((entries[0].threshold - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn unlabeled_entry_joins_tokens() {
        let entry = KeywordEntry::parse("hey halo", 2.0, 0.15).unwrap();
        assert_eq!(entry.label, "heyhalo");
        assert!((entry.boost - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_keywords_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path());
        std::fs::write(dir.path().join("keywords.txt"), "\n\n").unwrap();
        let assets = SpotterAssets::from_dir(dir.path());
        assert!(assets.load_keywords().is_err());
    }
}
