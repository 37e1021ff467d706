//! Text content detection for the profanity rule and the moderation worker.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Failed to load lexicon from {path}: {message}")]
    Lexicon { path: String, message: String },

    #[error("Invalid pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Detector unavailable: {0}")]
    Unavailable(String),
}

/// Result of checking one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub violations: Vec<String>,
}

impl Detection {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn is_flagged(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Moderation reason shown to moderators and authors.
    pub fn reason(&self) -> Option<String> {
        if self.violations.is_empty() {
            None
        } else {
            Some(self.violations.join(", "))
        }
    }
}

/// Anything that can classify user text.
pub trait ContentDetector: Send + Sync {
    fn check(&self, text: &str) -> Result<Detection, DetectorError>;
}

/// Lexicon configuration.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// One word per line; `#` starts a comment line
    pub words_file: Option<PathBuf>,
    /// Words given inline (comma separated in the environment)
    pub words: Vec<String>,
    /// Extra suspicious-content regexes
    pub extra_patterns: Vec<String>,
    /// Share of uppercase letters above which text counts as shouting
    pub caps_ratio: f64,
    /// Texts with fewer letters are never checked for capitalization
    pub caps_min_letters: usize,
    /// Length of a run of one letter that counts as spam
    pub repeat_run: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            words_file: None,
            words: Vec::new(),
            extra_patterns: Vec::new(),
            caps_ratio: 0.7,
            caps_min_letters: 10,
            repeat_run: 5,
        }
    }
}

impl DetectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            words_file: std::env::var("MODERATION_WORDS_FILE").ok().map(PathBuf::from),
            words: split_list(std::env::var("MODERATION_WORDS").ok()),
            extra_patterns: std::env::var("MODERATION_PATTERNS")
                .ok()
                .map(|s| {
                    s.split(';')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            caps_ratio: std::env::var("MODERATION_CAPS_RATIO")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.caps_ratio),
            caps_min_letters: defaults.caps_min_letters,
            repeat_run: std::env::var("MODERATION_REPEAT_RUN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.repeat_run),
        }
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Word-list detector with spam heuristics.
pub struct LexiconDetector {
    words: HashSet<String>,
    patterns: Vec<(String, Regex)>,
    caps_ratio: f64,
    caps_min_letters: usize,
    repeat_run: usize,
}

impl LexiconDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let mut words: HashSet<String> = config.words.iter().map(|w| w.to_lowercase()).collect();
        if let Some(path) = &config.words_file {
            words.extend(load_words(path)?);
        }

        let mut patterns = vec![(
            "repeated_punctuation".to_string(),
            compile(r"[!?]{4,}")?,
        )];
        for (idx, pattern) in config.extra_patterns.iter().enumerate() {
            patterns.push((format!("suspicious_pattern_{}", idx), compile(pattern)?));
        }

        Ok(Self {
            words,
            patterns,
            caps_ratio: config.caps_ratio,
            caps_min_letters: config.caps_min_letters,
            repeat_run: config.repeat_run.max(2),
        })
    }

    /// Detector over an inline word list with default heuristics.
    pub fn with_words<I, S>(words: I) -> Result<Self, DetectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = DetectorConfig {
            words: words.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self::new(&config)
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Lexicon words found in `text`, sorted.
    pub fn matched_words(&self, text: &str) -> Vec<String> {
        let normalized = text.to_lowercase();
        let mut found: Vec<String> = normalized
            .unicode_words()
            .filter(|w| self.words.contains(*w))
            .map(String::from)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        found.sort();
        found
    }

    fn has_excessive_caps(&self, text: &str) -> bool {
        let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() < self.caps_min_letters {
            return false;
        }
        let caps = letters.iter().filter(|c| c.is_uppercase()).count();
        caps as f64 / letters.len() as f64 > self.caps_ratio
    }

    /// Only letters count; digits and punctuation break a run.
    fn has_repeated_chars(&self, text: &str) -> bool {
        let mut run = 0;
        let mut previous = None;
        for c in text.chars().flat_map(char::to_lowercase) {
            if !c.is_alphabetic() {
                run = 0;
                previous = None;
                continue;
            }
            if Some(c) == previous {
                run += 1;
            } else {
                run = 1;
                previous = Some(c);
            }
            if run >= self.repeat_run {
                return true;
            }
        }
        false
    }
}

impl ContentDetector for LexiconDetector {
    fn check(&self, text: &str) -> Result<Detection, DetectorError> {
        if text.trim().is_empty() {
            return Ok(Detection::clean());
        }

        let mut violations: Vec<String> = self
            .matched_words(text)
            .into_iter()
            .map(|w| format!("sensitive_word: {}", w))
            .collect();

        for (name, pattern) in &self.patterns {
            if pattern.is_match(text) {
                violations.push(name.clone());
            }
        }
        if self.has_excessive_caps(text) {
            violations.push("excessive_capitalization".to_string());
        }
        if self.has_repeated_chars(text) {
            violations.push("repeated_characters".to_string());
        }

        Ok(Detection { violations })
    }
}

fn compile(pattern: &str) -> Result<Regex, DetectorError> {
    Regex::new(pattern).map_err(|e| DetectorError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn load_words(path: &Path) -> Result<Vec<String>, DetectorError> {
    let content = fs::read_to_string(path).map_err(|e| DetectorError::Lexicon {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect())
}
