use crate::core::error::StoryError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_WORD_COUNT: u32 = 100;
pub const MAX_WORD_COUNT: u32 = 1000;
pub const WORD_COUNT_STEP: u32 = 50;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Marathi,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => write!(f, "English"),
            Language::Marathi => write!(f, "Marathi"),
        }
    }
}

/// What the user asked for. Re-created for every generation cycle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoryRequest {
    pub title: String,
    pub character_description: String,
    pub message: String,
    #[serde(default = "default_word_count")]
    pub word_count: u32,
    #[serde(default)]
    pub language: Language,
}

fn default_word_count() -> u32 {
    300
}

impl StoryRequest {
    pub fn new(
        title: impl Into<String>,
        character_description: impl Into<String>,
        message: impl Into<String>,
        word_count: u32,
        language: Language,
    ) -> Self {
        Self {
            title: title.into(),
            character_description: character_description.into(),
            message: message.into(),
            word_count: clamp_word_count(word_count),
            language,
        }
    }

    /// Checks the three mandatory fields. Runs before any network call.
    pub fn validate(&self) -> Result<(), StoryError> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.character_description.trim().is_empty() {
            missing.push("character description");
        }
        if self.message.trim().is_empty() {
            missing.push("story details");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoryError::Validation { missing })
        }
    }
}

pub fn clamp_word_count(count: u32) -> u32 {
    count.clamp(MIN_WORD_COUNT, MAX_WORD_COUNT)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoryResult {
    pub text: String,
}

impl StoryResult {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A short visual description driving one illustration request.
///
/// `description` keeps the raw list item, including its leading `"<n>."`
/// marker when the model produced one.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub ordinal: usize,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneSource {
    Parsed,
    Fallback,
}

impl fmt::Display for SceneSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneSource::Parsed => write!(f, "parsed"),
            SceneSource::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct Illustration {
    pub scene_ordinal: usize,
    pub image: Vec<u8>,
    pub caption: String,
}

impl fmt::Debug for Illustration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Illustration")
            .field("scene_ordinal", &self.scene_ordinal)
            .field("image", &format_args!("{} bytes", self.image.len()))
            .field("caption", &self.caption)
            .finish()
    }
}
