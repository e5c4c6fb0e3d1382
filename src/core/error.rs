use thiserror::Error;

/// Failures a generation cycle can report to the user.
///
/// Per-scene image failures are not part of this enum: they are carried as
/// values in [`crate::services::illustration::SceneOutcome`] so that one bad
/// scene never aborts its siblings.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Please fill in all the mandatory fields (missing: {})", missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    #[error("Error generating story: {0}")]
    NarrativeFailed(String),

    #[error("Could not generate story. Please try again with different inputs.")]
    EmptyNarrative,

    #[error("Error extracting scenes: {0}")]
    ExtractionFailed(String),

    #[error("Please generate a story before downloading.")]
    NothingToExport,

    #[error("Error generating PDF: {0}")]
    AssemblyFailed(String),
}

impl StoryError {
    pub fn assembly(err: impl std::fmt::Display) -> Self {
        StoryError::AssemblyFailed(err.to_string())
    }
}
