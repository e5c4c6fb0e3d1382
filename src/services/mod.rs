pub mod document;
pub mod illustration;
pub mod image;
pub mod llm;
pub mod narrative;
pub mod scenes;
pub mod setup;
pub mod workflow;
