use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::story::StoryRequest;
use crate::services::document::DocumentConfig;
use crate::services::image::ImageConfig;
use crate::services::llm::LlmConfig;

pub const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default)]
    pub extraction_failure: ExtractionPolicy,

    pub llm: LlmConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub document: DocumentConfig,

    /// Pre-filled request; when absent the user is prompted.
    #[serde(default)]
    pub story: Option<StoryRequest>,
}

/// What to do when the scene extraction call itself fails.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionPolicy {
    /// Use the templated scenes and carry on.
    #[default]
    Fallback,
    /// Abort the cycle with the service error.
    Surface,
}

fn default_output() -> String {
    "output".to_string()
}

/// Returns `value` unless it is blank, in which case `env_key` is consulted.
pub fn resolve_secret(value: &str, env_key: &str) -> Result<String> {
    if !value.trim().is_empty() {
        return Ok(value.to_string());
    }
    std::env::var(env_key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("No credential configured and {} is not set", env_key))
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::story::Language;

    #[test]
    fn test_minimal_config_fills_defaults() -> Result<()> {
        let config = Config::parse(
            "llm:\n  provider: gemini\n  gemini:\n    api_key: abc\n",
        )?;

        assert_eq!(config.output_folder, "output");
        assert!(!config.unattended);
        assert_eq!(config.extraction_failure, ExtractionPolicy::Fallback);
        assert_eq!(config.llm.generation.temperature, 0.8);
        assert_eq!(config.llm.generation.top_k, 32);
        assert_eq!(config.llm.generation.max_output_tokens, 1024);
        assert_eq!(config.llm.scene_max_output_tokens, 512);
        assert_eq!(config.image.provider, "huggingface");
        assert_eq!(config.image.params.width, 512);
        assert_eq!(config.image.params.num_inference_steps, 30);
        assert_eq!(config.document.image_load_timeout_secs, 10);
        assert!(config.story.is_none());
        Ok(())
    }

    #[test]
    fn test_full_config_round_trips_story_and_policy() -> Result<()> {
        let yaml = r#"
output_folder: books
unattended: true
extraction_failure: surface
llm:
  provider: ollama
  ollama:
    base_url: http://localhost:11434/
    model: llama3
image:
  provider: openai
  openai:
    api_key: sk-test
story:
  title: The Fox
  character_description: a clever fox
  message: set in a forest
  word_count: 300
  language: english
"#;
        let config = Config::parse(yaml)?;
        assert_eq!(config.output_folder, "books");
        assert_eq!(config.extraction_failure, ExtractionPolicy::Surface);
        let story = config.story.as_ref().unwrap();
        assert_eq!(story.title, "The Fox");
        assert_eq!(story.language, Language::English);

        let reparsed = Config::parse(&serde_yaml_ng::to_string(&config)?)?;
        assert_eq!(reparsed.story, config.story);
        Ok(())
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&temp_dir.path().join("config.yml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_resolve_secret_prefers_config_value() {
        assert_eq!(
            resolve_secret("from-config", "STORYBOOK_TEST_UNSET_KEY").unwrap(),
            "from-config"
        );
        assert!(resolve_secret("  ", "STORYBOOK_TEST_UNSET_KEY").is_err());
    }
}
