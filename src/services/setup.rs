use crate::core::config::Config;
use crate::core::state::{CycleState, Subscriber};
use crate::core::story::{
    clamp_word_count, Language, StoryRequest, MAX_WORD_COUNT, MIN_WORD_COUNT, WORD_COUNT_STEP,
};
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Select, Text};

const DEFAULT_WORD_COUNT: u32 = 300;

pub fn word_count_options() -> Vec<u32> {
    (MIN_WORD_COUNT..=MAX_WORD_COUNT)
        .step_by(WORD_COUNT_STEP as usize)
        .collect()
}

/// Uses the request from `config.yml` when there is one, otherwise prompts
/// for each field. Unattended runs never prompt.
pub fn collect_story_request(config: &Config) -> Result<StoryRequest> {
    if let Some(story) = &config.story {
        let mut request = story.clone();
        request.word_count = clamp_word_count(request.word_count);
        return Ok(request);
    }
    if config.unattended {
        bail!("Unattended mode requires a 'story' section in config.yml");
    }

    let title = Text::new("Story title:").prompt()?;
    let character = Text::new("Describe the main character:").prompt()?;
    let message = Text::new("What should happen in the story?").prompt()?;

    let options = word_count_options();
    let cursor = options
        .iter()
        .position(|&n| n == DEFAULT_WORD_COUNT)
        .unwrap_or(0);
    let word_count = Select::new("Approximate length (words):", options)
        .with_starting_cursor(cursor)
        .prompt()?;

    let language = Select::new("Language:", vec![Language::English, Language::Marathi]).prompt()?;

    Ok(StoryRequest::new(title, character, message, word_count, language))
}

pub fn confirm_export() -> Result<bool> {
    let ans = Confirm::new("Download the story as PDF?")
        .with_default(true)
        .prompt()?;
    Ok(ans)
}

/// Terminal progress bar driven by illustration state changes.
pub fn progress_subscriber() -> Result<Subscriber> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images")?
            .progress_chars("#>-"),
    );

    Ok(Box::new(move |state: &CycleState| match state {
        CycleState::RequestingIllustrations { done, total } => {
            pb.set_length(*total as u64);
            pb.set_position(*done as u64);
        }
        CycleState::IllustrationsSettled { .. } => pb.finish_and_clear(),
        _ => {}
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_options() {
        let options = word_count_options();
        assert_eq!(options.first(), Some(&100));
        assert_eq!(options.last(), Some(&1000));
        assert_eq!(options.len(), 19);
        assert!(options.contains(&DEFAULT_WORD_COUNT));
    }

    #[test]
    fn test_configured_story_skips_prompts() {
        let config = Config::parse(
            "unattended: true\nllm:\n  provider: gemini\nstory:\n  title: The Fox\n  character_description: a clever fox\n  message: set in a forest\n  word_count: 5000\n",
        )
        .unwrap();
        let request = collect_story_request(&config).unwrap();
        assert_eq!(request.title, "The Fox");
        assert_eq!(request.word_count, 1000);
        assert_eq!(request.language, Language::English);
    }

    #[test]
    fn test_unattended_without_story_fails() {
        let config = Config::parse("unattended: true\nllm:\n  provider: gemini\n").unwrap();
        assert!(collect_story_request(&config).is_err());
    }

    #[test]
    fn test_progress_subscriber_accepts_transitions() {
        let subscriber = progress_subscriber().unwrap();
        subscriber(&CycleState::RequestingIllustrations { done: 1, total: 3 });
        subscriber(&CycleState::IllustrationsSettled { succeeded: 3, total: 3 });
        subscriber(&CycleState::Idle);
    }
}
