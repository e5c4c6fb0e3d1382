use crate::core::config::ExtractionPolicy;
use crate::core::error::StoryError;
use crate::core::state::Notifier;
use crate::core::story::{Scene, SceneSource, StoryRequest};
use crate::services::llm::{ChatRequest, GenerationParams, LlmClient};
use crate::utils::text::{strip_ordinal, truncate_chars};
use log::{info, warn};
use regex::Regex;
use std::sync::LazyLock;

pub const SCENE_COUNT: usize = 3;
pub const STORY_EXCERPT_CHARS: usize = 2000;

// "<n>." followed by whitespace; decimals such as "3.5" are not markers.
static SCENE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedScenes {
    pub scenes: Vec<Scene>,
    pub source: SceneSource,
}

pub fn scene_prompt(story: &str) -> String {
    format!(
        "From the following story, identify {} key visual scenes that would make good illustrations.\n\
         Describe each scene in 1-2 sentences that focus on visual elements.\n\
         Format the output as a numbered list with each scene description.\n\n\
         Story: {}",
        SCENE_COUNT,
        truncate_chars(story, STORY_EXCERPT_CHARS)
    )
}

/// Splits a numbered-list reply into scenes: each segment runs from one
/// `"<n>. "` marker to the next marker or the end of the text. Text before
/// the first marker is ignored and at most [`SCENE_COUNT`] scenes are kept.
pub fn parse_scenes(text: &str) -> Vec<Scene> {
    let starts: Vec<usize> = SCENE_MARKER.find_iter(text).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            text[start..end].trim()
        })
        .filter(|segment| !strip_ordinal(segment).trim().is_empty())
        .take(SCENE_COUNT)
        .enumerate()
        .map(|(i, segment)| Scene {
            ordinal: i + 1,
            description: segment.to_string(),
        })
        .collect()
}

pub fn fallback_scenes(request: &StoryRequest) -> Vec<Scene> {
    let title = request.title.trim();
    let character = request.character_description.trim();
    [
        format!("1. {} - main scene with {}", title, character),
        format!("2. Another moment from the story with {}", character),
        format!("3. Final scene from {}", title),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, description)| Scene {
        ordinal: i + 1,
        description,
    })
    .collect()
}

/// One follow-up call asking for visual scenes. Unparseable replies always
/// fall back to the templated scenes; service errors fall back too unless
/// `policy` is [`ExtractionPolicy::Surface`].
pub async fn extract_scenes(
    llm: &dyn LlmClient,
    story: &str,
    request: &StoryRequest,
    params: &GenerationParams,
    policy: ExtractionPolicy,
    notifier: &dyn Notifier,
) -> Result<ExtractedScenes, StoryError> {
    let chat = ChatRequest {
        history: Vec::new(),
        prompt: scene_prompt(story),
        params: *params,
    };

    match llm.chat(&chat).await {
        Ok(reply) => {
            let scenes = parse_scenes(&reply);
            if scenes.is_empty() {
                warn!("No numbered scenes in extraction reply, using default scenes");
                Ok(ExtractedScenes {
                    scenes: fallback_scenes(request),
                    source: SceneSource::Fallback,
                })
            } else {
                info!("Extracted {} scenes", scenes.len());
                Ok(ExtractedScenes {
                    scenes,
                    source: SceneSource::Parsed,
                })
            }
        }
        Err(e) if policy == ExtractionPolicy::Surface => {
            Err(StoryError::ExtractionFailed(format!("{:#}", e)))
        }
        Err(e) => {
            warn!("Error extracting scenes: {:#}", e);
            notifier.warning("Using default scenes for image generation");
            Ok(ExtractedScenes {
                scenes: fallback_scenes(request),
                source: SceneSource::Fallback,
            })
        }
    }
}
