use crate::core::error::StoryError;
use crate::core::story::{clamp_word_count, Language, StoryRequest, StoryResult};
use crate::services::llm::{ChatRequest, ChatTurn, GenerationParams, LlmClient};
use log::{error, info};

const PRIMER_USER: &str = "Hi, I'd like you to act as a story writer.\n";
const PRIMER_MODEL: &str = "Okay, I'm ready! Tell me what kind of story you have in mind.\n";
const MARATHI_INSTRUCTION: &str = "Write the story in Marathi language using Devanagari script.";

pub fn compose_story_prompt(request: &StoryRequest) -> String {
    let language_instruction = match request.language {
        Language::Marathi => MARATHI_INSTRUCTION,
        Language::English => "",
    };

    format!(
        "Generate a story with the title \"{}\".\n\
         The main character is described as: {}.\n\
         Additionally, {}.\n\
         The story should be approximately {} words long and use engaging and descriptive language.\n\
         {}",
        request.title.trim(),
        request.character_description.trim(),
        request.message.trim(),
        clamp_word_count(request.word_count),
        language_instruction
    )
    .trim_end()
    .to_string()
}

pub fn story_chat_request(request: &StoryRequest, params: &GenerationParams) -> ChatRequest {
    ChatRequest {
        history: vec![ChatTurn::user(PRIMER_USER), ChatTurn::model(PRIMER_MODEL)],
        prompt: compose_story_prompt(request),
        params: *params,
    }
}

/// Single narrative call. Validates first and never retries.
pub async fn request_narrative(
    llm: &dyn LlmClient,
    request: &StoryRequest,
    params: &GenerationParams,
) -> Result<StoryResult, StoryError> {
    request.validate()?;

    info!("Requesting narrative for \"{}\"", request.title);
    let text = llm
        .chat(&story_chat_request(request, params))
        .await
        .map_err(|e| {
            error!("Error generating story: {:#}", e);
            StoryError::NarrativeFailed(format!("{:#}", e))
        })?;

    if text.trim().is_empty() {
        return Err(StoryError::EmptyNarrative);
    }

    info!("Narrative received ({} chars)", text.chars().count());
    Ok(StoryResult { text })
}
