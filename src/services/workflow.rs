use crate::core::config::Config;
use crate::core::error::StoryError;
use crate::core::io::Storage;
use crate::core::state::{CycleState, Notifier, StoryState};
use crate::core::story::{Illustration, SceneSource, StoryRequest, StoryResult};
use crate::services::document::{assemble_document, missing_script_font};
use crate::services::illustration::{request_illustrations, SceneFailure};
use crate::services::image::ImageClient;
use crate::services::llm::{GenerationParams, LlmClient};
use crate::services::narrative::request_narrative;
use crate::services::scenes::extract_scenes;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a finished generation cycle produced.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub scene_source: SceneSource,
    pub scene_count: usize,
    pub illustrations: usize,
    pub failures: Vec<SceneFailure>,
}

/// Drives one story from request to exported PDF and owns the results of the
/// current cycle.
pub struct StoryWorkflow {
    config: Config,
    llm: Box<dyn LlmClient>,
    image: Box<dyn ImageClient>,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    state: StoryState,
    request: Option<StoryRequest>,
    story: Option<StoryResult>,
    illustrations: Vec<Illustration>,
}

impl StoryWorkflow {
    pub fn new(
        config: Config,
        llm: Box<dyn LlmClient>,
        image: Box<dyn ImageClient>,
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            llm,
            image,
            storage,
            notifier,
            state: StoryState::new(),
            request: None,
            story: None,
            illustrations: Vec::new(),
        }
    }

    pub fn state(&self) -> &StoryState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StoryState {
        &mut self.state
    }

    pub fn story(&self) -> Option<&StoryResult> {
        self.story.as_ref()
    }

    pub fn illustrations(&self) -> &[Illustration] {
        &self.illustrations
    }

    /// Narrative, scenes, then illustrations. Results of the previous cycle
    /// are discarded once the request passes validation. Taking `&mut self`
    /// means a second cycle cannot start while one is running.
    pub async fn generate(&mut self, request: StoryRequest) -> Result<CycleSummary, StoryError> {
        if let Err(e) = request.validate() {
            self.notifier.error(&e.to_string());
            return Err(e);
        }

        self.story = None;
        self.illustrations.clear();
        self.request = Some(request.clone());

        self.state.transition(CycleState::RequestingNarrative);
        let story = match request_narrative(
            self.llm.as_ref(),
            &request,
            &self.config.llm.generation,
        )
        .await
        {
            Ok(story) => story,
            Err(e) => {
                self.notifier.error(&e.to_string());
                self.state.transition(CycleState::NarrativeFailed { reason: e.to_string() });
                self.state.transition(CycleState::Idle);
                return Err(e);
            }
        };
        self.notifier.success("Story generated successfully!");
        self.state.transition(CycleState::NarrativeReady);

        self.state.transition(CycleState::ExtractingScenes);
        let scene_params = GenerationParams {
            max_output_tokens: self.config.llm.scene_max_output_tokens,
            ..self.config.llm.generation
        };
        let extracted = match extract_scenes(
            self.llm.as_ref(),
            &story.text,
            &request,
            &scene_params,
            self.config.extraction_failure,
            self.notifier.as_ref(),
        )
        .await
        {
            Ok(extracted) => extracted,
            Err(e) => {
                error!("{}", e);
                self.notifier.error(&e.to_string());
                self.story = Some(story);
                self.state.transition(CycleState::Idle);
                return Err(e);
            }
        };
        self.story = Some(story);
        self.state.transition(CycleState::ScenesReady {
            source: extracted.source,
            count: extracted.scenes.len(),
        });

        let total = extracted.scenes.len();
        self.state
            .transition(CycleState::RequestingIllustrations { done: 0, total });
        let state = &mut self.state;
        let batch = request_illustrations(
            self.image.as_ref(),
            &extracted.scenes,
            &self.config.image.params,
            self.notifier.as_ref(),
            |done, total| state.transition(CycleState::RequestingIllustrations { done, total }),
        )
        .await;

        let summary = CycleSummary {
            scene_source: extracted.source,
            scene_count: total,
            illustrations: batch.succeeded(),
            failures: batch.failures().cloned().collect(),
        };
        self.state.transition(CycleState::IllustrationsSettled {
            succeeded: summary.illustrations,
            total: batch.attempted(),
        });
        self.illustrations = batch.into_illustrations();

        Ok(summary)
    }

    /// Builds the PDF for the current story and writes it to the output
    /// folder. Nothing is written when assembly fails.
    pub async fn export(&mut self) -> Result<PathBuf, StoryError> {
        let (Some(request), Some(story)) = (self.request.as_ref(), self.story.as_ref()) else {
            self.notifier.warning(&StoryError::NothingToExport.to_string());
            return Err(StoryError::NothingToExport);
        };
        if story.is_empty() {
            self.notifier.warning(&StoryError::NothingToExport.to_string());
            return Err(StoryError::NothingToExport);
        }

        self.notifier.info("Creating your PDF...");
        self.state.transition(CycleState::Assembling);

        let result = self.write_document(request, story).await;
        match result {
            Ok(path) => {
                info!("PDF written to {}", path.display());
                self.notifier.success("PDF downloaded successfully!");
                self.state.transition(CycleState::Downloaded { path: path.clone() });
                Ok(path)
            }
            Err(e) => {
                error!("{}", e);
                self.notifier.error(&e.to_string());
                self.state.transition(CycleState::AssemblyFailed { reason: e.to_string() });
                Err(e)
            }
        }
    }

    async fn write_document(
        &self,
        request: &StoryRequest,
        story: &StoryResult,
    ) -> Result<PathBuf, StoryError> {
        if missing_script_font(request.language, &self.config.document) {
            warn!(
                "{} story without document.font_path; the built-in font cannot render its script",
                request.language
            );
            self.notifier
                .warning("No font configured for this language; the PDF text may be unreadable.");
        }
        let document = assemble_document(
            &request.title,
            story,
            &self.illustrations,
            &self.config.document,
        )
        .await?;

        let path = Path::new(&self.config.output_folder).join(&document.file_name);
        let path_str = path
            .to_str()
            .ok_or_else(|| StoryError::assembly("Output path is not valid UTF-8"))?;
        if self.storage.exists(path_str).await.unwrap_or(false) {
            warn!("Overwriting existing {}", path.display());
        }
        self.storage
            .write(path_str, &document.bytes)
            .await
            .map_err(|e| StoryError::assembly(format!("{:#}", e)))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::core::state::{NoticeLevel, RecordingNotifier};
    use crate::core::story::Language;
    use crate::services::illustration::tests::MockImageClient;
    use crate::services::narrative::tests::{fox_request, ScriptedLlm};
    use crate::services::scenes::fallback_scenes;
    use crate::utils::image::png_bytes;
    use anyhow::Result;
    use std::sync::Mutex;

    fn test_config(output: &Path) -> Config {
        let mut config = Config::parse("llm:\n  provider: mock\n").unwrap();
        config.output_folder = output.to_string_lossy().to_string();
        config
    }

    struct Harness {
        workflow: StoryWorkflow,
        notifier: Arc<RecordingNotifier>,
        states: Arc<Mutex<Vec<CycleState>>>,
        llm_requests: Arc<Mutex<Vec<crate::services::llm::ChatRequest>>>,
        _temp_dir: tempfile::TempDir,
        output: PathBuf,
    }

    fn harness(llm: ScriptedLlm, image: MockImageClient) -> Harness {
        let temp_dir = tempfile::tempdir().unwrap();
        let output = temp_dir.path().join("output");
        let notifier = Arc::new(RecordingNotifier::new());
        let llm_requests = llm.requests.clone();

        let mut workflow = StoryWorkflow::new(
            test_config(&output),
            Box::new(llm),
            Box::new(image),
            Arc::new(NativeStorage::new()),
            notifier.clone(),
        );

        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        workflow
            .state_mut()
            .subscribe(Box::new(move |s| sink.lock().unwrap().push(s.clone())));

        Harness {
            workflow,
            notifier,
            states,
            llm_requests,
            _temp_dir: temp_dir,
            output,
        }
    }

    const SCENES_REPLY: &str = "1. The fox wakes.\n2. The fox hunts.\n3. The fox sleeps.";

    #[tokio::test]
    async fn test_fox_scenario_end_to_end() -> Result<()> {
        let story_text = "Once upon a time ".repeat(200);
        let llm = ScriptedLlm::new(vec![Ok(story_text.clone()), Ok(SCENES_REPLY.into())]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        let summary = h.workflow.generate(fox_request()).await?;
        assert_eq!(summary.scene_source, SceneSource::Parsed);
        assert_eq!(summary.scene_count, 3);
        assert_eq!(summary.illustrations, 3);

        {
            let requests = h.llm_requests.lock().unwrap();
            assert_eq!(requests.len(), 2);
            assert!(requests[0].prompt.contains("\"The Fox\""));
            let excerpt: String = story_text.chars().take(2000).collect();
            assert!(requests[1].prompt.ends_with(&excerpt));
            assert_eq!(requests[1].params.max_output_tokens, 512);
        }

        let path = h.workflow.export().await?;
        assert_eq!(path, h.output.join("The Fox.pdf"));
        let bytes = std::fs::read(&path)?;
        assert!(bytes.starts_with(b"%PDF"));

        let states = h.states.lock().unwrap();
        assert_eq!(states.first(), Some(&CycleState::RequestingNarrative));
        assert!(states.contains(&CycleState::ScenesReady { source: SceneSource::Parsed, count: 3 }));
        assert!(states.contains(&CycleState::RequestingIllustrations { done: 3, total: 3 }));
        assert!(states.contains(&CycleState::IllustrationsSettled { succeeded: 3, total: 3 }));
        assert_eq!(states.last(), Some(&CycleState::Downloaded { path: path.clone() }));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_scene_failure_yields_three_page_document() -> Result<()> {
        let llm = ScriptedLlm::new(vec![Ok("A story.".into()), Ok(SCENES_REPLY.into())]);
        let image = MockImageClient::new(png_bytes(8, 8), &[2]);
        let mut h = harness(llm, image);

        let summary = h.workflow.generate(fox_request()).await?;
        assert_eq!(summary.illustrations, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].scene_ordinal, 2);

        let ordinals: Vec<usize> = h.workflow.illustrations().iter().map(|i| i.scene_ordinal).collect();
        assert_eq!(ordinals, vec![1, 3]);
        assert!(h
            .notifier
            .messages(NoticeLevel::Error)
            .iter()
            .any(|m| m.starts_with("Failed to generate image 2")));

        let document = assemble_document(
            "The Fox",
            h.workflow.story().unwrap(),
            h.workflow.illustrations(),
            &h.workflow.config.document,
        )
        .await?;
        assert_eq!(document.page_count, 3);

        h.workflow.export().await?;
        assert!(h.output.join("The Fox.pdf").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_unnumbered_scene_reply_uses_fallback_scenes() -> Result<()> {
        let llm = ScriptedLlm::new(vec![Ok("A story.".into()), Ok("No list here.".into())]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        let summary = h.workflow.generate(fox_request()).await?;
        assert_eq!(summary.scene_source, SceneSource::Fallback);
        assert_eq!(summary.illustrations, 3);

        let captions: Vec<String> = h.workflow.illustrations().iter().map(|i| i.caption.clone()).collect();
        let expected: Vec<String> = fallback_scenes(&fox_request())
            .iter()
            .map(crate::services::illustration::caption_for)
            .collect();
        assert_eq!(captions, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_two_parsed_scenes_request_two_images() -> Result<()> {
        let llm = ScriptedLlm::new(vec![
            Ok("A story.".into()),
            Ok("1. The fox wakes.\n2. The fox sleeps.".into()),
        ]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        let summary = h.workflow.generate(fox_request()).await?;
        assert_eq!(summary.scene_source, SceneSource::Parsed);
        assert_eq!(summary.scene_count, 2);
        assert_eq!(summary.illustrations, 2);
        assert_eq!(h.workflow.illustrations().len(), 2);

        let states = h.states.lock().unwrap();
        assert!(states.contains(&CycleState::RequestingIllustrations { done: 2, total: 2 }));
        assert!(!states
            .iter()
            .any(|s| matches!(s, CycleState::RequestingIllustrations { total: 3, .. })));
        assert!(states.contains(&CycleState::IllustrationsSettled { succeeded: 2, total: 2 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_cycle_replaces_previous_results() -> Result<()> {
        let llm = ScriptedLlm::new(vec![
            Ok("First story.".into()),
            Ok(SCENES_REPLY.into()),
            Ok("Second story.".into()),
            Ok("1. Only one scene.".into()),
        ]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        h.workflow.generate(fox_request()).await?;
        assert_eq!(h.workflow.illustrations().len(), 3);

        h.workflow.generate(fox_request()).await?;
        assert_eq!(h.workflow.story().map(|s| s.text.as_str()), Some("Second story."));
        assert_eq!(h.workflow.illustrations().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_marathi_export_without_font_warns() -> Result<()> {
        let llm = ScriptedLlm::new(vec![Ok("A story.".into()), Ok(SCENES_REPLY.into())]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        let mut request = fox_request();
        request.language = Language::Marathi;
        h.workflow.generate(request).await?;
        h.workflow.export().await?;

        assert!(h
            .notifier
            .messages(NoticeLevel::Warning)
            .iter()
            .any(|m| m.starts_with("No font configured")));
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_failure_issues_no_calls() {
        let llm = ScriptedLlm::new(vec![]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        let request = StoryRequest::new("The Fox", "", "set in a forest", 300, Language::English);
        let result = h.workflow.generate(request).await;

        assert!(matches!(result, Err(StoryError::Validation { .. })));
        assert!(h.llm_requests.lock().unwrap().is_empty());
        assert!(h.states.lock().unwrap().is_empty());
        assert_eq!(h.notifier.messages(NoticeLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_narrative_failure_returns_to_idle_without_images() {
        let llm = ScriptedLlm::new(vec![Err("service unavailable".into())]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        let result = h.workflow.generate(fox_request()).await;
        assert!(matches!(result, Err(StoryError::NarrativeFailed(_))));
        assert!(h.workflow.story().is_none());
        assert_eq!(h.workflow.state().current(), &CycleState::Idle);

        let states = h.states.lock().unwrap();
        assert!(matches!(states[1], CycleState::NarrativeFailed { .. }));
        assert_eq!(h.llm_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_export_overwrites_the_same_file() -> Result<()> {
        let llm = ScriptedLlm::new(vec![Ok("A story.".into()), Ok(SCENES_REPLY.into())]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        h.workflow.generate(fox_request()).await?;
        let first = h.workflow.export().await?;
        let second = h.workflow.export().await?;

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(&h.output)?.count(), 1);
        let successes = h.notifier.messages(NoticeLevel::Success);
        assert_eq!(successes.last().map(String::as_str), Some("PDF downloaded successfully!"));
        Ok(())
    }

    #[tokio::test]
    async fn test_export_without_story_writes_nothing() {
        let llm = ScriptedLlm::new(vec![]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);

        let result = h.workflow.export().await;
        assert!(matches!(result, Err(StoryError::NothingToExport)));
        assert!(!h.output.exists());
        assert!(h.states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_reports_assembly_failure() -> Result<()> {
        let llm = ScriptedLlm::new(vec![Ok("A story.".into()), Ok(SCENES_REPLY.into())]);
        let image = MockImageClient::new(png_bytes(8, 8), &[]);
        let mut h = harness(llm, image);
        h.workflow.config.document.font_path = Some("/nonexistent/font.ttf".to_string());

        h.workflow.generate(fox_request()).await?;
        let result = h.workflow.export().await;

        assert!(matches!(result, Err(StoryError::AssemblyFailed(_))));
        assert!(!h.output.join("The Fox.pdf").exists());
        assert!(matches!(
            h.workflow.state().current(),
            CycleState::AssemblyFailed { .. }
        ));
        Ok(())
    }
}
