use anyhow::Result;
use std::sync::Arc;
use storybook::core::config::{Config, CONFIG_FILE};
use storybook::core::io::NativeStorage;
use storybook::core::state::ConsoleNotifier;
use storybook::services::image::create_image_client;
use storybook::services::llm::create_llm;
use storybook::services::setup;
use storybook::services::workflow::StoryWorkflow;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please ensure '{}' exists with valid LLM settings.", CONFIG_FILE);
            return Err(e);
        }
    };

    config.ensure_directories()?;

    let llm = create_llm(&config)?;
    let image = create_image_client(&config)?;
    let request = setup::collect_story_request(&config)?;

    let mut workflow = StoryWorkflow::new(
        config.clone(),
        llm,
        image,
        Arc::new(NativeStorage::new()),
        Arc::new(ConsoleNotifier),
    );
    workflow.state_mut().subscribe(setup::progress_subscriber()?);

    let summary = workflow.generate(request).await?;
    log::info!(
        "Cycle finished: {} scenes ({}), {} illustrations, {} failed",
        summary.scene_count,
        summary.scene_source,
        summary.illustrations,
        summary.failures.len()
    );

    if let Some(story) = workflow.story() {
        println!("\n{}\n", story.text);
    }

    if config.unattended || setup::confirm_export()? {
        let path = workflow.export().await?;
        println!("Saved to {}", path.display());
    }

    Ok(())
}
