use crate::core::state::Notifier;
use crate::core::story::{Illustration, Scene};
use crate::services::image::{ImageClient, ImageParams};
use crate::services::scenes::SCENE_COUNT;
use crate::utils::text::{strip_ordinal, strip_scene_label};
use futures_util::StreamExt;
use log::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub struct SceneFailure {
    pub scene_ordinal: usize,
    pub message: String,
}

pub type SceneOutcome = Result<Illustration, SceneFailure>;

/// Every scene's outcome, in scene order.
#[derive(Debug, Clone, Default)]
pub struct IllustrationBatch {
    pub outcomes: Vec<SceneOutcome>,
}

impl IllustrationBatch {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SceneFailure> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn into_illustrations(self) -> Vec<Illustration> {
        self.outcomes.into_iter().filter_map(Result::ok).collect()
    }
}

pub fn illustration_prompt(scene: &Scene) -> String {
    format!(
        "Detailed illustration for a children's storybook: {}. Digital art style, vibrant colors, clear details.",
        strip_ordinal(&scene.description)
    )
}

pub fn caption_for(scene: &Scene) -> String {
    strip_scene_label(&scene.description).to_string()
}

/// Requests one image per scene (at most [`SCENE_COUNT`]), strictly one after
/// another. A failed scene is reported and skipped; nothing is retried and
/// later scenes still run. `on_progress(done, total)` fires after each scene.
pub async fn request_illustrations<F>(
    client: &dyn ImageClient,
    scenes: &[Scene],
    params: &ImageParams,
    notifier: &dyn Notifier,
    mut on_progress: F,
) -> IllustrationBatch
where
    F: FnMut(usize, usize),
{
    let total = scenes.len().min(SCENE_COUNT);
    notifier.info(&format!("Generating {} images for your story...", total));

    let mut done = 0;
    let mut succeeded = 0;
    let outcomes: Vec<SceneOutcome> = futures_util::stream::iter(scenes.iter().take(total))
        .then(|scene| async move {
            let prompt = illustration_prompt(scene);
            match client.generate(&prompt, params).await {
                Ok(image) => Ok(Illustration {
                    scene_ordinal: scene.ordinal,
                    image,
                    caption: caption_for(scene),
                }),
                Err(e) => Err(SceneFailure {
                    scene_ordinal: scene.ordinal,
                    message: format!("{:#}", e),
                }),
            }
        })
        .inspect(|outcome| {
            done += 1;
            match outcome {
                Ok(_) => {
                    succeeded += 1;
                    notifier.success(&format!("Image {} generated!", succeeded));
                }
                Err(failure) => {
                    error!("Error generating image for scene {}: {}", failure.scene_ordinal, failure.message);
                    notifier.error(&format!(
                        "Failed to generate image {}: {}",
                        done, failure.message
                    ));
                }
            }
            on_progress(done, total);
        })
        .collect()
        .await;

    let batch = IllustrationBatch { outcomes };
    info!("Illustrations settled: {}/{} succeeded", batch.succeeded(), batch.attempted());
    if batch.succeeded() > 0 {
        notifier.success(&format!("Generated {} images for your story!", batch.succeeded()));
    } else {
        notifier.error("Could not generate any images. Please try again later.");
    }
    batch
}
