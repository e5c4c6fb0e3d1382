use crate::core::config::{resolve_secret, Config};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

// --- Config ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_image_provider")]
    pub provider: String, // "huggingface" or "openai"
    #[serde(default)]
    pub params: ImageParams,
    pub huggingface: Option<HuggingFaceConfig>,
    pub openai: Option<OpenAIImageConfig>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_image_provider(),
            params: ImageParams::default(),
            huggingface: None,
            openai: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ImageParams {
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_image_side")]
    pub width: u32,
    #[serde(default = "default_image_side")]
    pub height: u32,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            guidance_scale: default_guidance_scale(),
            num_inference_steps: default_inference_steps(),
            width: default_image_side(),
            height: default_image_side(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HuggingFaceConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_hf_model")]
    pub model: String,
    #[serde(default = "default_hf_base_url")]
    pub base_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenAIImageConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_image_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_image_provider() -> String {
    "huggingface".to_string()
}
fn default_guidance_scale() -> f32 {
    7.5
}
fn default_inference_steps() -> u32 {
    30
}
fn default_image_side() -> u32 {
    512
}
fn default_hf_model() -> String {
    "stabilityai/stable-diffusion-xl-base-1.0".to_string()
}
fn default_hf_base_url() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}
fn default_openai_image_model() -> String {
    "dall-e-2".to_string()
}

// --- Client ---

#[async_trait]
pub trait ImageClient: Send + Sync + Debug {
    /// Returns encoded image bytes (PNG/JPEG) for `prompt`.
    async fn generate(&self, prompt: &str, params: &ImageParams) -> Result<Vec<u8>>;
}

pub fn create_image_client(config: &Config) -> Result<Box<dyn ImageClient>> {
    match config.image.provider.as_str() {
        "huggingface" => {
            let cfg = config
                .image
                .huggingface
                .clone()
                .unwrap_or_else(|| HuggingFaceConfig {
                    api_token: String::new(),
                    model: default_hf_model(),
                    base_url: default_hf_base_url(),
                });
            let token = resolve_secret(&cfg.api_token, "HF_API_TOKEN")?;
            Ok(Box::new(HuggingFaceClient::new(&token, &cfg.model, &cfg.base_url)))
        }
        "openai" => {
            let cfg = config
                .image
                .openai
                .as_ref()
                .context("OpenAI image config missing")?;
            let api_key = resolve_secret(&cfg.api_key, "OPENAI_API_KEY")?;
            Ok(Box::new(OpenAIImageClient::new(
                &api_key,
                &cfg.model,
                cfg.base_url.as_deref(),
            )))
        }
        _ => Err(anyhow!("Unknown image provider: {}", config.image.provider)),
    }
}

// --- Hugging Face Inference API ---

#[derive(Debug)]
struct HuggingFaceClient {
    api_token: String,
    url: String,
    client: reqwest::Client,
}

impl HuggingFaceClient {
    fn new(api_token: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_token: api_token.to_string(),
            url: format!("{}/{}", base_url.trim_end_matches('/'), model),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct HuggingFaceRequest<'a> {
    inputs: &'a str,
    parameters: &'a ImageParams,
}

#[async_trait]
impl ImageClient for HuggingFaceClient {
    async fn generate(&self, prompt: &str, params: &ImageParams) -> Result<Vec<u8>> {
        debug!("Hugging Face image request to {}", self.url);
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&HuggingFaceRequest { inputs: prompt, parameters: params })
            .send()
            .await
            .context("Failed to send image request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("Hugging Face error body: {}", body);
            return Err(anyhow!("HTTP error! status: {}", status.as_u16()));
        }

        let bytes = resp.bytes().await.context("Failed to read image bytes")?;
        debug!("Received image ({} bytes)", bytes.len());
        Ok(bytes.to_vec())
    }
}

// --- OpenAI Images API ---

#[derive(Debug)]
struct OpenAIImageClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIImageClient {
    fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

// Guidance scale and step count have no OpenAI equivalent.
#[derive(Serialize)]
struct OpenAIImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: String,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct OpenAIImageResponse {
    #[serde(default)]
    data: Vec<OpenAIImageData>,
}

#[derive(Deserialize)]
struct OpenAIImageData {
    b64_json: Option<String>,
}

impl OpenAIImageResponse {
    fn decode_first(self) -> Result<Vec<u8>> {
        let encoded = self
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| anyhow!("OpenAI image response contained no image data"))?;
        STANDARD
            .decode(encoded.trim())
            .context("Failed to decode base64 image payload")
    }
}

#[async_trait]
impl ImageClient for OpenAIImageClient {
    async fn generate(&self, prompt: &str, params: &ImageParams) -> Result<Vec<u8>> {
        let url = format!("{}/images/generations", self.base_url);
        let request_body = OpenAIImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: format!("{}x{}", params.width, params.height),
            response_format: "b64_json",
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send image request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("OpenAI image error body: {}", body);
            return Err(anyhow!("HTTP error! status: {}", status.as_u16()));
        }

        let result: OpenAIImageResponse = resp.json().await?;
        result.decode_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huggingface_request_shape() {
        let params = ImageParams::default();
        let body = serde_json::to_value(HuggingFaceRequest {
            inputs: "a fox",
            parameters: &params,
        })
        .unwrap();

        assert_eq!(body["inputs"], "a fox");
        assert_eq!(body["parameters"]["guidance_scale"], 7.5);
        assert_eq!(body["parameters"]["num_inference_steps"], 30);
        assert_eq!(body["parameters"]["width"], 512);
        assert_eq!(body["parameters"]["height"], 512);
    }

    #[test]
    fn test_huggingface_url_joins_model() {
        let client = HuggingFaceClient::new("t", "org/model", "https://example.test/models/");
        assert_eq!(client.url, "https://example.test/models/org/model");
    }

    #[test]
    fn test_openai_image_response_decodes_b64() {
        let json = r#"{ "created": 1, "data": [ { "b64_json": "iVBORw0=" } ] }"#;
        let result: OpenAIImageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(result.decode_first().unwrap(), STANDARD.decode("iVBORw0=").unwrap());

        let empty: OpenAIImageResponse = serde_json::from_str(r#"{ "data": [] }"#).unwrap();
        assert!(empty.decode_first().is_err());
    }

    #[test]
    fn test_openai_provider_requires_config() {
        let config = Config::parse("llm:\n  provider: gemini\nimage:\n  provider: openai\n").unwrap();
        let err = create_image_client(&config).unwrap_err();
        assert!(err.to_string().contains("OpenAI image config missing"));
    }
}
