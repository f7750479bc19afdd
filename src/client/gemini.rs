//! Gemini (Google) try-on client.

use crate::client::generator::TryOnGenerator;
use crate::error::{
    parse_retry_after, sanitize_error_message, Result, TryOnError, INVALID_KEY_MESSAGE,
    NO_IMAGE_MESSAGE,
};
use crate::gate::{env_api_key, KeyStore};
use crate::image::{to_data_uri, AspectRatio, EncodedImage, ImageSize, ImageSlot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// MIME type assumed when the response omits one.
const DEFAULT_OUTPUT_MIME: &str = "image/png";

const MISSING_KEY_MESSAGE: &str = "No API key selected. Connect to choose a key and try again.";

/// Instruction sent after both images.
pub const TRY_ON_INSTRUCTION: &str = "\
Dress the person from the subject image in the saree from the garment image. \
Keep the person's face, identity, skin tone, hair, pose and body shape exactly as they are. \
Transfer the saree's pattern, colors, border and fabric texture faithfully, \
with a realistic drape including the pleats and the pallu over the shoulder. \
Blend the garment naturally where it meets the body, with no visible seams or artifacts. \
Match the lighting, shadows and color temperature of the original photo. \
Return a single photorealistic image.";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    #[default]
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "gemini-3-pro-image-preview",
        }
    }
}

/// Where the client finds its key at request time.
#[derive(Debug, Clone)]
enum KeySource {
    Fixed(String),
    Store {
        store: KeyStore,
        fallback: Option<String>,
    },
}

impl KeySource {
    fn resolve(&self) -> Option<String> {
        match self {
            Self::Fixed(key) => Some(key.clone()),
            Self::Store { store, fallback } => store.get().or_else(|| fallback.clone()),
        }
    }
}

/// Builder for [`GeminiTryOnClient`].
#[derive(Debug, Clone, Default)]
pub struct GeminiTryOnClientBuilder {
    api_key: Option<String>,
    key_store: Option<KeyStore>,
    model: GeminiModel,
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
    base_url: Option<String>,
}

impl GeminiTryOnClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to the key store, then `GEMINI_API_KEY`
    /// and `API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Reads the key from `store` on every request.
    pub fn key_store(mut self, store: KeyStore) -> Self {
        self.key_store = Some(store);
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Sets the output aspect ratio.
    pub fn aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Sets the output resolution.
    pub fn image_size(mut self, size: ImageSize) -> Self {
        self.image_size = size;
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the client, resolving the key source.
    pub fn build(self) -> Result<GeminiTryOnClient> {
        let key_source = match (self.api_key, self.key_store) {
            (Some(key), _) => KeySource::Fixed(key),
            (None, Some(store)) => KeySource::Store {
                store,
                fallback: env_api_key(),
            },
            (None, None) => env_api_key().map(KeySource::Fixed).ok_or_else(|| {
                TryOnError::Auth("GEMINI_API_KEY not set and no API key provided".into())
            })?,
        };

        Ok(GeminiTryOnClient {
            client: reqwest::Client::new(),
            key_source,
            model: self.model,
            aspect_ratio: self.aspect_ratio,
            image_size: self.image_size,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Try-on client backed by Gemini image generation.
pub struct GeminiTryOnClient {
    client: reqwest::Client,
    key_source: KeySource,
    model: GeminiModel,
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
    base_url: String,
}

impl GeminiTryOnClient {
    /// Creates a new `GeminiTryOnClientBuilder`.
    pub fn builder() -> GeminiTryOnClientBuilder {
        GeminiTryOnClientBuilder::new()
    }

    /// Model this client calls.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    fn api_key(&self) -> Result<String> {
        self.key_source
            .resolve()
            .ok_or_else(|| TryOnError::Auth(MISSING_KEY_MESSAGE.into()))
    }

    async fn generate_impl(&self, subject: &EncodedImage, garment: &EncodedImage) -> Result<String> {
        let start = Instant::now();
        let api_key = self.api_key()?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            self.model.as_str(),
        );
        let body = GeminiRequest::try_on(subject, garment, self.aspect_ratio, self.image_size);

        tracing::debug!(
            model = self.model.as_str(),
            aspect_ratio = %self.aspect_ratio,
            image_size = %self.image_size,
            "submitting try-on request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let uri = extract_image(gemini_response)?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "try-on image received"
        );
        Ok(uri)
    }
}

#[async_trait]
impl TryOnGenerator for GeminiTryOnClient {
    async fn generate(&self, subject: &EncodedImage, garment: &EncodedImage) -> Result<String> {
        self.generate_impl(subject, garment).await
    }

    fn name(&self) -> &str {
        self.model.as_str()
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model.as_str());
        let api_key = self.api_key()?;

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &api_key)
            .send()
            .await?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        Err(parse_error(status, &text, &headers))
    }
}

/// Maps a non-success response onto an error, remapping key problems.
fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> TryOnError {
    let message = serde_json::from_str::<GeminiErrorBody>(text)
        .map(|body| body.error.message)
        .unwrap_or_else(|_| text.to_string());
    let message = sanitize_error_message(&message);

    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return TryOnError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 || message.to_lowercase().contains("api key") {
        return TryOnError::Auth(INVALID_KEY_MESSAGE.into());
    }
    let lower = message.to_lowercase();
    if lower.contains("safety") || lower.contains("prohibited") {
        return TryOnError::ContentBlocked(message);
    }
    TryOnError::Api { status, message }
}

/// Returns the first inline image of the first candidate as a data URI.
fn extract_image(response: GeminiResponse) -> Result<String> {
    // Prompt blocks come back as HTTP 200
    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            let msg = feedback
                .block_reason_message
                .unwrap_or_else(|| format!("Prompt blocked: {reason}"));
            return Err(TryOnError::ContentBlocked(msg));
        }
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| TryOnError::Generation(NO_IMAGE_MESSAGE.into()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(
            reason,
            "SAFETY" | "IMAGE_SAFETY" | "IMAGE_PROHIBITED_CONTENT" | "PROHIBITED_CONTENT" | "BLOCKLIST"
        ) {
            return Err(TryOnError::ContentBlocked(format!(
                "Content blocked by Gemini safety filter: {reason}"
            )));
        }
    }

    candidate
        .content
        .into_iter()
        .flat_map(|content| content.parts)
        .find_map(|part| part.inline_data)
        .map(|inline| {
            let mime = inline
                .mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_OUTPUT_MIME.to_string());
            to_data_uri(&mime, &inline.data)
        })
        .ok_or_else(|| TryOnError::Generation(NO_IMAGE_MESSAGE.into()))
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
    image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
}

impl GeminiRequest {
    fn try_on(
        subject: &EncodedImage,
        garment: &EncodedImage,
        aspect_ratio: AspectRatio,
        image_size: ImageSize,
    ) -> Self {
        let mut parts = Vec::with_capacity(5);
        for (image, slot) in [(subject, ImageSlot::Human), (garment, ImageSlot::Garment)] {
            parts.push(GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: image.mime_type().to_string(),
                    data: image.payload().to_string(),
                },
            });
            parts.push(GeminiRequestPart::Text {
                text: slot.label().to_string(),
            });
        }
        parts.push(GeminiRequestPart::Text {
            text: TRY_ON_INSTRUCTION.to_string(),
        });

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
                image_config: ImageConfig {
                    aspect_ratio,
                    image_size,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::CannedServer;

    fn subject() -> EncodedImage {
        EncodedImage::from_bytes(b"person-bytes", "image/jpeg")
    }

    fn garment() -> EncodedImage {
        EncodedImage::from_bytes(b"saree-bytes", "image/png")
    }

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_gemini_model_as_str() {
        assert_eq!(GeminiModel::NanoBanana.as_str(), "gemini-2.5-flash-image");
        assert_eq!(GeminiModel::default().as_str(), "gemini-3-pro-image-preview");
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let client = GeminiTryOnClientBuilder::new()
            .api_key("test-key")
            .model(GeminiModel::NanoBanana)
            .base_url("http://localhost:9999/")
            .build()
            .unwrap();
        assert_eq!(client.base_url, "http://localhost:9999");
        assert_eq!(client.api_key().unwrap(), "test-key");
    }

    #[test]
    fn test_builder_with_key_store_resolves_late() {
        let store = KeyStore::new();
        let client = GeminiTryOnClient {
            key_source: KeySource::Store {
                store: store.clone(),
                fallback: None,
            },
            ..GeminiTryOnClient::builder().api_key("unused").build().unwrap()
        };

        let err = client.api_key().unwrap_err();
        assert!(err.is_auth_failure());

        store.set("picked-later");
        assert_eq!(client.api_key().unwrap(), "picked-later");
    }

    #[test]
    fn test_request_part_order() {
        let req = GeminiRequest::try_on(
            &subject(),
            &garment(),
            AspectRatio::Portrait3x4,
            ImageSize::TwoK,
        );
        let json = serde_json::to_value(&req).unwrap();
        let parts = json["contents"][0]["parts"].as_array().unwrap();

        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], subject().payload());
        assert_eq!(parts[1]["text"], ImageSlot::Human.label());
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[2]["inlineData"]["data"], garment().payload());
        assert_eq!(parts[3]["text"], ImageSlot::Garment.label());
        assert_eq!(parts[4]["text"], TRY_ON_INSTRUCTION);
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let req = GeminiRequest::try_on(&subject(), &garment(), AspectRatio::Wide, ImageSize::FourK);
        let json = serde_json::to_value(&req).unwrap();

        let config = &json["generationConfig"];
        assert_eq!(config["responseModalities"], serde_json::json!(["IMAGE"]));
        assert_eq!(config["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(config["imageConfig"]["imageSize"], "4K");
        assert!(json.get("generation_config").is_none());
    }

    #[test]
    fn test_extract_first_inline_image() {
        let resp = parse(
            r#"{
                "candidates": [{
                    "content": {
                        "parts": [
                            {"text": "Here is the result"},
                            {"inlineData": {"mimeType": "image/jpeg", "data": "Zmlyc3Q="}},
                            {"inlineData": {"mimeType": "image/png", "data": "c2Vjb25k"}}
                        ]
                    },
                    "finishReason": "STOP"
                }]
            }"#,
        );
        assert_eq!(extract_image(resp).unwrap(), "data:image/jpeg;base64,Zmlyc3Q=");
    }

    #[test]
    fn test_extract_defaults_mime_type() {
        let resp = parse(
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"data": "AAAA"}}]}}]}"#,
        );
        assert_eq!(extract_image(resp).unwrap(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_extract_no_image_part() {
        let resp = parse(r#"{"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]}"#);
        let err = extract_image(resp).unwrap_err();
        assert!(matches!(err, TryOnError::Generation(_)));
        assert_eq!(err.to_string(), "No image generated in the response.");
    }

    #[test]
    fn test_extract_no_candidates() {
        let err = extract_image(parse(r#"{"candidates": []}"#)).unwrap_err();
        assert_eq!(err.to_string(), NO_IMAGE_MESSAGE);

        let err = extract_image(parse("{}")).unwrap_err();
        assert_eq!(err.to_string(), NO_IMAGE_MESSAGE);
    }

    #[test]
    fn test_extract_prompt_block() {
        let resp = parse(
            r#"{
                "candidates": [],
                "promptFeedback": {
                    "blockReason": "SAFETY",
                    "blockReasonMessage": "Prompt was blocked due to safety"
                }
            }"#,
        );
        let err = extract_image(resp).unwrap_err();
        assert!(matches!(err, TryOnError::ContentBlocked(ref m) if m == "Prompt was blocked due to safety"));
    }

    #[test]
    fn test_extract_safety_finish_reason() {
        let resp = parse(r#"{"candidates": [{"finishReason": "IMAGE_SAFETY"}]}"#);
        assert!(matches!(
            extract_image(resp).unwrap_err(),
            TryOnError::ContentBlocked(_)
        ));
    }

    #[test]
    fn test_parse_error_remaps_key_problems() {
        let headers = reqwest::header::HeaderMap::new();
        let body = r#"{"error": {"code": 400, "message": "API Key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#;

        let err = parse_error(400, body, &headers);
        assert!(matches!(err, TryOnError::Auth(ref m) if m == INVALID_KEY_MESSAGE));
        assert!(err.is_auth_failure());

        let err = parse_error(403, "forbidden", &headers);
        assert!(matches!(err, TryOnError::Auth(_)));
    }

    #[test]
    fn test_parse_error_keeps_entity_not_found_text() {
        let headers = reqwest::header::HeaderMap::new();
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;

        let err = parse_error(404, body, &headers);
        assert!(matches!(err, TryOnError::Api { status: 404, .. }));
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_parse_error_rate_limit() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());

        let err = parse_error(429, "slow down", &headers);
        assert!(matches!(
            err,
            TryOnError::RateLimited { retry_after: Some(d) } if d.as_secs() == 12
        ));
    }

    #[test]
    fn test_parse_error_plain_text() {
        let headers = reqwest::header::HeaderMap::new();
        let err = parse_error(500, "upstream exploded", &headers);
        assert_eq!(err.to_string(), "API error: 500 - upstream exploded");
    }

    fn store_client(base_url: &str, store: &KeyStore) -> GeminiTryOnClient {
        GeminiTryOnClient::builder()
            .key_store(store.clone())
            .base_url(base_url)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_posts_to_model_endpoint_with_selected_key() {
        let server = CannedServer::respond(
            200,
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "cmVzdWx0"}}]}}]}"#,
        )
        .await;
        let store = KeyStore::new();
        let client = store_client(&server.base_url, &store);
        store.set("picked-later");

        let uri = client.generate(&subject(), &garment()).await.unwrap();
        assert_eq!(uri, "data:image/png;base64,cmVzdWx0");

        let request = server.request().await;
        assert!(request
            .starts_with("POST /v1beta/models/gemini-3-pro-image-preview:generateContent HTTP/1.1"));
        assert!(request
            .to_lowercase()
            .contains("x-goog-api-key: picked-later"));
        assert!(request.contains(r#""responseModalities":["IMAGE"]"#));
    }

    #[tokio::test]
    async fn test_generate_maps_rejected_key_response() {
        let server = CannedServer::respond(
            400,
            r#"{"error": {"code": 400, "message": "API Key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#,
        )
        .await;
        let store = KeyStore::new();
        store.set("stale-key");
        let client = store_client(&server.base_url, &store);

        let err = client.generate(&subject(), &garment()).await.unwrap_err();
        assert!(matches!(err, TryOnError::Auth(ref m) if m == INVALID_KEY_MESSAGE));
        server.request().await;
    }

    #[tokio::test]
    async fn test_generate_surfaces_missing_image() {
        let server = CannedServer::respond(
            200,
            r#"{"candidates": [{"content": {"parts": [{"text": "no can do"}]}}]}"#,
        )
        .await;
        let client = GeminiTryOnClient::builder()
            .api_key("test-key")
            .base_url(&server.base_url)
            .build()
            .unwrap();

        let err = client.generate(&subject(), &garment()).await.unwrap_err();
        assert_eq!(err.to_string(), NO_IMAGE_MESSAGE);
        server.request().await;
    }

    #[tokio::test]
    async fn test_health_check_gets_model() {
        let server = CannedServer::respond(200, r#"{"name": "models/gemini-2.5-flash-image"}"#).await;
        let client = GeminiTryOnClient::builder()
            .api_key("test-key")
            .model(GeminiModel::NanoBanana)
            .base_url(&server.base_url)
            .build()
            .unwrap();

        client.health_check().await.unwrap();
        let request = server.request().await;
        assert!(request.starts_with("GET /v1beta/models/gemini-2.5-flash-image HTTP/1.1"));
    }
}
