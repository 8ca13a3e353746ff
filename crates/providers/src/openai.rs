//! OpenAI-compatible API client.
//!
//! Works with OpenAI and any endpoint exposing the same `/v1` surface.
//! Chat completions implement the `deva_core::Provider` trait; the
//! passthrough operations (images, speech, files, fine-tunes, models) are
//! inherent methods — each a single remote call with no branching logic.

use async_trait::async_trait;
use deva_config::DevaConfig;
use deva_core::error::ProviderError;
use deva_core::message::{Message, Role, ToolCallRequest, Usage};
use deva_core::provider::{Completion, CompletionRequest, Provider, ToolSchema};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible API client.
#[derive(Debug)]
pub struct OpenAiClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new client against the given endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create a client for the active provider in the given config.
    pub fn from_config(config: &DevaConfig) -> Result<Self, ProviderError> {
        let provider = config.active_provider();
        let api_key = provider
            .api_key
            .clone()
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "no api_key for provider '{}'",
                    config.provider
                ))
            })?;
        Self::new(
            config.provider.clone(),
            provider.api_url.clone(),
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Map a transport-level error to the provider taxonomy.
    fn transport_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    /// Map an unsuccessful HTTP status to the provider taxonomy.
    async fn status_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return ProviderError::RateLimited { retry_after_secs };
        }

        if status == 401 || status == 403 {
            return ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            );
        }

        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        ProviderError::ApiError {
            status_code: status,
            message: error_body,
        }
    }

    /// POST a JSON body and parse the JSON reply.
    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .auth(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    /// GET a path and parse the JSON reply.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    fn to_api_tools(tools: &[ToolSchema]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                name: m.name.clone(),
                tool_call_id: m.tool_call_id.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "top_p": request.top_p,
            "frequency_penalty": request.frequency_penalty,
            "presence_penalty": request.presence_penalty,
            "n": request.n,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        // Parse into a Value first: the raw payload rides along on the
        // Completion for the downstream memory event.
        let raw: serde_json::Value = self.post_json("/chat/completions", &body).await?;
        let api_response: ApiResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let message = Message {
            role: Role::Assistant,
            content: choice.message.content.unwrap_or_default(),
            name: None,
            tool_call_id: None,
            tool_calls,
        };

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(Completion {
            id: api_response.id,
            model: api_response.model,
            created: api_response.created,
            message,
            usage,
            raw,
        })
    }
}

// --- Passthrough operations ---

impl OpenAiClient {
    /// Generate images from a text prompt. Returns base64 PNG payloads.
    pub async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        n: u32,
        size: &str,
    ) -> Result<Vec<GeneratedImage>, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "n": n,
            "size": size,
            "response_format": "b64_json",
        });

        debug!(provider = %self.name, model, size, "Sending image generation request");

        let response: ListResponse<GeneratedImage> =
            self.post_json("/images/generations", &body).await?;
        Ok(response.data)
    }

    /// Synthesize speech audio (MP3 bytes) from input text.
    pub async fn synthesize_speech(
        &self,
        model: &str,
        voice: &str,
        input: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "voice": voice,
            "input": input,
        });

        debug!(provider = %self.name, model, voice, "Sending speech request");

        let response = self
            .auth(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Upload a file for later fine-tuning or retrieval.
    pub async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        purpose: &str,
    ) -> Result<FileObject, ProviderError> {
        let url = format!("{}/files", self.base_url);

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.to_string())
            .part("file", part);

        debug!(provider = %self.name, filename, purpose, "Uploading file");

        let response = self
            .auth(self.client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    /// List uploaded files.
    pub async fn list_files(&self) -> Result<Vec<FileObject>, ProviderError> {
        let response: ListResponse<FileObject> = self.get_json("/files").await?;
        Ok(response.data)
    }

    /// Get a single uploaded file's metadata.
    pub async fn get_file(&self, id: &str) -> Result<FileObject, ProviderError> {
        self.get_json(&format!("/files/{id}")).await
    }

    /// Delete an uploaded file.
    pub async fn delete_file(&self, id: &str) -> Result<DeletedFile, ProviderError> {
        let url = format!("{}/files/{id}", self.base_url);
        let response = self
            .auth(self.client.delete(&url))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    /// Create a fine-tune job from an uploaded training file.
    pub async fn create_fine_tune(
        &self,
        training_file: &str,
        model: &str,
    ) -> Result<FineTuneJob, ProviderError> {
        let body = serde_json::json!({
            "training_file": training_file,
            "model": model,
        });
        self.post_json("/fine_tuning/jobs", &body).await
    }

    /// List fine-tune jobs.
    pub async fn list_fine_tunes(&self) -> Result<Vec<FineTuneJob>, ProviderError> {
        let response: ListResponse<FineTuneJob> = self.get_json("/fine_tuning/jobs").await?;
        Ok(response.data)
    }

    /// Get a single fine-tune job.
    pub async fn get_fine_tune(&self, id: &str) -> Result<FineTuneJob, ProviderError> {
        self.get_json(&format!("/fine_tuning/jobs/{id}")).await
    }

    /// Cancel a running fine-tune job.
    pub async fn cancel_fine_tune(&self, id: &str) -> Result<FineTuneJob, ProviderError> {
        let body = serde_json::json!({});
        self.post_json(&format!("/fine_tuning/jobs/{id}/cancel"), &body)
            .await
    }

    /// List available models.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response: ListResponse<ModelInfo> = self.get_json("/models").await?;
        Ok(response.data)
    }

    /// Get a single model's details.
    pub async fn get_model(&self, id: &str) -> Result<ModelInfo, ProviderError> {
        self.get_json(&format!("/models/{id}")).await
    }
}

// --- Passthrough payload types ---

/// One generated image from `/images/generations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Base64-encoded PNG
    pub b64_json: String,

    /// The prompt as rewritten by the model, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

/// An uploaded file's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
    pub purpose: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub created_at: i64,
}

/// Acknowledgement of a file deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedFile {
    pub id: String,
    pub deleted: bool,
}

/// A fine-tune job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTuneJob {
    pub id: String,
    pub model: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_tuned_model: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

/// A model listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

// --- OpenAI API wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    #[serde(default)]
    created: i64,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// The `{"data": [...]}` wrapper the list endpoints share.
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> OpenAiClient {
        OpenAiClient::new(
            "openai",
            "https://api.openai.com/v1/",
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = test_client();
        assert_eq!(client.base_url, "https://api.openai.com/v1");
        assert_eq!(client.name(), "openai");
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = DevaConfig::default();
        let err = OpenAiClient::from_config(&config).unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiClient::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let mut msg = Message::assistant("");
        msg.tool_calls = vec![ToolCallRequest {
            id: "call_1".into(),
            name: "search_memory".into(),
            arguments: r#"{"text":"rust"}"#.into(),
        }];
        let api_msgs = OpenAiClient::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "search_memory");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_result() {
        let msg = Message::tool_result("call_1", "search_memory", "result data");
        let api_msgs = OpenAiClient::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api_msgs[0].name.as_deref(), Some("search_memory"));
    }

    #[test]
    fn tool_schema_conversion() {
        let tools = vec![ToolSchema {
            name: "search_laws".into(),
            description: "Search legal texts".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiClient::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "search_laws");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{
            "id": "chatcmpl-123",
            "model": "gpt-4o",
            "created": 1700000000,
            "choices": [
                {"message": {"role": "assistant", "content": "Hello there"}}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.id, "chatcmpl-123");
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Hello there")
        );
        assert_eq!(parsed.usage.unwrap().total_tokens, 16);
    }

    #[test]
    fn parse_tool_call_response() {
        let data = r#"{
            "id": "chatcmpl-456",
            "model": "gpt-4o",
            "created": 1700000001,
            "choices": [
                {"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "search_memory", "arguments": "{\"text\":\"laws\"}"}}
                    ]
                }}
            ],
            "usage": null
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let tc = parsed.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].id, "call_a");
        assert_eq!(tc[0].function.name, "search_memory");
    }

    #[test]
    fn parse_image_response() {
        let data = r#"{
            "data": [
                {"b64_json": "aGVsbG8=", "revised_prompt": "a red fox, digital art"}
            ]
        }"#;
        let parsed: ListResponse<GeneratedImage> = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].b64_json, "aGVsbG8=");
        assert_eq!(
            parsed.data[0].revised_prompt.as_deref(),
            Some("a red fox, digital art")
        );
    }

    #[test]
    fn parse_file_listing() {
        let data = r#"{
            "data": [
                {"id": "file-1", "filename": "train.jsonl", "purpose": "fine-tune",
                 "bytes": 2048, "created_at": 1700000000}
            ]
        }"#;
        let parsed: ListResponse<FileObject> = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data[0].id, "file-1");
        assert_eq!(parsed.data[0].bytes, 2048);
    }

    #[test]
    fn parse_fine_tune_job() {
        let data = r#"{
            "id": "ftjob-1", "model": "gpt-4o-mini", "status": "running",
            "training_file": "file-1", "created_at": 1700000000
        }"#;
        let parsed: FineTuneJob = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.status, "running");
        assert!(parsed.fine_tuned_model.is_none());
    }

    #[test]
    fn parse_model_listing() {
        let data = r#"{
            "data": [
                {"id": "gpt-4o", "owned_by": "openai", "created": 1687882411},
                {"id": "tts-1", "owned_by": "openai-internal"}
            ]
        }"#;
        let parsed: ListResponse<ModelInfo> = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].id, "gpt-4o");
        assert_eq!(parsed.data[1].created, 0);
    }
}
