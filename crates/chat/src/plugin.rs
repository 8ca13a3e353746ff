//! The plugin facade — the surface the hosting framework calls.
//!
//! `ChatDeva` wires the chat session, the vendor client, the tool
//! registry, and the collaborator together. Chat-shaped methods run the
//! core flow and round-trip the rendered block through the "feecting"
//! formatting service; passthrough methods are one vendor call plus
//! rendering.

use crate::media::MediaStore;
use crate::render;
use crate::session::{ChatOutcome, ChatRequest, ChatSession};
use deva_config::{DevaConfig, ImageConfig, SpeechConfig};
use deva_core::collaborator::{Answer, Collaborator};
use deva_core::error::{Error, Result};
use deva_core::event::EventBus;
use deva_core::provider::Provider;
use deva_core::tool::ToolRegistry;
use deva_providers::OpenAiClient;
use std::sync::Arc;
use tracing::info;

/// What every plugin method returns: display text, optional HTML from the
/// formatting service, and the raw payload.
#[derive(Debug, Clone)]
pub struct PluginReply {
    pub text: String,
    pub html: Option<String>,
    pub data: serde_json::Value,
}

impl PluginReply {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: None,
            data: serde_json::Value::Null,
        }
    }
}

/// The Deva chat plugin.
pub struct ChatDeva {
    session: ChatSession,
    vendor: Arc<OpenAiClient>,
    collaborator: Arc<dyn Collaborator>,
    events: Arc<EventBus>,
    media: MediaStore,
    agent_key: String,
    provider_name: String,
    image: ImageConfig,
    speech: SpeechConfig,
    notext: String,
}

impl ChatDeva {
    /// Assemble a plugin from explicit parts. Tests swap in a mock
    /// provider; production wiring goes through [`ChatDeva::from_config`].
    pub fn new(
        config: &DevaConfig,
        provider: Arc<dyn Provider>,
        vendor: Arc<OpenAiClient>,
        tools: Arc<ToolRegistry>,
        collaborator: Arc<dyn Collaborator>,
        events: Arc<EventBus>,
        agent_key: impl Into<String>,
    ) -> Result<Self> {
        let session = ChatSession::new(provider, tools, events.clone(), config)?;
        Ok(Self {
            session,
            vendor,
            collaborator,
            events,
            media: MediaStore::new(config.assets.dir.clone()),
            agent_key: agent_key.into(),
            provider_name: config.provider.clone(),
            image: config.image.clone(),
            speech: config.speech.clone(),
            notext: config.messages.notext.clone(),
        })
    }

    /// Build the plugin from config: vendor client, default tool registry,
    /// fresh event bus.
    pub fn from_config(
        config: &DevaConfig,
        collaborator: Arc<dyn Collaborator>,
        agent_key: impl Into<String>,
    ) -> Result<Self> {
        let vendor = Arc::new(OpenAiClient::from_config(config)?);
        let agent_key = agent_key.into();
        let tools = Arc::new(deva_tools::default_registry(
            collaborator.clone(),
            &agent_key,
        ));
        info!(provider = %config.provider, agent = %agent_key, "Deva plugin ready");
        Self::new(
            config,
            vendor.clone(),
            vendor,
            tools,
            collaborator,
            Arc::new(EventBus::default()),
            agent_key,
        )
    }

    /// The event bus carrying memory events and telemetry.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Direct access to the conversation session.
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    async fn feecting(&self, text: &str) -> Result<Answer> {
        Ok(self
            .collaborator
            .ask(&format!("feecting parse {text}"))
            .await?)
    }

    // ── Chat surface ──

    /// Full chat: core flow, boxed rendering, formatting round-trip.
    pub async fn chat(&self, request: ChatRequest) -> Result<PluginReply> {
        match self.session.chat(&request).await? {
            ChatOutcome::SoftError { error } => Ok(PluginReply {
                text: format!("error: {error}"),
                html: None,
                data: serde_json::json!({ "error": error }),
            }),
            ChatOutcome::Reply(result) => {
                let block = render::chat_block(&self.provider_name, &result);
                let feecting = self.feecting(&block).await?;
                Ok(PluginReply {
                    text: feecting.text,
                    html: feecting.html,
                    data: serde_json::json!({
                        "chat": result,
                        "feecting": feecting.data,
                    }),
                })
            }
        }
    }

    /// Chat without the formatted return — the normalized text comes back
    /// directly.
    pub async fn relay(&self, request: ChatRequest) -> Result<PluginReply> {
        match self.session.chat(&request).await? {
            ChatOutcome::SoftError { error } => Ok(PluginReply {
                text: format!("error: {error}"),
                html: None,
                data: serde_json::json!({ "error": error }),
            }),
            ChatOutcome::Reply(result) => Ok(PluginReply {
                text: result.text.clone(),
                html: None,
                data: serde_json::json!({ "chat": result }),
            }),
        }
    }

    /// The last cached response.
    pub async fn response(&self) -> PluginReply {
        match self.session.last_response().await {
            Some(result) => PluginReply {
                text: result.text.clone(),
                html: None,
                data: serde_json::json!({ "chat": result }),
            },
            None => PluginReply::text_only(&self.notext),
        }
    }

    // ── Passthrough surface ──

    /// Generate an image, persist it, and format the gallery block.
    pub async fn image(&self, prompt: &str, size_name: Option<&str>) -> Result<PluginReply> {
        if prompt.trim().is_empty() {
            return Ok(PluginReply::text_only(&self.notext));
        }

        let size = size_name
            .and_then(|s| self.image.sizes.get(s))
            .unwrap_or(&self.image.size);
        let images = self
            .vendor
            .generate_image(&self.image.model, prompt, self.image.n, size)
            .await?;
        let first = images
            .first()
            .ok_or_else(|| Error::Internal("image response carried no data".into()))?;
        let saved = self.media.save_image(&self.agent_key, first, prompt).await?;

        let block = render::image_block(&saved);
        let feecting = self.feecting(&block).await?;
        Ok(PluginReply {
            text: feecting.text,
            html: feecting.html,
            data: serde_json::json!({
                "image": saved,
                "feecting": feecting.data,
            }),
        })
    }

    /// Synthesize speech, persist the clip, and format the audio block.
    pub async fn voice(&self, text: &str, voice: Option<&str>) -> Result<PluginReply> {
        if text.trim().is_empty() {
            return Ok(PluginReply::text_only(&self.notext));
        }

        let voice = voice.unwrap_or(&self.speech.voice);
        let bytes = self
            .vendor
            .synthesize_speech(&self.speech.model, voice, text)
            .await?;
        let saved = self.media.save_audio(&self.agent_key, &bytes).await?;

        let block = render::audio_block(&saved);
        let feecting = self.feecting(&block).await?;
        Ok(PluginReply {
            text: feecting.text,
            html: feecting.html,
            data: serde_json::json!({
                "voice": saved,
                "feecting": feecting.data,
            }),
        })
    }

    /// List available models.
    pub async fn models(&self) -> Result<PluginReply> {
        let models = self.vendor.list_models().await?;
        Ok(PluginReply {
            text: render::models_block(&models),
            html: None,
            data: serde_json::json!({ "models": models }),
        })
    }

    /// Details for one model.
    pub async fn model(&self, id: &str) -> Result<PluginReply> {
        let model = self.vendor.get_model(id).await?;
        Ok(PluginReply {
            text: render::model_detail_block(&model),
            html: None,
            data: serde_json::json!({ "model": model }),
        })
    }

    /// Upload a file.
    pub async fn file_upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        purpose: &str,
    ) -> Result<PluginReply> {
        let file = self.vendor.upload_file(filename, bytes, purpose).await?;
        Ok(PluginReply {
            text: render::file_block(&file),
            html: None,
            data: serde_json::json!({ "file": file }),
        })
    }

    /// List uploaded files.
    pub async fn files(&self) -> Result<PluginReply> {
        let files = self.vendor.list_files().await?;
        Ok(PluginReply {
            text: render::files_block(&files),
            html: None,
            data: serde_json::json!({ "files": files }),
        })
    }

    /// One uploaded file's metadata.
    pub async fn file(&self, id: &str) -> Result<PluginReply> {
        let file = self.vendor.get_file(id).await?;
        Ok(PluginReply {
            text: render::file_block(&file),
            html: None,
            data: serde_json::json!({ "file": file }),
        })
    }

    /// Delete an uploaded file.
    pub async fn file_delete(&self, id: &str) -> Result<PluginReply> {
        let deleted = self.vendor.delete_file(id).await?;
        Ok(PluginReply {
            text: format!("file deleted: {} ({})", deleted.id, deleted.deleted),
            html: None,
            data: serde_json::json!({ "deleted": deleted }),
        })
    }

    /// Create a fine-tune job.
    pub async fn fine_tune_create(
        &self,
        training_file: &str,
        model: &str,
    ) -> Result<PluginReply> {
        let job = self.vendor.create_fine_tune(training_file, model).await?;
        Ok(PluginReply {
            text: render::fine_tune_block(&job),
            html: None,
            data: serde_json::json!({ "fine_tune": job }),
        })
    }

    /// List fine-tune jobs.
    pub async fn fine_tunes(&self) -> Result<PluginReply> {
        let jobs = self.vendor.list_fine_tunes().await?;
        Ok(PluginReply {
            text: render::fine_tunes_block(&jobs),
            html: None,
            data: serde_json::json!({ "fine_tunes": jobs }),
        })
    }

    /// One fine-tune job.
    pub async fn fine_tune(&self, id: &str) -> Result<PluginReply> {
        let job = self.vendor.get_fine_tune(id).await?;
        Ok(PluginReply {
            text: render::fine_tune_block(&job),
            html: None,
            data: serde_json::json!({ "fine_tune": job }),
        })
    }

    /// Cancel a fine-tune job.
    pub async fn fine_tune_cancel(&self, id: &str) -> Result<PluginReply> {
        let job = self.vendor.cancel_fine_tune(id).await?;
        Ok(PluginReply {
            text: render::fine_tune_block(&job),
            html: None,
            data: serde_json::json!({ "fine_tune": job }),
        })
    }

    // ── Session state surface ──

    /// Set the conversation topic; empty text reads the current one.
    pub async fn topic(&self, text: &str) -> Result<PluginReply> {
        if text.trim().is_empty() {
            return Ok(PluginReply::text_only(
                self.session.topic().await.unwrap_or_default(),
            ));
        }
        self.session.set_topic(text).await;
        let feecting = self.feecting(&format!("topic: {text}")).await?;
        Ok(PluginReply {
            text: feecting.text,
            html: feecting.html,
            data: feecting.data.unwrap_or(serde_json::Value::Null),
        })
    }

    /// Set the conversation location; empty text reads the current one.
    pub async fn location(&self, text: &str) -> Result<PluginReply> {
        if text.trim().is_empty() {
            return Ok(PluginReply::text_only(
                self.session.location().await.unwrap_or_default(),
            ));
        }
        self.session.set_location(text).await;
        let feecting = self.feecting(&format!("location: {text}")).await?;
        Ok(PluginReply {
            text: feecting.text,
            html: feecting.html,
            data: feecting.data.unwrap_or(serde_json::Value::Null),
        })
    }
}
