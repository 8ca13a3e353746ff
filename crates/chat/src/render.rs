//! Display rendering — the `::begin:`/`::end:` text blocks handed to the
//! downstream formatting service.
//!
//! Each passthrough result is reformatted into a display string; the raw
//! payload travels alongside it in the plugin reply.

use crate::media::{SavedAudio, SavedImage};
use chrono::{TimeZone, Utc};
use deva_core::hash;
use deva_core::message::ChatResult;
use deva_providers::{FileObject, FineTuneJob, ModelInfo};

pub const BOX_BEGIN: &str = "::begin";
pub const BOX_END: &str = "::end";

/// The boxed chat response: reply text plus a metadata trailer.
pub fn chat_block(provider: &str, result: &ChatResult) -> String {
    let tokens = result
        .usage
        .as_ref()
        .map(|u| u.total_tokens)
        .unwrap_or_default();
    [
        format!("{BOX_BEGIN}:{provider}:{}", result.id),
        result.text.clone(),
        "---".into(),
        "## Metadata".into(),
        format!("chatid: {}", result.id),
        format!("model: {}", result.model),
        format!("tokens: {tokens}"),
        format!("created: {}", result.created),
        format!("sha256: {}", hash::sha256_text(&result.text)),
        format!("{BOX_END}:{provider}:{}", result.id),
    ]
    .join("\n")
}

/// The model listing.
pub fn models_block(models: &[ModelInfo]) -> String {
    let mut lines = vec!["## Models".to_string()];
    for model in models {
        lines.push(
            [
                format!("{BOX_BEGIN}:model"),
                format!("#### {}", model.id),
                format!("id: {}", model.id),
                format!("owner: {}", model.owned_by),
                format!("{BOX_END}:model"),
            ]
            .join("\n"),
        );
    }
    lines.join("\n")
}

/// Details for a single model.
pub fn model_detail_block(model: &ModelInfo) -> String {
    let created = Utc
        .timestamp_opt(model.created, 0)
        .single()
        .map(|t| t.to_rfc2822())
        .unwrap_or_else(|| model.created.to_string());
    [
        format!("{BOX_BEGIN}:model:{}", model.id),
        "### Model Details".into(),
        format!("id: {}", model.id),
        format!("owner: {}", model.owned_by),
        format!("parent: {}", model.parent.as_deref().unwrap_or("none")),
        format!("root: {}", model.root.as_deref().unwrap_or("none")),
        format!("created: {created}"),
        format!("{BOX_END}:model"),
    ]
    .join("\n")
}

/// A saved generated image.
pub fn image_block(image: &SavedImage) -> String {
    [
        format!("{BOX_BEGIN}:image:{}", image.name),
        format!("image: {}", image.url),
        format!("url: {}", image.url),
        String::new(),
        image.prompt.clone(),
        format!("{BOX_END}:image:{}", image.hash),
    ]
    .join("\n")
}

/// A saved speech clip.
pub fn audio_block(audio: &SavedAudio) -> String {
    [
        format!("{BOX_BEGIN}:audio:{}", audio.name),
        format!("audio[tts]: {}", audio.url),
        format!("url: {}", audio.url),
        format!("{BOX_END}:audio:{}", audio.hash),
    ]
    .join("\n")
}

/// The uploaded-file listing.
pub fn files_block(files: &[FileObject]) -> String {
    let mut lines = vec!["## Files".to_string()];
    for file in files {
        lines.push(
            [
                format!("{BOX_BEGIN}:file"),
                format!("#### {}", file.filename),
                format!("id: {}", file.id),
                format!("purpose: {}", file.purpose),
                format!("bytes: {}", file.bytes),
                format!("{BOX_END}:file"),
            ]
            .join("\n"),
        );
    }
    lines.join("\n")
}

/// A single uploaded file.
pub fn file_block(file: &FileObject) -> String {
    [
        format!("{BOX_BEGIN}:file:{}", file.id),
        format!("id: {}", file.id),
        format!("filename: {}", file.filename),
        format!("purpose: {}", file.purpose),
        format!("bytes: {}", file.bytes),
        format!("{BOX_END}:file"),
    ]
    .join("\n")
}

/// A fine-tune job.
pub fn fine_tune_block(job: &FineTuneJob) -> String {
    [
        format!("{BOX_BEGIN}:finetune:{}", job.id),
        format!("id: {}", job.id),
        format!("model: {}", job.model),
        format!("status: {}", job.status),
        format!(
            "fine_tuned_model: {}",
            job.fine_tuned_model.as_deref().unwrap_or("pending")
        ),
        format!("{BOX_END}:finetune"),
    ]
    .join("\n")
}

/// The fine-tune job listing.
pub fn fine_tunes_block(jobs: &[FineTuneJob]) -> String {
    let mut lines = vec!["## Fine-tune Jobs".to_string()];
    for job in jobs {
        lines.push(fine_tune_block(job));
    }
    lines.join("\n")
}
