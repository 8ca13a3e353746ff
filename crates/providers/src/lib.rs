//! Remote API client for the Deva chat plugin.
//!
//! One client covers the whole vendor surface: chat completions (the
//! `Provider` trait), plus the passthrough endpoints — image generation,
//! speech synthesis, file management, fine-tune jobs, and model listing.

pub mod openai;

pub use openai::{
    DeletedFile, FileObject, FineTuneJob, GeneratedImage, ModelInfo, OpenAiClient,
};
