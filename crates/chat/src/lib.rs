//! The Deva chat plugin.
//!
//! A chat call runs one serialized operation per session:
//!
//! 1. **Assemble** a message list: recent history window plus optional
//!    system context blocks (corpus, agent profile, client profile, header)
//! 2. **Send to the model**; if the reply requests tool calls, resolve each
//!    against the fixed registry and run a second, summarizing completion
//! 3. **Record**: normalize the reply text, append the assistant turn to
//!    history, overwrite the response cache, emit a memory event
//!
//! Everything else the plugin exposes (images, speech, files, fine-tunes,
//! models, topic/location) is a single passthrough call to the vendor API
//! plus display rendering.

pub mod assembler;
pub mod media;
pub mod normalize;
pub mod plugin;
pub mod render;
pub mod session;

pub use assembler::{AssembledPrompt, ChatOptions};
pub use media::{MediaStore, SavedAudio, SavedImage};
pub use normalize::ResponseNormalizer;
pub use plugin::{ChatDeva, PluginReply};
pub use session::{ChatOutcome, ChatRequest, ChatSession};
