//! Conversation assembly — builds the message list for a completion request.
//!
//! The submitted list is the recent history window with optional system
//! context blocks in front. Assembly is deterministic: identical inputs
//! always produce an identical list.

use deva_core::message::{History, Message};

/// The per-call configuration bag accepted by `chat`.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Entity corpus text, injected as a system block
    pub corpus: Option<String>,

    /// Agent profile text, injected as a system block
    pub agent: Option<String>,

    /// Client profile text, injected as a system block
    pub client: Option<String>,

    /// Header text, injected as the first system block
    pub header: Option<String>,

    /// Replacement history for this call; the shared History is neither
    /// read nor mutated when this is set
    pub history: Option<Vec<Message>>,

    /// Model override; defaults to the active provider's configured model
    pub model: Option<String>,

    /// Max-tokens override for this call
    pub max_tokens: Option<u32>,

    /// Memory scope key for the search_memory tool
    pub memory: Option<String>,
}

/// An assembled message list, ready to submit.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub messages: Vec<Message>,
    pub model: String,

    /// True when an override history was used; the shared History must not
    /// receive the assistant turn afterwards
    pub override_history: bool,
}

/// Assemble the message list for one chat call.
///
/// Appends the user message to the shared History (or to a copy of the
/// override list), truncates to the last `window` entries, then inserts
/// the context blocks. Blocks are declared corpus → agent → client →
/// header, each inserted at the front, so the final order is
/// `[header, client, agent, corpus, ...history]`.
pub fn assemble(
    history: &mut History,
    text: &str,
    options: &ChatOptions,
    window: usize,
    default_model: &str,
) -> AssembledPrompt {
    let override_history = options.history.is_some();

    let mut messages: Vec<Message> = match &options.history {
        Some(supplied) => {
            let mut list = supplied.clone();
            list.push(Message::user(text));
            let start = list.len().saturating_sub(window);
            list.split_off(start)
        }
        None => {
            history.push(Message::user(text));
            history.window(window).to_vec()
        }
    };

    if let Some(corpus) = &options.corpus {
        messages.insert(0, Message::system(corpus));
    }
    if let Some(agent) = &options.agent {
        messages.insert(0, Message::system(agent));
    }
    if let Some(client) = &options.client {
        messages.insert(0, Message::system(client));
    }
    if let Some(header) = &options.header {
        messages.insert(0, Message::system(header));
    }

    let model = options
        .model
        .clone()
        .unwrap_or_else(|| default_model.to_string());

    AssembledPrompt {
        messages,
        model,
        override_history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deva_core::message::Role;

    fn full_options() -> ChatOptions {
        ChatOptions {
            corpus: Some("the corpus".into()),
            agent: Some("the agent profile".into()),
            client: Some("the client profile".into()),
            header: Some("the header".into()),
            ..Default::default()
        }
    }

    #[test]
    fn window_holds_exactly_n_recent_in_order() {
        let mut history = History::new();
        for i in 0..12 {
            history.push(Message::user(format!("m{i}")));
        }

        let prompt = assemble(&mut history, "m12", &ChatOptions::default(), 10, "gpt-4o");

        assert_eq!(prompt.messages.len(), 10);
        assert_eq!(prompt.messages[0].content, "m3");
        assert_eq!(prompt.messages[9].content, "m12");
        // the new message landed in shared history
        assert_eq!(history.len(), 13);
    }

    #[test]
    fn system_blocks_take_declared_final_order() {
        let mut history = History::new();
        let prompt = assemble(&mut history, "question", &full_options(), 10, "gpt-4o");

        let contents: Vec<&str> = prompt
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            contents,
            vec![
                "the header",
                "the client profile",
                "the agent profile",
                "the corpus",
                "question",
            ]
        );
        for m in &prompt.messages[..4] {
            assert_eq!(m.role, Role::System);
        }
    }

    #[test]
    fn window_excludes_system_blocks() {
        let mut history = History::new();
        for i in 0..20 {
            history.push(Message::user(format!("m{i}")));
        }

        let prompt = assemble(&mut history, "new", &full_options(), 5, "gpt-4o");

        let non_system = prompt
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count();
        assert_eq!(non_system, 5);
        assert_eq!(prompt.messages.len(), 9);
    }

    #[test]
    fn override_history_leaves_shared_history_untouched() {
        let mut history = History::new();
        history.push(Message::user("shared"));

        let options = ChatOptions {
            history: Some(vec![Message::user("supplied")]),
            ..Default::default()
        };
        let prompt = assemble(&mut history, "new", &options, 10, "gpt-4o");

        assert!(prompt.override_history);
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].content, "supplied");
        assert_eq!(prompt.messages[1].content, "new");
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].content, "shared");
    }

    #[test]
    fn override_history_is_windowed_too() {
        let supplied: Vec<Message> = (0..8).map(|i| Message::user(format!("o{i}"))).collect();
        let options = ChatOptions {
            history: Some(supplied),
            ..Default::default()
        };

        let mut history = History::new();
        let prompt = assemble(&mut history, "new", &options, 5, "gpt-4o");

        assert_eq!(prompt.messages.len(), 5);
        assert_eq!(prompt.messages[0].content, "o4");
        assert_eq!(prompt.messages[4].content, "new");
    }

    #[test]
    fn model_resolution_prefers_override() {
        let mut history = History::new();
        let options = ChatOptions {
            model: Some("gpt-4o-mini".into()),
            ..Default::default()
        };
        let prompt = assemble(&mut history, "hi", &options, 10, "gpt-4o");
        assert_eq!(prompt.model, "gpt-4o-mini");

        let prompt = assemble(&mut history, "hi", &ChatOptions::default(), 10, "gpt-4o");
        assert_eq!(prompt.model, "gpt-4o");
    }
}
