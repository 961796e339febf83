// Assembles the message list sent to the generation API for a chat prompt.

use crate::models::chat::{ChatMessage, MessageRole};
use crate::openai_client::ChatCompletionMessage;

pub const SYSTEM_PROMPT: &str = "You are Buz AI, a professional business strategist and marketing assistant. \
You help entrepreneurs plan, analyze, and build ideas clearly. \
If the user uploaded a file, use its content for context. Be precise, insightful, and strategic.";

/// Characters of an attached file forwarded with each prompt.
pub const FILE_CONTEXT_CHARS: usize = 5000;

pub struct AttachedFile<'a> {
    pub name: Option<&'a str>,
    pub content: &'a str,
}

/// Prompt text, with the head of the attached file appended when present.
pub fn prompt_with_file(prompt: &str, file: Option<&AttachedFile<'_>>) -> String {
    match file {
        Some(file) if !file.content.is_empty() => {
            let excerpt: String = file.content.chars().take(FILE_CONTEXT_CHARS).collect();
            format!("User prompt: \"{}\"\n\n📄 File content:\n{}", prompt, excerpt)
        }
        _ => prompt.to_string(),
    }
}

/// System persona, then stored history oldest first, then the prompt.
///
/// Clients store the user's message before asking for a reply, so a trailing
/// stored user message identical to the prompt is dropped rather than sent
/// twice.
pub fn build_conversation(
    history: &[ChatMessage],
    prompt: &str,
    file: Option<&AttachedFile<'_>>,
) -> Vec<ChatCompletionMessage> {
    let mut history = history;
    if let Some((last, rest)) = history.split_last() {
        if MessageRole::parse(&last.role) == Some(MessageRole::User) && last.text.trim() == prompt.trim() {
            history = rest;
        }
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatCompletionMessage::system(SYSTEM_PROMPT));

    for message in history {
        match MessageRole::parse(&message.role) {
            Some(MessageRole::User) => messages.push(ChatCompletionMessage::user(message.text.clone())),
            Some(MessageRole::Assistant) => messages.push(ChatCompletionMessage::assistant(message.text.clone())),
            None => tracing::debug!("Skipping message {} with role '{}'", message.id, message.role),
        }
    }

    messages.push(ChatCompletionMessage::user(prompt_with_file(prompt, file)));
    messages
}
