//! Context construction.
//!
//! Message order is: the system prompt, then a memory system message, then
//! the conversation. User turns with image attachments become multi-part
//! content with one image part per attachment. Tool turns are dropped:
//! a conversation turn carries no `tool_call_id` to pair them with.

use tracing::warn;

use parley_core::{ChatMessage, ContentPart, ConversationMessage, EndpointConfig, Role};

use crate::attachments::AttachmentResolver;

/// Build the driver messages for a turn.
///
/// An attachment that fails to resolve is dropped with a warning rather
/// than failing the turn.
pub async fn build_messages(
    endpoint: &EndpointConfig,
    memory_context: Option<String>,
    conversation: &[ConversationMessage],
    resolver: &dyn AttachmentResolver,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(conversation.len() + 2);

    if let Some(prompt) = endpoint
        .system_prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        messages.push(ChatMessage::system(prompt));
    }

    if let Some(memory) = memory_context.filter(|m| !m.is_empty()) {
        messages.push(ChatMessage::system(memory));
    }

    for turn in conversation {
        if let Some(message) = convert_turn(turn, resolver).await {
            messages.push(message);
        }
    }

    messages
}

async fn convert_turn(
    turn: &ConversationMessage,
    resolver: &dyn AttachmentResolver,
) -> Option<ChatMessage> {
    let message = match turn.role {
        Role::User if turn.has_image() => {
            let mut parts = vec![ContentPart::Text {
                text: turn.text.clone(),
            }];
            for attachment in turn.attachments.iter().filter(|a| a.is_image()) {
                match resolver.resolve(attachment).await {
                    Ok(url) => parts.push(ContentPart::image(url)),
                    Err(e) => warn!(uri = %attachment.uri, error = %e, "Dropping attachment"),
                }
            }
            ChatMessage::user_parts(parts)
        }
        Role::User => ChatMessage::user(turn.text.clone()),
        Role::Assistant => ChatMessage::assistant(turn.text.clone()),
        Role::System => ChatMessage::system(turn.text.clone()),
        Role::Tool => {
            warn!("Dropping tool turn without a tool call id");
            return None;
        }
    };
    Some(message)
}
