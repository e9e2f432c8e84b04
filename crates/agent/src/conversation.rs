use brewline_core::{ApplicationError, Message, OrderSnapshot, Role};

/// Most recent order-taking state, scanning backwards from the turn before
/// the latest one. Turns produced by other agents are skipped.
pub fn last_order_state(messages: &[Message]) -> Option<&OrderSnapshot> {
    let earlier = messages.len().checked_sub(1)?;
    messages[..earlier].iter().rev().find_map(Message::order_snapshot)
}

/// The newest `n` messages.
pub fn tail(messages: &[Message], n: usize) -> &[Message] {
    &messages[messages.len().saturating_sub(n)..]
}

pub fn latest_content(messages: &[Message]) -> &str {
    messages.last().map(|message| message.content.as_str()).unwrap_or_default()
}

/// Private copy of `messages` whose latest turn reads `content`.
pub fn with_latest_content(messages: &[Message], content: String) -> Vec<Message> {
    let mut copy = messages.to_vec();
    if let Some(last) = copy.last_mut() {
        last.content = content;
    }
    copy
}

/// A routable conversation is non-empty and ends with a user turn.
pub fn validate_conversation(messages: &[Message]) -> Result<(), ApplicationError> {
    match messages.last() {
        None => Err(ApplicationError::InvalidConversation(
            "conversation must contain at least one message".to_string(),
        )),
        Some(last) if last.role != Role::User => Err(ApplicationError::InvalidConversation(
            "the latest message must come from the user".to_string(),
        )),
        Some(last) if last.content.trim().is_empty() => Err(
            ApplicationError::InvalidConversation("the latest message is empty".to_string()),
        ),
        Some(_) => Ok(()),
    }
}
