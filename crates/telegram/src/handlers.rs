use {
    parley_channels::InboundSink,
    parley_common::types::InboundMessage,
    teloxide::types::Message,
    tracing::debug,
};

/// Extract a text message from a Telegram update.
///
/// Returns `None` for anything without text (stickers, photos, service
/// messages) and for messages without a sender, such as channel posts.
pub fn inbound_from_message(msg: &Message) -> Option<InboundMessage> {
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, message_id = msg.id.0, "ignoring non-text message");
        return None;
    };
    let Some(from) = msg.from.as_ref() else {
        debug!(chat_id = msg.chat.id.0, "ignoring message without sender");
        return None;
    };
    let Ok(sender_id) = i64::try_from(from.id.0) else {
        debug!(user_id = from.id.0, "sender id out of range");
        return None;
    };

    Some(InboundMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        sender_id,
        sender_username: from.username.clone(),
        text: text.to_string(),
    })
}

/// Forward a Telegram message to the sink when it carries text.
///
/// Returns whether the message was forwarded.
pub async fn handle_message(msg: &Message, sink: &dyn InboundSink) -> bool {
    match inbound_from_message(msg) {
        Some(inbound) => {
            debug!(
                chat_id = inbound.chat_id,
                user_id = inbound.sender_id,
                "received telegram message"
            );
            sink.dispatch(inbound).await;
            true
        },
        None => false,
    }
}
