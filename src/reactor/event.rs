//! Inbound chat events, already stripped of wire details.

/// A posted (or edited) chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    /// Absent for integration posts without a user.
    pub user: Option<String>,
    pub text: String,
    /// The message is an edit of a thread reply.
    pub edited_reply: bool,
}

impl MessageEvent {
    /// Thread to reply in: the message's own thread, or a new one under it.
    pub fn reply_thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// A reaction added to or removed from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub user: String,
    pub reaction: String,
    pub channel: String,
    pub ts: String,
    /// Author of the message the reaction sits on.
    pub item_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmojiChange {
    Added { name: String },
    Removed { names: Vec<String> },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    UserTyping { channel: String, user: String },
    EmojiChanged(EmojiChange),
    ChannelCreated { id: String, name: Option<String> },
    Hello,
    Goodbye,
}

impl InboundEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::ReactionAdded(_) => "reaction_added",
            Self::ReactionRemoved(_) => "reaction_removed",
            Self::UserTyping { .. } => "user_typing",
            Self::EmojiChanged(_) => "emoji_changed",
            Self::ChannelCreated { .. } => "channel_created",
            Self::Hello => "hello",
            Self::Goodbye => "goodbye",
        }
    }
}
