//! The narrow chat-platform surface the reactor talks through.

use std::fmt;

/// Errors returned by an outbound platform call.
#[derive(Debug, Clone)]
pub enum PlatformError {
    /// Transport failure (connect, TLS, timeout inside the HTTP client).
    Http(String),
    /// The platform answered `ok: false`.
    Api { method: &'static str, error: String },
    /// The response body could not be decoded.
    Parse(String),
    /// No live session to send on.
    Disconnected,
    /// The call didn't finish within its deadline.
    Timeout,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Api { method, error } => write!(f, "slack {method} failed: {error}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Disconnected => write!(f, "no live session"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for PlatformError {}

/// An image block rendered under a message.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub image_url: String,
    pub alt_text: String,
}

/// A message to post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    /// Reply in this thread.
    pub thread_ts: Option<String>,
    pub unfurl_links: bool,
    pub image: Option<ImageBlock>,
    /// Display name override.
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

impl OutgoingMessage {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    pub fn unfurled(mut self) -> Self {
        self.unfurl_links = true;
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        self.image = Some(ImageBlock {
            image_url: image_url.into(),
            alt_text: alt_text.into(),
        });
        self
    }

    pub fn posing_as(mut self, username: impl Into<String>, icon_emoji: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.icon_emoji = Some(icon_emoji.into());
        self
    }
}

/// Where a posted message landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

/// One reaction on a message and the users who added it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSummary {
    pub name: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserInfo {
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub is_private: bool,
    pub is_im: bool,
}

/// Everything the reactor needs from the chat platform.
///
/// The reactor only ever has one event in flight, so implementations are
/// free to block each call until the platform answers.
#[allow(async_fn_in_trait)]
pub trait ChatPlatform {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<MessageRef, PlatformError>;

    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), PlatformError>;

    async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<(), PlatformError>;

    async fn remove_reaction(&self, channel: &str, ts: &str, name: &str)
    -> Result<(), PlatformError>;

    async fn get_permalink(&self, channel: &str, ts: &str) -> Result<String, PlatformError>;

    async fn list_reactions(
        &self,
        channel: &str,
        ts: &str,
    ) -> Result<Vec<ReactionSummary>, PlatformError>;

    async fn user_info(&self, user: &str) -> Result<UserInfo, PlatformError>;

    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, PlatformError>;

    async fn own_identity(&self) -> Result<String, PlatformError>;

    async fn send_typing(&self, channel: &str) -> Result<(), PlatformError>;
}
