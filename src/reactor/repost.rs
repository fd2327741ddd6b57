//! Cross-posting messages about a subject into a dedicated channel.

use regex::Regex;
use tracing::info;

use crate::reactor::platform::{ChatPlatform, OutgoingMessage, PlatformError};

/// Built-in rule: (pattern, target channel, description, emoji).
pub const DEFAULT_REPOST: (&str, &str, &str, &str) = (
    r"corona\s?virus|covid|quarantine|isolat(ion|e)",
    "CUZJRJ42E",
    "the COVID-19 pandemic",
    "mask-parrot",
);

#[derive(Debug, Clone)]
pub struct RepostRule {
    pub pattern: Regex,
    pub target_channel: String,
    pub description: String,
    pub emoji: String,
    /// Tell the author privately instead of in a thread.
    pub ephemeral: bool,
}

/// A completed cross-post, ready to be announced to the author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepostOutcome {
    pub source_permalink: String,
    pub repost_permalink: String,
    pub target_channel: String,
    pub description: String,
    pub emoji: String,
    pub ephemeral: bool,
}

impl RepostOutcome {
    pub fn notification(&self, author: &str) -> String {
        format!(
            ":{emoji}: hey <@{author}>, since <{source}|your message> was about *{description}*, \
             I went ahead and <{repost}|reposted it> to <#{target}> for you.",
            emoji = self.emoji,
            source = self.source_permalink,
            description = self.description,
            repost = self.repost_permalink,
            target = self.target_channel,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepostTrigger {
    rules: Vec<RepostRule>,
}

impl RepostTrigger {
    pub fn new(rules: Vec<RepostRule>) -> Self {
        Self { rules }
    }

    /// Repost `ts` if its text matches a rule. First match wins.
    pub async fn evaluate<P: ChatPlatform>(
        &self,
        platform: &P,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<Option<RepostOutcome>, PlatformError> {
        let rule = self
            .rules
            .iter()
            .filter(|rule| rule.target_channel != channel)
            .find(|rule| rule.pattern.is_match(text));
        match rule {
            Some(rule) => repost(platform, rule, channel, ts).await.map(Some),
            None => Ok(None),
        }
    }

    /// Repost `ts` because someone reacted with a rule's emoji.
    pub async fn on_watch_emoji<P: ChatPlatform>(
        &self,
        platform: &P,
        channel: &str,
        ts: &str,
        emoji: &str,
    ) -> Result<Option<RepostOutcome>, PlatformError> {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.emoji == emoji && rule.target_channel != channel);
        match rule {
            Some(rule) => repost(platform, rule, channel, ts).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn is_watch_emoji(&self, emoji: &str) -> bool {
        self.rules.iter().any(|rule| rule.emoji == emoji)
    }
}

async fn repost<P: ChatPlatform>(
    platform: &P,
    rule: &RepostRule,
    channel: &str,
    ts: &str,
) -> Result<RepostOutcome, PlatformError> {
    let source_permalink = platform.get_permalink(channel, ts).await?;

    let copy = OutgoingMessage::new(
        rule.target_channel.as_str(),
        format!(":{}: {}", rule.emoji, source_permalink),
    )
    .unfurled();
    let posted = platform.post_message(&copy).await?;
    let repost_permalink = platform.get_permalink(&posted.channel, &posted.ts).await?;

    info!("🔁 Reposted {} from {} to {}", ts, channel, rule.target_channel);
    Ok(RepostOutcome {
        source_permalink,
        repost_permalink,
        target_channel: rule.target_channel.clone(),
        description: rule.description.clone(),
        emoji: rule.emoji.clone(),
        ephemeral: rule.ephemeral,
    })
}
