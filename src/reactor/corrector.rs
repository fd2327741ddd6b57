//! Canned "corrections" posted under a custom name and icon.

use regex::Regex;
use tracing::info;

use crate::reactor::platform::{ChatPlatform, OutgoingMessage, PlatformError};

/// Built-in corrections: (pattern, message, icon emoji, display name).
pub const DEFAULT_CORRECTIONS: &[(&str, &str, &str, &str)] = &[
    (r"\bgarage\b", "> garbage\nFTFY :welcome:", "thinking_face", "Corrector"),
    (r"\bbrighton\b", "> Braaaahton\nFTFY :welcome:", "beach_with_umbrella", "Corrector"),
    (
        r"\bfriday\b",
        "https://www.youtube.com/watch?v=kfVsfOSbJY0&feature=youtu.be",
        "rebecca",
        "RB",
    ),
    (
        r"\bsaturday\b",
        "https://www.youtube.com/watch?v=GVCzdpagXOQ&feature=youtu.be",
        "rebecca",
        "RB",
    ),
];

#[derive(Debug, Clone)]
pub struct CorrectionRule {
    pub pattern: Regex,
    pub message: String,
    pub icon_emoji: String,
    pub username: String,
    pub ephemeral: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Corrector {
    rules: Vec<CorrectionRule>,
}

impl Corrector {
    pub fn new(rules: Vec<CorrectionRule>) -> Self {
        Self { rules }
    }

    /// Post every matching correction.
    pub async fn trigger<P: ChatPlatform>(
        &self,
        platform: &P,
        channel: &str,
        ts: &str,
        user: &str,
        text: &str,
    ) -> Result<(), PlatformError> {
        for rule in self.rules.iter().filter(|r| r.pattern.is_match(text)) {
            info!("✏️ Correcting msg {} in {} as {}", ts, channel, rule.username);
            if rule.ephemeral {
                platform
                    .post_ephemeral(channel, user, &rule.message, None)
                    .await?;
            } else {
                let message = OutgoingMessage::new(channel, rule.message.as_str())
                    .in_thread(ts)
                    .unfurled()
                    .posing_as(rule.username.as_str(), rule.icon_emoji.as_str());
                platform.post_message(&message).await?;
            }
        }
        Ok(())
    }
}
