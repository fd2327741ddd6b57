//! Parrot mode: pick a victim, mirror their reactions and typing, and
//! periodically post a mocking copy of what they say.
//!
//! The engine is either idle or parroting exactly one user. Trigger emoji
//! (in message text or as reactions) move the parrot to whoever used them,
//! with a per-emoji chance. It gives up after `parrot_limit` messages from
//! the victim, or when someone tells it to stop.
//!
//! Every outbound call is caught where it is made, so a failed post never
//! leaves the state half-updated.

use std::sync::LazyLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::reactor::event::{MessageEvent, ReactionEvent};
use crate::reactor::identity::IdentityCache;
use crate::reactor::platform::{ChatPlatform, OutgoingMessage, PlatformError};

/// Built-in trigger emoji and the chance each one moves the parrot.
pub const DEFAULT_TRIGGERS: &[(&str, f64)] = &[
    ("wave", 0.1),
    ("clap", 0.1),
    ("plus1", 0.1),
    ("laughing", 0.1),
    ("robot_face", 0.2),
    ("surprisedpikachu", 0.5),
    ("facepalm", 0.5),
    ("10x", 0.5),
    ("jnbow", 0.8),
    ("rip", 1.0),
    ("dumpster-fire", 1.0),
];

pub const DEFAULT_MOCK_FREQUENCY: u32 = 7;
pub const DEFAULT_TYPING_FREQUENCY: u32 = 3;
pub const DEFAULT_PARROT_LIMIT: u32 = 50;
pub const DEFAULT_MOCK_URL: &str = "https://mock.sam.wtf/";

const STOP_PHRASES: [&str; 5] = ["quit it", "cut it out", "cut that out", "stop it", "enough"];

/// Typing indicators are best-effort; don't hold up the event loop for one.
const TYPING_TIMEOUT: Duration = Duration::from_secs(2);

static NOMINATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"parrot <@([a-z0-9]+)(?:\|[^>]*)?>").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEmoji {
    pub name: String,
    /// Probability in `[0, 1]`.
    pub chance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParrotSettings {
    /// Checked in order; the first one that fires wins.
    pub triggers: Vec<TriggerEmoji>,
    pub mock_frequency: u32,
    pub typing_frequency: u32,
    pub parrot_limit: u32,
    /// Prefix the URL-encoded text is appended to for the mock image.
    pub mock_url: String,
}

impl Default for ParrotSettings {
    fn default() -> Self {
        Self {
            triggers: DEFAULT_TRIGGERS
                .iter()
                .map(|(name, chance)| TriggerEmoji {
                    name: name.to_string(),
                    chance: *chance,
                })
                .collect(),
            mock_frequency: DEFAULT_MOCK_FREQUENCY,
            typing_frequency: DEFAULT_TYPING_FREQUENCY,
            parrot_limit: DEFAULT_PARROT_LIMIT,
            mock_url: DEFAULT_MOCK_URL.to_string(),
        }
    }
}

/// Who is being parroted, and how many of their messages we've seen since.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParrotState {
    target: Option<String>,
    message_count: u32,
}

impl ParrotState {
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    fn is_target(&self, user: &str) -> bool {
        self.target.as_deref() == Some(user)
    }
}

pub struct ParrotEngine {
    settings: ParrotSettings,
    state: ParrotState,
    debug_channel: Option<String>,
}

impl ParrotEngine {
    pub fn new(settings: ParrotSettings, debug_channel: Option<String>) -> Self {
        Self {
            settings,
            state: ParrotState::default(),
            debug_channel,
        }
    }

    pub fn state(&self) -> &ParrotState {
        &self.state
    }

    /// Announce in the debug channel (if any) and the log.
    async fn write_log_entry<P: ChatPlatform>(&self, platform: &P, message: &str) {
        if let Some(ref channel) = self.debug_channel {
            let entry = OutgoingMessage::new(channel.as_str(), format!(":partyparrot: {message}"))
                .unfurled();
            if let Err(e) = platform.post_message(&entry).await {
                warn!("Failed to post parrot log entry: {e}");
            }
        }
        info!("🦜 {}", message);
    }

    /// Start parroting `user`.
    async fn parrot<P: ChatPlatform>(
        &mut self,
        platform: &P,
        user: &str,
        nominated_by: Option<&str>,
        origin: Option<(&str, &str)>,
    ) {
        let mut message = format!("Now parroting <@{user}>");
        if let Some(nominator) = nominated_by {
            message.push_str(&format!(" - nominated by <@{nominator}>"));
        }
        if let Some((channel, ts)) = origin {
            match platform.get_permalink(channel, ts).await {
                Ok(permalink) => message.push_str(&format!(" ({permalink})")),
                Err(e) => warn!("Failed to get permalink for parrot origin: {e}"),
            }
        }
        self.write_log_entry(platform, &message).await;
        self.state.target = Some(user.to_string());
        self.state.message_count = 0;
    }

    async fn stop<P: ChatPlatform>(&mut self, platform: &P, message: &str) {
        self.write_log_entry(platform, message).await;
        self.state.target = None;
        self.state.message_count = 0;
    }

    /// First trigger that fires for `user`, if any. `present` says whether a
    /// trigger applies to this event at all.
    fn roll_trigger<R, F>(&self, rng: &mut R, user: &str, present: F) -> Option<&str>
    where
        R: Rng,
        F: Fn(&str) -> bool,
    {
        if self.state.is_target(user) {
            return None;
        }
        self.settings
            .triggers
            .iter()
            .find(|t| present(&t.name) && rng.gen_bool(t.chance))
            .map(|t| t.name.as_str())
    }

    async fn is_bot<P: ChatPlatform>(
        &self,
        platform: &P,
        identity: &mut IdentityCache,
        user: &str,
    ) -> bool {
        match identity.is_bot(platform, user).await {
            Ok(is_bot) => is_bot,
            Err(e) => {
                warn!("Failed to look up user {}: {e}", user);
                true
            }
        }
    }

    fn mock_url(&self, text: &str) -> String {
        format!(
            "{}{}",
            self.settings.mock_url,
            urlencoding::encode(text).replace("%20", "+")
        )
    }

    /// Handle a message from `user`.
    pub async fn on_message<P: ChatPlatform, R: Rng>(
        &mut self,
        platform: &P,
        identity: &mut IdentityCache,
        rng: &mut R,
        message: &MessageEvent,
        user: &str,
    ) {
        let text = message.text.as_str();
        if self.is_bot(platform, identity, user).await {
            return;
        }

        let triggered = self
            .roll_trigger(rng, user, |name| text.contains(&format!(":{name}:")))
            .map(str::to_string);
        if let Some(emoji) = triggered {
            debug!("Trigger :{}: fired for {}", emoji, user);
            self.parrot(platform, user, None, Some((&message.channel, &message.ts)))
                .await;
            return;
        }

        if !self.state.is_target(user) {
            return;
        }

        self.state.message_count += 1;
        if self.state.message_count % self.settings.mock_frequency == 0 {
            let mock = OutgoingMessage::new(message.channel.as_str(), text)
                .in_thread(message.reply_thread())
                .with_image(self.mock_url(text), text);
            if let Err(e) = platform.post_message(&mock).await {
                warn!("Failed to post mockery: {e}");
            }
        }
        if self.state.message_count >= self.settings.parrot_limit {
            let notice = format!("No longer parroting <@{user}> :bongoblob:");
            self.stop(platform, &notice).await;
        }
    }

    /// Handle a message addressed to the bot: a mention, a DM, or anything
    /// in the debug channel. `text` is expected lowercased.
    pub async fn on_command<P: ChatPlatform>(
        &mut self,
        platform: &P,
        identity: &mut IdentityCache,
        message: &MessageEvent,
        user: &str,
        text: &str,
    ) {
        let channel = message.channel.as_str();
        let thread_ts = message.reply_thread();
        if STOP_PHRASES.iter().any(|phrase| text.contains(phrase)) {
            let reply = match self.state.target.clone() {
                None => format!("<@{user}> I'm sorry but I'm not quite sure what you're talking about?"),
                Some(target) => {
                    let notice = format!(
                        "No longer parroting <@{target}> :pouting_cat: (<@{user}> asked me to stop)"
                    );
                    self.stop(platform, &notice).await;
                    format!("<@{user}> OK. :pouting_cat:")
                }
            };
            if let Err(e) = platform
                .post_message(&OutgoingMessage::new(channel, reply).in_thread(thread_ts))
                .await
            {
                warn!("Failed to reply to stop request: {e}");
            }
        }

        if !self.is_privileged_channel(platform, identity, channel).await {
            return;
        }

        let victim = NOMINATION
            .captures(text)
            .map(|captures| captures[1].to_uppercase());
        if let Some(victim) = victim {
            self.parrot(platform, &victim, Some(user), None).await;
            let confirmation =
                format!(":partyparrot: Watch out <@{victim}>, there's a parrot circling you");
            if let Err(e) = platform
                .post_ephemeral(channel, user, &confirmation, Some(thread_ts))
                .await
            {
                warn!("Failed to confirm nomination: {e}");
            }
        }

        if text.contains("parrot status") {
            let status = match self.state.target() {
                Some(target) => format!(":partyparrot: Currently parroting <@{target}>"),
                None => ":pouting_cat: Not parroting anyone right now".to_string(),
            };
            if let Err(e) = platform
                .post_ephemeral(channel, user, &status, Some(thread_ts))
                .await
            {
                warn!("Failed to send parrot status: {e}");
            }
        }
    }

    async fn is_privileged_channel<P: ChatPlatform>(
        &self,
        platform: &P,
        identity: &mut IdentityCache,
        channel: &str,
    ) -> bool {
        if self.debug_channel.as_deref() == Some(channel) {
            return true;
        }
        match identity.is_channel_im(platform, channel).await {
            Ok(is_im) => is_im,
            Err(e) => {
                warn!("Failed to look up channel {}: {e}", channel);
                false
            }
        }
    }

    pub async fn on_reaction_added<P: ChatPlatform, R: Rng>(
        &mut self,
        platform: &P,
        identity: &mut IdentityCache,
        rng: &mut R,
        event: &ReactionEvent,
    ) {
        if self.is_bot(platform, identity, &event.user).await {
            return;
        }

        let triggered = self
            .roll_trigger(rng, &event.user, |name| name == event.reaction)
            .is_some();
        if triggered {
            self.parrot(platform, &event.user, None, Some((&event.channel, &event.ts)))
                .await;
            // The trigger emoji itself is not mirrored.
            return;
        }

        if !self.state.is_target(&event.user) {
            return;
        }

        if let Err(e) = platform
            .add_reaction(&event.channel, &event.ts, &event.reaction)
            .await
        {
            warn!("Failed to mirror :{}: - {e}", event.reaction);
        }
    }

    pub async fn on_reaction_removed<P: ChatPlatform>(&self, platform: &P, event: &ReactionEvent) {
        if !self.state.is_target(&event.user) {
            return;
        }

        if let Err(e) = platform
            .remove_reaction(&event.channel, &event.ts, &event.reaction)
            .await
        {
            warn!("Failed to unmirror :{}: - {e}", event.reaction);
        }
    }

    /// Type along with the victim every `typing_frequency` messages.
    pub async fn on_user_typing<P: ChatPlatform>(&self, platform: &P, channel: &str, user: &str) {
        if !self.state.is_target(user) {
            return;
        }
        if self.state.message_count % self.settings.typing_frequency != 0 {
            return;
        }

        let sent = tokio::time::timeout(TYPING_TIMEOUT, platform.send_typing(channel))
            .await
            .unwrap_or(Err(PlatformError::Timeout));
        match sent {
            Ok(()) => debug!("Typing along with {} in {}", user, channel),
            Err(e) => warn!("Failed to send typing indicator: {e}"),
        }
    }
}
