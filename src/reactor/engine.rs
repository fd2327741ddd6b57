//! Event reactor - fans each inbound event out to the components.
//!
//! Components run in a fixed order. Each one's failure is caught and logged
//! at its boundary so a later component still sees the event.

use std::collections::HashSet;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::reactor::corrector::Corrector;
use crate::reactor::event::{EmojiChange, InboundEvent, MessageEvent, ReactionEvent};
use crate::reactor::identity::IdentityCache;
use crate::reactor::parrot::{ParrotEngine, ParrotSettings};
use crate::reactor::platform::{ChatPlatform, OutgoingMessage, PlatformError};
use crate::reactor::repost::{RepostOutcome, RepostTrigger};
use crate::reactor::triggers::{TriggerTable, dice_emojis, roll_d20, wants_dice};

pub const DEFAULT_UNDO_EMOJI: &str = "x";

/// Reactor configuration.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    pub triggers: TriggerTable,
    pub reposts: RepostTrigger,
    pub corrector: Corrector,
    pub parrot: ParrotSettings,
    /// Parrot announcements and privileged commands.
    pub debug_channel: Option<String>,
    /// New emoji / new channel announcements.
    pub announce_channel: Option<String>,
    /// Reacting with this removes the bot's own reactions from a message.
    pub undo_emoji: String,
}

/// The per-session chat-event reactor.
pub struct Reactor<P: ChatPlatform> {
    platform: Arc<P>,
    identity: IdentityCache,
    triggers: TriggerTable,
    reposts: RepostTrigger,
    corrector: Corrector,
    parrot: ParrotEngine,
    /// `(channel, ts)` of every message already cross-posted.
    reposted: HashSet<(String, String)>,
    rng: StdRng,
    debug_channel: Option<String>,
    announce_channel: Option<String>,
    undo_emoji: String,
}

impl<P: ChatPlatform> Reactor<P> {
    pub fn new(config: ReactorConfig, platform: Arc<P>) -> Self {
        Self::with_rng(config, platform, StdRng::from_entropy())
    }

    pub fn with_rng(config: ReactorConfig, platform: Arc<P>, rng: StdRng) -> Self {
        let parrot = ParrotEngine::new(config.parrot, config.debug_channel.clone());
        Self {
            platform,
            identity: IdentityCache::new(),
            triggers: config.triggers,
            reposts: config.reposts,
            corrector: config.corrector,
            parrot,
            reposted: HashSet::new(),
            rng,
            debug_channel: config.debug_channel,
            announce_channel: config.announce_channel,
            undo_emoji: config.undo_emoji,
        }
    }

    pub fn parrot(&self) -> &ParrotEngine {
        &self.parrot
    }

    /// Handle one inbound event to completion.
    pub async fn handle(&mut self, event: InboundEvent) {
        debug!("Handling {}", event.kind());
        match event {
            InboundEvent::Message(message) => self.on_message(message).await,
            InboundEvent::ReactionAdded(reaction) => self.on_reaction_added(reaction).await,
            InboundEvent::ReactionRemoved(reaction) => {
                self.parrot
                    .on_reaction_removed(&*self.platform, &reaction)
                    .await
            }
            InboundEvent::UserTyping { channel, user } => {
                self.parrot
                    .on_user_typing(&*self.platform, &channel, &user)
                    .await
            }
            InboundEvent::EmojiChanged(change) => self.on_emoji_changed(change).await,
            InboundEvent::ChannelCreated { id, name } => self.on_channel_created(id, name).await,
            InboundEvent::Hello => self.on_hello().await,
            InboundEvent::Goodbye => warn!("👋 Server is closing the session"),
        }
    }

    async fn on_message(&mut self, message: MessageEvent) {
        if message.edited_reply {
            debug!("Skipping edited reply {} in {}", message.ts, message.channel);
            return;
        }

        let own_id = match self.identity.own_id(&*self.platform).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to resolve own identity: {e}");
                None
            }
        };
        if own_id.is_some() && message.user == own_id {
            return;
        }

        if let Err(e) = self.react(&message).await {
            warn!("Trigger reactions failed: {e}");
        }

        let Some(user) = message.user.as_deref() else {
            return;
        };

        if let Err(e) = self.repost_message(&message, user).await {
            warn!("Repost failed: {e}");
        }
        if let Err(e) = self.roll_dice(&message).await {
            warn!("Dice roll failed: {e}");
        }
        if let Err(e) = self
            .corrector
            .trigger(&*self.platform, &message.channel, message.reply_thread(), user, &message.text)
            .await
        {
            warn!("Correction failed: {e}");
        }

        self.parrot
            .on_message(
                &*self.platform,
                &mut self.identity,
                &mut self.rng,
                &message,
                user,
            )
            .await;

        if self.is_addressed(&message, own_id.as_deref()).await {
            let text = message.text.to_lowercase();
            self.parrot
                .on_command(&*self.platform, &mut self.identity, &message, user, &text)
                .await;
        }
    }

    async fn react(&self, message: &MessageEvent) -> Result<(), PlatformError> {
        for emoji in self.triggers.apply(&message.text) {
            self.platform
                .add_reaction(&message.channel, &message.ts, emoji)
                .await?;
        }
        Ok(())
    }

    async fn repost_message(&mut self, message: &MessageEvent, user: &str) -> Result<(), PlatformError> {
        if self
            .identity
            .is_channel_private(&*self.platform, &message.channel)
            .await?
        {
            return Ok(());
        }
        if self.already_reposted(&message.channel, &message.ts) {
            return Ok(());
        }
        let outcome = self
            .reposts
            .evaluate(&*self.platform, &message.channel, &message.ts, &message.text)
            .await?;
        if let Some(outcome) = outcome {
            self.mark_reposted(&message.channel, &message.ts);
            self.notify_author(&outcome, &message.channel, message.reply_thread(), user)
                .await?;
        }
        Ok(())
    }

    async fn roll_dice(&mut self, message: &MessageEvent) -> Result<(), PlatformError> {
        if !wants_dice(&message.text) {
            return Ok(());
        }
        let roll = roll_d20(&mut self.rng);
        info!("🎲 Rolled {} for msg {}", roll, message.ts);
        for emoji in dice_emojis(roll) {
            self.platform
                .add_reaction(&message.channel, &message.ts, emoji)
                .await?;
        }
        Ok(())
    }

    fn already_reposted(&self, channel: &str, ts: &str) -> bool {
        self.reposted
            .contains(&(channel.to_string(), ts.to_string()))
    }

    fn mark_reposted(&mut self, channel: &str, ts: &str) {
        self.reposted.insert((channel.to_string(), ts.to_string()));
    }

    async fn notify_author(
        &self,
        outcome: &RepostOutcome,
        channel: &str,
        ts: &str,
        author: &str,
    ) -> Result<(), PlatformError> {
        let text = outcome.notification(author);
        if outcome.ephemeral {
            self.platform.post_ephemeral(channel, author, &text, None).await
        } else {
            let reply = OutgoingMessage::new(channel, text).in_thread(ts);
            self.platform.post_message(&reply).await.map(|_| ())
        }
    }

    /// Mentions, DMs and the debug channel all count as talking to the bot.
    async fn is_addressed(&mut self, message: &MessageEvent, own_id: Option<&str>) -> bool {
        if let Some(id) = own_id
            && message.text.contains(&format!("<@{id}"))
        {
            return true;
        }
        if self.debug_channel.as_deref() == Some(message.channel.as_str()) {
            return true;
        }
        match self
            .identity
            .is_channel_im(&*self.platform, &message.channel)
            .await
        {
            Ok(is_im) => is_im,
            Err(e) => {
                warn!("Failed to look up channel {}: {e}", message.channel);
                false
            }
        }
    }

    async fn on_reaction_added(&mut self, reaction: ReactionEvent) {
        if reaction.reaction == self.undo_emoji
            && let Err(e) = self.remove_own_reactions(&reaction).await
        {
            warn!("Failed to undo reactions on {}: {e}", reaction.ts);
        }

        if self.reposts.is_watch_emoji(&reaction.reaction)
            && let Err(e) = self.repost_watched(&reaction).await
        {
            warn!("Repost via :{}: failed: {e}", reaction.reaction);
        }

        self.parrot
            .on_reaction_added(&*self.platform, &mut self.identity, &mut self.rng, &reaction)
            .await;
    }

    /// Remove every reaction the bot itself left on the message.
    async fn remove_own_reactions(&mut self, reaction: &ReactionEvent) -> Result<(), PlatformError> {
        let own_id = self.identity.own_id(&*self.platform).await?;
        let reactions = self
            .platform
            .list_reactions(&reaction.channel, &reaction.ts)
            .await?;
        for summary in reactions.iter().filter(|r| r.users.contains(&own_id)) {
            info!("↩️ Removing :{}: from {}", summary.name, reaction.ts);
            self.platform
                .remove_reaction(&reaction.channel, &reaction.ts, &summary.name)
                .await?;
        }
        Ok(())
    }

    async fn repost_watched(&mut self, reaction: &ReactionEvent) -> Result<(), PlatformError> {
        // Includes our own mirrored reactions.
        if self.identity.is_bot(&*self.platform, &reaction.user).await? {
            return Ok(());
        }
        if self
            .identity
            .is_channel_private(&*self.platform, &reaction.channel)
            .await?
        {
            return Ok(());
        }
        if self.already_reposted(&reaction.channel, &reaction.ts) {
            debug!("{} was already reposted", reaction.ts);
            return Ok(());
        }
        let outcome = self
            .reposts
            .on_watch_emoji(&*self.platform, &reaction.channel, &reaction.ts, &reaction.reaction)
            .await?;
        if let Some(outcome) = outcome {
            self.mark_reposted(&reaction.channel, &reaction.ts);
            let author = reaction.item_user.as_deref().unwrap_or(&reaction.user);
            self.notify_author(&outcome, &reaction.channel, &reaction.ts, author)
                .await?;
        }
        Ok(())
    }

    async fn on_emoji_changed(&self, change: EmojiChange) {
        match change {
            EmojiChange::Added { name } => {
                info!("New emoji :{}:", name);
                self.announce(format!(":{name}: New emoji `:{name}:`")).await;
            }
            EmojiChange::Removed { names } => info!("Emoji removed: {}", names.join(", ")),
            EmojiChange::Other => debug!("Ignoring emoji change"),
        }
    }

    async fn on_channel_created(&mut self, id: String, name: Option<String>) {
        self.identity.forget_channel(&id);
        info!("New channel {} ({})", id, name.as_deref().unwrap_or("?"));
        self.announce(format!(":new: New channel <#{id}>")).await;
    }

    async fn on_hello(&mut self) {
        // New session, so nothing cached under the old one is trusted.
        self.identity.invalidate();
        let state = self.parrot.state();
        info!(
            "🚀 Connected (parroting {:?}, {} message(s) in)",
            state.target(),
            state.message_count()
        );
        if let Some(ref channel) = self.debug_channel {
            let notice = format!(
                ":wave: {} v{} connected at {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                chrono::Utc::now().format("%Y-%m-%d %H:%M UTC"),
            );
            if let Err(e) = self
                .platform
                .post_message(&OutgoingMessage::new(channel.as_str(), notice))
                .await
            {
                warn!("Failed to post connect notice: {e}");
            }
        }
    }

    async fn announce(&self, text: String) {
        let Some(ref channel) = self.announce_channel else {
            return;
        };
        if let Err(e) = self
            .platform
            .post_message(&OutgoingMessage::new(channel.as_str(), text))
            .await
        {
            warn!("Failed to post announcement: {e}");
        }
    }
}
