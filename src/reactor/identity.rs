//! Memoized identity lookups.
//!
//! Results are assumed stable for the life of one session: the bot's own id,
//! whether a user is a bot, and a channel's privacy never change under us.
//! Nothing expires on its own. Callers drop entries explicitly with
//! [`IdentityCache::invalidate`] (new session) or the per-key `forget_*`
//! hook (a channel was created).

use std::collections::HashMap;

use tracing::debug;

use crate::reactor::platform::{ChannelInfo, ChatPlatform, PlatformError};

#[derive(Debug, Default)]
pub struct IdentityCache {
    own_id: Option<String>,
    bots: HashMap<String, bool>,
    channels: HashMap<String, ChannelInfo>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn own_id<P: ChatPlatform>(&mut self, platform: &P) -> Result<String, PlatformError> {
        if let Some(ref id) = self.own_id {
            return Ok(id.clone());
        }
        let id = platform.own_identity().await?;
        debug!("Cached own identity {}", id);
        self.own_id = Some(id.clone());
        Ok(id)
    }

    pub async fn is_bot<P: ChatPlatform>(
        &mut self,
        platform: &P,
        user: &str,
    ) -> Result<bool, PlatformError> {
        if let Some(&is_bot) = self.bots.get(user) {
            return Ok(is_bot);
        }
        let is_bot = platform.user_info(user).await?.is_bot;
        self.bots.insert(user.to_string(), is_bot);
        Ok(is_bot)
    }

    async fn channel<P: ChatPlatform>(
        &mut self,
        platform: &P,
        channel: &str,
    ) -> Result<&ChannelInfo, PlatformError> {
        if !self.channels.contains_key(channel) {
            let info = platform.channel_info(channel).await?;
            self.channels.insert(channel.to_string(), info);
        }
        Ok(&self.channels[channel])
    }

    /// Private channels and direct messages both count as private.
    pub async fn is_channel_private<P: ChatPlatform>(
        &mut self,
        platform: &P,
        channel: &str,
    ) -> Result<bool, PlatformError> {
        let info = self.channel(platform, channel).await?;
        Ok(info.is_private || info.is_im)
    }

    pub async fn is_channel_im<P: ChatPlatform>(
        &mut self,
        platform: &P,
        channel: &str,
    ) -> Result<bool, PlatformError> {
        Ok(self.channel(platform, channel).await?.is_im)
    }

    /// Drop everything. Called when a new session starts.
    pub fn invalidate(&mut self) {
        self.own_id = None;
        self.bots.clear();
        self.channels.clear();
    }

    pub fn forget_channel(&mut self, channel: &str) {
        self.channels.remove(channel);
    }
}
