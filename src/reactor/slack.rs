//! Slack Web API client.
//!
//! Typing indicators aren't a Web API method; they go out over the live RTM
//! socket, which the session loop attaches with [`SlackClient::attach_session`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::reactor::platform::{
    ChannelInfo, ChatPlatform, MessageRef, OutgoingMessage, PlatformError, ReactionSummary,
    UserInfo,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct PostedMessage {
    channel: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct Permalink {
    permalink: String,
}

#[derive(Deserialize)]
struct AuthTest {
    user_id: String,
}

#[derive(Deserialize)]
struct RtmConnect {
    url: String,
}

#[derive(Deserialize)]
struct UsersInfo {
    user: UserRecord,
}

#[derive(Deserialize)]
struct UserRecord {
    #[serde(default)]
    is_bot: bool,
}

#[derive(Deserialize)]
struct ConversationsInfo {
    channel: ConversationRecord,
}

#[derive(Deserialize)]
struct ConversationRecord {
    is_private: Option<bool>,
    #[serde(default)]
    is_im: bool,
}

#[derive(Deserialize)]
struct ReactionsGet {
    message: Option<ReactedMessage>,
}

#[derive(Deserialize)]
struct ReactedMessage {
    #[serde(default)]
    reactions: Vec<ReactionRecord>,
}

#[derive(Deserialize)]
struct ReactionRecord {
    name: String,
    #[serde(default)]
    users: Vec<String>,
}

/// Slack API client.
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    /// Outbound frames for the current RTM session, if one is live.
    session: Mutex<Option<mpsc::Sender<String>>>,
    next_frame_id: AtomicU64,
}

impl SlackClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            session: Mutex::new(None),
            next_frame_id: AtomicU64::new(1),
        })
    }

    /// Start an RTM session. Returns the websocket URL.
    pub async fn rtm_connect(&self) -> Result<String, PlatformError> {
        let response: RtmConnect = self.get("rtm.connect", &[]).await?;
        Ok(response.url)
    }

    pub async fn attach_session(&self, outbound: mpsc::Sender<String>) {
        *self.session.lock().await = Some(outbound);
    }

    pub async fn detach_session(&self) {
        *self.session.lock().await = None;
    }

    /// Post plain text. Used by the log layer, which must not log failures.
    pub async fn post_text(&self, channel: &str, text: &str) -> Result<(), PlatformError> {
        self.post_message(&OutgoingMessage::new(channel, text))
            .await
            .map(|_| ())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let request = self
            .http
            .get(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.token)
            .query(query);
        self.call(method, request).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: &Value,
    ) -> Result<T, PlatformError> {
        let request = self
            .http
            .post(format!("{}/{}", self.api_base, method))
            .bearer_auth(&self.token)
            .json(payload);
        self.call(method, request).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PlatformError> {
        debug!("slack {}", method);
        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Api {
                method,
                error: format!("{status}: {body}"),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Parse(e.to_string()))?;
        parse_envelope(method, body)
    }
}

/// Check Slack's `ok` flag and decode the rest of the body.
fn parse_envelope<T: DeserializeOwned>(method: &'static str, body: Value) -> Result<T, PlatformError> {
    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(PlatformError::Api { method, error });
    }
    serde_json::from_value(body).map_err(|e| PlatformError::Parse(format!("{method}: {e}")))
}

fn message_payload(message: &OutgoingMessage) -> Value {
    let mut payload = json!({
        "channel": message.channel,
        "text": message.text,
        "unfurl_links": message.unfurl_links,
    });
    if let Some(ref thread_ts) = message.thread_ts {
        payload["thread_ts"] = Value::String(thread_ts.clone());
    }
    if let Some(ref image) = message.image {
        payload["blocks"] = json!([{
            "type": "image",
            "image_url": image.image_url,
            "alt_text": image.alt_text,
        }]);
    }
    if let Some(ref username) = message.username {
        payload["username"] = Value::String(username.clone());
    }
    if let Some(ref icon_emoji) = message.icon_emoji {
        payload["icon_emoji"] = Value::String(format!(":{}:", icon_emoji.trim_matches(':')));
    }
    payload
}

impl ChatPlatform for SlackClient {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<MessageRef, PlatformError> {
        let posted: PostedMessage = self
            .post("chat.postMessage", &message_payload(message))
            .await?;
        Ok(MessageRef {
            channel: posted.channel,
            ts: posted.ts,
        })
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), PlatformError> {
        let mut payload = json!({ "channel": channel, "user": user, "text": text });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }
        let _: Value = self.post("chat.postEphemeral", &payload).await?;
        Ok(())
    }

    async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<(), PlatformError> {
        let payload = json!({ "channel": channel, "timestamp": ts, "name": name });
        let _: Value = self.post("reactions.add", &payload).await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), PlatformError> {
        let payload = json!({ "channel": channel, "timestamp": ts, "name": name });
        let _: Value = self.post("reactions.remove", &payload).await?;
        Ok(())
    }

    async fn get_permalink(&self, channel: &str, ts: &str) -> Result<String, PlatformError> {
        let response: Permalink = self
            .get("chat.getPermalink", &[("channel", channel), ("message_ts", ts)])
            .await?;
        Ok(response.permalink)
    }

    async fn list_reactions(
        &self,
        channel: &str,
        ts: &str,
    ) -> Result<Vec<ReactionSummary>, PlatformError> {
        let response: ReactionsGet = self
            .get(
                "reactions.get",
                &[("channel", channel), ("timestamp", ts), ("full", "true")],
            )
            .await?;
        Ok(response
            .message
            .map(|m| m.reactions)
            .unwrap_or_default()
            .into_iter()
            .map(|r| ReactionSummary {
                name: r.name,
                users: r.users,
            })
            .collect())
    }

    async fn user_info(&self, user: &str) -> Result<UserInfo, PlatformError> {
        let response: UsersInfo = self.get("users.info", &[("user", user)]).await?;
        Ok(UserInfo {
            is_bot: response.user.is_bot,
        })
    }

    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, PlatformError> {
        let response: ConversationsInfo = self
            .get("conversations.info", &[("channel", channel)])
            .await?;
        Ok(ChannelInfo {
            // Unknown privacy is treated as private.
            is_private: response.channel.is_private.unwrap_or(true),
            is_im: response.channel.is_im,
        })
    }

    async fn own_identity(&self) -> Result<String, PlatformError> {
        let response: AuthTest = self.get("auth.test", &[]).await?;
        Ok(response.user_id)
    }

    async fn send_typing(&self, channel: &str) -> Result<(), PlatformError> {
        let outbound = self
            .session
            .lock()
            .await
            .clone()
            .ok_or(PlatformError::Disconnected)?;
        let id = self.next_frame_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({ "id": id, "type": "typing", "channel": channel }).to_string();
        outbound
            .send(frame)
            .await
            .map_err(|_| PlatformError::Disconnected)
    }
}
