//! RTM websocket session: connect, decode events, feed the reactor one at a
//! time, reconnect when the server goes away.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::reactor::engine::Reactor;
use crate::reactor::event::{EmojiChange, InboundEvent, MessageEvent, ReactionEvent};
use crate::reactor::platform::PlatformError;
use crate::reactor::slack::SlackClient;

/// Outbound frames (typing indicators) waiting to go out.
const OUTBOUND_BUFFER: usize = 16;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RtmEvent {
    Message {
        channel: Option<String>,
        user: Option<String>,
        text: Option<String>,
        ts: Option<String>,
        thread_ts: Option<String>,
        subtype: Option<String>,
        message: Option<InnerMessage>,
    },
    ReactionAdded(RtmReaction),
    ReactionRemoved(RtmReaction),
    UserTyping {
        channel: String,
        user: String,
    },
    EmojiChanged {
        subtype: Option<String>,
        name: Option<String>,
        #[serde(default)]
        names: Vec<String>,
    },
    ChannelCreated {
        channel: CreatedChannel,
    },
    Hello {},
    Goodbye {},
    #[serde(other)]
    Other,
}

/// The message carried inside a `message_changed` event.
#[derive(Debug, Deserialize)]
struct InnerMessage {
    user: Option<String>,
    text: Option<String>,
    ts: String,
    thread_ts: Option<String>,
    /// Only set when a person edited the text; unfurls and reply counts leave it out.
    edited: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RtmReaction {
    user: String,
    reaction: String,
    item: ReactionItem,
    item_user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReactionItem {
    channel: Option<String>,
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedChannel {
    id: String,
    name: Option<String>,
}

/// Decode one text frame. Replies to our own frames and events we don't
/// react to come back as `None`.
fn parse_frame(text: &str) -> Result<Option<InboundEvent>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("type").is_none() {
        return Ok(None);
    }
    let event: RtmEvent = serde_json::from_value(value)?;
    Ok(into_inbound(event))
}

fn into_inbound(event: RtmEvent) -> Option<InboundEvent> {
    match event {
        RtmEvent::Message {
            channel,
            user,
            text,
            ts,
            thread_ts,
            subtype,
            message,
        } => {
            let channel = channel?;
            match subtype.as_deref() {
                Some("message_deleted") => None,
                Some("message_changed") => {
                    let inner = message?;
                    if inner.edited.is_none() {
                        return None;
                    }
                    Some(InboundEvent::Message(MessageEvent {
                        channel,
                        edited_reply: inner.thread_ts.is_some(),
                        ts: inner.ts,
                        thread_ts: inner.thread_ts,
                        user: inner.user,
                        text: inner.text.unwrap_or_default(),
                    }))
                }
                _ => Some(InboundEvent::Message(MessageEvent {
                    channel,
                    ts: ts?,
                    thread_ts,
                    user,
                    text: text.unwrap_or_default(),
                    edited_reply: false,
                })),
            }
        }
        RtmEvent::ReactionAdded(reaction) => reaction.into_event().map(InboundEvent::ReactionAdded),
        RtmEvent::ReactionRemoved(reaction) => {
            reaction.into_event().map(InboundEvent::ReactionRemoved)
        }
        RtmEvent::UserTyping { channel, user } => Some(InboundEvent::UserTyping { channel, user }),
        RtmEvent::EmojiChanged {
            subtype,
            name,
            names,
        } => {
            let change = match (subtype.as_deref(), name) {
                (Some("add"), Some(name)) => EmojiChange::Added { name },
                (Some("remove"), _) => EmojiChange::Removed { names },
                _ => EmojiChange::Other,
            };
            Some(InboundEvent::EmojiChanged(change))
        }
        RtmEvent::ChannelCreated { channel } => Some(InboundEvent::ChannelCreated {
            id: channel.id,
            name: channel.name,
        }),
        RtmEvent::Hello {} => Some(InboundEvent::Hello),
        RtmEvent::Goodbye {} => Some(InboundEvent::Goodbye),
        RtmEvent::Other => None,
    }
}

impl RtmReaction {
    /// Only reactions on messages carry a channel and ts.
    fn into_event(self) -> Option<ReactionEvent> {
        Some(ReactionEvent {
            user: self.user,
            reaction: self.reaction,
            channel: self.item.channel?,
            ts: self.item.ts?,
            item_user: self.item_user,
        })
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Run RTM sessions until Ctrl-C.
pub async fn run(client: Arc<SlackClient>, mut reactor: Reactor<SlackClient>, reconnect_delay: Duration) {
    loop {
        match client.rtm_connect().await {
            Ok(url) => match run_session(&client, &mut reactor, &url).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Shutdown requested");
                    return;
                }
                Ok(SessionEnd::Disconnected) => info!("RTM session ended"),
                Err(e) => warn!("RTM session error: {e}"),
            },
            Err(e) => warn!("Failed to open RTM session: {e}"),
        }
        client.detach_session().await;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return;
            }
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

async fn run_session(
    client: &SlackClient,
    reactor: &mut Reactor<SlackClient>,
    url: &str,
) -> Result<SessionEnd, PlatformError> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| PlatformError::Http(format!("websocket connect: {e}")))?;
    let (mut sink, mut source) = stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    client.attach_session(outbound_tx).await;
    info!("RTM socket connected");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(SessionEnd::Shutdown);
            }
            Some(frame) = outbound_rx.recv() => {
                sink.send(WsMessage::Text(frame.into()))
                    .await
                    .map_err(|e| PlatformError::Http(format!("websocket send: {e}")))?;
            }
            message = source.next() => {
                let Some(message) = message else {
                    return Ok(SessionEnd::Disconnected);
                };
                let message = message
                    .map_err(|e| PlatformError::Http(format!("websocket read: {e}")))?;
                let text = match message {
                    WsMessage::Text(text) => text.to_string(),
                    WsMessage::Close(_) => return Ok(SessionEnd::Disconnected),
                    _ => continue,
                };
                let event = match parse_frame(&text) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!("Undecodable RTM frame: {e}");
                        continue;
                    }
                };
                let goodbye = event == InboundEvent::Goodbye;
                reactor.handle(event).await;
                if goodbye {
                    return Ok(SessionEnd::Disconnected);
                }
            }
        }
    }
}
