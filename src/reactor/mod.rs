//! Reactor module - reacts to Slack events with emoji, reposts and parrots.

pub mod corrector;
pub mod engine;
pub mod event;
pub mod identity;
pub mod parrot;
pub mod platform;
pub mod repost;
pub mod rtm;
pub mod slack;
pub mod triggers;


pub use engine::{Reactor, ReactorConfig};
pub use slack::SlackClient;
