//! Glue between core types and the serenity gateway/REST API.

use serenity::{
    all::{ActivityData, Colour, CreateEmbed, CreateEmbedFooter, OnlineStatus, ShardMessenger},
    builder::CreateMessage,
};
use statusbot_core::{
    error::PresenceError,
    presence::{Presence, PresenceSink, PresenceState},
    Reply, Tone,
};

/// Presence sink bound to one gateway session.
pub struct GatewayPresence {
    shard: ShardMessenger,
}

impl GatewayPresence {
    pub fn new(shard: ShardMessenger) -> Self {
        Self { shard }
    }
}

impl PresenceSink for GatewayPresence {
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn push(&self, presence: &Presence) -> Result<(), PresenceError> {
        // Queued on the shard runner; delivery failures surface as a lost session.
        self.shard.set_presence(
            Some(ActivityData::custom(presence.text.clone())),
            online_status(presence.state),
        );
        Ok(())
    }
}

fn online_status(state: PresenceState) -> OnlineStatus {
    match state {
        PresenceState::Idle => OnlineStatus::Idle,
        PresenceState::Busy => OnlineStatus::DoNotDisturb,
        PresenceState::Online => OnlineStatus::Online,
    }
}

fn colour(tone: Tone) -> Colour {
    match tone {
        Tone::Success => Colour::DARK_GREEN,
        Tone::Info => Colour::BLUE,
        Tone::Notice => Colour::PURPLE,
        Tone::Warning => Colour::ORANGE,
        Tone::Error => Colour::RED,
    }
}

pub fn embed(reply: &Reply) -> CreateEmbed {
    let mut embed = CreateEmbed::new().title(&reply.title).colour(colour(reply.tone));
    if !reply.description.is_empty() {
        embed = embed.description(&reply.description);
    }
    for (name, value) in &reply.fields {
        embed = embed.field(name, value, false);
    }
    if let Some(footer) = &reply.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    embed
}

pub fn message(reply: &Reply) -> CreateMessage {
    CreateMessage::new().embed(embed(reply))
}
