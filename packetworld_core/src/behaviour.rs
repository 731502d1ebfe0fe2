//! Behaviour hooks: the decision-making half of an actor.
//!
//! The kernel owns the phase machine; a [`Behaviour`] only answers the
//! question each phase asks. Each hook returns that phase's result, so a
//! phase always yields exactly one outcome.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use packetworld_env::{ActorId, AgentState, Coordinate, Influence, Mail, MailBuffer, Perception};

use crate::outcome::CommToken;

/// Default number of memory fragments an actor may hold.
pub const DEFAULT_MEMORY: usize = 10;

/// Bounded key/value memory.
#[derive(Debug, Clone)]
pub struct Memory {
    capacity: usize,
    fragments: BTreeMap<String, String>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY)
    }
}

impl Memory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            fragments: BTreeMap::new(),
        }
    }

    /// Stores a fragment. Overwriting an existing key always succeeds; a new
    /// key is refused once the memory is full.
    pub fn remember(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if !self.fragments.contains_key(&key) && self.fragments.len() >= self.capacity {
            return false;
        }
        self.fragments.insert(key, value.into());
        true
    }

    pub fn recall(&self, key: &str) -> Option<&str> {
        self.fragments.get(key).map(String::as_str)
    }

    pub fn forget(&mut self, key: &str) -> Option<String> {
        self.fragments.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

/// What a behaviour can see and keep during a phase.
pub struct Context<'a> {
    pub id: ActorId,
    pub name: &'a str,

    /// World tick at the start of the phase.
    pub time: u64,

    /// Latest perception snapshot.
    pub perception: &'a Perception,

    /// The actor's body, for agents.
    pub state: Option<&'a AgentState>,

    pub memory: &'a mut Memory,

    /// Received mail not yet consumed by the behaviour.
    pub messages: &'a mut Vec<Mail>,
}

impl Context<'_> {
    pub fn position(&self) -> Coordinate {
        self.perception.position
    }

    pub fn is_carrying(&self) -> bool {
        self.state.map_or(false, AgentState::is_carrying)
    }
}

/// Context of a talk phase: a [`Context`] plus an outgoing buffer.
pub struct TalkContext<'a> {
    ctx: Context<'a>,
    outbox: &'a mut MailBuffer,
    peers: &'a [String],
}

impl<'a> TalkContext<'a> {
    pub fn new(ctx: Context<'a>, outbox: &'a mut MailBuffer, peers: &'a [String]) -> Self {
        Self { ctx, outbox, peers }
    }

    /// Queues a mail to the agent called `to`.
    pub fn send(&mut self, to: impl Into<String>, text: impl Into<String>) {
        let mail = Mail::new(self.ctx.name, to, text);
        self.outbox.push(mail);
    }

    /// Queues the same mail to every other agent.
    pub fn broadcast(&mut self, text: impl Into<String>) {
        let text = text.into();
        for peer in self.peers {
            let mail = Mail::new(self.ctx.name, peer.as_str(), text.as_str());
            self.outbox.push(mail);
        }
    }

    /// Names of the other agents currently registered.
    pub fn peers(&self) -> &[String] {
        self.peers
    }
}

impl<'a> Deref for TalkContext<'a> {
    type Target = Context<'a>;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl DerefMut for TalkContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}

/// Decision strategy of an agent or active item.
pub trait Behaviour: Send + 'static {
    /// Called once per perceive phase, after the new snapshot is taken.
    fn on_perceive(&mut self, _ctx: &mut Context<'_>) {}

    /// Talk phase. Mail is written through `ctx`; the return value votes on
    /// whether the group may leave the talk phase.
    fn on_communicate(&mut self, ctx: &mut TalkContext<'_>) -> CommToken;

    /// Act phase. The returned influence is submitted on the actor's behalf.
    fn on_act(&mut self, ctx: &mut Context<'_>) -> Influence;

    /// Called once when the actor stops.
    fn on_stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_capacity() {
        let mut m = Memory::new(2);
        assert!(m.remember("a", "1"));
        assert!(m.remember("b", "2"));
        assert!(!m.remember("c", "3"));
        assert!(m.remember("a", "4"));
        assert_eq!(m.recall("a"), Some("4"));
        assert_eq!(m.forget("b").as_deref(), Some("2"));
        assert!(m.remember("c", "3"));
    }

    #[test]
    fn test_talk_context_buffers_mail() {
        let perception = Perception::blind(ActorId(1), Coordinate::new(0, 0), 0);
        let mut memory = Memory::default();
        let mut messages = Vec::new();
        let mut outbox = MailBuffer::new();
        let peers = vec!["b".to_string(), "c".to_string()];

        let ctx = Context {
            id: ActorId(1),
            name: "a",
            time: 0,
            perception: &perception,
            state: None,
            memory: &mut memory,
            messages: &mut messages,
        };
        let mut talk = TalkContext::new(ctx, &mut outbox, &peers);
        talk.send("b", "hello");
        talk.broadcast("all");
        talk.memory.remember("k", "v");
        drop(talk);

        assert_eq!(outbox.len(), 3);
        assert_eq!(memory.recall("k"), Some("v"));
    }
}
