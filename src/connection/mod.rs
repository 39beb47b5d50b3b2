//! Message connection abstraction
//!
//! A [`Connection`] moves typed, timestamped messages between a tracker server
//! and its clients. Message types and senders are registered by name; ids are
//! local to each endpoint, so the envelope that crosses the link carries names
//! and each side maps them back to its own ids on arrival.
//!
//! Implementations:
//! - [`LoopbackConnection`]: in-process pair, for tests and embedding
//! - [`TcpConnection`]: length-prefixed frames over a non-blocking TCP stream

mod loopback;
mod tcp;
pub mod wire;

pub use loopback::LoopbackConnection;
pub use tcp::{MAX_PENDING_WRITE, TcpConnection};
pub use wire::{Serializer, WireEnvelope, WireFormat};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection-local message type id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u32);

/// Connection-local sender id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(pub u32);

/// How urgently a message must arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryClass {
    /// Must not be lost (transforms, requests)
    Reliable,
    /// Newer data supersedes older (pose, velocity, acceleration)
    LowLatency,
}

/// A received message, with ids mapped into this endpoint's tables
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender: SenderId,
    pub message: MessageId,
    pub timestamp_us: u64,
    pub class: DeliveryClass,
    pub payload: Vec<u8>,
}

/// Transport-facing interface consumed by trackers
pub trait Connection {
    /// Register (or look up) a message type by name
    fn register_message_type(&mut self, name: &str) -> Result<MessageId>;

    /// Register (or look up) a sender by name
    fn register_sender(&mut self, name: &str) -> Result<SenderId>;

    /// Queue one message for the peer
    fn send(
        &mut self,
        message: MessageId,
        sender: SenderId,
        timestamp_us: u64,
        payload: &[u8],
        class: DeliveryClass,
    ) -> Result<()>;

    /// Next received message, `Ok(None)` when nothing is waiting. Never blocks.
    fn receive(&mut self) -> Result<Option<Envelope>>;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn register_message_type(&mut self, name: &str) -> Result<MessageId> {
        (**self).register_message_type(name)
    }

    fn register_sender(&mut self, name: &str) -> Result<SenderId> {
        (**self).register_sender(name)
    }

    fn send(
        &mut self,
        message: MessageId,
        sender: SenderId,
        timestamp_us: u64,
        payload: &[u8],
        class: DeliveryClass,
    ) -> Result<()> {
        (**self).send(message, sender, timestamp_us, payload, class)
    }

    fn receive(&mut self) -> Result<Option<Envelope>> {
        (**self).receive()
    }
}

/// Bidirectional name ↔ id table
#[derive(Debug, Default)]
struct NameTable {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl NameTable {
    fn register(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    fn name(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }
}

/// Per-endpoint registrations for message types and senders
#[derive(Debug, Default)]
pub(crate) struct NameMap {
    types: NameTable,
    senders: NameTable,
}

impl NameMap {
    pub(crate) fn register_type(&mut self, name: &str) -> MessageId {
        MessageId(self.types.register(name))
    }

    pub(crate) fn register_sender(&mut self, name: &str) -> SenderId {
        SenderId(self.senders.register(name))
    }

    /// Translate local ids into a name-carrying envelope
    pub(crate) fn outgoing(
        &self,
        message: MessageId,
        sender: SenderId,
        timestamp_us: u64,
        payload: &[u8],
        class: DeliveryClass,
    ) -> Result<WireEnvelope> {
        let message_type = self
            .types
            .name(message.0)
            .ok_or_else(|| Error::UnknownMessageType(format!("id {}", message.0)))?;
        let sender = self
            .senders
            .name(sender.0)
            .ok_or_else(|| Error::Other(format!("Unknown sender id {}", sender.0)))?;
        Ok(WireEnvelope {
            sender: sender.to_string(),
            message_type: message_type.to_string(),
            timestamp_us,
            class,
            payload: payload.to_vec(),
        })
    }

    /// Map an arriving envelope into local ids, registering unseen names
    pub(crate) fn incoming(&mut self, wire: WireEnvelope) -> Envelope {
        Envelope {
            sender: self.register_sender(&wire.sender),
            message: self.register_type(&wire.message_type),
            timestamp_us: wire.timestamp_us,
            class: wire.class,
            payload: wire.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_table_is_idempotent() {
        let mut table = NameTable::default();
        let a = table.register("tracker.pose");
        let b = table.register("tracker.velocity");
        assert_ne!(a, b);
        assert_eq!(table.register("tracker.pose"), a);
        assert_eq!(table.name(b), Some("tracker.velocity"));
        assert_eq!(table.name(99), None);
    }

    #[test]
    fn test_name_map_translates_both_ways() {
        let mut server = NameMap::default();
        let msg = server.register_type("tracker.pose");
        let sender = server.register_sender("Tracker0");
        let wire = server
            .outgoing(msg, sender, 12, &[1, 2, 3], DeliveryClass::LowLatency)
            .unwrap();
        assert_eq!(wire.message_type, "tracker.pose");
        assert_eq!(wire.sender, "Tracker0");

        // Client registered a different type first, so ids differ
        let mut client = NameMap::default();
        client.register_type("tracker.workspace");
        let local_pose = client.register_type("tracker.pose");
        let envelope = client.incoming(wire);
        assert_eq!(envelope.message, local_pose);
        assert_eq!(envelope.payload, vec![1, 2, 3]);
        assert_eq!(envelope.timestamp_us, 12);
    }

    #[test]
    fn test_outgoing_unknown_id() {
        let map = NameMap::default();
        let result = map.outgoing(MessageId(3), SenderId(0), 0, &[], DeliveryClass::Reliable);
        assert!(matches!(result, Err(Error::UnknownMessageType(_))));
    }
}
