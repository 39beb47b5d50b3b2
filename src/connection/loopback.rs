//! In-process connection pair

use super::{Connection, DeliveryClass, Envelope, MessageId, NameMap, SenderId, WireEnvelope};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Queue = Arc<Mutex<VecDeque<WireEnvelope>>>;

/// One end of an in-memory link. Messages sent on one end are received,
/// in order, on the other.
pub struct LoopbackConnection {
    names: NameMap,
    inbox: Queue,
    outbox: Queue,
}

impl LoopbackConnection {
    /// Create two connected endpoints
    pub fn pair() -> (Self, Self) {
        let a_to_b: Queue = Arc::new(Mutex::new(VecDeque::new()));
        let b_to_a: Queue = Arc::new(Mutex::new(VecDeque::new()));
        let a = Self {
            names: NameMap::default(),
            inbox: Arc::clone(&b_to_a),
            outbox: Arc::clone(&a_to_b),
        };
        let b = Self {
            names: NameMap::default(),
            inbox: a_to_b,
            outbox: b_to_a,
        };
        (a, b)
    }

    /// Messages waiting to be received on this end
    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }
}

impl Connection for LoopbackConnection {
    fn register_message_type(&mut self, name: &str) -> Result<MessageId> {
        Ok(self.names.register_type(name))
    }

    fn register_sender(&mut self, name: &str) -> Result<SenderId> {
        Ok(self.names.register_sender(name))
    }

    fn send(
        &mut self,
        message: MessageId,
        sender: SenderId,
        timestamp_us: u64,
        payload: &[u8],
        class: DeliveryClass,
    ) -> Result<()> {
        let wire = self
            .names
            .outgoing(message, sender, timestamp_us, payload, class)?;
        self.outbox.lock().push_back(wire);
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Envelope>> {
        let wire = self.inbox.lock().pop_front();
        Ok(wire.map(|w| self.names.incoming(w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_order() {
        let (mut a, mut b) = LoopbackConnection::pair();
        let msg = a.register_message_type("tracker.pose").unwrap();
        let sender = a.register_sender("Tracker0").unwrap();

        for i in 0..3u8 {
            a.send(msg, sender, i as u64, &[i], DeliveryClass::LowLatency)
                .unwrap();
        }
        assert_eq!(b.pending(), 3);

        let local = b.register_message_type("tracker.pose").unwrap();
        for i in 0..3u8 {
            let envelope = b.receive().unwrap().unwrap();
            assert_eq!(envelope.message, local);
            assert_eq!(envelope.payload, vec![i]);
        }
        assert!(b.receive().unwrap().is_none());
    }

    #[test]
    fn test_directions_are_independent() {
        let (mut a, mut b) = LoopbackConnection::pair();
        let msg = b.register_message_type("tracker.request.workspace").unwrap();
        let sender = b.register_sender("client").unwrap();
        b.send(msg, sender, 0, &[], DeliveryClass::Reliable).unwrap();

        assert!(b.receive().unwrap().is_none());
        let envelope = a.receive().unwrap().unwrap();
        assert_eq!(envelope.class, DeliveryClass::Reliable);
    }
}
