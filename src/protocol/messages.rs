//! Message type catalogue shared by server and client trackers

use crate::connection::{Connection, DeliveryClass, MessageId};
use crate::core::ReportKind;
use crate::error::{Error, Result};

pub const POSE: &str = "tracker.pose";
pub const VELOCITY: &str = "tracker.velocity";
pub const ACCELERATION: &str = "tracker.acceleration";
pub const TRACKER2ROOM: &str = "tracker.tracker2room";
pub const UNIT2SENSOR: &str = "tracker.unit2sensor";
pub const WORKSPACE: &str = "tracker.workspace";
pub const REQUEST_TRACKER2ROOM: &str = "tracker.request.tracker2room";
pub const REQUEST_UNIT2SENSOR: &str = "tracker.request.unit2sensor";
pub const REQUEST_WORKSPACE: &str = "tracker.request.workspace";
pub const UPDATE_RATE: &str = "tracker.update_rate";

/// Client-to-server requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Tracker2Room,
    Unit2Sensor,
    Workspace,
    UpdateRate,
}

/// Connection-local ids for every tracker message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageIds {
    pub pose: MessageId,
    pub velocity: MessageId,
    pub acceleration: MessageId,
    pub tracker2room: MessageId,
    pub unit2sensor: MessageId,
    pub workspace: MessageId,
    pub request_tracker2room: MessageId,
    pub request_unit2sensor: MessageId,
    pub request_workspace: MessageId,
    pub update_rate: MessageId,
}

impl MessageIds {
    /// Register every tracker message type with the connection
    pub fn register<N: Connection + ?Sized>(connection: &mut N) -> Result<Self> {
        Ok(Self {
            pose: connection.register_message_type(POSE)?,
            velocity: connection.register_message_type(VELOCITY)?,
            acceleration: connection.register_message_type(ACCELERATION)?,
            tracker2room: connection.register_message_type(TRACKER2ROOM)?,
            unit2sensor: connection.register_message_type(UNIT2SENSOR)?,
            workspace: connection.register_message_type(WORKSPACE)?,
            request_tracker2room: connection.register_message_type(REQUEST_TRACKER2ROOM)?,
            request_unit2sensor: connection.register_message_type(REQUEST_UNIT2SENSOR)?,
            request_workspace: connection.register_message_type(REQUEST_WORKSPACE)?,
            update_rate: connection.register_message_type(UPDATE_RATE)?,
        })
    }

    /// Message id carrying reports of `kind`
    pub fn for_kind(&self, kind: ReportKind) -> MessageId {
        match kind {
            ReportKind::Pose => self.pose,
            ReportKind::Velocity => self.velocity,
            ReportKind::Acceleration => self.acceleration,
            ReportKind::Tracker2Room => self.tracker2room,
            ReportKind::Unit2Sensor => self.unit2sensor,
            ReportKind::Workspace => self.workspace,
        }
    }

    /// Report kind carried by `id`, if it is a report message
    pub fn kind_of(&self, id: MessageId) -> Option<ReportKind> {
        ReportKind::ALL.into_iter().find(|&k| self.for_kind(k) == id)
    }

    /// Request carried by `id`, if it is a request message
    pub fn request_of(&self, id: MessageId) -> Option<Request> {
        if id == self.request_tracker2room {
            Some(Request::Tracker2Room)
        } else if id == self.request_unit2sensor {
            Some(Request::Unit2Sensor)
        } else if id == self.request_workspace {
            Some(Request::Workspace)
        } else if id == self.update_rate {
            Some(Request::UpdateRate)
        } else {
            None
        }
    }

    /// Message id for `request`
    pub fn for_request(&self, request: Request) -> MessageId {
        match request {
            Request::Tracker2Room => self.request_tracker2room,
            Request::Unit2Sensor => self.request_unit2sensor,
            Request::Workspace => self.request_workspace,
            Request::UpdateRate => self.update_rate,
        }
    }
}

/// Streaming motion data tolerates loss; transforms and workspace do not
pub fn delivery_class(kind: ReportKind) -> DeliveryClass {
    match kind {
        ReportKind::Pose | ReportKind::Velocity | ReportKind::Acceleration => {
            DeliveryClass::LowLatency
        }
        ReportKind::Tracker2Room | ReportKind::Unit2Sensor | ReportKind::Workspace => {
            DeliveryClass::Reliable
        }
    }
}

/// Update-rate request payload: one big-endian f64 (Hz)
pub fn encode_update_rate(hz: f64) -> [u8; 8] {
    hz.to_be_bytes()
}

pub fn decode_update_rate(payload: &[u8]) -> Result<f64> {
    let bytes: [u8; 8] = payload.try_into().map_err(|_| {
        Error::MalformedMessage(format!(
            "update rate payload is {} bytes, expected 8",
            payload.len()
        ))
    })?;
    Ok(f64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LoopbackConnection;

    #[test]
    fn test_register_assigns_distinct_ids() {
        let (mut conn, _) = LoopbackConnection::pair();
        let ids = MessageIds::register(&mut conn).unwrap();
        let all = [
            ids.pose,
            ids.velocity,
            ids.acceleration,
            ids.tracker2room,
            ids.unit2sensor,
            ids.workspace,
            ids.request_tracker2room,
            ids.request_unit2sensor,
            ids.request_workspace,
            ids.update_rate,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
        // Registration is idempotent per connection
        assert_eq!(MessageIds::register(&mut conn).unwrap(), ids);
    }

    #[test]
    fn test_kind_and_request_lookup() {
        let (mut conn, _) = LoopbackConnection::pair();
        let ids = MessageIds::register(&mut conn).unwrap();
        for kind in ReportKind::ALL {
            assert_eq!(ids.kind_of(ids.for_kind(kind)), Some(kind));
            assert_eq!(ids.request_of(ids.for_kind(kind)), None);
        }
        for request in [
            Request::Tracker2Room,
            Request::Unit2Sensor,
            Request::Workspace,
            Request::UpdateRate,
        ] {
            assert_eq!(ids.request_of(ids.for_request(request)), Some(request));
            assert_eq!(ids.kind_of(ids.for_request(request)), None);
        }
    }

    #[test]
    fn test_update_rate_payload() {
        let payload = encode_update_rate(60.0);
        assert_eq!(decode_update_rate(&payload).unwrap(), 60.0);
        assert!(matches!(
            decode_update_rate(&payload[..4]),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_delivery_class_by_kind() {
        assert_eq!(delivery_class(ReportKind::Pose), DeliveryClass::LowLatency);
        assert_eq!(delivery_class(ReportKind::Workspace), DeliveryClass::Reliable);
    }
}
