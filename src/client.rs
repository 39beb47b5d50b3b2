//! Client-side tracker proxy
//!
//! [`TrackerRemote`] decodes report messages from a connection, mirrors them
//! into a local [`DeviceState`] and fans them out through a shared
//! [`SubscriptionRegistry`]. Handlers receive a clone of the context they were
//! registered with; a handler that needs to change subscriptions can hold the
//! [`SharedRegistry`] handle returned by [`TrackerRemote::registry`].

use crate::connection::{Connection, DeliveryClass, SenderId};
use crate::core::{DeviceState, Report, SensorSlot, TrackerStatus, current_timestamp_us};
use crate::error::Result;
use crate::protocol::messages::encode_update_rate;
use crate::protocol::{MessageIds, Request, decode_kind};
use crate::registry::{Handler, SharedRegistry, SubscriptionRegistry, dispatch_shared};
use std::sync::Arc;

pub struct TrackerRemote<C, N: Connection> {
    connection: N,
    ids: MessageIds,
    sender: SenderId,
    registry: SharedRegistry<C>,
    state: DeviceState,
    dropped: u64,
}

impl<C: Clone + PartialEq, N: Connection> TrackerRemote<C, N> {
    /// Attach to the tracker called `name` on `connection`
    pub fn new(name: &str, mut connection: N) -> Result<Self> {
        let ids = MessageIds::register(&mut connection)?;
        let sender = connection.register_sender(name)?;
        Ok(Self {
            connection,
            ids,
            sender,
            registry: SubscriptionRegistry::shared(),
            state: DeviceState::default(),
            dropped: 0,
        })
    }

    /// Shared handle to the handler registry
    pub fn registry(&self) -> SharedRegistry<C> {
        Arc::clone(&self.registry)
    }

    /// Latest reports and transforms received so far
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Malformed messages discarded since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn register_handler(&self, slot: SensorSlot, context: C, handler: Handler<C>) {
        self.registry.lock().register(slot, context, handler);
    }

    pub fn unregister_handler(&self, slot: SensorSlot, context: &C, handler: Handler<C>) -> Result<()> {
        self.registry.lock().unregister(slot, context, handler)
    }

    /// Ask the server for its Tracker2Room transform
    pub fn request_t2r_xform(&mut self) -> Result<()> {
        self.send_request(Request::Tracker2Room, &[])
    }

    /// Ask the server for every sensor's Unit2Sensor transform
    pub fn request_u2s_xform(&mut self) -> Result<()> {
        self.send_request(Request::Unit2Sensor, &[])
    }

    /// Ask the server for its workspace box
    pub fn request_workspace(&mut self) -> Result<()> {
        self.send_request(Request::Workspace, &[])
    }

    /// Ask the server to report at `hz`
    pub fn set_update_rate(&mut self, hz: f64) -> Result<()> {
        self.send_request(Request::UpdateRate, &encode_update_rate(hz))
    }

    fn send_request(&mut self, request: Request, payload: &[u8]) -> Result<()> {
        self.connection.send(
            self.ids.for_request(request),
            self.sender,
            current_timestamp_us(),
            payload,
            DeliveryClass::Reliable,
        )
    }

    /// Receive, decode and dispatch everything waiting on the connection.
    /// Returns the number of handler invocations.
    pub fn poll(&mut self) -> Result<usize> {
        let mut invoked = 0;
        while let Some(envelope) = self.connection.receive()? {
            let Some(kind) = self.ids.kind_of(envelope.message) else {
                log::trace!("Ignoring non-report message {:?}", envelope.message);
                continue;
            };
            let report = match decode_kind(&envelope.payload, kind) {
                Ok(report) => report,
                Err(e) => {
                    self.dropped += 1;
                    log::warn!("Dropping malformed {} message: {}", kind, e);
                    continue;
                }
            };
            invoked += self.deliver(&report);
        }
        Ok(invoked)
    }

    fn deliver(&mut self, report: &Report) -> usize {
        self.state.record(report);
        self.state.set_status(TrackerStatus::ReportReady);
        let invoked = dispatch_shared(&self.registry, report);
        self.state.mark_consumed();
        invoked
    }
}
