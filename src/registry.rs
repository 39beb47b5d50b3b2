//! Subscription registry and dispatcher
//!
//! For each of the six report kinds the registry keeps ordered handler lists.
//! Per-sensor kinds (pose, velocity, acceleration, unit2sensor) have
//! `MAX_SENSORS + 1` lists: one per sensor plus the ALL slot. Tracker2Room and
//! Workspace have a single list; the slot given at registration is ignored.
//!
//! Dispatch clones the relevant lists before invoking anything, so a handler
//! that registers or unregisters only affects later dispatches.

use crate::core::{
    AccelerationReport, MAX_SENSORS, PoseReport, Report, ReportKind, SensorIndex, SensorSlot,
    Tracker2RoomReport, Unit2SensorReport, VelocityReport, WorkspaceReport,
};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Registry handle shared between a client tracker and its handlers
pub type SharedRegistry<C> = Arc<Mutex<SubscriptionRegistry<C>>>;

/// Typed handler for one report kind
pub enum Handler<C> {
    Pose(fn(&C, &PoseReport)),
    Velocity(fn(&C, &VelocityReport)),
    Acceleration(fn(&C, &AccelerationReport)),
    Tracker2Room(fn(&C, &Tracker2RoomReport)),
    Unit2Sensor(fn(&C, &Unit2SensorReport)),
    Workspace(fn(&C, &WorkspaceReport)),
}

impl<C> Handler<C> {
    pub fn kind(&self) -> ReportKind {
        match self {
            Handler::Pose(_) => ReportKind::Pose,
            Handler::Velocity(_) => ReportKind::Velocity,
            Handler::Acceleration(_) => ReportKind::Acceleration,
            Handler::Tracker2Room(_) => ReportKind::Tracker2Room,
            Handler::Unit2Sensor(_) => ReportKind::Unit2Sensor,
            Handler::Workspace(_) => ReportKind::Workspace,
        }
    }
}

impl<C> Clone for Handler<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Handler<C> {}

impl<C> std::fmt::Debug for Handler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}

/// One (context, handler) registration
struct Subscription<C, T> {
    context: C,
    handler: fn(&C, &T),
}

impl<C: Clone, T> Clone for Subscription<C, T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            handler: self.handler,
        }
    }
}

impl<C: PartialEq, T> Subscription<C, T> {
    fn matches(&self, context: &C, handler: fn(&C, &T)) -> bool {
        self.context == *context && std::ptr::fn_addr_eq(self.handler, handler)
    }
}

/// Handler lists for one report kind
struct HandlerTable<C, T> {
    lists: Vec<Vec<Subscription<C, T>>>,
}

impl<C: Clone + PartialEq, T> HandlerTable<C, T> {
    fn per_sensor() -> Self {
        Self {
            lists: (0..=MAX_SENSORS).map(|_| Vec::new()).collect(),
        }
    }

    fn global() -> Self {
        Self {
            lists: vec![Vec::new()],
        }
    }

    fn index(&self, slot: SensorSlot) -> usize {
        if self.lists.len() == 1 { 0 } else { slot.slot() }
    }

    fn add(&mut self, slot: SensorSlot, context: C, handler: fn(&C, &T)) {
        let i = self.index(slot);
        self.lists[i].push(Subscription { context, handler });
    }

    fn remove(&mut self, slot: SensorSlot, context: &C, handler: fn(&C, &T)) -> Result<()> {
        let i = self.index(slot);
        let list = &mut self.lists[i];
        let position = list
            .iter()
            .position(|s| s.matches(context, handler))
            .ok_or(Error::HandlerNotFound)?;
        list.remove(position);
        Ok(())
    }

    fn len(&self, slot: SensorSlot) -> usize {
        self.lists[self.index(slot)].len()
    }

    fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Specific-sensor list followed by the ALL list (or the single global list)
    fn snapshot(&self, sensor: Option<SensorIndex>) -> Vec<Subscription<C, T>> {
        match sensor {
            Some(sensor) if self.lists.len() > 1 => self.lists[sensor.get()]
                .iter()
                .chain(self.lists[MAX_SENSORS].iter())
                .cloned()
                .collect(),
            _ => self.lists[0].to_vec(),
        }
    }
}

fn fire<C, T>(subscriptions: &[Subscription<C, T>], report: &T) -> usize {
    for s in subscriptions {
        (s.handler)(&s.context, report);
    }
    subscriptions.len()
}

/// Handlers captured for one report, ready to run without the registry
pub struct DispatchSnapshot<C> {
    pending: Pending<C>,
}

enum Pending<C> {
    Pose(Vec<Subscription<C, PoseReport>>),
    Velocity(Vec<Subscription<C, VelocityReport>>),
    Acceleration(Vec<Subscription<C, AccelerationReport>>),
    Tracker2Room(Vec<Subscription<C, Tracker2RoomReport>>),
    Unit2Sensor(Vec<Subscription<C, Unit2SensorReport>>),
    Workspace(Vec<Subscription<C, WorkspaceReport>>),
}

impl<C> DispatchSnapshot<C> {
    /// Number of handlers that will run
    pub fn len(&self) -> usize {
        match &self.pending {
            Pending::Pose(s) => s.len(),
            Pending::Velocity(s) => s.len(),
            Pending::Acceleration(s) => s.len(),
            Pending::Tracker2Room(s) => s.len(),
            Pending::Unit2Sensor(s) => s.len(),
            Pending::Workspace(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every captured handler in order, returning how many ran
    pub fn invoke(&self, report: &Report) -> usize {
        match (&self.pending, report) {
            (Pending::Pose(s), Report::Pose(r)) => fire(s, r),
            (Pending::Velocity(s), Report::Velocity(r)) => fire(s, r),
            (Pending::Acceleration(s), Report::Acceleration(r)) => fire(s, r),
            (Pending::Tracker2Room(s), Report::Tracker2Room(r)) => fire(s, r),
            (Pending::Unit2Sensor(s), Report::Unit2Sensor(r)) => fire(s, r),
            (Pending::Workspace(s), Report::Workspace(r)) => fire(s, r),
            _ => {
                log::warn!("Snapshot does not match {} report", report.kind());
                0
            }
        }
    }
}

/// Per-kind, per-sensor handler lists
pub struct SubscriptionRegistry<C> {
    pose: HandlerTable<C, PoseReport>,
    velocity: HandlerTable<C, VelocityReport>,
    acceleration: HandlerTable<C, AccelerationReport>,
    tracker2room: HandlerTable<C, Tracker2RoomReport>,
    unit2sensor: HandlerTable<C, Unit2SensorReport>,
    workspace: HandlerTable<C, WorkspaceReport>,
}

impl<C: Clone + PartialEq> SubscriptionRegistry<C> {
    pub fn new() -> Self {
        Self {
            pose: HandlerTable::per_sensor(),
            velocity: HandlerTable::per_sensor(),
            acceleration: HandlerTable::per_sensor(),
            tracker2room: HandlerTable::global(),
            unit2sensor: HandlerTable::per_sensor(),
            workspace: HandlerTable::global(),
        }
    }

    /// Wrap a new registry for sharing with handlers
    pub fn shared() -> SharedRegistry<C> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append a handler; it fires after every handler already registered for the slot
    pub fn register(&mut self, slot: SensorSlot, context: C, handler: Handler<C>) {
        log::trace!("Registering {:?} for {:?}", handler, slot);
        match handler {
            Handler::Pose(h) => self.pose.add(slot, context, h),
            Handler::Velocity(h) => self.velocity.add(slot, context, h),
            Handler::Acceleration(h) => self.acceleration.add(slot, context, h),
            Handler::Tracker2Room(h) => self.tracker2room.add(slot, context, h),
            Handler::Unit2Sensor(h) => self.unit2sensor.add(slot, context, h),
            Handler::Workspace(h) => self.workspace.add(slot, context, h),
        }
    }

    /// Register using a raw sensor number, where `MAX_SENSORS` means all sensors
    pub fn register_raw(&mut self, sensor: i64, context: C, handler: Handler<C>) -> Result<()> {
        let slot = SensorSlot::from_raw(sensor)?;
        self.register(slot, context, handler);
        Ok(())
    }

    /// Remove the first registration matching both context and handler
    ///
    /// Handlers are compared by function address. Rust does not promise one
    /// address per function: the same `fn` may get distinct addresses in
    /// different codegen units, and identical bodies may be merged. Pass the
    /// same `fn` item from the same crate that registered it, and give
    /// registrations distinct contexts when two handlers could be merged.
    pub fn unregister(&mut self, slot: SensorSlot, context: &C, handler: Handler<C>) -> Result<()> {
        match handler {
            Handler::Pose(h) => self.pose.remove(slot, context, h),
            Handler::Velocity(h) => self.velocity.remove(slot, context, h),
            Handler::Acceleration(h) => self.acceleration.remove(slot, context, h),
            Handler::Tracker2Room(h) => self.tracker2room.remove(slot, context, h),
            Handler::Unit2Sensor(h) => self.unit2sensor.remove(slot, context, h),
            Handler::Workspace(h) => self.workspace.remove(slot, context, h),
        }
    }

    pub fn unregister_raw(&mut self, sensor: i64, context: &C, handler: Handler<C>) -> Result<()> {
        let slot = SensorSlot::from_raw(sensor)?;
        self.unregister(slot, context, handler)
    }

    /// Handlers registered under exactly this key
    pub fn handler_count(&self, kind: ReportKind, slot: SensorSlot) -> usize {
        match kind {
            ReportKind::Pose => self.pose.len(slot),
            ReportKind::Velocity => self.velocity.len(slot),
            ReportKind::Acceleration => self.acceleration.len(slot),
            ReportKind::Tracker2Room => self.tracker2room.len(slot),
            ReportKind::Unit2Sensor => self.unit2sensor.len(slot),
            ReportKind::Workspace => self.workspace.len(slot),
        }
    }

    /// Total registrations across all kinds and slots
    pub fn len(&self) -> usize {
        self.pose.total()
            + self.velocity.total()
            + self.acceleration.total()
            + self.tracker2room.total()
            + self.unit2sensor.total()
            + self.workspace.total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capture the handlers that a dispatch of `report` would run
    pub fn snapshot(&self, report: &Report) -> DispatchSnapshot<C> {
        let sensor = report.sensor();
        let pending = match report {
            Report::Pose(_) => Pending::Pose(self.pose.snapshot(sensor)),
            Report::Velocity(_) => Pending::Velocity(self.velocity.snapshot(sensor)),
            Report::Acceleration(_) => Pending::Acceleration(self.acceleration.snapshot(sensor)),
            Report::Tracker2Room(_) => Pending::Tracker2Room(self.tracker2room.snapshot(None)),
            Report::Unit2Sensor(_) => Pending::Unit2Sensor(self.unit2sensor.snapshot(sensor)),
            Report::Workspace(_) => Pending::Workspace(self.workspace.snapshot(None)),
        };
        DispatchSnapshot { pending }
    }

    /// Invoke the sensor's handlers, then the ALL handlers, in registration order
    pub fn dispatch(&self, report: &Report) -> usize {
        self.snapshot(report).invoke(report)
    }
}

impl<C: Clone + PartialEq> Default for SubscriptionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch through a shared handle. The lock is held only while taking the
/// snapshot, so handlers may register and unregister on the same registry.
pub fn dispatch_shared<C: Clone + PartialEq>(registry: &SharedRegistry<C>, report: &Report) -> usize {
    let snapshot = registry.lock().snapshot(report);
    snapshot.invoke(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    thread_local! {
        static CALLS: RefCell<Vec<(&'static str, u32, usize)>> = const { RefCell::new(Vec::new()) };
        static SHARED: RefCell<Option<SharedRegistry<u32>>> = const { RefCell::new(None) };
    }

    fn log_call(name: &'static str, ctx: u32, sensor: usize) {
        CALLS.with(|c| c.borrow_mut().push((name, ctx, sensor)));
    }

    fn take_calls() -> Vec<(&'static str, u32, usize)> {
        CALLS.with(|c| std::mem::take(&mut *c.borrow_mut()))
    }

    fn h1(ctx: &u32, r: &PoseReport) {
        log_call("h1", *ctx, r.sensor.get());
    }

    fn h2(ctx: &u32, r: &PoseReport) {
        log_call("h2", *ctx, r.sensor.get());
    }

    fn on_workspace(ctx: &u32, _r: &WorkspaceReport) {
        log_call("workspace", *ctx, 0);
    }

    fn on_t2r(ctx: &u32, _r: &Tracker2RoomReport) {
        log_call("t2r", *ctx, 0);
    }

    fn on_velocity(ctx: &u32, r: &VelocityReport) {
        log_call("velocity", *ctx, r.sensor.get());
    }

    fn sensor(n: usize) -> SensorIndex {
        SensorIndex::new(n).unwrap()
    }

    fn slot(n: usize) -> SensorSlot {
        SensorSlot::Sensor(sensor(n))
    }

    fn pose(n: usize) -> Report {
        Report::Pose(PoseReport::identity(sensor(n), 0))
    }

    #[test]
    fn test_sensor_then_all_order() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(slot(3), 1u32, Handler::Pose(h1));

        assert_eq!(registry.dispatch(&pose(3)), 1);
        assert_eq!(take_calls(), vec![("h1", 1, 3)]);

        assert_eq!(registry.dispatch(&pose(4)), 0);
        assert!(take_calls().is_empty());

        registry.register(SensorSlot::All, 2u32, Handler::Pose(h2));
        assert_eq!(registry.dispatch(&pose(3)), 2);
        assert_eq!(take_calls(), vec![("h1", 1, 3), ("h2", 2, 3)]);

        assert_eq!(registry.dispatch(&pose(4)), 1);
        assert_eq!(take_calls(), vec![("h2", 2, 4)]);
    }

    #[test]
    fn test_all_registered_first_still_runs_after_sensor_list() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(SensorSlot::All, 2u32, Handler::Pose(h2));
        registry.register(slot(0), 1u32, Handler::Pose(h1));

        registry.dispatch(&pose(0));
        assert_eq!(take_calls(), vec![("h1", 1, 0), ("h2", 2, 0)]);
    }

    #[test]
    fn test_duplicates_fire_independently() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(slot(1), 7u32, Handler::Pose(h1));
        registry.register(slot(1), 7u32, Handler::Pose(h1));
        assert_eq!(registry.handler_count(ReportKind::Pose, slot(1)), 2);

        assert_eq!(registry.dispatch(&pose(1)), 2);
        assert_eq!(take_calls(), vec![("h1", 7, 1), ("h1", 7, 1)]);

        registry
            .unregister(slot(1), &7, Handler::Pose(h1))
            .unwrap();
        assert_eq!(registry.dispatch(&pose(1)), 1);
        take_calls();
    }

    #[test]
    fn test_unregister_removes_first_match_only() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(slot(2), 1u32, Handler::Pose(h1));
        registry.register(slot(2), 2u32, Handler::Pose(h1));
        registry.register(slot(2), 1u32, Handler::Pose(h2));
        registry.register(slot(2), 1u32, Handler::Pose(h1));

        registry
            .unregister(slot(2), &1, Handler::Pose(h1))
            .unwrap();
        registry.dispatch(&pose(2));
        assert_eq!(
            take_calls(),
            vec![("h1", 2, 2), ("h2", 1, 2), ("h1", 1, 2)]
        );
    }

    #[test]
    fn test_unregister_missing_handler() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(slot(2), 1u32, Handler::Pose(h1));

        // Wrong slot, wrong context, wrong handler
        for (s, ctx, handler) in [
            (slot(3), 1u32, Handler::Pose(h1)),
            (SensorSlot::All, 1u32, Handler::Pose(h1)),
            (slot(2), 9u32, Handler::Pose(h1)),
            (slot(2), 1u32, Handler::Pose(h2)),
        ] {
            assert!(matches!(
                registry.unregister(s, &ctx, handler),
                Err(Error::HandlerNotFound)
            ));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_raw_sensor_bounds() {
        let mut registry = SubscriptionRegistry::new();
        registry
            .register_raw(MAX_SENSORS as i64, 1u32, Handler::Pose(h1))
            .unwrap();
        assert_eq!(registry.handler_count(ReportKind::Pose, SensorSlot::All), 1);
        registry
            .register_raw(0, 1u32, Handler::Pose(h1))
            .unwrap();

        for bad in [-1i64, MAX_SENSORS as i64 + 1] {
            assert!(matches!(
                registry.register_raw(bad, 1u32, Handler::Pose(h1)),
                Err(Error::InvalidSensorIndex(_))
            ));
            assert!(matches!(
                registry.unregister_raw(bad, &1u32, Handler::Pose(h1)),
                Err(Error::InvalidSensorIndex(_))
            ));
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_global_kinds_share_one_list() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(slot(5), 1u32, Handler::Workspace(on_workspace));
        registry.register(SensorSlot::All, 2u32, Handler::Workspace(on_workspace));
        registry.register(slot(0), 3u32, Handler::Tracker2Room(on_t2r));

        assert_eq!(registry.handler_count(ReportKind::Workspace, slot(11)), 2);
        assert_eq!(
            registry.dispatch(&Report::Workspace(WorkspaceReport::empty(0))),
            2
        );
        assert_eq!(
            registry.dispatch(&Report::Tracker2Room(Tracker2RoomReport::identity(0))),
            1
        );
        assert_eq!(
            take_calls(),
            vec![("workspace", 1, 0), ("workspace", 2, 0), ("t2r", 3, 0)]
        );

        // Removal ignores the slot as well
        registry
            .unregister(slot(19), &1, Handler::Workspace(on_workspace))
            .unwrap();
        assert_eq!(registry.handler_count(ReportKind::Workspace, SensorSlot::All), 1);
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut registry = SubscriptionRegistry::new();
        registry.register(SensorSlot::All, 1u32, Handler::Pose(h1));
        registry.register(SensorSlot::All, 2u32, Handler::Velocity(on_velocity));

        let velocity = Report::Velocity(VelocityReport {
            timestamp_us: 0,
            sensor: sensor(6),
            velocity: [0.0; 3],
            velocity_quat: [0.0, 0.0, 0.0, 1.0],
            velocity_quat_dt: 0.0,
        });
        assert_eq!(registry.dispatch(&velocity), 1);
        assert_eq!(take_calls(), vec![("velocity", 2, 6)]);

        assert!(matches!(
            registry.unregister(SensorSlot::All, &1, Handler::Velocity(on_velocity)),
            Err(Error::HandlerNotFound)
        ));
    }

    fn reentrant(ctx: &u32, r: &PoseReport) {
        log_call("reentrant", *ctx, r.sensor.get());
        SHARED.with(|shared| {
            if let Some(registry) = shared.borrow().as_ref() {
                let mut registry = registry.lock();
                registry.register(SensorSlot::All, 99, Handler::Pose(h2));
                registry
                    .unregister(SensorSlot::All, ctx, Handler::Pose(reentrant))
                    .unwrap();
            }
        });
    }

    #[test]
    fn test_mutation_during_dispatch_affects_next_pass_only() {
        let registry: SharedRegistry<u32> = SubscriptionRegistry::shared();
        {
            let mut r = registry.lock();
            r.register(SensorSlot::All, 1, Handler::Pose(reentrant));
            r.register(SensorSlot::All, 2, Handler::Pose(h1));
        }
        SHARED.with(|s| *s.borrow_mut() = Some(Arc::clone(&registry)));

        // First pass: snapshot holds reentrant + h1; h2 added mid-pass does not run
        assert_eq!(dispatch_shared(&registry, &pose(8)), 2);
        assert_eq!(take_calls(), vec![("reentrant", 1, 8), ("h1", 2, 8)]);

        // Second pass sees the mutation
        assert_eq!(dispatch_shared(&registry, &pose(8)), 2);
        assert_eq!(take_calls(), vec![("h1", 2, 8), ("h2", 99, 8)]);

        SHARED.with(|s| *s.borrow_mut() = None);
    }

    #[test]
    fn test_replay_matches_multiset_model() {
        let handlers: [(&str, fn(&u32, &PoseReport)); 2] = [("h1", h1), ("h2", h2)];
        let slots = [slot(0), slot(1), SensorSlot::All];

        let mut registry = SubscriptionRegistry::new();
        // Model: per slot, ordered (handler name, context)
        let mut model: Vec<Vec<(&str, u32)>> = vec![Vec::new(); slots.len()];

        // Deterministic pseudo-random sequence
        let mut seed: u32 = 0x2545_F491;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..500 {
            let s = (next() % 3) as usize;
            let h = (next() % 2) as usize;
            let ctx = next() % 3;
            let (name, handler) = handlers[h];

            if next() % 2 == 0 {
                registry.register(slots[s], ctx, Handler::Pose(handler));
                model[s].push((name, ctx));
            } else {
                let found = model[s].iter().position(|&(n, c)| n == name && c == ctx);
                let result = registry.unregister(slots[s], &ctx, Handler::Pose(handler));
                match found {
                    Some(i) => {
                        model[s].remove(i);
                        assert!(result.is_ok());
                    }
                    None => assert!(matches!(result, Err(Error::HandlerNotFound))),
                }
            }
        }

        for (i, list) in model.iter().enumerate() {
            assert_eq!(registry.handler_count(ReportKind::Pose, slots[i]), list.len());
        }

        for n in 0..2 {
            take_calls();
            registry.dispatch(&pose(n));
            let expected: Vec<_> = model[n]
                .iter()
                .chain(model[2].iter())
                .map(|&(name, ctx)| (name, ctx, n))
                .collect();
            assert_eq!(take_calls(), expected);
        }
    }
}
