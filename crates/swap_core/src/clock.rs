//! Simulation clock: a single logical timeline and its event queue.
//!
//! Every suspendable process (vehicle trips, charge timers, distributors, the
//! run driver) advances by scheduling events here. Events pop in timestamp
//! order; events sharing a timestamp pop in submission order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::battery::{BatteryId, BatteryTypeId};

pub const ONE_SEC_MS: u64 = 1000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    SimulationStarted,
    /// A vehicle (re)plans its path from its current node.
    TripStarted,
    /// A vehicle reaches the next node of its route.
    MoveStep,
    /// A vehicle reaches the station terminating its route and asks for a slot.
    StationArrival,
    /// A station slot was granted to a vehicle.
    SlotGranted,
    /// The swap operator finished; the vehicle starts retrieving batteries.
    SwapCompleted,
    /// A charger handed a battery to a waiting vehicle.
    BatteryDelivered,
    /// One in-place recharge finished (sharing disabled).
    RechargeStep,
    /// A charger timer ran to completion.
    ChargeComplete,
    TripEnded,
    RedistributionRound,
    /// The inter-round interval of the redistribution cycle elapsed.
    RedistributionGate,
    DistributorLoaded,
    DistributorArrived,
    DistributorUnloaded,
}

/// What an event is about. Charge timers carry their token so a cancelled timer
/// can be recognised when its completion pops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    Vehicle(Entity),
    Distributor(Entity),
    ChargeTimer {
        station: Entity,
        battery_type: BatteryTypeId,
        battery: BatteryId,
        token: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
}

impl Event {
    pub fn vehicle(&self) -> Option<Entity> {
        match self.subject {
            Some(EventSubject::Vehicle(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn distributor(&self) -> Option<Entity> {
        match self.subject {
            Some(EventSubject::Distributor(entity)) => Some(entity),
            _ => None,
        }
    }
}

/// The event currently being processed by the schedule.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (timestamp, seq).
        other
            .event
            .timestamp
            .cmp(&self.event.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default, Resource)]
pub struct SimulationClock {
    now: u64,
    next_seq: u64,
    events: BinaryHeap<QueuedEvent>,
}

impl SimulationClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule(&mut self, event: Event) {
        debug_assert!(
            event.timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(QueuedEvent { seq, event });
    }

    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule(Event {
            timestamp,
            kind,
            subject,
        });
    }

    pub fn schedule_in(&mut self, delay_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        let timestamp = self.now.saturating_add(delay_ms);
        self.schedule_at(timestamp, kind, subject);
    }

    pub fn schedule_at_secs(&mut self, secs: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(secs * ONE_SEC_MS, kind, subject);
    }

    pub fn schedule_in_secs(&mut self, secs: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_in(secs * ONE_SEC_MS, kind, subject);
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let queued = self.events.pop()?;
        self.now = queued.event.timestamp;
        Some(queued.event)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|queued| queued.event.timestamp)
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_pops_events_in_time_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(10, EventKind::MoveStep, None);
        clock.schedule_at(5, EventKind::MoveStep, None);
        clock.schedule_at(20, EventKind::MoveStep, None);

        let first = clock.pop_next().expect("first event");
        assert_eq!(first.timestamp, 5);
        assert_eq!(clock.now(), 5);

        let second = clock.pop_next().expect("second event");
        assert_eq!(second.timestamp, 10);
        assert_eq!(clock.now(), 10);

        let third = clock.pop_next().expect("third event");
        assert_eq!(third.timestamp, 20);
        assert_eq!(clock.now(), 20);

        assert!(clock.pop_next().is_none());
        assert!(clock.is_empty());
    }

    #[test]
    fn simultaneous_events_pop_in_submission_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(7, EventKind::TripEnded, None);
        clock.schedule_at(7, EventKind::SimulationStarted, None);
        clock.schedule_at(7, EventKind::ChargeComplete, None);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| clock.pop_next())
            .map(|event| event.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::TripEnded,
                EventKind::SimulationStarted,
                EventKind::ChargeComplete
            ]
        );
    }

    #[test]
    fn schedule_in_is_relative_to_now() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(ONE_MIN_MS, EventKind::MoveStep, None);
        clock.pop_next().expect("event");
        clock.schedule_in_secs(30, EventKind::SwapCompleted, None);
        assert_eq!(clock.next_event_time(), Some(ONE_MIN_MS + 30 * ONE_SEC_MS));
        assert_eq!(clock.pending_event_count(), 1);
    }
}
