//! Event handlers. Each system runs only while [`CurrentEvent`] carries its
//! event kind; see [`crate::runner::simulation_schedule`].
//!
//! [`CurrentEvent`]: crate::clock::CurrentEvent

pub mod charging;
pub mod redistribution;
pub mod spawner;
pub mod station_service;
pub mod trip;

use bevy_ecs::prelude::{Entity, Query};
use tracing::warn;

use crate::charger::ChargerEffects;
use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::telemetry::SimTelemetry;
use crate::vehicle::Vehicle;

/// Turns charger side effects into events: started timers become
/// `ChargeComplete` events and handed-over batteries go straight into the
/// requesting vehicle, which is woken with `BatteryDelivered`.
pub(crate) fn apply_charger_effects(
    station: Entity,
    effects: ChargerEffects,
    clock: &mut SimulationClock,
    vehicles: &mut Query<&mut Vehicle>,
    telemetry: &mut SimTelemetry,
) {
    for timer in effects.timers {
        clock.schedule_at(
            timer.due_at,
            EventKind::ChargeComplete,
            Some(EventSubject::ChargeTimer {
                station,
                battery_type: timer.battery_type,
                battery: timer.battery,
                token: timer.token,
            }),
        );
    }
    for delivery in effects.deliveries {
        let Ok(mut vehicle) = vehicles.get_mut(delivery.requester) else {
            warn!(requester = ?delivery.requester, battery = ?delivery.battery.id(), "battery delivered to a missing vehicle");
            continue;
        };
        vehicle.batteries.push(delivery.battery);
        clock.schedule_in(
            0,
            EventKind::BatteryDelivered,
            Some(EventSubject::Vehicle(delivery.requester)),
        );
    }
    telemetry.charge_interruptions += u64::from(effects.interruptions);
}
