use bevy_ecs::prelude::{Query, Res, ResMut};
use tracing::debug;

use crate::charger::ChargerEffects;
use crate::clock::{CurrentEvent, EventSubject, SimulationClock};
use crate::station::Station;
use crate::telemetry::SimTelemetry;
use crate::vehicle::Vehicle;

use super::apply_charger_effects;

/// A charge timer fired. Stale timers (battery interrupted or already gone)
/// are dropped.
pub fn charge_complete_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<&mut Vehicle>,
    mut stations: Query<&mut Station>,
) {
    let Some(EventSubject::ChargeTimer {
        station: station_entity,
        battery_type,
        battery,
        token,
    }) = event.0.subject
    else {
        return;
    };
    let Ok(mut station) = stations.get_mut(station_entity) else {
        return;
    };
    let Some(charger) = station.charger_mut(battery_type) else {
        return;
    };

    let now = clock.now();
    let mut effects = ChargerEffects::default();
    if !charger.complete_timer(battery, token, now, &mut effects) {
        debug!(station = ?station_entity, ?battery, token, "stale charge timer ignored");
        return;
    }
    apply_charger_effects(station_entity, effects, &mut clock, &mut vehicles, &mut telemetry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bevy_ecs::prelude::{Schedule, World};

    use crate::battery::{BatteryFactory, BatteryType};
    use crate::clock::{EventKind, ONE_HOUR_MS};
    use crate::network::NodeId;
    use crate::station::StationType;

    fn charging_world() -> (World, bevy_ecs::prelude::Entity) {
        let mut world = World::new();
        world.insert_resource(SimulationClock::default());
        world.insert_resource(SimTelemetry::default());
        let battery_type = Arc::new(BatteryType::new(0, 10.0));
        let station_type = StationType {
            id: 0,
            capacity: 1,
            power_kw: 10.0,
            charger_capacities: vec![2],
        };
        let station = Station::new(NodeId(0), &station_type, &[battery_type.clone()]);
        let station_entity = world.spawn(station).id();

        let mut factory = BatteryFactory::default();
        let mut effects = ChargerEffects::default();
        {
            let mut station = world.get_mut::<Station>(station_entity).expect("station");
            station
                .put_battery(factory.with_level(&battery_type, 0.0), 0, &mut effects)
                .expect("charger");
        }
        let mut clock = world.resource_mut::<SimulationClock>();
        for timer in effects.timers {
            clock.schedule_at(
                timer.due_at,
                EventKind::ChargeComplete,
                Some(EventSubject::ChargeTimer {
                    station: station_entity,
                    battery_type: timer.battery_type,
                    battery: timer.battery,
                    token: timer.token,
                }),
            );
        }
        (world, station_entity)
    }

    #[test]
    fn timer_completion_marks_battery_charged() {
        let (mut world, station) = charging_world();
        let event = world
            .resource_mut::<SimulationClock>()
            .pop_next()
            .expect("timer");
        assert_eq!(event.timestamp, ONE_HOUR_MS);
        world.insert_resource(CurrentEvent(event));

        let mut schedule = Schedule::default();
        schedule.add_systems(charge_complete_system);
        schedule.run(&mut world);

        let station = world.get::<Station>(station).expect("station");
        let charger = station.chargers().next().expect("charger");
        assert_eq!(charger.charged(), 1);
        assert_eq!(charger.in_charge(), 0);
    }

    #[test]
    fn stale_token_is_ignored() {
        let (mut world, station) = charging_world();
        let mut event = world
            .resource_mut::<SimulationClock>()
            .pop_next()
            .expect("timer");
        if let Some(EventSubject::ChargeTimer { token, .. }) = event.subject.as_mut() {
            *token += 100;
        }
        world.insert_resource(CurrentEvent(event));

        let mut schedule = Schedule::default();
        schedule.add_systems(charge_complete_system);
        schedule.run(&mut world);

        let station = world.get::<Station>(station).expect("station");
        let charger = station.chargers().next().expect("charger");
        assert_eq!(charger.charged(), 0);
        assert_eq!(charger.in_charge(), 1);
    }
}
