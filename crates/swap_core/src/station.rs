//! Stations: a bounded pool of vehicle slots plus one charger per battery type.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use bevy_ecs::prelude::{Component, Entity};
use serde::{Deserialize, Serialize};

use crate::battery::{Battery, BatteryType, BatteryTypeId};
use crate::charger::{Charger, ChargerEffects, PutOutcome};
use crate::network::NodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationType {
    pub id: u32,
    /// Vehicles served at the same time.
    pub capacity: usize,
    pub power_kw: f64,
    /// Charger capacity per battery type, in battery catalog order.
    pub charger_capacities: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrant {
    pub requester: Entity,
    pub requested_at: u64,
    pub granted_at: u64,
}

impl SlotGrant {
    pub fn waited_ms(&self) -> u64 {
        self.granted_at.saturating_sub(self.requested_at)
    }
}

/// Counted slots with a FIFO wait list.
#[derive(Debug, Clone)]
pub struct SlotPool {
    capacity: usize,
    occupied: usize,
    queue: VecDeque<(Entity, u64)>,
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            occupied: 0,
            queue: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn waiting(&self) -> usize {
        self.queue.len()
    }

    /// Takes a slot if one is free, otherwise joins the wait list.
    pub fn request(&mut self, requester: Entity, now: u64) -> Option<SlotGrant> {
        if self.occupied < self.capacity && self.queue.is_empty() {
            self.occupied += 1;
            return Some(SlotGrant {
                requester,
                requested_at: now,
                granted_at: now,
            });
        }
        self.queue.push_back((requester, now));
        None
    }

    /// Frees a slot and hands it to the head of the wait list, if any.
    pub fn release(&mut self, now: u64) -> Option<SlotGrant> {
        debug_assert!(self.occupied > 0, "release without a held slot");
        self.occupied = self.occupied.saturating_sub(1);
        if self.occupied >= self.capacity {
            return None;
        }
        let (requester, requested_at) = self.queue.pop_front()?;
        self.occupied += 1;
        Some(SlotGrant {
            requester,
            requested_at,
            granted_at: now,
        })
    }
}

#[derive(Debug, Clone, Component)]
pub struct Station {
    pub node: NodeId,
    pub station_type: u32,
    pub power_kw: f64,
    pub slots: SlotPool,
    chargers: BTreeMap<BatteryTypeId, Charger>,
}

impl Station {
    /// One charger per battery type, sized by the station type's capacities.
    pub fn new(node: NodeId, station_type: &StationType, battery_types: &[Arc<BatteryType>]) -> Self {
        let chargers = battery_types
            .iter()
            .zip(station_type.charger_capacities.iter())
            .map(|(battery_type, capacity)| {
                (
                    battery_type.id,
                    Charger::new(Arc::clone(battery_type), *capacity, station_type.power_kw),
                )
            })
            .collect();
        Self {
            node,
            station_type: station_type.id,
            power_kw: station_type.power_kw,
            slots: SlotPool::new(station_type.capacity),
            chargers,
        }
    }

    pub fn charger(&self, battery_type: BatteryTypeId) -> Option<&Charger> {
        self.chargers.get(&battery_type)
    }

    pub fn charger_mut(&mut self, battery_type: BatteryTypeId) -> Option<&mut Charger> {
        self.chargers.get_mut(&battery_type)
    }

    pub fn chargers(&self) -> impl Iterator<Item = &Charger> {
        self.chargers.values()
    }

    /// Puts a battery into the charger of its type. Hands the battery back
    /// when the station has no such charger.
    pub fn put_battery(
        &mut self,
        battery: Battery,
        now: u64,
        effects: &mut ChargerEffects,
    ) -> Result<PutOutcome, Battery> {
        match self.chargers.get_mut(&battery.type_id()) {
            Some(charger) => Ok(charger.put(battery, now, effects)),
            None => Err(battery),
        }
    }

    pub fn on_the_side_total(&self) -> usize {
        self.chargers.values().map(Charger::on_the_side).sum()
    }

    /// Room left in charging slots across every charger.
    pub fn free_charger_capacity(&self) -> usize {
        self.chargers.values().map(Charger::free_slots).sum()
    }

    /// Drains the on-the-side queues of every charger.
    pub fn take_on_the_side(&mut self) -> Vec<Battery> {
        self.chargers
            .values_mut()
            .flat_map(Charger::take_on_the_side)
            .collect()
    }

    pub fn battery_count(&self) -> usize {
        self.chargers.values().map(|c| c.batteries().count()).sum()
    }
}
