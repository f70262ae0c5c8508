//! Batteries and battery types.
//!
//! A [`BatteryType`] is an immutable template shared by `Arc` across every
//! battery of that type. A [`Battery`] is a passive charge-state record that is
//! always owned by value by exactly one holder (a vehicle, a charger or a
//! distributor), so moving it is the ownership transfer.

use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::clock::ONE_HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatteryTypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatteryId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryType {
    pub id: BatteryTypeId,
    /// Maximum charge in kWh.
    pub capacity_kwh: f64,
}

impl BatteryType {
    pub fn new(id: u32, capacity_kwh: f64) -> Self {
        Self {
            id: BatteryTypeId(id),
            capacity_kwh,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Battery {
    id: BatteryId,
    battery_type: Arc<BatteryType>,
    level_kwh: f64,
    /// Simulation time the running charge timer started; `None` when not charging.
    pub charge_started_at: Option<u64>,
}

impl Battery {
    /// A fully charged battery.
    pub fn new(id: BatteryId, battery_type: Arc<BatteryType>) -> Self {
        let level_kwh = battery_type.capacity_kwh;
        Self {
            id,
            battery_type,
            level_kwh,
            charge_started_at: None,
        }
    }

    pub fn with_level(id: BatteryId, battery_type: Arc<BatteryType>, level_kwh: f64) -> Self {
        let mut battery = Self::new(id, battery_type);
        battery.set_level(level_kwh);
        battery
    }

    pub fn id(&self) -> BatteryId {
        self.id
    }

    pub fn battery_type(&self) -> &Arc<BatteryType> {
        &self.battery_type
    }

    pub fn type_id(&self) -> BatteryTypeId {
        self.battery_type.id
    }

    pub fn capacity(&self) -> f64 {
        self.battery_type.capacity_kwh
    }

    pub fn level(&self) -> f64 {
        self.level_kwh
    }

    /// Sets the level, clamped to `[0, capacity]`.
    pub fn set_level(&mut self, level_kwh: f64) {
        self.level_kwh = level_kwh.clamp(0.0, self.capacity());
    }

    pub fn fill(&mut self) {
        self.level_kwh = self.capacity();
    }

    pub fn is_charged(&self) -> bool {
        self.level_kwh >= self.capacity()
    }

    /// State of charge in `[0, 1]`.
    pub fn state_of_charge(&self) -> f64 {
        if self.capacity() <= 0.0 {
            return 1.0;
        }
        self.level_kwh / self.capacity()
    }
}

/// Time to bring `level_kwh` up to `capacity_kwh` at `power_kw`, in milliseconds.
pub fn charge_time_ms(level_kwh: f64, capacity_kwh: f64, power_kw: f64) -> u64 {
    let missing = (capacity_kwh - level_kwh).max(0.0);
    if missing == 0.0 {
        return 0;
    }
    if power_kw <= 0.0 {
        return u64::MAX;
    }
    (missing / power_kw * ONE_HOUR_MS as f64).round() as u64
}

/// Level reached after charging for `elapsed_ms` from `start_level_kwh`.
/// Linear in elapsed time, clamped at capacity.
pub fn level_at_time(start_level_kwh: f64, capacity_kwh: f64, power_kw: f64, elapsed_ms: u64) -> f64 {
    let hours = elapsed_ms as f64 / ONE_HOUR_MS as f64;
    (start_level_kwh + power_kw.max(0.0) * hours).min(capacity_kwh)
}

/// Hands out unique battery ids.
#[derive(Debug, Default, Resource)]
pub struct BatteryFactory {
    next_id: u64,
}

impl BatteryFactory {
    pub fn full(&mut self, battery_type: &Arc<BatteryType>) -> Battery {
        let id = BatteryId(self.next_id);
        self.next_id += 1;
        Battery::new(id, Arc::clone(battery_type))
    }

    pub fn with_level(&mut self, battery_type: &Arc<BatteryType>, level_kwh: f64) -> Battery {
        let mut battery = self.full(battery_type);
        battery.set_level(level_kwh);
        battery
    }

    pub fn issued(&self) -> u64 {
        self.next_id
    }
}
