//! Charger: a bounded pool of batteries of one type under charge.
//!
//! Each admitted battery runs a charge timer. Batteries that do not fit wait
//! "on the side" until a slot frees. Retrieval either waits for a timer to run
//! to completion (the battery is reserved for the requester) or interrupts the
//! timer and hands the battery over at its interpolated level.
//!
//! The charger never talks to the scheduler directly: every mutating call
//! appends the timers it started and the batteries it handed over to a
//! [`ChargerEffects`], which the calling system turns into events.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy_ecs::prelude::Entity;

use crate::battery::{charge_time_ms, level_at_time, Battery, BatteryId, BatteryType, BatteryTypeId};

/// Whoever asked for a battery. Always a vehicle in the simulation.
pub type Requester = Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeTimer {
    pub token: u64,
    pub started_at: u64,
    pub due_at: u64,
}

#[derive(Debug, Clone)]
struct ChargingSlot {
    battery: Battery,
    /// Level when the running timer started.
    start_level: f64,
    timer: Option<ChargeTimer>,
    reserved_for: Option<Requester>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GetRequest {
    requester: Requester,
    wait_for_full: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStarted {
    pub battery_type: BatteryTypeId,
    pub battery: BatteryId,
    pub token: u64,
    pub due_at: u64,
}

#[derive(Debug)]
pub struct Delivery {
    pub requester: Requester,
    pub battery: Battery,
}

/// Side effects produced by a charger operation.
#[derive(Debug, Default)]
pub struct ChargerEffects {
    pub timers: Vec<TimerStarted>,
    pub deliveries: Vec<Delivery>,
    pub interruptions: u32,
}

impl ChargerEffects {
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.deliveries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Admitted and a charge timer started.
    Charging,
    /// Admitted already full, no timer needed.
    Charged,
    OnTheSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetOutcome {
    /// A battery was handed over within this call.
    Delivered,
    /// A battery under charge was reserved; it is delivered when its timer completes.
    Reserved(BatteryId),
    /// Nothing to take yet; the request waits for the next admitted battery.
    Queued,
}

#[derive(Debug, Clone)]
pub struct Charger {
    battery_type: Arc<BatteryType>,
    capacity: usize,
    power_kw: f64,
    slots: Vec<ChargingSlot>,
    on_the_side: VecDeque<Battery>,
    waiters: VecDeque<GetRequest>,
    next_token: u64,
}

impl Charger {
    pub fn new(battery_type: Arc<BatteryType>, capacity: usize, power_kw: f64) -> Self {
        Self {
            battery_type,
            capacity,
            power_kw,
            slots: Vec::with_capacity(capacity),
            on_the_side: VecDeque::new(),
            waiters: VecDeque::new(),
            next_token: 0,
        }
    }

    pub fn battery_type(&self) -> BatteryTypeId {
        self.battery_type.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn power_kw(&self) -> f64 {
        self.power_kw
    }

    /// Batteries holding a charging slot (charging or already full).
    pub fn occupancy(&self) -> usize {
        self.slots.len()
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.slots.len())
    }

    pub fn in_charge(&self) -> usize {
        self.slots.iter().filter(|slot| slot.timer.is_some()).count()
    }

    pub fn charged(&self) -> usize {
        self.slots.iter().filter(|slot| slot.battery.is_charged()).count()
    }

    pub fn on_the_side(&self) -> usize {
        self.on_the_side.len()
    }

    pub fn pending_requests(&self) -> usize {
        self.waiters.len()
    }

    /// Every battery currently held, slots first.
    pub fn batteries(&self) -> impl Iterator<Item = &Battery> {
        self.slots
            .iter()
            .map(|slot| &slot.battery)
            .chain(self.on_the_side.iter())
    }

    /// Level the battery would have if its timer were interrupted at `now`.
    pub fn level_at(&self, battery: BatteryId, now: u64) -> Option<f64> {
        self.slots
            .iter()
            .find(|slot| slot.battery.id() == battery)
            .map(|slot| self.current_level(slot, now))
            .or_else(|| {
                self.on_the_side
                    .iter()
                    .find(|b| b.id() == battery)
                    .map(Battery::level)
            })
    }

    /// Stores a battery without blocking: it takes a free slot or waits on the side.
    pub fn put(&mut self, battery: Battery, now: u64, effects: &mut ChargerEffects) -> PutOutcome {
        debug_assert_eq!(battery.type_id(), self.battery_type());
        let outcome = if self.slots.len() < self.capacity {
            self.admit(battery, now, effects)
        } else {
            self.on_the_side.push_back(battery);
            PutOutcome::OnTheSide
        };
        self.settle(now, effects);
        outcome
    }

    /// Asks for one battery on behalf of `requester`.
    pub fn get(
        &mut self,
        requester: Requester,
        wait_for_full: bool,
        now: u64,
        effects: &mut ChargerEffects,
    ) -> GetOutcome {
        let request = GetRequest {
            requester,
            wait_for_full,
        };
        if self.waiters.is_empty() {
            if let Some(outcome) = self.try_serve(request, now, effects) {
                self.settle(now, effects);
                return outcome;
            }
        }
        self.waiters.push_back(request);
        GetOutcome::Queued
    }

    /// Handles a timer completion. Returns `false` for a stale timer: the
    /// battery already left or was interrupted and the token no longer matches.
    pub fn complete_timer(
        &mut self,
        battery: BatteryId,
        token: u64,
        now: u64,
        effects: &mut ChargerEffects,
    ) -> bool {
        let Some(idx) = self.slots.iter().position(|slot| {
            slot.battery.id() == battery && slot.timer.map(|t| t.token) == Some(token)
        }) else {
            return false;
        };

        let slot = &mut self.slots[idx];
        slot.battery.fill();
        slot.battery.charge_started_at = None;
        slot.timer = None;
        slot.start_level = slot.battery.level();

        if let Some(requester) = slot.reserved_for {
            let battery = self.remove_slot(idx, now);
            effects.deliveries.push(Delivery { requester, battery });
        }
        self.settle(now, effects);
        true
    }

    /// Drains the on-the-side queue.
    pub fn take_on_the_side(&mut self) -> Vec<Battery> {
        self.on_the_side.drain(..).collect()
    }

    fn admit(&mut self, mut battery: Battery, now: u64, effects: &mut ChargerEffects) -> PutOutcome {
        debug_assert!(self.slots.len() < self.capacity, "charger over capacity");
        let start_level = battery.level();
        if battery.is_charged() {
            battery.charge_started_at = None;
            self.slots.push(ChargingSlot {
                battery,
                start_level,
                timer: None,
                reserved_for: None,
            });
            return PutOutcome::Charged;
        }

        let token = self.next_token;
        self.next_token += 1;
        let due_at = now.saturating_add(charge_time_ms(start_level, battery.capacity(), self.power_kw));
        battery.charge_started_at = Some(now);
        effects.timers.push(TimerStarted {
            battery_type: self.battery_type(),
            battery: battery.id(),
            token,
            due_at,
        });
        self.slots.push(ChargingSlot {
            battery,
            start_level,
            timer: Some(ChargeTimer {
                token,
                started_at: now,
                due_at,
            }),
            reserved_for: None,
        });
        PutOutcome::Charging
    }

    fn remaining_ms(slot: &ChargingSlot, now: u64) -> u64 {
        slot.timer
            .map(|timer| timer.due_at.saturating_sub(now))
            .unwrap_or(0)
    }

    fn current_level(&self, slot: &ChargingSlot, now: u64) -> f64 {
        match slot.timer {
            Some(timer) => level_at_time(
                slot.start_level,
                slot.battery.capacity(),
                self.power_kw,
                now.saturating_sub(timer.started_at),
            ),
            None => slot.battery.level(),
        }
    }

    /// Unreserved slot closest to full; ties go to the earliest slot.
    fn pick(&self, now: u64) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.reserved_for.is_none())
            .min_by_key(|(_, slot)| Self::remaining_ms(slot, now))
            .map(|(idx, _)| idx)
    }

    fn try_serve(
        &mut self,
        request: GetRequest,
        now: u64,
        effects: &mut ChargerEffects,
    ) -> Option<GetOutcome> {
        let idx = self.pick(now)?;
        let remaining = Self::remaining_ms(&self.slots[idx], now);

        if remaining > 0 && request.wait_for_full {
            let slot = &mut self.slots[idx];
            slot.reserved_for = Some(request.requester);
            return Some(GetOutcome::Reserved(slot.battery.id()));
        }
        if remaining > 0 {
            effects.interruptions += 1;
        }
        let battery = self.remove_slot(idx, now);
        effects.deliveries.push(Delivery {
            requester: request.requester,
            battery,
        });
        Some(GetOutcome::Delivered)
    }

    /// Removes a slot, stopping its timer at the interpolated level.
    fn remove_slot(&mut self, idx: usize, now: u64) -> Battery {
        let level = self.current_level(&self.slots[idx], now);
        let mut slot = self.slots.remove(idx);
        slot.battery.set_level(level);
        slot.battery.charge_started_at = None;
        slot.battery
    }

    /// Promotes on-the-side batteries into free slots and serves waiting
    /// requests until neither makes progress.
    fn settle(&mut self, now: u64, effects: &mut ChargerEffects) {
        loop {
            let mut progressed = false;
            while self.slots.len() < self.capacity {
                let Some(battery) = self.on_the_side.pop_front() else {
                    break;
                };
                self.admit(battery, now, effects);
                progressed = true;
            }
            if let Some(request) = self.waiters.front().copied() {
                if self.try_serve(request, now, effects).is_some() {
                    self.waiters.pop_front();
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }
}
