#![allow(dead_code)]

use bevy_ecs::prelude::World;
use bevy_ecs::schedule::Schedule;
use swap_core::clock::Event;
use swap_core::runner::{run_next_event_with_hook, run_until_empty, simulation_schedule};

/// Helper that owns a reusable `Schedule` so tests can step or drain the event queue.
pub struct ScheduleRunner {
    schedule: Schedule,
}

impl Default for ScheduleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRunner {
    /// Create a runner with the default simulation schedule.
    pub fn new() -> Self {
        Self {
            schedule: simulation_schedule(),
        }
    }

    /// Run a single event, returning it if one was processed.
    pub fn run_one(&mut self, world: &mut World) -> Option<Event> {
        let mut processed = None;
        run_next_event_with_hook(world, &mut self.schedule, |_, event| processed = Some(*event));
        processed
    }

    /// Run multiple events up to `max_steps`, returning the number of steps executed.
    pub fn run_until_empty(&mut self, world: &mut World, max_steps: usize) -> usize {
        run_until_empty(world, &mut self.schedule, max_steps)
    }

    /// Drive the simulation until the event queue is empty, collecting every event.
    pub fn run_full(&mut self, world: &mut World) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.run_one(world) {
            events.push(event);
        }
        events
    }
}
