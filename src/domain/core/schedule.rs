use chrono::NaiveDateTime;
use derive_more::{Display, Error};
use intervaltree::IntervalTree;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Event, EventName, TimeRange};

/// One event's claim on the facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    event: EventName,
    time: TimeRange,
}

impl Slot {
    pub fn event(&self) -> &EventName {
        &self.event
    }

    pub fn time(&self) -> &TimeRange {
        &self.time
    }
}

/// Every event placed at the facility, ordered by start time. No two slots overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    slots: Vec<Slot>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_availability(&self, time: &TimeRange) -> bool {
        match self.find_overlap(time) {
            Some(event) => {
                debug!(%time, %event, "time slot overlaps an existing event");
                false
            }
            None => true,
        }
    }

    /// Name of an event whose slot intersects `time`, if any.
    pub fn find_overlap(&self, time: &TimeRange) -> Option<EventName> {
        let tree: IntervalTree<NaiveDateTime, &EventName> = self
            .slots
            .iter()
            .map(|s| (s.time.as_range(), &s.event))
            .collect();
        tree.query(time.as_range()).next().map(|e| e.value.clone())
    }

    pub fn find_event(&self, name: &EventName) -> Option<&Slot> {
        self.slots.iter().find(|s| s.event == *name)
    }

    pub fn add_event(&mut self, event: &Event) -> Result<(), ScheduleError> {
        self.validate_event_added(event.name(), event.time())?;
        let slot = Slot {
            event: event.name().clone(),
            time: *event.time(),
        };
        let index = self
            .slots
            .partition_point(|s| s.time.start() <= slot.time.start());
        self.slots.insert(index, slot);
        Ok(())
    }

    pub fn remove_event(&mut self, name: &EventName) -> Result<Slot, ScheduleError> {
        match self.slots.iter().position(|s| s.event == *name) {
            Some(index) => Ok(self.slots.remove(index)),
            None => Err(ScheduleError::EventNotFound),
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn validate_event_added(&self, name: &EventName, time: &TimeRange) -> Result<(), ScheduleError> {
        self.validate_duplicate_event(name)?;
        self.validate_overlapping_event(time)
    }

    fn validate_duplicate_event(&self, name: &EventName) -> Result<(), ScheduleError> {
        match self.find_event(name) {
            Some(_) => Err(ScheduleError::DuplicateEvent),
            None => Ok(()),
        }
    }

    fn validate_overlapping_event(&self, time: &TimeRange) -> Result<(), ScheduleError> {
        match self.check_availability(time) {
            true => Ok(()),
            false => Err(ScheduleError::OverlappingEvent),
        }
    }
}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[display(fmt = "The event does not exist in the schedule")]
    EventNotFound,
    #[display(fmt = "An event with this name is already scheduled")]
    DuplicateEvent,
    #[display(fmt = "Event overlaps with an existing event")]
    OverlappingEvent,
}
