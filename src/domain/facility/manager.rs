use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::core::{
    Account, Event, EventDetails, EventName, Ledger, Money, Schedule, TimeRange, Username,
};
use crate::domain::{ChangeQueue, Entity};

use super::FacilityError;

/// Request to place a new event; times are still in their textual form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    pub name: EventName,
    pub organizer: Username,
    pub start: String,
    pub end: String,
    pub details: EventDetails,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerChange {
    EventScheduled { name: EventName, time: TimeRange },
    EventRemoved { name: EventName },
    BudgetUpdated { amount: Money, balance: Money },
}

/// Owns the schedule, the event table and the facility budget.
#[derive(Debug, Default)]
pub struct FacilityManager {
    schedule: Schedule,
    events: BTreeMap<EventName, Event>,
    budget: Money,
    changes: ChangeQueue<ManagerChange>,
}

impl FacilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn budget(&self) -> Money {
        self.budget
    }

    pub fn event(&self, name: &EventName) -> Option<&Event> {
        self.events.get(name)
    }

    pub fn event_mut(&mut self, name: &EventName) -> Option<&mut Event> {
        self.events.get_mut(name)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    pub(crate) fn events_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.events.values_mut()
    }

    /// Validates and places a new event. The checks run in a fixed order so the
    /// caller always sees the same first failure: name, organizer, time format,
    /// availability, organizer quota, operating hours.
    pub fn create_event(
        &mut self,
        request: NewEvent,
        accounts: &mut BTreeMap<Username, Account>,
    ) -> Result<(), FacilityError> {
        let NewEvent {
            name,
            organizer,
            start,
            end,
            details,
        } = request;
        if self.events.contains_key(&name) {
            return Err(FacilityError::DuplicateEventName(name));
        }
        let account = accounts
            .get_mut(&organizer)
            .ok_or_else(|| FacilityError::AccountNotFound(organizer.clone()))?;
        let time = TimeRange::parse(&start, &end)?;
        if let Some(conflict) = self.schedule.find_overlap(&time) {
            warn!(event = %name, %time, %conflict, "facility is not available");
            return Err(FacilityError::SlotUnavailable(conflict));
        }
        let hours = time.elapsed_hours();
        if !account.check_weekly_limit(hours) {
            return Err(FacilityError::WeeklyLimitExceeded {
                username: organizer,
                hours,
            });
        }
        if !time.is_within_operating_hours() {
            return Err(FacilityError::OutsideOperatingHours(time));
        }
        let event = Event::create(name, organizer, time, details)?;
        self.insert_event(event)?;
        account.add_reservation_hours(hours);
        Ok(())
    }

    /// Places an already-built event, as when loading the event table.
    pub fn insert_event(&mut self, event: Event) -> Result<(), FacilityError> {
        if self.events.contains_key(event.name()) {
            return Err(FacilityError::DuplicateEventName(event.id()));
        }
        self.schedule.add_event(&event)?;
        info!(event = %event.name(), time = %event.time(), "event scheduled");
        self.changes.push(ManagerChange::EventScheduled {
            name: event.id(),
            time: *event.time(),
        });
        self.events.insert(event.id(), event);
        Ok(())
    }

    /// Takes the event out of both the table and the schedule.
    pub fn remove_event(&mut self, name: &EventName) -> Result<Event, FacilityError> {
        let event = self
            .events
            .remove(name)
            .ok_or_else(|| FacilityError::EventNotFound(name.clone()))?;
        self.schedule.remove_event(name)?;
        info!(event = %name, "event removed");
        self.changes
            .push(ManagerChange::EventRemoved { name: name.clone() });
        Ok(event)
    }

    /// Unconditional; the budget may go negative.
    pub fn update_facility_budget(&mut self, amount: Money) {
        self.budget += amount;
        self.changes.push(ManagerChange::BudgetUpdated {
            amount,
            balance: self.budget,
        });
    }

    /// The balance is not persisted; the loader rebuilds it from paid reservations.
    pub(crate) fn restore_budget(&mut self, balance: Money) {
        self.budget = balance;
    }

    pub(crate) fn pop_all(&mut self) -> Vec<ManagerChange> {
        let mut changes = Vec::new();
        while let Some(c) = self.changes.pop() {
            changes.push(c);
        }
        changes
    }
}

impl Ledger for FacilityManager {
    fn update_budget(&mut self, amount: Money) {
        self.update_facility_budget(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::core::{LayoutStyle, Role, TimeError};

    fn details() -> EventDetails {
        EventDetails {
            layout: LayoutStyle::Lecture,
            public: true,
            max_guests: 20,
            ticket_price: Money::from_units(5),
            open_to_residents: true,
            open_to_non_residents: true,
        }
    }

    fn request(name: &str, organizer: &str, start: &str, end: &str) -> NewEvent {
        NewEvent {
            name: name.into(),
            organizer: organizer.into(),
            start: start.to_owned(),
            end: end.to_owned(),
            details: details(),
        }
    }

    fn accounts() -> BTreeMap<Username, Account> {
        let mut accounts = BTreeMap::new();
        for (name, role) in [("city", Role::City), ("res", Role::Resident)] {
            let account = Account::create(name.into(), "pw".to_owned(), role).unwrap();
            accounts.insert(account.id(), account);
        }
        accounts
    }

    #[test]
    fn test_create_event_places_in_schedule_and_table() {
        let mut manager = FacilityManager::new();
        let mut accounts = accounts();
        manager
            .create_event(
                request("Talk", "city", "2024-06-01T10:00", "2024-06-01T12:00"),
                &mut accounts,
            )
            .unwrap();
        assert!(manager.event(&"Talk".into()).is_some());
        assert!(manager.schedule().find_event(&"Talk".into()).is_some());
        assert_eq!(accounts[&Username::from("city")].weekly_hours(), 2);
    }

    #[test]
    fn test_create_event_check_order() {
        let mut manager = FacilityManager::new();
        let mut accounts = accounts();
        manager
            .create_event(
                request("Talk", "city", "2024-06-01T10:00", "2024-06-01T12:00"),
                &mut accounts,
            )
            .unwrap();

        // duplicate name wins over every other problem
        assert_eq!(
            manager.create_event(request("Talk", "ghost", "bad", "bad"), &mut accounts),
            Err(FacilityError::DuplicateEventName("Talk".into()))
        );
        assert_eq!(
            manager.create_event(request("New", "ghost", "bad", "bad"), &mut accounts),
            Err(FacilityError::AccountNotFound("ghost".into()))
        );
        assert_eq!(
            manager.create_event(request("New", "city", "bad", "bad"), &mut accounts),
            Err(FacilityError::Time(TimeError::Malformed("bad".to_owned())))
        );
        // overlapping and outside operating hours: availability is reported first
        assert_eq!(
            manager.create_event(
                request("New", "city", "2024-06-01T07:00", "2024-06-01T11:00"),
                &mut accounts
            ),
            Err(FacilityError::SlotUnavailable("Talk".into()))
        );
        // over quota and outside operating hours: quota is reported first
        assert_eq!(
            manager.create_event(
                request("New", "res", "2024-06-02T06:00", "2024-06-03T07:00"),
                &mut accounts
            ),
            Err(FacilityError::WeeklyLimitExceeded {
                username: "res".into(),
                hours: 25
            })
        );
        let early = request("New", "res", "2024-06-02T07:00", "2024-06-02T09:00");
        assert!(matches!(
            manager.create_event(early, &mut accounts),
            Err(FacilityError::OutsideOperatingHours(_))
        ));
        assert_eq!(manager.events().count(), 1);
        assert_eq!(accounts[&Username::from("res")].weekly_hours(), 0);
    }

    #[test]
    fn test_remove_event() {
        let mut manager = FacilityManager::new();
        let mut accounts = accounts();
        manager
            .create_event(
                request("Talk", "city", "2024-06-01T10:00", "2024-06-01T12:00"),
                &mut accounts,
            )
            .unwrap();
        let event = manager.remove_event(&"Talk".into()).unwrap();
        assert_eq!(event.name(), &EventName::from("Talk"));
        assert!(manager.schedule().is_empty());
        assert_eq!(
            manager.remove_event(&"Talk".into()).err(),
            Some(FacilityError::EventNotFound("Talk".into()))
        );
    }

    #[test]
    fn test_budget_may_go_negative() {
        let mut manager = FacilityManager::new();
        manager.update_facility_budget(Money::from_units(30));
        manager.update_budget(Money::from_units(-50));
        assert_eq!(manager.budget(), Money::from_units(-20));
        assert_eq!(
            manager.pop_all().last(),
            Some(&ManagerChange::BudgetUpdated {
                amount: Money::from_units(-50),
                balance: Money::from_units(-20)
            })
        );
    }
}
