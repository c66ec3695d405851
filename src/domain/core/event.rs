use std::collections::VecDeque;
use std::str::FromStr;

use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use tracing::{debug, info};

use crate::domain::{Aggregation, Change, ChangeQueue, Entity, Id};

use super::{is_record_token, Account, Money, ReservationId, Role, TimeRange, Timestamp, Username};

/// Unique event name, the key of the event table.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Deref,
)]
pub struct EventName(String);

impl Id for EventName {
    type Inner = String;
}

impl From<&str> for EventName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Room arrangement requested for an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum LayoutStyle {
    Meeting,
    Lecture,
    Wedding,
    Dance,
}

impl FromStr for LayoutStyle {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Meeting" => Ok(LayoutStyle::Meeting),
            "Lecture" => Ok(LayoutStyle::Lecture),
            "Wedding" => Ok(LayoutStyle::Wedding),
            "Dance" => Ok(LayoutStyle::Dance),
            _ => Err(EventError::UnknownLayout(s.to_owned())),
        }
    }
}

/// Result of asking an event for a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketOutcome {
    Purchased,
    Waitlisted,
    Denied,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventChange {
    EventCreated {
        name: EventName,
        organizer: Username,
        time: TimeRange,
        layout: LayoutStyle,
    },
    TicketPurchased {
        name: EventName,
        username: Username,
        tickets_sold: u32,
    },
    TicketCanceled {
        name: EventName,
        username: Username,
        tickets_sold: u32,
    },
    Waitlisted {
        name: EventName,
        username: Username,
        position: usize,
    },
    RemovedFromWaitlist {
        name: EventName,
        username: Username,
    },
    ReservationAdded {
        name: EventName,
        reservation_id: ReservationId,
        #[serde_as(as = "DisplayFromStr")]
        time: Timestamp,
    },
    ReservationRemoved {
        name: EventName,
        reservation_id: ReservationId,
    },
    AccessChanged {
        name: EventName,
        open_to_residents: bool,
        open_to_non_residents: bool,
    },
}

impl Change for EventChange {
    type Id = EventName;
}

/// Parameters of a new event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDetails {
    pub layout: LayoutStyle,
    pub public: bool,
    pub max_guests: u32,
    pub ticket_price: Money,
    pub open_to_residents: bool,
    pub open_to_non_residents: bool,
}

#[derive(Debug, Clone)]
pub struct Event {
    name: EventName,
    organizer: Username,
    time: TimeRange,
    layout: LayoutStyle,
    public: bool,
    max_guests: u32,
    ticket_price: Money,
    tickets_sold: u32,
    open_to_residents: bool,
    open_to_non_residents: bool,
    waitlist: VecDeque<Username>,
    reservations: Vec<ReservationId>,
    changes: ChangeQueue<EventChange>,
}

impl Event {
    pub fn create(
        name: EventName,
        organizer: Username,
        time: TimeRange,
        details: EventDetails,
    ) -> Result<Self, EventError> {
        Self::validate_name(&name)?;
        let mut entity = Event {
            name: name.clone(),
            organizer: organizer.clone(),
            time,
            layout: details.layout,
            public: details.public,
            max_guests: details.max_guests,
            ticket_price: details.ticket_price,
            tickets_sold: 0,
            open_to_residents: details.open_to_residents,
            open_to_non_residents: details.open_to_non_residents,
            waitlist: VecDeque::new(),
            reservations: Vec::new(),
            changes: ChangeQueue::new(),
        };
        entity.changes.push(EventChange::EventCreated {
            name,
            organizer,
            time,
            layout: details.layout,
        });
        Ok(entity)
    }

    pub fn name(&self) -> &EventName {
        &self.name
    }

    pub fn organizer(&self) -> &Username {
        &self.organizer
    }

    pub fn time(&self) -> &TimeRange {
        &self.time
    }

    pub fn layout(&self) -> LayoutStyle {
        self.layout
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn max_guests(&self) -> u32 {
        self.max_guests
    }

    pub fn ticket_price(&self) -> Money {
        self.ticket_price
    }

    pub fn tickets_sold(&self) -> u32 {
        self.tickets_sold
    }

    pub fn is_open_to_residents(&self) -> bool {
        self.open_to_residents
    }

    pub fn is_open_to_non_residents(&self) -> bool {
        self.open_to_non_residents
    }

    pub fn waitlist(&self) -> impl Iterator<Item = &Username> {
        self.waitlist.iter()
    }

    pub fn is_waitlisted(&self, username: &Username) -> bool {
        self.waitlist.contains(username)
    }

    pub fn reservations(&self) -> &[ReservationId] {
        &self.reservations
    }

    pub fn details(&self) -> EventDetails {
        EventDetails {
            layout: self.layout,
            public: self.public,
            max_guests: self.max_guests,
            ticket_price: self.ticket_price,
            open_to_residents: self.open_to_residents,
            open_to_non_residents: self.open_to_non_residents,
        }
    }

    pub fn is_within_event_time(&self, instant: Timestamp) -> bool {
        self.time.contains(instant)
    }

    /// Sells a ticket while seats remain, otherwise queues the account.
    /// Only non-residents are gated by the access policy.
    pub fn purchase_ticket(&mut self, account: &Account) -> TicketOutcome {
        let username = account.username().clone();
        if account.role() == Role::NonResident && !self.open_to_non_residents {
            info!(event = %self.name, %username, "ticket denied: closed to non-residents");
            return TicketOutcome::Denied;
        }
        if self.tickets_sold < self.max_guests {
            self.tickets_sold += 1;
            info!(event = %self.name, %username, sold = self.tickets_sold, "ticket purchased");
            self.changes.push(EventChange::TicketPurchased {
                name: self.name.clone(),
                username,
                tickets_sold: self.tickets_sold,
            });
            TicketOutcome::Purchased
        } else {
            self.add_to_waitlist(username);
            TicketOutcome::Waitlisted
        }
    }

    /// Frees one seat. The waitlist is left untouched; nobody is promoted.
    pub fn cancel_ticket(&mut self, username: &Username) -> bool {
        if self.tickets_sold == 0 {
            debug!(event = %self.name, %username, "no tickets to cancel");
            return false;
        }
        self.tickets_sold -= 1;
        info!(event = %self.name, %username, sold = self.tickets_sold, "ticket canceled");
        self.changes.push(EventChange::TicketCanceled {
            name: self.name.clone(),
            username: username.clone(),
            tickets_sold: self.tickets_sold,
        });
        true
    }

    pub fn add_to_waitlist(&mut self, username: Username) {
        self.waitlist.push_back(username.clone());
        info!(event = %self.name, %username, position = self.waitlist.len(), "added to waitlist");
        self.changes.push(EventChange::Waitlisted {
            name: self.name.clone(),
            username,
            position: self.waitlist.len(),
        });
    }

    pub fn remove_from_waitlist(&mut self, username: &Username) -> bool {
        let before = self.waitlist.len();
        self.waitlist.retain(|u| u != username);
        let removed = self.waitlist.len() != before;
        if removed {
            self.changes.push(EventChange::RemovedFromWaitlist {
                name: self.name.clone(),
                username: username.clone(),
            });
        }
        removed
    }

    /// Registration only; capacity is governed by tickets, not by this list.
    pub fn add_reservation(&mut self, reservation_id: ReservationId, time: Timestamp) {
        self.reservations.push(reservation_id);
        self.changes.push(EventChange::ReservationAdded {
            name: self.name.clone(),
            reservation_id,
            time,
        });
    }

    pub fn remove_reservation(&mut self, reservation_id: ReservationId) -> bool {
        let before = self.reservations.len();
        self.reservations.retain(|id| *id != reservation_id);
        let removed = self.reservations.len() != before;
        if removed {
            self.changes.push(EventChange::ReservationRemoved {
                name: self.name.clone(),
                reservation_id,
            });
        }
        removed
    }

    pub fn set_open_to_residents(&mut self, open: bool) {
        self.open_to_residents = open;
        self.push_access_changed();
    }

    pub fn set_open_to_non_residents(&mut self, open: bool) {
        self.open_to_non_residents = open;
        self.push_access_changed();
    }

    /// Ticket counts are not persisted; the loader rebuilds them from live reservations.
    pub(crate) fn restore_tickets_sold(&mut self, count: u32) {
        self.tickets_sold = count.min(self.max_guests);
    }

    fn push_access_changed(&mut self) {
        self.changes.push(EventChange::AccessChanged {
            name: self.name.clone(),
            open_to_residents: self.open_to_residents,
            open_to_non_residents: self.open_to_non_residents,
        });
    }

    fn validate_name(name: &EventName) -> Result<(), EventError> {
        match is_record_token(name) {
            true => Ok(()),
            false => Err(EventError::InvalidName),
        }
    }
}

impl Entity for Event {
    type Id = EventName;

    const ENTITY_NAME: &'static str = "event";

    fn id(&self) -> Self::Id {
        self.name.clone()
    }
}

impl Aggregation for Event {
    type Change = EventChange;

    fn changes(&self) -> &ChangeQueue<Self::Change> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeQueue<Self::Change> {
        &mut self.changes
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.organizer == other.organizer
            && self.time == other.time
            && self.details() == other.details()
            && self.tickets_sold == other.tickets_sold
            && self.waitlist == other.waitlist
            && self.reservations == other.reservations
    }
}

impl Eq for Event {}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[display(fmt = "Event name must be a single non-empty word")]
    InvalidName,
    #[display(fmt = "Unknown layout {:?}, expected Meeting, Lecture, Wedding or Dance", _0)]
    UnknownLayout(#[error(not(source))] String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(max_guests: u32) -> EventDetails {
        EventDetails {
            layout: LayoutStyle::Wedding,
            public: true,
            max_guests,
            ticket_price: Money::from_units(50),
            open_to_residents: true,
            open_to_non_residents: true,
        }
    }

    fn gala(max_guests: u32) -> Event {
        Event::create(
            "Gala".into(),
            "admin".into(),
            TimeRange::parse("2024-06-01T18:00", "2024-06-01T20:00").unwrap(),
            details(max_guests),
        )
        .unwrap()
    }

    fn account(name: &str, role: Role) -> Account {
        Account::create(name.into(), "pw".to_owned(), role).unwrap()
    }

    #[test]
    fn test_event_create() {
        let mut event = gala(10);
        assert_eq!(event.name(), &EventName::from("Gala"));
        assert_eq!(event.tickets_sold(), 0);
        assert!(event.is_open_to_residents());
        assert!(event.is_open_to_non_residents());
        assert!(matches!(event.pop(), Some(EventChange::EventCreated { .. })));
        assert!(event.peek().is_none());
    }

    #[test]
    fn test_event_rejects_blank_name() {
        let result = Event::create(
            " ".into(),
            "admin".into(),
            TimeRange::parse("2024-06-01T18:00", "2024-06-01T20:00").unwrap(),
            details(1),
        );
        assert_eq!(result, Err(EventError::InvalidName));
    }

    #[test]
    fn test_full_event_waitlists() {
        let mut event = gala(1);
        let alice = account("alice", Role::Resident);
        let bob = account("bob", Role::NonResident);
        let carol = account("carol", Role::City);
        assert_eq!(event.purchase_ticket(&alice), TicketOutcome::Purchased);
        assert_eq!(event.purchase_ticket(&bob), TicketOutcome::Waitlisted);
        assert_eq!(event.purchase_ticket(&carol), TicketOutcome::Waitlisted);
        assert_eq!(event.tickets_sold(), 1);
        assert_eq!(
            event.waitlist().cloned().collect::<Vec<_>>(),
            vec![Username::from("bob"), Username::from("carol")]
        );
    }

    #[test]
    fn test_non_residents_denied_when_closed() {
        let mut event = gala(5);
        event.set_open_to_non_residents(false);
        let bob = account("bob", Role::NonResident);
        let alice = account("alice", Role::Resident);
        assert_eq!(event.purchase_ticket(&bob), TicketOutcome::Denied);
        assert_eq!(event.tickets_sold(), 0);
        assert!(!event.is_waitlisted(bob.username()));
        assert_eq!(event.purchase_ticket(&alice), TicketOutcome::Purchased);
    }

    #[test]
    fn test_closed_to_residents_is_not_enforced() {
        let mut event = gala(5);
        event.set_open_to_residents(false);
        event.set_open_to_non_residents(false);
        let alice = account("alice", Role::Resident);
        assert_eq!(event.purchase_ticket(&alice), TicketOutcome::Purchased);
    }

    #[test]
    fn test_cancel_ticket_does_not_promote() {
        let mut event = gala(1);
        let alice = account("alice", Role::Resident);
        let bob = account("bob", Role::Resident);
        event.purchase_ticket(&alice);
        event.purchase_ticket(&bob);
        assert!(event.cancel_ticket(alice.username()));
        assert_eq!(event.tickets_sold(), 0);
        assert!(event.is_waitlisted(bob.username()));
        assert!(!event.cancel_ticket(alice.username()));
        assert_eq!(event.tickets_sold(), 0);
    }

    #[test]
    fn test_remove_from_waitlist() {
        let mut event = gala(0);
        let bob = account("bob", Role::Resident);
        event.purchase_ticket(&bob);
        assert!(event.remove_from_waitlist(bob.username()));
        assert!(!event.remove_from_waitlist(bob.username()));
        assert_eq!(event.waitlist().count(), 0);
    }

    #[test]
    fn test_reservations_are_not_capacity_checked() {
        let mut event = gala(1);
        let at = "2024-06-01T19:00".parse().unwrap();
        event.add_reservation(ReservationId::from(1), at);
        event.add_reservation(ReservationId::from(2), at);
        assert_eq!(event.reservations().len(), 2);
        assert!(event.remove_reservation(ReservationId::from(1)));
        assert_eq!(event.reservations(), &[ReservationId::from(2)]);
    }

    #[test]
    fn test_is_within_event_time() {
        let event = gala(1);
        assert!(event.is_within_event_time("2024-06-01T18:00".parse().unwrap()));
        assert!(!event.is_within_event_time("2024-06-01T17:59".parse().unwrap()));
    }

    #[test]
    fn test_restore_tickets_sold_is_capped() {
        let mut event = gala(2);
        event.restore_tickets_sold(5);
        assert_eq!(event.tickets_sold(), 2);
    }
}
