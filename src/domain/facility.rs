mod manager;

use std::collections::BTreeMap;

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::core::{
    Account, AccountChange, AccountError, Event, EventChange, EventError, EventName, Money,
    PaymentStatus, Reservation, ReservationChange, ReservationError, ReservationId,
    ReservationStatus, Role, ScheduleError, TicketOutcome, TimeError, TimeRange, Timestamp,
    Username,
};
use crate::domain::{Aggregation, ChangeQueue, DataAccessError, Entity};

pub use self::manager::*;

/// Everything a caller may get back from a booking attempt that was not rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    Reserved(ReservationId),
    Waitlisted { position: usize },
}

/// A reservation refunded while its event was being canceled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refund {
    pub reservation_id: ReservationId,
    pub username: Username,
    pub amount: Money,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventCancellation {
    pub event: EventName,
    pub refunds: Vec<Refund>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacilityChange {
    Account(AccountChange),
    Event(EventChange),
    Reservation(ReservationChange),
    Manager(ManagerChange),
}

/// Storage of the whole set of facility tables.
pub trait FacilityRepository {
    fn load(&self) -> Result<Facility, DataAccessError>;
    fn save(&self, facility: &Facility) -> Result<(), DataAccessError>;
}

/// The tables every facility operation works against: accounts, events (through
/// the manager), reservations and the budget.
#[derive(Debug)]
pub struct Facility {
    accounts: BTreeMap<Username, Account>,
    manager: FacilityManager,
    reservations: BTreeMap<ReservationId, Reservation>,
    next_reservation_id: ReservationId,
    changes: ChangeQueue<FacilityChange>,
}

impl Default for Facility {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            manager: FacilityManager::new(),
            reservations: BTreeMap::new(),
            next_reservation_id: ReservationId::from(1),
            changes: ChangeQueue::new(),
        }
    }
}

impl Facility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, username: &Username, password: &str) -> Result<&Account, FacilityError> {
        match self.accounts.get(username) {
            Some(account) if account.verify_password(password) => {
                info!(%username, "login");
                Ok(account)
            }
            _ => {
                warn!(%username, "invalid username or password");
                Err(FacilityError::InvalidCredentials)
            }
        }
    }

    pub fn create_account(
        &mut self,
        username: Username,
        password: String,
        role: Role,
    ) -> Result<(), FacilityError> {
        let account = Account::create(username, password, role)?;
        self.insert_account(account)?;
        self.collect_changes();
        Ok(())
    }

    pub fn change_password(
        &mut self,
        username: &Username,
        password: String,
    ) -> Result<(), FacilityError> {
        self.account_mut(username)?.change_password(password)?;
        self.collect_changes();
        Ok(())
    }

    /// Events in start-time order.
    pub fn view_schedule(&self) -> Vec<&Event> {
        self.manager
            .schedule()
            .slots()
            .iter()
            .filter_map(|slot| self.manager.event(slot.event()))
            .collect()
    }

    /// Books `username` onto an event. A full event queues the account on the
    /// waitlist instead; nothing is charged until [`Facility::make_payment`].
    /// A waitlisted account that retries after a seat frees up leaves the
    /// waitlist and takes the seat.
    pub fn make_reservation(
        &mut self,
        username: &Username,
        event_name: &EventName,
        time: &str,
    ) -> Result<BookingOutcome, FacilityError> {
        let (time, hours) = self.validate_reservation(username, event_name, time)?;
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| FacilityError::AccountNotFound(username.clone()))?;
        let event = self
            .manager
            .event_mut(event_name)
            .ok_or_else(|| FacilityError::EventNotFound(event_name.clone()))?;
        let outcome = match event.purchase_ticket(account) {
            TicketOutcome::Denied => Err(FacilityError::AccessDenied(event_name.clone())),
            TicketOutcome::Waitlisted => Ok(BookingOutcome::Waitlisted {
                position: event.waitlist().count(),
            }),
            TicketOutcome::Purchased => {
                let id = self.next_reservation_id;
                match Reservation::create(id, account, event, time) {
                    Ok(reservation) => {
                        event.remove_from_waitlist(username);
                        account.add_reservation_hours(hours);
                        self.next_reservation_id = id.next();
                        info!(%id, %username, event = %event_name, cost = %reservation.total_cost(), "reservation made");
                        self.reservations.insert(id, reservation);
                        Ok(BookingOutcome::Reserved(id))
                    }
                    Err(e) => {
                        event.cancel_ticket(username);
                        Err(e.into())
                    }
                }
            }
        };
        self.collect_changes();
        outcome
    }

    /// Cancels one of `username`'s reservations and returns the refunded amount.
    pub fn cancel_reservation(
        &mut self,
        username: &Username,
        id: ReservationId,
    ) -> Result<Money, FacilityError> {
        self.owned_reservation(username, id)?;
        let refunded = self
            .retire_reservation(id)
            .map(|refund| refund.amount)
            .unwrap_or(Money::ZERO);
        self.collect_changes();
        Ok(refunded)
    }

    /// Pays for one of `username`'s reservations and returns the amount charged.
    pub fn make_payment(
        &mut self,
        username: &Username,
        id: ReservationId,
    ) -> Result<Money, FacilityError> {
        self.owned_reservation(username, id)?;
        let reservation = self
            .reservations
            .get_mut(&id)
            .ok_or(FacilityError::ReservationNotFound(id))?;
        let result = reservation.make_payment(&mut self.manager);
        let amount = reservation.total_cost();
        self.collect_changes();
        result?;
        Ok(amount)
    }

    pub fn create_event(&mut self, request: NewEvent) -> Result<(), FacilityError> {
        let name = request.name.clone();
        let result = self.manager.create_event(request, &mut self.accounts);
        match &result {
            Ok(()) => info!(event = %name, "event created"),
            Err(e) => warn!(event = %name, error = %e, "event rejected"),
        }
        self.collect_changes();
        result
    }

    /// Refunds and deletes every reservation attached to the event, then removes it.
    pub fn cancel_event(&mut self, name: &EventName) -> Result<EventCancellation, FacilityError> {
        let ids = match self.manager.event(name) {
            Some(event) => event.reservations().to_vec(),
            None => return Err(FacilityError::EventNotFound(name.clone())),
        };
        let mut refunds = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(refund) = self.retire_reservation(id) {
                refunds.push(refund);
            }
        }
        let mut event = self.manager.remove_event(name)?;
        if let Some(organizer) = self.accounts.get_mut(event.organizer()) {
            organizer.subtract_reservation_hours(event.time().elapsed_hours());
        }
        self.changes
            .extend(event.pop_all().into_iter().map(FacilityChange::Event));
        info!(event = %name, refunds = refunds.len(), "event canceled");
        self.collect_changes();
        Ok(EventCancellation {
            event: name.clone(),
            refunds,
        })
    }

    pub fn view_budget(&self) -> Money {
        self.manager.budget()
    }

    pub fn manager(&self) -> &FacilityManager {
        &self.manager
    }

    pub fn account(&self, username: &Username) -> Option<&Account> {
        self.accounts.get(username)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn event(&self, name: &EventName) -> Option<&Event> {
        self.manager.event(name)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.manager.events()
    }

    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    pub fn account_reservations(
        &self,
        username: &Username,
    ) -> Result<Vec<&Reservation>, FacilityError> {
        let account = self
            .accounts
            .get(username)
            .ok_or_else(|| FacilityError::AccountNotFound(username.clone()))?;
        Ok(account
            .reservations()
            .iter()
            .filter_map(|id| self.reservations.get(id))
            .collect())
    }

    pub fn waitlist(&self, name: &EventName) -> Result<Vec<&Username>, FacilityError> {
        self.manager
            .event(name)
            .map(|event| event.waitlist().collect())
            .ok_or_else(|| FacilityError::EventNotFound(name.clone()))
    }

    pub fn next_reservation_id(&self) -> ReservationId {
        self.next_reservation_id
    }

    /// Clears every account's weekly hour counter.
    pub fn start_new_week(&mut self) {
        self.accounts
            .values_mut()
            .for_each(Account::reset_weekly_hours);
        self.collect_changes();
    }

    /// Every change recorded since the last drain, oldest first.
    pub fn drain_changes(&mut self) -> Vec<FacilityChange> {
        self.collect_changes();
        let mut changes = Vec::with_capacity(self.changes.len());
        while let Some(c) = self.changes.pop() {
            changes.push(c);
        }
        changes
    }

    /// Adds a persisted account.
    pub fn insert_account(&mut self, account: Account) -> Result<(), FacilityError> {
        if self.accounts.contains_key(account.username()) {
            return Err(FacilityError::DuplicateUsername(account.id()));
        }
        info!(username = %account.username(), role = %account.role(), "account added");
        self.accounts.insert(account.id(), account);
        Ok(())
    }

    /// Adds a persisted event; its organizer must already exist.
    pub fn insert_event(&mut self, event: Event) -> Result<(), FacilityError> {
        if !self.accounts.contains_key(event.organizer()) {
            return Err(FacilityError::AccountNotFound(event.organizer().clone()));
        }
        self.manager.insert_event(event)
    }

    /// Rebuilds a persisted reservation and its back-references.
    #[allow(clippy::too_many_arguments)]
    pub fn restore_reservation(
        &mut self,
        id: ReservationId,
        username: &Username,
        event_name: &EventName,
        status: ReservationStatus,
        payment_status: PaymentStatus,
        total_cost: Money,
        time: Timestamp,
    ) -> Result<(), FacilityError> {
        if self.reservations.contains_key(&id) {
            return Err(FacilityError::DuplicateReservation(id));
        }
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| FacilityError::AccountNotFound(username.clone()))?;
        let event = self
            .manager
            .event_mut(event_name)
            .ok_or_else(|| FacilityError::EventNotFound(event_name.clone()))?;
        let reservation = Reservation::restore(
            id,
            account,
            event,
            time,
            status,
            payment_status,
            total_cost,
        );
        self.reservations.insert(id, reservation);
        if self.next_reservation_id <= id {
            self.next_reservation_id = id.next();
        }
        Ok(())
    }

    /// Never moves the sequence backwards past an existing reservation.
    pub fn set_next_reservation_id(&mut self, id: ReservationId) {
        self.next_reservation_id = self.next_reservation_id.max(id);
    }

    /// Ticket counts are derived from live reservations after a load.
    pub fn rebuild_ticket_counts(&mut self) {
        let reservations = &self.reservations;
        for event in self.manager.events_mut() {
            let live = event
                .reservations()
                .iter()
                .filter_map(|id| reservations.get(id))
                .filter(|r| !r.is_canceled())
                .count();
            event.restore_tickets_sold(u32::try_from(live).unwrap_or(u32::MAX));
        }
    }

    /// The budget is derived from paid live reservations after a load.
    pub fn rebuild_budget(&mut self) {
        let balance = self
            .reservations
            .values()
            .filter(|r| !r.is_canceled() && r.payment_status() == PaymentStatus::Paid)
            .fold(Money::ZERO, |sum, r| sum + r.total_cost());
        self.manager.restore_budget(balance);
    }

    /// Drops recorded changes, e.g. the registrations produced while loading.
    pub fn discard_changes(&mut self) {
        self.accounts.values_mut().for_each(Aggregation::clear);
        self.manager.events_mut().for_each(Aggregation::clear);
        self.reservations.values_mut().for_each(Aggregation::clear);
        self.manager.pop_all();
        self.changes.clear();
    }

    fn validate_reservation(
        &self,
        username: &Username,
        event_name: &EventName,
        time: &str,
    ) -> Result<(Timestamp, i64), FacilityError> {
        let account = self
            .accounts
            .get(username)
            .ok_or_else(|| FacilityError::AccountNotFound(username.clone()))?;
        let event = self
            .manager
            .event(event_name)
            .ok_or_else(|| FacilityError::EventNotFound(event_name.clone()))?;
        let booked = account
            .reservations()
            .iter()
            .filter_map(|id| self.reservations.get(id))
            .filter(|r| !r.is_canceled())
            .any(|r| r.event() == event_name);
        if booked {
            return Err(FacilityError::DuplicateBooking(event_name.clone()));
        }
        if event.is_waitlisted(username) && event.tickets_sold() >= event.max_guests() {
            return Err(FacilityError::AlreadyWaitlisted(event_name.clone()));
        }
        let time: Timestamp = time.parse()?;
        if !event.is_within_event_time(time) {
            return Err(ReservationError::OutsideEventTime(time).into());
        }
        let hours = event.time().elapsed_hours();
        if !account.check_weekly_limit(hours) {
            return Err(FacilityError::WeeklyLimitExceeded {
                username: username.clone(),
                hours,
            });
        }
        Ok((time, hours))
    }

    fn owned_reservation(
        &self,
        username: &Username,
        id: ReservationId,
    ) -> Result<&Reservation, FacilityError> {
        let reservation = self
            .reservations
            .get(&id)
            .ok_or(FacilityError::ReservationNotFound(id))?;
        if reservation.username() != username {
            return Err(FacilityError::NotOwner(id));
        }
        Ok(reservation)
    }

    /// Refunds a reservation and scrubs it from the table, its account and its event.
    fn retire_reservation(&mut self, id: ReservationId) -> Option<Refund> {
        let mut reservation = self.reservations.remove(&id)?;
        let live = !reservation.is_canceled();
        let amount = reservation.process_refund(&mut self.manager);
        let username = reservation.username().clone();
        let mut hours = 0;
        if let Some(event) = self.manager.event_mut(reservation.event()) {
            event.remove_reservation(id);
            if live {
                event.cancel_ticket(&username);
                hours = event.time().elapsed_hours();
            }
        }
        if let Some(account) = self.accounts.get_mut(&username) {
            account.remove_reservation(id);
            account.subtract_reservation_hours(hours);
            if !amount.is_zero() {
                account.process_refund(amount);
            }
        }
        self.changes.extend(
            reservation
                .pop_all()
                .into_iter()
                .map(FacilityChange::Reservation),
        );
        Some(Refund {
            reservation_id: id,
            username,
            amount,
        })
    }

    fn account_mut(&mut self, username: &Username) -> Result<&mut Account, FacilityError> {
        self.accounts
            .get_mut(username)
            .ok_or_else(|| FacilityError::AccountNotFound(username.clone()))
    }

    fn collect_changes(&mut self) {
        let accounts = self
            .accounts
            .values_mut()
            .flat_map(|a| a.pop_all())
            .map(FacilityChange::Account);
        self.changes.extend(accounts);
        let events = self
            .manager
            .events_mut()
            .flat_map(|e| e.pop_all())
            .map(FacilityChange::Event)
            .collect::<Vec<_>>();
        self.changes.extend(events);
        let reservations = self
            .reservations
            .values_mut()
            .flat_map(|r| r.pop_all())
            .map(FacilityChange::Reservation);
        self.changes.extend(reservations);
        let manager = self.manager.pop_all().into_iter().map(FacilityChange::Manager);
        self.changes.extend(manager);
    }
}

/// Whether a rejection came from bad input or from a missing record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ErrorKind {
    Validation,
    NotFound,
}

#[derive(Error, Display, Debug, From, Clone, PartialEq, Eq)]
pub enum FacilityError {
    #[display(fmt = "Username {} is already taken", _0)]
    DuplicateUsername(#[error(not(source))] Username),
    #[display(fmt = "Invalid username or password")]
    InvalidCredentials,
    #[display(fmt = "Account {} not found", _0)]
    AccountNotFound(#[error(not(source))] Username),
    #[display(fmt = "Event {} not found", _0)]
    EventNotFound(#[error(not(source))] EventName),
    #[display(fmt = "Reservation {} not found", _0)]
    ReservationNotFound(#[error(not(source))] ReservationId),
    #[display(fmt = "Reservation {} already exists", _0)]
    DuplicateReservation(#[error(not(source))] ReservationId),
    #[display(fmt = "Event with name {} already exists", _0)]
    DuplicateEventName(#[error(not(source))] EventName),
    #[display(fmt = "The facility is not available during this time slot (conflicts with {})", _0)]
    SlotUnavailable(#[error(not(source))] EventName),
    #[display(fmt = "Booking {} hours exceeds the weekly limit for {}", hours, username)]
    WeeklyLimitExceeded { username: Username, hours: i64 },
    #[display(fmt = "The event time {} is outside the facility's operating hours", _0)]
    OutsideOperatingHours(#[error(not(source))] TimeRange),
    #[display(fmt = "You already have a reservation for {}", _0)]
    DuplicateBooking(#[error(not(source))] EventName),
    #[display(fmt = "You are already on the waitlist for {}", _0)]
    AlreadyWaitlisted(#[error(not(source))] EventName),
    #[display(fmt = "{} is not open to non-residents", _0)]
    AccessDenied(#[error(not(source))] EventName),
    #[display(fmt = "Reservation {} belongs to another account", _0)]
    NotOwner(#[error(not(source))] ReservationId),
    #[display(fmt = "{}", _0)]
    #[from]
    Time(TimeError),
    #[display(fmt = "{}", _0)]
    #[from]
    Account(AccountError),
    #[display(fmt = "{}", _0)]
    #[from]
    Event(EventError),
    #[display(fmt = "{}", _0)]
    #[from]
    Schedule(ScheduleError),
    #[display(fmt = "{}", _0)]
    #[from]
    Reservation(ReservationError),
}

impl FacilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FacilityError::AccountNotFound(_)
            | FacilityError::EventNotFound(_)
            | FacilityError::ReservationNotFound(_)
            | FacilityError::Schedule(ScheduleError::EventNotFound) => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        }
    }
}
