use std::str::FromStr;

use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use tracing::info;

use crate::domain::{Aggregation, Change, ChangeQueue, Entity, Id};

use super::{Account, Event, EventName, Money, Role, Timestamp, Username};

/// Standard service charge per hour, before the role surcharge.
pub const HOURLY_SERVICE_CHARGE: Money = Money::from_units(10);

/// Where reservation payments and refunds are booked.
pub trait Ledger {
    fn update_budget(&mut self, amount: Money);
}

/// Reservation ID, handed out by a monotonic sequence and never reused.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Deref,
    Default,
)]
pub struct ReservationId(u64);

impl Id for ReservationId {
    type Inner = u64;
}

impl ReservationId {
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl FromStr for ReservationStatus {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Canceled" => Ok(Self::Canceled),
            _ => Err(ReservationError::UnknownStatus(s.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl FromStr for PaymentStatus {
    type Err = ReservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unpaid" => Ok(Self::Unpaid),
            "Paid" => Ok(Self::Paid),
            _ => Err(ReservationError::UnknownPaymentStatus(s.to_owned())),
        }
    }
}

/// Price of booking `hours` for an account of `role`.
pub fn calculate_cost(role: Role, hours: i64) -> Money {
    let rate = HOURLY_SERVICE_CHARGE + role.hourly_surcharge();
    Money::from_cents(rate.cents() * hours)
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationChange {
    ReservationCreated {
        id: ReservationId,
        username: Username,
        event: EventName,
        #[serde_as(as = "DisplayFromStr")]
        time: Timestamp,
        total_cost: Money,
    },
    PaymentMade {
        id: ReservationId,
        amount: Money,
    },
    ReservationCanceled {
        id: ReservationId,
        refunded: Money,
    },
}

impl Change for ReservationChange {
    type Id = ReservationId;
}

#[derive(Debug, Clone)]
pub struct Reservation {
    id: ReservationId,
    username: Username,
    event: EventName,
    time: Timestamp,
    status: ReservationStatus,
    payment_status: PaymentStatus,
    total_cost: Money,
    changes: ChangeQueue<ReservationChange>,
}

impl Reservation {
    /// Books `account` onto `event` and registers the reservation with both.
    pub fn create(
        id: ReservationId,
        account: &mut Account,
        event: &mut Event,
        time: Timestamp,
    ) -> Result<Self, ReservationError> {
        if !event.is_within_event_time(time) {
            return Err(ReservationError::OutsideEventTime(time));
        }
        let total_cost = calculate_cost(account.role(), event.time().hour_span());
        let mut entity = Self::register(
            id,
            account,
            event,
            time,
            ReservationStatus::Pending,
            PaymentStatus::Unpaid,
            total_cost,
        );
        entity.changes.push(ReservationChange::ReservationCreated {
            id,
            username: entity.username.clone(),
            event: entity.event.clone(),
            time,
            total_cost,
        });
        Ok(entity)
    }

    /// Rebuilds a persisted reservation as-is, without cost or time checks.
    pub fn restore(
        id: ReservationId,
        account: &mut Account,
        event: &mut Event,
        time: Timestamp,
        status: ReservationStatus,
        payment_status: PaymentStatus,
        total_cost: Money,
    ) -> Self {
        let mut entity = Self::register(
            id,
            account,
            event,
            time,
            status,
            payment_status,
            total_cost,
        );
        entity.clear();
        entity
    }

    fn register(
        id: ReservationId,
        account: &mut Account,
        event: &mut Event,
        time: Timestamp,
        status: ReservationStatus,
        payment_status: PaymentStatus,
        total_cost: Money,
    ) -> Self {
        account.add_reservation(id);
        event.add_reservation(id, time);
        Reservation {
            id,
            username: account.username().clone(),
            event: event.name().clone(),
            time,
            status,
            payment_status,
            total_cost,
            changes: ChangeQueue::new(),
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn event(&self) -> &EventName {
        &self.event
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn total_cost(&self) -> Money {
        self.total_cost
    }

    pub fn is_canceled(&self) -> bool {
        self.status == ReservationStatus::Canceled
    }

    pub fn make_payment<L: Ledger>(&mut self, ledger: &mut L) -> Result<(), ReservationError> {
        self.validate_payable()?;
        self.payment_status = PaymentStatus::Paid;
        self.status = ReservationStatus::Confirmed;
        ledger.update_budget(self.total_cost);
        info!(id = %self.id, amount = %self.total_cost, "payment made");
        self.changes.push(ReservationChange::PaymentMade {
            id: self.id,
            amount: self.total_cost,
        });
        Ok(())
    }

    /// Cancels the reservation and returns what was paid. Unpaid reservations
    /// refund nothing, and an already canceled one is left alone.
    pub fn process_refund<L: Ledger>(&mut self, ledger: &mut L) -> Money {
        if self.is_canceled() {
            return Money::ZERO;
        }
        let refunded = match self.payment_status {
            PaymentStatus::Paid => self.total_cost,
            PaymentStatus::Unpaid => Money::ZERO,
        };
        if !refunded.is_zero() {
            ledger.update_budget(-refunded);
        }
        self.payment_status = PaymentStatus::Unpaid;
        self.status = ReservationStatus::Canceled;
        info!(id = %self.id, %refunded, "reservation canceled");
        self.changes.push(ReservationChange::ReservationCanceled {
            id: self.id,
            refunded,
        });
        refunded
    }

    fn validate_payable(&self) -> Result<(), ReservationError> {
        if self.is_canceled() {
            return Err(ReservationError::Canceled(self.id));
        }
        match self.payment_status {
            PaymentStatus::Paid => Err(ReservationError::AlreadyPaid(self.id)),
            PaymentStatus::Unpaid => Ok(()),
        }
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    const ENTITY_NAME: &'static str = "reservation";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Reservation {
    type Change = ReservationChange;

    fn changes(&self) -> &ChangeQueue<Self::Change> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeQueue<Self::Change> {
        &mut self.changes
    }
}

impl PartialEq for Reservation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.username == other.username
            && self.event == other.event
            && self.time == other.time
            && self.status == other.status
            && self.payment_status == other.payment_status
            && self.total_cost == other.total_cost
    }
}

impl Eq for Reservation {}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[display(fmt = "Reservation time {} is outside the event's start and end times", _0)]
    OutsideEventTime(#[error(not(source))] Timestamp),
    #[display(fmt = "Reservation {} is already paid", _0)]
    AlreadyPaid(#[error(not(source))] ReservationId),
    #[display(fmt = "Reservation {} is canceled", _0)]
    Canceled(#[error(not(source))] ReservationId),
    #[display(fmt = "Unknown reservation status {:?}", _0)]
    UnknownStatus(#[error(not(source))] String),
    #[display(fmt = "Unknown payment status {:?}", _0)]
    UnknownPaymentStatus(#[error(not(source))] String),
}
