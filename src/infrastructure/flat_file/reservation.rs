use crate::domain::core::{
    EventName, Money, PaymentStatus, Reservation, ReservationId, ReservationStatus, Timestamp,
    Username,
};
use crate::domain::Entity;

use super::{field, fields, Record, RecordError};

/// A reservation row. It only becomes a [`Reservation`] once its account and
/// event are known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationRecord {
    pub id: ReservationId,
    pub username: Username,
    pub event: EventName,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub total_cost: Money,
    pub time: Timestamp,
}

impl From<&Reservation> for ReservationRecord {
    fn from(value: &Reservation) -> Self {
        Self {
            id: value.id(),
            username: value.username().clone(),
            event: value.event().clone(),
            status: value.status(),
            payment_status: value.payment_status(),
            total_cost: value.total_cost(),
            time: value.time(),
        }
    }
}

/// `id username eventName status paymentStatus totalCost reservationTime`
impl Record for ReservationRecord {
    const TABLE: &'static str = Reservation::ENTITY_NAME;

    fn parse(line: &str) -> Result<Self, RecordError> {
        let [id, username, event, status, payment_status, total_cost, time] = fields(line)?;
        Ok(Self {
            id: ReservationId::from(field::<u64>("id", id)?),
            username: username.into(),
            event: event.into(),
            status: field("status", status)?,
            payment_status: field("paymentStatus", payment_status)?,
            total_cost: field("totalCost", total_cost)?,
            time: time.parse()?,
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}",
            self.id,
            self.username,
            self.event,
            self.status,
            self.payment_status,
            self.total_cost.to_plain_string(),
            self.time
        )
    }
}
