use std::str::FromStr;

use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Aggregation, Change, ChangeQueue, Entity, Id};

use super::{is_record_token, Money, ReservationId};

/// Unique login name, the key of the account table.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Deref,
)]
pub struct Username(String);

impl Id for Username {
    type Inner = String;
}

impl From<&str> for Username {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Role {
    City,
    Organization,
    Resident,
    NonResident,
}

impl Role {
    /// Hours an account of this role may hold per week.
    pub fn weekly_cap(&self) -> i64 {
        match self {
            Role::City => 48,
            Role::Organization => 36,
            Role::Resident | Role::NonResident => 24,
        }
    }

    /// Per-hour charge added on top of the standard service charge.
    pub fn hourly_surcharge(&self) -> Money {
        match self {
            Role::City => Money::from_units(5),
            Role::Organization => Money::from_units(20),
            Role::Resident => Money::from_units(10),
            Role::NonResident => Money::from_units(15),
        }
    }
}

impl FromStr for Role {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "City" => Ok(Role::City),
            "Organization" => Ok(Role::Organization),
            "Resident" => Ok(Role::Resident),
            "NonResident" => Ok(Role::NonResident),
            _ => Err(AccountError::UnknownRole(s.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountChange {
    AccountCreated {
        username: Username,
        role: Role,
    },
    PasswordChanged {
        username: Username,
    },
    ReservationAdded {
        username: Username,
        reservation_id: ReservationId,
    },
    ReservationRemoved {
        username: Username,
        reservation_id: ReservationId,
    },
    WeeklyHoursChanged {
        username: Username,
        hours: i64,
    },
    RefundIssued {
        username: Username,
        amount: Money,
    },
}

impl Change for AccountChange {
    type Id = Username;
}

#[derive(Debug, Clone)]
pub struct Account {
    username: Username,
    password: String,
    role: Role,
    weekly_hours: i64,
    reservations: Vec<ReservationId>,
    changes: ChangeQueue<AccountChange>,
}

impl Account {
    pub fn create(username: Username, password: String, role: Role) -> Result<Self, AccountError> {
        Self::validate_username(&username)?;
        Self::validate_password(&password)?;
        let mut entity = Account {
            username: username.clone(),
            password,
            role,
            weekly_hours: 0,
            reservations: Vec::new(),
            changes: ChangeQueue::new(),
        };
        entity
            .changes
            .push(AccountChange::AccountCreated { username, role });
        Ok(entity)
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn weekly_hours(&self) -> i64 {
        self.weekly_hours
    }

    pub fn reservations(&self) -> &[ReservationId] {
        &self.reservations
    }

    /// Plain-text comparison.
    pub fn verify_password(&self, password: &str) -> bool {
        self.password == password
    }

    pub fn change_password(&mut self, password: String) -> Result<(), AccountError> {
        Self::validate_password(&password)?;
        self.password = password;
        self.changes.push(AccountChange::PasswordChanged {
            username: self.username.clone(),
        });
        Ok(())
    }

    /// Appends without checking for duplicates; callers scan [`Account::reservations`] first.
    pub fn add_reservation(&mut self, reservation_id: ReservationId) {
        self.reservations.push(reservation_id);
        self.changes.push(AccountChange::ReservationAdded {
            username: self.username.clone(),
            reservation_id,
        });
    }

    pub fn remove_reservation(&mut self, reservation_id: ReservationId) -> bool {
        let before = self.reservations.len();
        self.reservations.retain(|id| *id != reservation_id);
        let removed = self.reservations.len() != before;
        if removed {
            self.changes.push(AccountChange::ReservationRemoved {
                username: self.username.clone(),
                reservation_id,
            });
        }
        removed
    }

    pub fn check_weekly_limit(&self, hours: i64) -> bool {
        self.weekly_hours + hours <= self.role.weekly_cap()
    }

    pub fn add_reservation_hours(&mut self, hours: i64) {
        self.set_weekly_hours(self.weekly_hours + hours);
    }

    /// Never drops below zero.
    pub fn subtract_reservation_hours(&mut self, hours: i64) {
        self.set_weekly_hours((self.weekly_hours - hours).max(0));
    }

    pub fn reset_weekly_hours(&mut self) {
        if self.weekly_hours != 0 {
            self.set_weekly_hours(0);
        }
    }

    /// Notification that money went back to this account; there is no wallet to credit.
    pub fn process_refund(&mut self, amount: Money) {
        info!(username = %self.username, %amount, "refund issued");
        self.changes.push(AccountChange::RefundIssued {
            username: self.username.clone(),
            amount,
        });
    }

    fn set_weekly_hours(&mut self, hours: i64) {
        self.weekly_hours = hours;
        self.changes.push(AccountChange::WeeklyHoursChanged {
            username: self.username.clone(),
            hours,
        });
    }

    fn validate_username(username: &Username) -> Result<(), AccountError> {
        match is_record_token(username) {
            true => Ok(()),
            false => Err(AccountError::InvalidUsername),
        }
    }

    fn validate_password(password: &str) -> Result<(), AccountError> {
        match is_record_token(password) {
            true => Ok(()),
            false => Err(AccountError::InvalidPassword),
        }
    }
}

impl Entity for Account {
    type Id = Username;

    const ENTITY_NAME: &'static str = "account";

    fn id(&self) -> Self::Id {
        self.username.clone()
    }
}

impl Aggregation for Account {
    type Change = AccountChange;

    fn changes(&self) -> &ChangeQueue<Self::Change> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeQueue<Self::Change> {
        &mut self.changes
    }
}

/// Weekly hours are session state and take no part in equality.
impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.password == other.password
            && self.role == other.role
            && self.reservations == other.reservations
    }
}

impl Eq for Account {}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[display(fmt = "Username must be a single non-empty word")]
    InvalidUsername,
    #[display(fmt = "Password must be a single non-empty word")]
    InvalidPassword,
    #[display(fmt = "Unknown role {:?}, expected City, Organization, Resident or NonResident", _0)]
    UnknownRole(#[error(not(source))] String),
}
