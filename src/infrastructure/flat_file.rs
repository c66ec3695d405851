mod account;
mod event;
mod reservation;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use derive_more::{Display, Error, From};
use tracing::{info, warn};

use crate::domain::core::{
    Account, AccountError, Event, EventError, ReservationId, TimeError,
};
use crate::domain::facility::{Facility, FacilityError, FacilityRepository};
use crate::domain::DataAccessError;
use crate::infrastructure::{read_optional, write_file};
use crate::Storage;

pub use self::reservation::ReservationRecord;

/// One whitespace-delimited line of a table file.
pub trait Record: Sized {
    const TABLE: &'static str;

    fn parse(line: &str) -> Result<Self, RecordError>;
    fn to_line(&self) -> String;
}

#[derive(Debug, Display, Error, From, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[display(fmt = "expected {} fields, found {}", expected, found)]
    FieldCount { expected: usize, found: usize },
    #[display(fmt = "invalid {}: {:?}", field, value)]
    InvalidField { field: &'static str, value: String },
    #[display(fmt = "{}", _0)]
    #[from]
    Time(TimeError),
    #[display(fmt = "{}", _0)]
    #[from]
    Account(AccountError),
    #[display(fmt = "{}", _0)]
    #[from]
    Event(EventError),
}

fn fields<const N: usize>(line: &str) -> Result<[&str; N], RecordError> {
    let fields = line.split_whitespace().collect::<Vec<_>>();
    <[&str; N]>::try_from(fields).map_err(|found| RecordError::FieldCount {
        expected: N,
        found: found.len(),
    })
}

fn field<T: FromStr>(name: &'static str, value: &str) -> Result<T, RecordError> {
    value.parse().map_err(|_| RecordError::InvalidField {
        field: name,
        value: value.to_owned(),
    })
}

/// Access flags are stored as `0` or `1`.
fn flag(name: &'static str, value: &str) -> Result<bool, RecordError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(RecordError::InvalidField {
            field: name,
            value: value.to_owned(),
        }),
    }
}

/// Keeps every table in its own text file next to a file holding the next
/// reservation ID.
#[derive(Clone, Debug)]
pub struct FlatFileStore {
    accounts: PathBuf,
    events: PathBuf,
    reservations: PathBuf,
    sequence: PathBuf,
}

impl FlatFileStore {
    pub fn new(storage: &Storage) -> Self {
        Self {
            accounts: storage.accounts.clone(),
            events: storage.events.clone(),
            reservations: storage.reservations.clone(),
            sequence: storage.sequence.clone(),
        }
    }

    fn load_sequence(&self, facility: &mut Facility) -> Result<(), DataAccessError> {
        let content = match read_optional(&self.sequence)? {
            Some(content) => content,
            None => return Ok(()),
        };
        match content.trim().parse::<u64>() {
            Ok(next) => facility.set_next_reservation_id(ReservationId::from(next)),
            Err(_) => warn!(
                path = %self.sequence.display(),
                value = content.trim(),
                "ignoring malformed reservation sequence"
            ),
        }
        Ok(())
    }
}

impl FacilityRepository for FlatFileStore {
    fn load(&self) -> Result<Facility, DataAccessError> {
        let mut facility = Facility::new();
        load_table::<Account, _>(&self.accounts, |account| facility.insert_account(account))?;
        load_table::<Event, _>(&self.events, |event| facility.insert_event(event))?;
        load_table::<ReservationRecord, _>(&self.reservations, |record| {
            facility.restore_reservation(
                record.id,
                &record.username,
                &record.event,
                record.status,
                record.payment_status,
                record.total_cost,
                record.time,
            )
        })?;
        self.load_sequence(&mut facility)?;
        facility.rebuild_ticket_counts();
        facility.rebuild_budget();
        facility.discard_changes();
        Ok(facility)
    }

    fn save(&self, facility: &Facility) -> Result<(), DataAccessError> {
        write_table(&self.accounts, facility.accounts().map(Record::to_line))?;
        write_table(&self.events, facility.events().map(Record::to_line))?;
        write_table(
            &self.reservations,
            facility
                .reservations()
                .map(|r| ReservationRecord::from(r).to_line()),
        )?;
        write_file(
            &self.sequence,
            &format!("{}\n", facility.next_reservation_id()),
        )?;
        info!(
            accounts = facility.accounts().count(),
            events = facility.events().count(),
            reservations = facility.reservations().count(),
            "tables saved"
        );
        Ok(())
    }
}

/// Feeds every parsable line to `insert`. Lines that fail to parse or that
/// `insert` rejects are skipped with a warning.
fn load_table<R, F>(path: &Path, mut insert: F) -> Result<usize, DataAccessError>
where
    R: Record,
    F: FnMut(R) -> Result<(), FacilityError>,
{
    let content = match read_optional(path)? {
        Some(content) => content,
        None => return Ok(0),
    };
    let mut loaded = 0;
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let result = R::parse(line)
            .map_err(|e| e.to_string())
            .and_then(|record| insert(record).map_err(|e| e.to_string()));
        match result {
            Ok(()) => loaded += 1,
            Err(error) => warn!(
                table = R::TABLE,
                path = %path.display(),
                line = index + 1,
                %error,
                "skipping record"
            ),
        }
    }
    info!(table = R::TABLE, loaded, "table loaded");
    Ok(loaded)
}

fn write_table(path: &Path, lines: impl Iterator<Item = String>) -> Result<(), DataAccessError> {
    let mut content = String::new();
    for line in lines {
        content.push_str(&line);
        content.push('\n');
    }
    write_file(path, &content)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::domain::core::{
        EventDetails, LayoutStyle, Money, PaymentStatus, ReservationStatus, Role,
    };
    use crate::domain::facility::{BookingOutcome, NewEvent};
    use crate::domain::Entity;

    fn store(dir: &TempDir) -> FlatFileStore {
        FlatFileStore::new(&Storage {
            accounts: dir.path().join("accounts.txt"),
            events: dir.path().join("events.txt"),
            reservations: dir.path().join("reservations.txt"),
            sequence: dir.path().join("sequence.txt"),
            journal: dir.path().join("journal.jsonl"),
        })
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn sample() -> Facility {
        let mut facility = Facility::new();
        facility
            .create_account("admin".into(), "root".to_owned(), Role::City)
            .unwrap();
        facility
            .create_account("alice".into(), "pw".to_owned(), Role::Resident)
            .unwrap();
        facility
            .create_account("acme".into(), "pw".to_owned(), Role::Organization)
            .unwrap();
        for (name, start, end, open_to_non_residents) in [
            ("Gala", "2024-06-01T18:00", "2024-06-01T20:00", true),
            ("Council", "2024-06-02T09:00", "2024-06-02T11:30", false),
        ] {
            facility
                .create_event(NewEvent {
                    name: name.into(),
                    organizer: "admin".into(),
                    start: start.to_owned(),
                    end: end.to_owned(),
                    details: EventDetails {
                        layout: LayoutStyle::Meeting,
                        public: open_to_non_residents,
                        max_guests: 10,
                        ticket_price: Money::from_cents(1250),
                        open_to_residents: true,
                        open_to_non_residents,
                    },
                })
                .unwrap();
        }
        let mut book = |user: &str, event: &str, at: &str| {
            match facility.make_reservation(&user.into(), &event.into(), at) {
                Ok(BookingOutcome::Reserved(id)) => id,
                other => panic!("unexpected {:?}", other),
            }
        };
        let paid = book("alice", "Gala", "2024-06-01T19:00");
        let canceled = book("acme", "Gala", "2024-06-01T18:30");
        book("acme", "Council", "2024-06-02T10:00");
        facility.make_payment(&"alice".into(), paid).unwrap();
        facility.cancel_reservation(&"acme".into(), canceled).unwrap();
        facility
    }

    fn lines<'a, R: Record + 'a>(records: impl Iterator<Item = &'a R>) -> Vec<String> {
        records.map(Record::to_line).collect()
    }

    #[test]
    fn test_save_then_load_is_structurally_equal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let facility = sample();
        store.save(&facility).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(lines(loaded.accounts()), lines(facility.accounts()));
        assert_eq!(lines(loaded.events()), lines(facility.events()));
        let reservations = |f: &Facility| {
            f.reservations()
                .map(|r| ReservationRecord::from(r).to_line())
                .collect::<Vec<_>>()
        };
        assert_eq!(reservations(&loaded), reservations(&facility));
        assert!(loaded.accounts().eq(facility.accounts()));
        for event in facility.events() {
            let restored = loaded.event(event.name()).unwrap();
            assert_eq!(restored.reservations(), event.reservations());
            assert_eq!(restored.tickets_sold(), event.tickets_sold());
        }
        assert_eq!(loaded.next_reservation_id(), facility.next_reservation_id());
        assert_eq!(loaded.manager().schedule(), facility.manager().schedule());
        assert_eq!(loaded.view_budget(), Money::from_units(40));
    }

    #[test]
    fn test_refund_after_restart_keeps_budget_balanced() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let facility = sample();
        let paid = facility
            .reservations()
            .find(|r| r.payment_status() == PaymentStatus::Paid)
            .map(|r| r.id())
            .unwrap();
        store.save(&facility).unwrap();

        let mut loaded = store.load().unwrap();
        assert_eq!(loaded.view_budget(), facility.view_budget());
        assert_eq!(
            loaded.cancel_reservation(&"alice".into(), paid),
            Ok(Money::from_units(40))
        );
        assert_eq!(loaded.view_budget(), Money::ZERO);
    }

    #[test]
    fn test_record_lines() {
        let facility = sample();
        let gala = facility.event(&"Gala".into()).unwrap();
        assert_eq!(
            gala.to_line(),
            "Gala admin 2024-06-01T18:00 2024-06-01T20:00 Meeting true 10 12.5 1 1"
        );
        let alice = facility.account(&"alice".into()).unwrap();
        assert_eq!(alice.to_line(), "alice pw Resident");
        let paid = facility.reservation(ReservationId::from(1)).unwrap();
        assert_eq!(
            ReservationRecord::from(paid).to_line(),
            "1 alice Gala Confirmed Paid 40 2024-06-01T19:00"
        );
    }

    #[test]
    fn test_load_missing_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let facility = store(&dir).load().unwrap();
        assert_eq!(facility.accounts().count(), 0);
        assert_eq!(facility.events().count(), 0);
        assert_eq!(facility.reservations().count(), 0);
        assert_eq!(facility.next_reservation_id(), ReservationId::from(1));
    }

    #[test]
    fn test_load_skips_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir,
            "accounts.txt",
            "admin root City\nalice pw Resident\nbroken\nbob pw Mayor\nalice other City\n\n",
        );
        write(
            &dir,
            "events.txt",
            "Gala admin 2024-06-01T18:00 2024-06-01T20:00 Wedding true 2 50 1 1\n\
             Clash admin 2024-06-01T19:00 2024-06-01T21:00 Dance true 2 50 1 1\n\
             Ghost nobody 2024-06-03T10:00 2024-06-03T12:00 Dance true 2 50 1 1\n\
             Backwards admin 2024-06-04T12:00 2024-06-04T10:00 Dance true 2 50 1 1\n\
             Odd admin 2024-06-05T10:00 2024-06-05T12:00 Dance yes 2 50 1 1\n",
        );
        write(
            &dir,
            "reservations.txt",
            "1 alice Gala Pending Unpaid 40 2024-06-01T19:00\n\
             1 alice Gala Pending Unpaid 40 2024-06-01T19:00\n\
             2 bob Gala Pending Unpaid 40 2024-06-01T19:00\n\
             3 alice Clash Pending Unpaid 40 2024-06-01T19:00\n\
             4 alice Gala Lost Unpaid 40 2024-06-01T19:00\n\
             7 admin Gala Canceled Unpaid 30 2024-06-01T18:00\n",
        );
        let mut facility = store(&dir).load().unwrap();

        let accounts = facility.accounts().map(|a| a.id().to_string()).collect::<Vec<_>>();
        assert_eq!(accounts, vec!["admin", "alice"]);
        assert_eq!(facility.account(&"alice".into()).unwrap().role(), Role::Resident);
        let events = facility.events().map(|e| e.id().to_string()).collect::<Vec<_>>();
        assert_eq!(events, vec!["Gala"]);
        let ids = facility.reservations().map(Entity::id).collect::<Vec<_>>();
        assert_eq!(ids, vec![ReservationId::from(1), ReservationId::from(7)]);
        assert_eq!(
            facility.reservation(ReservationId::from(7)).unwrap().status(),
            ReservationStatus::Canceled
        );
        // only the live reservation holds a seat
        assert_eq!(facility.event(&"Gala".into()).unwrap().tickets_sold(), 1);
        assert_eq!(facility.next_reservation_id(), ReservationId::from(8));
        assert!(facility.drain_changes().is_empty());
    }

    #[test]
    fn test_sequence_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "accounts.txt", "alice pw Resident\nadmin root City\n");
        write(
            &dir,
            "events.txt",
            "Gala admin 2024-06-01T18:00 2024-06-01T20:00 Wedding true 2 50 1 1\n",
        );
        write(
            &dir,
            "reservations.txt",
            "5 alice Gala Pending Unpaid 40 2024-06-01T19:00\n",
        );
        write(&dir, "sequence.txt", "3\n");
        assert_eq!(
            store(&dir).load().unwrap().next_reservation_id(),
            ReservationId::from(6)
        );
        write(&dir, "sequence.txt", "42\n");
        assert_eq!(
            store(&dir).load().unwrap().next_reservation_id(),
            ReservationId::from(42)
        );
        write(&dir, "sequence.txt", "forty-two\n");
        assert_eq!(
            store(&dir).load().unwrap().next_reservation_id(),
            ReservationId::from(6)
        );
    }

    #[test]
    fn test_save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FlatFileStore::new(&Storage {
            accounts: nested.join("accounts.txt"),
            events: nested.join("events.txt"),
            reservations: nested.join("reservations.txt"),
            sequence: nested.join("sequence.txt"),
            journal: nested.join("journal.jsonl"),
        });
        store.save(&sample()).unwrap();
        assert_eq!(
            fs::read_to_string(nested.join("sequence.txt")).unwrap(),
            "4\n"
        );
    }
}
