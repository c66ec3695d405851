use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::domain::facility::FacilityChange;
use crate::domain::DataAccessError;
use crate::infrastructure::{create_parent, read_optional};

/// Append-only log of facility changes, one JSON document per line.
#[derive(Clone, Debug)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, changes: &[FacilityChange]) -> Result<(), DataAccessError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for change in changes {
            buf.push_str(&serde_json::to_string(change)?);
            buf.push('\n');
        }
        create_parent(&self.path)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(buf.as_bytes()))
            .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
        debug!(count = changes.len(), path = %self.path.display(), "journal appended");
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<FacilityChange>, DataAccessError> {
        let content = match read_optional(&self.path)? {
            Some(content) => content,
            None => return Ok(Vec::new()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(DataAccessError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::domain::core::{
        AccountChange, EventDetails, LayoutStyle, Money, ReservationChange, Role,
    };
    use crate::domain::facility::{BookingOutcome, Facility, NewEvent};

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join("log").join("journal.jsonl"));
        assert!(journal.read_all().unwrap().is_empty());

        let mut facility = Facility::new();
        facility
            .create_account("admin".into(), "root".to_owned(), Role::City)
            .unwrap();
        facility
            .create_event(NewEvent {
                name: "Gala".into(),
                organizer: "admin".into(),
                start: "2024-06-01T18:00".to_owned(),
                end: "2024-06-01T20:00".to_owned(),
                details: EventDetails {
                    layout: LayoutStyle::Dance,
                    public: true,
                    max_guests: 4,
                    ticket_price: Money::from_units(50),
                    open_to_residents: true,
                    open_to_non_residents: true,
                },
            })
            .unwrap();
        let first = facility.drain_changes();
        journal.append(&first).unwrap();

        let outcome = facility
            .make_reservation(&"admin".into(), &"Gala".into(), "2024-06-01T18:00")
            .unwrap();
        let id = match outcome {
            BookingOutcome::Reserved(id) => id,
            other => panic!("unexpected {:?}", other),
        };
        let second = facility.drain_changes();
        journal.append(&second).unwrap();
        journal.append(&[]).unwrap();

        let read = journal.read_all().unwrap();
        assert_eq!(read.len(), first.len() + second.len());
        assert_eq!(read[..first.len()], first[..]);
        assert_eq!(
            read[0],
            FacilityChange::Account(AccountChange::AccountCreated {
                username: "admin".into(),
                role: Role::City
            })
        );
        assert!(read.contains(&FacilityChange::Reservation(
            ReservationChange::ReservationCreated {
                id,
                username: "admin".into(),
                event: "Gala".into(),
                time: "2024-06-01T18:00".parse().unwrap(),
                total_cost: Money::from_units(30),
            }
        )));
        let raw = fs::read_to_string(journal.path()).unwrap();
        assert_eq!(raw.lines().count(), read.len());
        assert!(raw.contains("\"time\":\"2024-06-01T18:00\""));
    }

    #[test]
    fn test_read_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        fs::write(&path, "{not json}\n").unwrap();
        assert!(matches!(
            Journal::new(path).read_all(),
            Err(DataAccessError::ClientSideError(_))
        ));
    }
}
