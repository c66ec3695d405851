use std::{
    error::Error,
    io::{self, BufRead, Write},
    str::FromStr,
};

use hall::{
    domain::{
        core::{Event, EventDetails, EventName, Reservation, ReservationId, Username},
        facility::{BookingOutcome, Facility, FacilityError, FacilityRepository, NewEvent},
        Entity,
    },
    infrastructure::{flat_file::FlatFileStore, journal::Journal},
    HallConfig,
};
use tracing::{error, info, Level};

const MENU: &[&str] = &[
    "Login",
    "Create New User",
    "View Schedule",
    "Make a Reservation",
    "Cancel a Reservation",
    "View Your Reservations",
    "Edit Your User Info",
    "List All Reservations",
    "View Detailed Event Info",
    "View Detailed Reservation Info",
    "Create an Event",
    "Cancel an Event",
    "Make a Payment",
    "View Facility Budget",
    "Logout",
    "Exit",
];

fn main() {
    match HallConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .with_writer(io::stderr)
                .init();
            if let Err(error) = run(&config) {
                error!("application error: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("application error: {}", error)
        }
    }
}

fn run(config: &HallConfig) -> Result<(), Box<dyn Error>> {
    let store = FlatFileStore::new(&config.storage);
    let facility = store.load()?;
    info!(
        accounts = facility.accounts().count(),
        events = facility.events().count(),
        reservations = facility.reservations().count(),
        "facility loaded"
    );
    let journal = Journal::new(config.storage.journal.clone());
    let stdin = io::stdin();
    Session::new(facility, store, journal, stdin.lock(), io::stdout()).run()?;
    Ok(())
}

/// One interactive user session over the loaded facility.
struct Session<S, R, W> {
    facility: Facility,
    store: S,
    journal: Journal,
    user: Option<Username>,
    input: R,
    output: W,
}

impl<S, R, W> Session<S, R, W>
where
    S: FacilityRepository,
    R: BufRead,
    W: Write,
{
    fn new(facility: Facility, store: S, journal: Journal, input: R, output: W) -> Self {
        Self {
            facility,
            store,
            journal,
            user: None,
            input,
            output,
        }
    }

    fn run(&mut self) -> io::Result<()> {
        loop {
            self.print_menu()?;
            let choice = match self.prompt("Enter your choice: ") {
                Ok(choice) => choice,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };
            match choice.parse::<usize>() {
                Ok(16) => break,
                Ok(n) if (1..MENU.len()).contains(&n) => match self.dispatch(n) {
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    result => result?,
                },
                _ => writeln!(self.output, "Invalid choice. Please try again.")?,
            }
        }
        self.persist();
        writeln!(self.output, "Goodbye.")
    }

    fn print_menu(&mut self) -> io::Result<()> {
        writeln!(self.output)?;
        if let Some(user) = &self.user {
            writeln!(self.output, "Logged in as {}", user)?;
        }
        for (i, item) in MENU.iter().enumerate() {
            writeln!(self.output, "{}. {}", i + 1, item)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, choice: usize) -> io::Result<()> {
        match choice {
            1 => self.login(),
            2 => self.create_account(),
            3 => self.view_schedule(),
            4 => self.make_reservation(),
            5 => self.cancel_reservation(),
            6 => self.view_own_reservations(),
            7 => self.edit_user_info(),
            8 => self.list_reservations(),
            9 => self.view_event(),
            10 => self.view_reservation(),
            11 => self.create_event(),
            12 => self.cancel_event(),
            13 => self.make_payment(),
            14 => {
                let budget = self.facility.view_budget();
                writeln!(self.output, "Current Facility Budget: {}", budget)
            }
            15 => {
                self.user = None;
                writeln!(self.output, "Logged out successfully.")
            }
            _ => Ok(()),
        }
    }

    fn login(&mut self) -> io::Result<()> {
        let username = Username::from(self.prompt("Username: ")?.as_str());
        let password = self.prompt("Password: ")?;
        match self.facility.login(&username, &password) {
            Ok(account) => {
                writeln!(self.output, "Welcome, {} ({}).", account.username(), account.role())?;
                self.user = Some(username);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    fn create_account(&mut self) -> io::Result<()> {
        let username = Username::from(self.prompt("Username: ")?.as_str());
        let password = self.prompt("Password: ")?;
        let role = match self.prompt_parse("Role (City, Organization, Resident, NonResident): ")? {
            Some(role) => role,
            None => return Ok(()),
        };
        match self.facility.create_account(username, password, role) {
            Ok(()) => {
                self.persist();
                writeln!(self.output, "User created successfully.")
            }
            Err(e) => self.fail(e),
        }
    }

    fn view_schedule(&mut self) -> io::Result<()> {
        let lines = self
            .facility
            .view_schedule()
            .into_iter()
            .map(|event| format!("{}: {} ({})", event.name(), event.time(), event.layout()))
            .collect::<Vec<_>>();
        if lines.is_empty() {
            return writeln!(self.output, "No events scheduled.");
        }
        for line in lines {
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }

    fn make_reservation(&mut self) -> io::Result<()> {
        let username = match self.require_login()? {
            Some(username) => username,
            None => return Ok(()),
        };
        let event = EventName::from(self.prompt("Event name: ")?.as_str());
        let time = self.prompt("Reservation time (YYYY-MM-DDTHH:MM): ")?;
        match self.facility.make_reservation(&username, &event, &time) {
            Ok(outcome) => {
                self.persist();
                match outcome {
                    BookingOutcome::Reserved(id) => {
                        let cost = self
                            .facility
                            .reservation(id)
                            .map(Reservation::total_cost)
                            .unwrap_or_default();
                        writeln!(self.output, "Reservation {} made. Total cost: {}", id, cost)
                    }
                    BookingOutcome::Waitlisted { position } => writeln!(
                        self.output,
                        "The event is full. You are number {} on the waitlist.",
                        position
                    ),
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn cancel_reservation(&mut self) -> io::Result<()> {
        let username = match self.require_login()? {
            Some(username) => username,
            None => return Ok(()),
        };
        let id = match self.prompt_parse::<u64>("Reservation ID: ")? {
            Some(id) => ReservationId::from(id),
            None => return Ok(()),
        };
        match self.facility.cancel_reservation(&username, id) {
            Ok(refunded) => {
                self.persist();
                writeln!(self.output, "Reservation {} canceled. Refunded: {}", id, refunded)
            }
            Err(e) => self.fail(e),
        }
    }

    fn view_own_reservations(&mut self) -> io::Result<()> {
        let username = match self.require_login()? {
            Some(username) => username,
            None => return Ok(()),
        };
        let lines = self
            .facility
            .account_reservations(&username)
            .map(|reservations| reservations.into_iter().map(summarize).collect::<Vec<_>>());
        match lines {
            Ok(lines) => self.print_lines(lines, "You have no reservations."),
            Err(e) => self.fail(e),
        }
    }

    fn edit_user_info(&mut self) -> io::Result<()> {
        let username = match self.require_login()? {
            Some(username) => username,
            None => return Ok(()),
        };
        let password = self.prompt("New password: ")?;
        match self.facility.change_password(&username, password) {
            Ok(()) => {
                self.persist();
                writeln!(self.output, "Password updated.")
            }
            Err(e) => self.fail(e),
        }
    }

    fn list_reservations(&mut self) -> io::Result<()> {
        let lines = self
            .facility
            .reservations()
            .map(summarize)
            .collect::<Vec<_>>();
        self.print_lines(lines, "No reservations found.")
    }

    fn view_event(&mut self) -> io::Result<()> {
        let name = EventName::from(self.prompt("Event name: ")?.as_str());
        match self.facility.event(&name).map(describe_event) {
            Some(text) => writeln!(self.output, "{}", text),
            None => self.fail(FacilityError::EventNotFound(name)),
        }
    }

    fn view_reservation(&mut self) -> io::Result<()> {
        let id = match self.prompt_parse::<u64>("Reservation ID: ")? {
            Some(id) => ReservationId::from(id),
            None => return Ok(()),
        };
        match self.facility.reservation(id).map(describe_reservation) {
            Some(text) => writeln!(self.output, "{}", text),
            None => self.fail(FacilityError::ReservationNotFound(id)),
        }
    }

    fn create_event(&mut self) -> io::Result<()> {
        let name = EventName::from(self.prompt("Event name: ")?.as_str());
        let organizer = Username::from(self.prompt("Organizer username: ")?.as_str());
        let start = self.prompt("Start time (YYYY-MM-DDTHH:MM): ")?;
        let end = self.prompt("End time (YYYY-MM-DDTHH:MM): ")?;
        let layout = match self.prompt_parse("Layout (Meeting, Lecture, Wedding, Dance): ")? {
            Some(layout) => layout,
            None => return Ok(()),
        };
        let max_guests = match self.prompt_parse("Max guests: ")? {
            Some(max_guests) => max_guests,
            None => return Ok(()),
        };
        let ticket_price = match self.prompt_parse("Ticket price: ")? {
            Some(price) => price,
            None => return Ok(()),
        };
        let public = self.confirm("Is this event public? (yes/no): ")?;
        let open_to_residents = self.confirm("Open to residents? (yes/no): ")?;
        let open_to_non_residents = self.confirm("Open to non-residents? (yes/no): ")?;
        let request = NewEvent {
            name,
            organizer,
            start,
            end,
            details: EventDetails {
                layout,
                public,
                max_guests,
                ticket_price,
                open_to_residents,
                open_to_non_residents,
            },
        };
        match self.facility.create_event(request) {
            Ok(()) => {
                self.persist();
                writeln!(self.output, "Event created successfully.")
            }
            Err(e) => self.fail(e),
        }
    }

    fn cancel_event(&mut self) -> io::Result<()> {
        let name = EventName::from(self.prompt("Event name to cancel: ")?.as_str());
        match self.facility.cancel_event(&name) {
            Ok(cancellation) => {
                self.persist();
                for refund in &cancellation.refunds {
                    writeln!(
                        self.output,
                        "Refunded {} to {} for reservation {}",
                        refund.amount, refund.username, refund.reservation_id
                    )?;
                }
                writeln!(self.output, "Event {} canceled.", cancellation.event)
            }
            Err(e) => self.fail(e),
        }
    }

    fn make_payment(&mut self) -> io::Result<()> {
        let username = match self.require_login()? {
            Some(username) => username,
            None => return Ok(()),
        };
        let id = match self.prompt_parse::<u64>("Reservation ID: ")? {
            Some(id) => ReservationId::from(id),
            None => return Ok(()),
        };
        match self.facility.make_payment(&username, id) {
            Ok(amount) => {
                self.persist();
                writeln!(self.output, "Payment of {} received for reservation {}.", amount, id)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Saves the tables and journals what changed since the last call.
    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.facility) {
            error!("failed to save tables: {}", e);
        }
        let changes = self.facility.drain_changes();
        if let Err(e) = self.journal.append(&changes) {
            error!("failed to append to journal: {}", e);
        }
    }

    fn require_login(&mut self) -> io::Result<Option<Username>> {
        if self.user.is_none() {
            writeln!(self.output, "Please login first.")?;
        }
        Ok(self.user.clone())
    }

    fn fail(&mut self, error: FacilityError) -> io::Result<()> {
        writeln!(self.output, "Error: {}", error)
    }

    fn print_lines(&mut self, lines: Vec<String>, empty: &str) -> io::Result<()> {
        if lines.is_empty() {
            return writeln!(self.output, "{}", empty);
        }
        for line in lines {
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }

    /// Reads one trimmed line; end of input is reported as `UnexpectedEof`.
    fn prompt(&mut self, label: &str) -> io::Result<String> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(line.trim().to_owned())
    }

    fn prompt_parse<T>(&mut self, label: &str) -> io::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.prompt(label)?;
        match value.parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                writeln!(self.output, "Invalid input: {}", e)?;
                Ok(None)
            }
        }
    }

    fn confirm(&mut self, label: &str) -> io::Result<bool> {
        let answer = self.prompt(label)?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

fn summarize(reservation: &Reservation) -> String {
    format!(
        "#{} {} at {} [{} / {}] {}",
        reservation.id(),
        reservation.event(),
        reservation.time(),
        reservation.status(),
        reservation.payment_status(),
        reservation.total_cost()
    )
}

fn describe_event(event: &Event) -> String {
    let waitlist = event
        .waitlist()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    format!(
        "Event: {}\nOrganizer: {}\nTime: {}\nLayout: {}\nPublic: {}\nTickets: {}/{}\n\
         Ticket price: {}\nOpen to residents: {}\nOpen to non-residents: {}\nWaitlist: {}",
        event.name(),
        event.organizer(),
        event.time(),
        event.layout(),
        event.is_public(),
        event.tickets_sold(),
        event.max_guests(),
        event.ticket_price(),
        event.is_open_to_residents(),
        event.is_open_to_non_residents(),
        if waitlist.is_empty() {
            "(empty)".to_owned()
        } else {
            waitlist.join(", ")
        }
    )
}

fn describe_reservation(reservation: &Reservation) -> String {
    format!(
        "Reservation ID: {}\nUser: {}\nEvent: {}\nStatus: {}\nPayment Status: {}\n\
         Total Cost: {}\nReservation Time: {}",
        reservation.id(),
        reservation.username(),
        reservation.event(),
        reservation.status(),
        reservation.payment_status(),
        reservation.total_cost(),
        reservation.time()
    )
}
