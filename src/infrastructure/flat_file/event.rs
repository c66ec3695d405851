use crate::domain::core::{Event, EventDetails, TimeRange};
use crate::domain::Entity;

use super::{field, fields, flag, Record, RecordError};

/// `name organizer start end layout isPublic maxGuests ticketPrice openToResidents openToNonResidents`
impl Record for Event {
    const TABLE: &'static str = Event::ENTITY_NAME;

    fn parse(line: &str) -> Result<Self, RecordError> {
        let [name, organizer, start, end, layout, public, max_guests, ticket_price, residents, non_residents] =
            fields(line)?;
        let time = TimeRange::parse(start, end)?;
        let details = EventDetails {
            layout: field("layout", layout)?,
            public: field("isPublic", public)?,
            max_guests: field("maxGuests", max_guests)?,
            ticket_price: field("ticketPrice", ticket_price)?,
            open_to_residents: flag("openToResidents", residents)?,
            open_to_non_residents: flag("openToNonResidents", non_residents)?,
        };
        Ok(Event::create(name.into(), organizer.into(), time, details)?)
    }

    fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {} {} {}",
            self.name(),
            self.organizer(),
            self.time().start(),
            self.time().end(),
            self.layout(),
            self.is_public(),
            self.max_guests(),
            self.ticket_price().to_plain_string(),
            u8::from(self.is_open_to_residents()),
            u8::from(self.is_open_to_non_residents()),
        )
    }
}
