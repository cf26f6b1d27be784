//! Future-events query.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::clock::Clock;
use crate::models::{EventDate, EventInstance};
use crate::store::Store;
use crate::Result;

/// The calendar date at `now` as seen from `time_zone`.
pub fn today_in(time_zone: Tz, now: DateTime<Utc>) -> EventDate {
    EventDate::from_naive(now.with_timezone(&time_zone).date_naive())
}

/// Events from today onward, earliest first.
///
/// Each call re-reads the clock, so a fresh iterator reflects the current day.
#[derive(Debug)]
pub struct UpcomingEvents {
    today: EventDate,
    events: std::vec::IntoIter<EventInstance>,
}

impl UpcomingEvents {
    /// The day the listing was computed for.
    pub fn today(&self) -> EventDate {
        self.today
    }
}

impl Iterator for UpcomingEvents {
    type Item = EventInstance;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.events.size_hint()
    }
}

pub async fn upcoming_events(
    store: &dyn Store,
    clock: &dyn Clock,
    time_zone: Tz,
) -> Result<UpcomingEvents> {
    let today = today_in(time_zone, clock.now());
    let mut events = store.fetch_events_from(&today).await?;
    events.retain(|event| event.date >= today);
    events.sort_by_key(|event| event.date);

    Ok(UpcomingEvents {
        today,
        events: events.into_iter(),
    })
}
