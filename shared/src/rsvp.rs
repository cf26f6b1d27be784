//! RSVP transaction coordinator.
//!
//! A submission runs as:
//! 1. resolve the family and check its token (or an admin privilege proof)
//! 2. validate the requested count and date
//! 3. open the event's partition, which serializes writers on that event
//! 4. load the family's current response
//! 5. when the family asks for more seats than it holds, sum the other
//!    families' seats and reject if the cap would be exceeded
//! 6. upsert the response and commit
//!
//! Steps 3-6 are retried as a whole when the store reports a lost
//! concurrency race, up to the configured attempt limit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tracing::{info, warn};

use crate::admin;
use crate::auth::AdminUser;
use crate::capacity;
use crate::clock::Clock;
use crate::config::Config;
use crate::event;
use crate::family;
use crate::models::{
    EventDate, EventInstance, EventSummary, Family, FamilyId, RsvpAck, RsvpResponse, UpcomingRsvp,
};
use crate::reminders::{self, ReminderDue};
use crate::store::Store;
use crate::upcoming;
use crate::{Error, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest count the stores can hold.
const MAX_ATTENDING: i64 = i32::MAX as i64;

pub struct RsvpService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    time_zone: Tz,
    max_attempts: u32,
    request_timeout: Duration,
}

impl RsvpService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, time_zone: Tz) -> Self {
        Self {
            store,
            clock,
            time_zone,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_config(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self::new(store, clock, config.time_zone)
            .with_max_attempts(config.max_attempts)
            .with_request_timeout(config.request_timeout)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Record a family's attendance for one event.
    pub async fn submit_rsvp(
        &self,
        family_id: FamilyId,
        token: &str,
        date: &str,
        attending: i64,
        note: &str,
    ) -> Result<RsvpAck> {
        self.within_deadline("submit_rsvp", async {
            let family = family::resolve_family(self.store(), family_id, token).await?;
            let (date, attending) = validate_submission(date, attending)?;
            self.commit_with_retry(family.id, date, attending, note).await
        })
        .await
    }

    /// Record attendance on a family's behalf.
    ///
    /// Skips the access token but enforces the cap exactly like
    /// [`RsvpService::submit_rsvp`].
    pub async fn admin_submit_rsvp(
        &self,
        admin: &AdminUser,
        family_id: FamilyId,
        date: &str,
        attending: i64,
        note: &str,
    ) -> Result<RsvpAck> {
        self.within_deadline("admin_submit_rsvp", async {
            let family = self
                .store
                .fetch_family(family_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("no family {}", family_id)))?;
            let (date, attending) = validate_submission(date, attending)?;

            info!(
                admin = %admin.user_id(),
                family_id = %family.id,
                date = %date,
                attending,
                "Admin RSVP override"
            );
            self.commit_with_retry(family.id, date, attending, note).await
        })
        .await
    }

    /// Upcoming events joined with the family's own response to each.
    pub async fn list_upcoming_responses(
        &self,
        family_id: FamilyId,
        token: &str,
    ) -> Result<Vec<UpcomingRsvp>> {
        self.within_deadline("list_upcoming_responses", async {
            let family = family::resolve_family(self.store(), family_id, token).await?;
            let events =
                upcoming::upcoming_events(self.store(), self.clock(), self.time_zone).await?;

            let mut listing = Vec::with_capacity(events.size_hint().0);
            for event in events {
                let responses = self.store.fetch_responses(&event.date).await?;
                let taken = capacity::sum_excluding(&responses, None);
                let response = responses
                    .into_iter()
                    .find(|response| response.family_id == family.id);

                listing.push(UpcomingRsvp {
                    seats_remaining: event.cap.saturating_sub(taken),
                    event,
                    response,
                });
            }
            Ok(listing)
        })
        .await
    }

    pub async fn admin_put_family(&self, admin: &AdminUser, family: &Family) -> Result<()> {
        self.within_deadline("admin_put_family", admin::put_family(self.store(), admin, family))
            .await
    }

    /// Create or update an event, waiting on its partition no longer than
    /// the request deadline.
    pub async fn admin_put_event(&self, admin: &AdminUser, event: &EventInstance) -> Result<()> {
        self.within_deadline("admin_put_event", admin::put_event(self.store(), admin, event))
            .await
    }

    pub async fn admin_event_summary(
        &self,
        admin: &AdminUser,
        date: &EventDate,
    ) -> Result<EventSummary> {
        self.within_deadline("admin_event_summary", admin::event_summary(self.store(), admin, date))
            .await
    }

    /// Families that have not answered for events in the next `window_days`,
    /// counted from today in the reference time zone.
    pub async fn pending_reminders(&self, window_days: u64) -> Result<Vec<ReminderDue>> {
        let today = upcoming::today_in(self.time_zone, self.clock.now());
        self.within_deadline(
            "pending_reminders",
            reminders::pending_reminders(self.store(), today, window_days),
        )
        .await
    }

    async fn within_deadline<T>(
        &self,
        operation: &str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.request_timeout.as_millis() as u64, "Request deadline exceeded");
                Err(Error::StoreFailure(format!(
                    "{} did not finish within {} ms",
                    operation,
                    self.request_timeout.as_millis()
                )))
            }
        }
    }

    async fn commit_with_retry(
        &self,
        family: FamilyId,
        date: EventDate,
        attending: u32,
        note: &str,
    ) -> Result<RsvpAck> {
        let mut attempt = 1;
        loop {
            match self.commit_once(family, &date, attending, note).await {
                Err(Error::Conflict(reason)) if attempt < self.max_attempts => {
                    warn!(family_id = %family, date = %date, attempt, reason = %reason, "RSVP lost a concurrency race, retrying");
                    attempt += 1;
                }
                Err(Error::Conflict(reason)) => {
                    warn!(family_id = %family, date = %date, attempt, "RSVP retries exhausted");
                    return Err(Error::Conflict(format!(
                        "event {} kept changing after {} attempts: {}",
                        date, attempt, reason
                    )));
                }
                other => return other,
            }
        }
    }

    async fn commit_once(
        &self,
        family: FamilyId,
        date: &EventDate,
        attending: u32,
        note: &str,
    ) -> Result<RsvpAck> {
        let mut partition = self.store.open_partition(date).await?;
        let event = event::require_event(date, partition.event().cloned())?;
        let existing = partition.fetch_response(family).await?;

        let needs_cap_check = match &existing {
            Some(previous) => attending > previous.attending,
            None => true,
        };

        if needs_cap_check {
            let others = capacity::other_families_attending(&mut *partition, family).await?;
            if !capacity::fits(event.cap, others, attending) {
                warn!(
                    family_id = %family,
                    date = %date,
                    attending,
                    others,
                    cap = event.cap,
                    "RSVP rejected, cap exceeded"
                );
                return Err(Error::CapExceeded(format!(
                    "event {} has {} of {} seats held by other families; {} more do not fit",
                    date, others, event.cap, attending
                )));
            }
        }

        let response = RsvpResponse {
            event_date: *date,
            family_id: family,
            attending,
            note: note.to_string(),
            updated_at: self.clock.now(),
        };
        partition.put_response(&response).await?;
        partition.commit().await?;

        info!(
            family_id = %family,
            date = %date,
            attending,
            previous = existing.as_ref().map(|r| r.attending),
            "RSVP recorded"
        );

        Ok(RsvpAck {
            family_id: family,
            event_date: *date,
            attending,
            message: format!("RSVP for {} recorded: {} attending", date, attending),
        })
    }
}

fn validate_submission(date: &str, attending: i64) -> Result<(EventDate, u32)> {
    if attending < 0 {
        return Err(Error::BadRequest(format!(
            "attending: must be zero or more, got {}",
            attending
        )));
    }
    if attending > MAX_ATTENDING {
        return Err(Error::BadRequest(format!(
            "attending: {} is too large",
            attending
        )));
    }
    let date: EventDate = date.parse()?;
    Ok((date, attending as u32))
}
