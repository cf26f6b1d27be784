//! Entity store adapter.
//!
//! [`Store`] covers point reads, admin writes and range queries. Everything
//! that must be consistent with an event's attendance cap goes through an
//! [`EventPartition`], a unit of work that holds the event exclusively until
//! it is committed or dropped.

mod postgres;
mod reference;

use async_trait::async_trait;

use crate::models::{EventDate, EventInstance, Family, FamilyId, RsvpResponse};
use crate::Result;

pub use self::postgres::PgStore;
pub use self::reference::ReferenceStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a family, with its people, by id
    async fn fetch_family(&self, id: FamilyId) -> Result<Option<Family>>;

    /// Fetch every family, ordered by id
    async fn fetch_families(&self) -> Result<Vec<Family>>;

    /// Insert or replace a family and its people
    async fn put_family(&self, family: &Family) -> Result<()>;

    /// Fetch an event by its date key
    async fn fetch_event(&self, date: &EventDate) -> Result<Option<EventInstance>>;

    /// Fetch events dated on or after `from`, ascending by date
    async fn fetch_events_from(&self, from: &EventDate) -> Result<Vec<EventInstance>>;

    /// Fetch every response recorded for one event, ordered by family id
    async fn fetch_responses(&self, date: &EventDate) -> Result<Vec<RsvpResponse>>;

    /// Open the exclusive unit of work for one event
    async fn open_partition(&self, date: &EventDate) -> Result<Box<dyn EventPartition>>;
}

/// Serialized access to one event and the responses scoped to it.
///
/// Writes become visible only on [`EventPartition::commit`]. Dropping the
/// partition without committing discards them.
#[async_trait]
pub trait EventPartition: Send {
    /// The event as read when the partition was opened
    fn event(&self) -> Option<&EventInstance>;

    /// Fetch one family's response to this event
    async fn fetch_response(&mut self, family: FamilyId) -> Result<Option<RsvpResponse>>;

    /// Fetch every response to this event
    async fn fetch_responses(&mut self) -> Result<Vec<RsvpResponse>>;

    /// Stage an insert-or-replace of a response
    async fn put_response(&mut self, response: &RsvpResponse) -> Result<()>;

    /// Stage an insert-or-replace of the event itself
    async fn put_event(&mut self, event: &EventInstance) -> Result<()>;

    /// Make staged writes visible atomically
    async fn commit(self: Box<Self>) -> Result<()>;
}
