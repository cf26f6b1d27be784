//! Shared library for the family RSVP Lambda functions.
//!
//! The core is [`rsvp::RsvpService`]: it admits a family's attendance for an
//! event only when the event's cap still holds, serializing concurrent
//! submissions per event through [`store::EventPartition`].

pub mod admin;
pub mod auth;
pub mod bootstrap;
pub mod capacity;
pub mod clock;
pub mod config;
pub mod csrf;
pub mod db;
pub mod error;
pub mod event;
pub mod family;
pub mod http;
pub mod models;
pub mod reminders;
pub mod rsvp;
pub mod secrets;
pub mod store;
pub mod upcoming;

pub use auth::{admin_from_claims, admin_from_request, AdminUser};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use http::ApiResponse;
pub use models::{
    EventDate, EventInstance, EventSummary, Family, FamilyId, Person, RsvpAck, RsvpResponse,
    UpcomingRsvp,
};
pub use rsvp::RsvpService;
pub use store::{EventPartition, PgStore, ReferenceStore, Store};
