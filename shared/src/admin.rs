//! Administrator operations on families and events.
//!
//! Every function takes an [`AdminUser`], so callers must have passed the
//! privilege check first. RSVP overrides live on
//! [`crate::rsvp::RsvpService::admin_submit_rsvp`].

use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::auth::AdminUser;
use crate::capacity;
use crate::event;
use crate::models::{EventDate, EventInstance, EventSummary, Family, FamilyId, Person};
use crate::store::Store;
use crate::{Error, Result};

/// Body of an admin family upsert.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FamilyForm {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 8, max = 200))]
    pub token: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    #[validate(nested)]
    pub people: Vec<PersonForm>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PersonForm {
    pub id: i64,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub is_child: bool,
    #[serde(default)]
    pub birth_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub diet_notes: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub contact_info: Vec<String>,
}

/// Body of an admin event upsert.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventForm {
    pub date: String,
    #[validate(range(min = 0, max = 2147483647))]
    pub cap: i64,
    #[serde(default)]
    pub notes: String,
}

fn validation_error(err: validator::ValidationErrors) -> Error {
    Error::BadRequest(err.to_string())
}

impl TryFrom<FamilyForm> for Family {
    type Error = Error;

    fn try_from(form: FamilyForm) -> Result<Self> {
        form.validate().map_err(validation_error)?;

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = form.people.iter().find(|p| !seen.insert(p.id)) {
            return Err(Error::BadRequest(format!("people: duplicate person id {}", dup.id)));
        }

        Ok(Family {
            id: FamilyId::new(form.id)?,
            name: form.name,
            token: form.token,
            notes: form.notes,
            people: form
                .people
                .into_iter()
                .map(|p| Person {
                    id: p.id,
                    name: p.name,
                    email: p.email,
                    is_child: p.is_child,
                    birth_date: p.birth_date,
                    diet_notes: p.diet_notes,
                    notes: p.notes,
                    contact_info: p.contact_info,
                })
                .collect(),
        })
    }
}

impl TryFrom<EventForm> for EventInstance {
    type Error = Error;

    fn try_from(form: EventForm) -> Result<Self> {
        form.validate().map_err(validation_error)?;
        Ok(EventInstance {
            date: form.date.parse()?,
            cap: u32::try_from(form.cap)
                .map_err(|_| Error::BadRequest(format!("cap: {} is out of range", form.cap)))?,
            notes: form.notes,
        })
    }
}

/// Create or replace a family, including its people and access token.
pub async fn put_family(store: &dyn Store, admin: &AdminUser, family: &Family) -> Result<()> {
    if family.token.is_empty() {
        return Err(Error::BadRequest("token: must not be empty".to_string()));
    }
    store.put_family(family).await?;
    info!(admin = %admin.user_id(), family_id = %family.id, people = family.people.len(), "Family saved");
    Ok(())
}

/// Create or update an event.
///
/// Lowering the cap below the seats already reserved is refused, checked
/// under the event's partition so no RSVP can slip in between.
pub async fn put_event(store: &dyn Store, admin: &AdminUser, event: &EventInstance) -> Result<()> {
    let mut partition = store.open_partition(&event.date).await?;

    let reserved = capacity::sum_excluding(&partition.fetch_responses().await?, None);
    if event.cap < reserved {
        warn!(date = %event.date, cap = event.cap, reserved, "Refusing cap below reservations");
        return Err(Error::CapExceeded(format!(
            "event {}: cap {} is below the {} seats already reserved",
            event.date, event.cap, reserved
        )));
    }

    partition.put_event(event).await?;
    partition.commit().await?;

    info!(admin = %admin.user_id(), date = %event.date, cap = event.cap, "Event saved");
    Ok(())
}

/// Every response to one event with the seat total.
pub async fn event_summary(
    store: &dyn Store,
    _admin: &AdminUser,
    date: &EventDate,
) -> Result<EventSummary> {
    let event = event::resolve_event(store, date).await?;
    let responses = store.fetch_responses(date).await?;
    let total_attending = capacity::sum_excluding(&responses, None);

    Ok(EventSummary {
        event,
        responses,
        total_attending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_family_form_validation() {
        let form: FamilyForm = serde_json::from_value(json!({
            "id": 3,
            "name": "Nakamura",
            "token": "long-enough-token",
            "people": [
                {"id": 1, "name": "Aiko", "email": "aiko@example.com"},
                {"id": 2, "name": "Ren", "email": "ren@example.com", "isChild": true, "birthDate": "2017-04-02"}
            ]
        }))
        .unwrap();
        let family = Family::try_from(form).unwrap();
        assert_eq!(family.people.len(), 2);
        assert!(family.people[1].is_child);

        let form: FamilyForm = serde_json::from_value(json!({
            "id": 3, "name": "Nakamura", "token": "short"
        }))
        .unwrap();
        assert!(matches!(Family::try_from(form), Err(Error::BadRequest(_))));

        let form: FamilyForm = serde_json::from_value(json!({
            "id": 3, "name": "Nakamura", "token": "long-enough-token",
            "people": [{"id": 1, "name": "Aiko", "email": "not-an-email"}]
        }))
        .unwrap();
        assert!(matches!(Family::try_from(form), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_duplicate_person_ids_rejected() {
        let form: FamilyForm = serde_json::from_value(json!({
            "id": 3, "name": "Nakamura", "token": "long-enough-token",
            "people": [
                {"id": 1, "name": "Aiko", "email": "aiko@example.com"},
                {"id": 1, "name": "Ren", "email": "ren@example.com"}
            ]
        }))
        .unwrap();
        assert!(matches!(Family::try_from(form), Err(Error::BadRequest(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_event_form_validation() {
        let form: EventForm =
            serde_json::from_value(json!({"date": "2024-06-01", "cap": 12})).unwrap();
        let event = EventInstance::try_from(form).unwrap();
        assert_eq!(event.cap, 12);

        let form: EventForm =
            serde_json::from_value(json!({"date": "2024-06-01", "cap": -1})).unwrap();
        assert!(EventInstance::try_from(form).is_err());

        let form: EventForm =
            serde_json::from_value(json!({"date": "06/01/2024", "cap": 1})).unwrap();
        assert!(EventInstance::try_from(form).is_err());
    }
}
