//! Selection of families that still owe an answer for a nearby event.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{EventDate, EventInstance, FamilyId};
use crate::store::Store;
use crate::Result;

/// One family that has not answered for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDue {
    pub event: EventInstance,
    pub family_id: FamilyId,
    pub family_name: String,
    pub days_until: i64,
}

/// Families with no response for events dated within `window_days` of `today`.
///
/// A response of zero counts as an answer; only missing responses are due.
pub async fn pending_reminders(
    store: &dyn Store,
    today: EventDate,
    window_days: u64,
) -> Result<Vec<ReminderDue>> {
    let last_day = today.plus_days(window_days);
    let families = store.fetch_families().await?;

    let mut due = Vec::new();
    for event in store.fetch_events_from(&today).await? {
        if event.date > last_day {
            break;
        }

        let answered: HashSet<FamilyId> = store
            .fetch_responses(&event.date)
            .await?
            .into_iter()
            .map(|response| response.family_id)
            .collect();

        let days_until = (event.date.as_naive() - today.as_naive()).num_days();
        due.extend(
            families
                .iter()
                .filter(|family| !answered.contains(&family.id))
                .map(|family| ReminderDue {
                    event: event.clone(),
                    family_id: family.id,
                    family_name: family.name.clone(),
                    days_until,
                }),
        );
    }

    Ok(due)
}
