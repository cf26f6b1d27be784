#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use shared::{
    admin, admin_from_claims, AdminUser, EventDate, EventInstance, Family, FamilyId, FixedClock,
    ReferenceStore, RsvpResponse, RsvpService, Store,
};

pub struct Fixture {
    pub store: ReferenceStore,
    pub service: RsvpService,
    pub admin: AdminUser,
}

/// Service on a reference store, with "now" at noon on 2024-05-01 in Los Angeles.
pub fn fixture() -> Fixture {
    let store = ReferenceStore::new();
    let clock = FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 19, 0, 0).unwrap());
    let service = RsvpService::new(
        Arc::new(store.clone()),
        Arc::new(clock),
        chrono_tz::America::Los_Angeles,
    )
    .with_request_timeout(Duration::from_secs(2));
    let admin = admin_from_claims(
        &json!({"sub": "admin-1", "cognito:groups": ["rsvp-admins"]}),
        "rsvp-admins",
    )
    .unwrap();

    Fixture {
        store,
        service,
        admin,
    }
}

pub fn id(n: i64) -> FamilyId {
    FamilyId::new(n).unwrap()
}

pub fn date(s: &str) -> EventDate {
    s.parse().unwrap()
}

pub fn token_for(n: i64) -> String {
    format!("family-token-{}", n)
}

impl Fixture {
    pub async fn add_family(&self, n: i64) {
        let family = Family {
            id: id(n),
            name: format!("Family {}", n),
            token: token_for(n),
            notes: String::new(),
            people: vec![],
        };
        admin::put_family(&self.store, &self.admin, &family).await.unwrap();
    }

    pub async fn add_event(&self, day: &str, cap: u32) {
        let event = EventInstance {
            date: date(day),
            cap,
            notes: String::new(),
        };
        admin::put_event(&self.store, &self.admin, &event).await.unwrap();
    }

    /// Write a response straight through a partition, skipping the cap check.
    pub async fn force_response(&self, day: &str, family: i64, attending: u32) {
        let mut partition = self.store.open_partition(&date(day)).await.unwrap();
        partition
            .put_response(&RsvpResponse {
                event_date: date(day),
                family_id: id(family),
                attending,
                note: String::new(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        partition.commit().await.unwrap();
    }

    pub async fn submit(&self, family: i64, day: &str, attending: i64) -> shared::Result<shared::RsvpAck> {
        self.service
            .submit_rsvp(id(family), &token_for(family), day, attending, "")
            .await
    }

    pub async fn total(&self, day: &str) -> u32 {
        self.store
            .fetch_responses(&date(day))
            .await
            .unwrap()
            .iter()
            .map(|r| r.attending)
            .sum()
    }
}
