use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{EventDate, EventInstance, Family, FamilyId, Person, RsvpResponse};
use crate::{Error, Result};

use super::{EventPartition, Store};

/// PostgreSQL-backed store.
///
/// A partition is a transaction that starts by locking the event row with
/// `FOR UPDATE`; every other partition on the same event blocks on that row
/// until the first one commits or rolls back.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FamilyRow {
    id: i64,
    name: String,
    token: String,
    notes: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PersonRow {
    family_id: i64,
    id: i64,
    name: String,
    email: String,
    is_child: bool,
    birth_date: Option<NaiveDate>,
    diet_notes: String,
    notes: String,
    contact_info: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_date: NaiveDate,
    cap: i32,
    notes: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ResponseRow {
    event_date: NaiveDate,
    family_id: i64,
    attending: i32,
    note: String,
    updated_at: DateTime<Utc>,
}

fn stored_family_id(id: i64) -> Result<FamilyId> {
    FamilyId::new(id).map_err(|_| Error::StoreFailure(format!("stored family id {} is invalid", id)))
}

fn stored_count(value: i32, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::StoreFailure(format!("stored {} {} is negative", what, value)))
}

fn bind_count(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::BadRequest(format!("{}: {} is too large", field, value)))
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            is_child: row.is_child,
            birth_date: row.birth_date,
            diet_notes: row.diet_notes,
            notes: row.notes,
            contact_info: row.contact_info,
        }
    }
}

impl TryFrom<EventRow> for EventInstance {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Self {
            date: EventDate::from_naive(row.event_date),
            cap: stored_count(row.cap, "cap")?,
            notes: row.notes,
        })
    }
}

impl TryFrom<ResponseRow> for RsvpResponse {
    type Error = Error;

    fn try_from(row: ResponseRow) -> Result<Self> {
        Ok(Self {
            event_date: EventDate::from_naive(row.event_date),
            family_id: stored_family_id(row.family_id)?,
            attending: stored_count(row.attending, "attending")?,
            note: row.note,
            updated_at: row.updated_at,
        })
    }
}

fn assemble_family(row: FamilyRow, people: Vec<PersonRow>) -> Result<Family> {
    Ok(Family {
        id: stored_family_id(row.id)?,
        name: row.name,
        token: row.token,
        notes: row.notes,
        people: people.into_iter().map(Person::from).collect(),
    })
}

const PERSON_COLUMNS: &str =
    "family_id, id, name, email, is_child, birth_date, diet_notes, notes, contact_info";

#[async_trait]
impl Store for PgStore {
    async fn fetch_family(&self, id: FamilyId) -> Result<Option<Family>> {
        let row: Option<FamilyRow> =
            sqlx::query_as("SELECT id, name, token, notes FROM families WHERE id = $1")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let people: Vec<PersonRow> = sqlx::query_as(&format!(
            "SELECT {} FROM people WHERE family_id = $1 ORDER BY id",
            PERSON_COLUMNS
        ))
        .bind(id.get())
        .fetch_all(&self.pool)
        .await?;

        assemble_family(row, people).map(Some)
    }

    async fn fetch_families(&self) -> Result<Vec<Family>> {
        let rows: Vec<FamilyRow> =
            sqlx::query_as("SELECT id, name, token, notes FROM families ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        let people: Vec<PersonRow> = sqlx::query_as(&format!(
            "SELECT {} FROM people ORDER BY family_id, id",
            PERSON_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_family: BTreeMap<i64, Vec<PersonRow>> = BTreeMap::new();
        for person in people {
            by_family.entry(person.family_id).or_default().push(person);
        }

        rows.into_iter()
            .map(|row| {
                let people = by_family.remove(&row.id).unwrap_or_default();
                assemble_family(row, people)
            })
            .collect()
    }

    async fn put_family(&self, family: &Family) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO families (id, name, token, notes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, token = EXCLUDED.token, notes = EXCLUDED.notes
            "#,
        )
        .bind(family.id.get())
        .bind(&family.name)
        .bind(&family.token)
        .bind(&family.notes)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM people WHERE family_id = $1")
            .bind(family.id.get())
            .execute(&mut *tx)
            .await?;

        for person in &family.people {
            sqlx::query(
                r#"
                INSERT INTO people (family_id, id, name, email, is_child, birth_date, diet_notes, notes, contact_info)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(family.id.get())
            .bind(person.id)
            .bind(&person.name)
            .bind(&person.email)
            .bind(person.is_child)
            .bind(person.birth_date)
            .bind(&person.diet_notes)
            .bind(&person.notes)
            .bind(&person.contact_info)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_event(&self, date: &EventDate) -> Result<Option<EventInstance>> {
        let row: Option<EventRow> =
            sqlx::query_as("SELECT event_date, cap, notes FROM events WHERE event_date = $1")
                .bind(date.as_naive())
                .fetch_optional(&self.pool)
                .await?;

        row.map(EventInstance::try_from).transpose()
    }

    async fn fetch_events_from(&self, from: &EventDate) -> Result<Vec<EventInstance>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_date, cap, notes FROM events WHERE event_date >= $1 ORDER BY event_date",
        )
        .bind(from.as_naive())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventInstance::try_from).collect()
    }

    async fn fetch_responses(&self, date: &EventDate) -> Result<Vec<RsvpResponse>> {
        let rows: Vec<ResponseRow> = sqlx::query_as(
            r#"
            SELECT event_date, family_id, attending, note, updated_at
            FROM responses
            WHERE event_date = $1
            ORDER BY family_id
            "#,
        )
        .bind(date.as_naive())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RsvpResponse::try_from).collect()
    }

    async fn open_partition(&self, date: &EventDate) -> Result<Box<dyn EventPartition>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<EventRow> = sqlx::query_as(
            "SELECT event_date, cap, notes FROM events WHERE event_date = $1 FOR UPDATE",
        )
        .bind(date.as_naive())
        .fetch_optional(&mut *tx)
        .await?;

        Ok(Box::new(PgPartition {
            tx,
            date: *date,
            event: row.map(EventInstance::try_from).transpose()?,
        }))
    }
}

struct PgPartition {
    tx: Transaction<'static, Postgres>,
    date: EventDate,
    event: Option<EventInstance>,
}

#[async_trait]
impl EventPartition for PgPartition {
    fn event(&self) -> Option<&EventInstance> {
        self.event.as_ref()
    }

    async fn fetch_response(&mut self, family: FamilyId) -> Result<Option<RsvpResponse>> {
        let row: Option<ResponseRow> = sqlx::query_as(
            r#"
            SELECT event_date, family_id, attending, note, updated_at
            FROM responses
            WHERE event_date = $1 AND family_id = $2
            "#,
        )
        .bind(self.date.as_naive())
        .bind(family.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(RsvpResponse::try_from).transpose()
    }

    async fn fetch_responses(&mut self) -> Result<Vec<RsvpResponse>> {
        let rows: Vec<ResponseRow> = sqlx::query_as(
            r#"
            SELECT event_date, family_id, attending, note, updated_at
            FROM responses
            WHERE event_date = $1
            ORDER BY family_id
            "#,
        )
        .bind(self.date.as_naive())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(RsvpResponse::try_from).collect()
    }

    async fn put_response(&mut self, response: &RsvpResponse) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO responses (event_date, family_id, attending, note, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_date, family_id) DO UPDATE
            SET attending = EXCLUDED.attending,
                note = EXCLUDED.note,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(response.event_date.as_naive())
        .bind(response.family_id.get())
        .bind(bind_count(response.attending, "attending")?)
        .bind(&response.note)
        .bind(response.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn put_event(&mut self, event: &EventInstance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (event_date, cap, notes)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_date) DO UPDATE
            SET cap = EXCLUDED.cap, notes = EXCLUDED.notes
            "#,
        )
        .bind(event.date.as_naive())
        .bind(bind_count(event.cap, "cap")?)
        .bind(&event.notes)
        .execute(&mut *self.tx)
        .await?;

        self.event = Some(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
