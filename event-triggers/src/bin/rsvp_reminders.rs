//! RSVP Reminder Lambda - Finds families that have not answered for upcoming events.
//!
//! This Lambda runs daily via EventBridge and:
//! 1. Computes today in the configured reference time zone
//! 2. Lists events within the reminder window
//! 3. Finds families with no response for each of them
//! 4. Publishes one SNS message per (family, event) for delivery elsewhere

use std::sync::Arc;

use aws_sdk_sns::Client as SnsClient;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use shared::reminders::ReminderDue;
use shared::upcoming::today_in;
use shared::{Clock, Config, RsvpService, SystemClock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct ScheduledEvent {
    #[serde(default, rename = "detail-type")]
    detail_type: String,
}

#[derive(Debug, Serialize)]
struct ReminderRunResponse {
    today: String,
    reminders_due: usize,
    reminders_published: usize,
    errors: usize,
}

struct AppState {
    service: RsvpService,
    sns_client: SnsClient,
    reminder_topic_arn: Option<String>,
    window_days: u64,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws = shared::bootstrap::load_aws_config(&config).await;
        let store = shared::bootstrap::connect_store(&config, &aws).await?;

        Ok(Self {
            service: RsvpService::from_config(store, Arc::new(SystemClock), &config),
            sns_client: SnsClient::new(&aws),
            reminder_topic_arn: config.reminder_topic_arn,
            window_days: config.reminder_window_days,
        })
    }
}

async fn publish_reminder(state: &AppState, topic_arn: &str, reminder: &ReminderDue) -> Result<(), Error> {
    let message = serde_json::json!({
        "type": "rsvp_reminder",
        "familyId": reminder.family_id,
        "familyName": reminder.family_name,
        "eventDate": reminder.event.date,
        "daysUntil": reminder.days_until,
    });

    state
        .sns_client
        .publish()
        .topic_arn(topic_arn)
        .message(serde_json::to_string(&message)?)
        .send()
        .await
        .map_err(|e| format!("Failed to publish to SNS: {}", e))?;

    Ok(())
}

async fn handler(
    state: Arc<AppState>,
    event: LambdaEvent<ScheduledEvent>,
) -> Result<ReminderRunResponse, Error> {
    let service = &state.service;
    let today = today_in(service.time_zone(), service.clock().now());
    info!(today = %today, trigger = %event.payload.detail_type, window_days = state.window_days, "Starting RSVP reminder run");

    let due = service.pending_reminders(state.window_days).await?;

    let mut reminders_published = 0;
    let mut errors = 0;

    match &state.reminder_topic_arn {
        Some(topic_arn) => {
            for reminder in &due {
                match publish_reminder(&state, topic_arn, reminder).await {
                    Ok(()) => reminders_published += 1,
                    Err(e) => {
                        error!(family_id = %reminder.family_id, date = %reminder.event.date, error = %e, "Failed to publish reminder");
                        errors += 1;
                    }
                }
            }
        }
        None => warn!(reminders_due = due.len(), "REMINDER_TOPIC_ARN not set, nothing published"),
    }

    let response = ReminderRunResponse {
        today: today.to_string(),
        reminders_due: due.len(),
        reminders_published,
        errors,
    };

    info!(
        reminders_due = response.reminders_due,
        reminders_published = response.reminders_published,
        errors = response.errors,
        "RSVP reminder run complete"
    );

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
