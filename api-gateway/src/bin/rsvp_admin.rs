//! RSVP Admin Lambda - Administrator endpoints.
//!
//! All routes require a Cognito user in the configured admin group. Writes
//! also require a CSRF token from GET /admin/csrf, sent in the
//! `x-csrf-token` header or a `csrf` form field.
//!
//! Endpoints:
//! - GET /admin/csrf - Issue a CSRF token
//! - POST /admin/rsvp - Record an RSVP on a family's behalf (form: family, date, attending, note)
//! - PUT /admin/families - Create or replace a family (JSON)
//! - PUT /admin/events - Create or update an event (JSON)
//! - GET /admin/responses - All responses for one event (query: date)

use std::sync::Arc;

use chrono::Utc;
use lambda_http::http::Method;
use lambda_http::{run, service_fn, Body, Error, Request, RequestPayloadExt, Response};
use serde::de::DeserializeOwned;
use shared::admin::{EventForm, FamilyForm};
use shared::csrf::CsrfKeys;
use shared::http::{error_response, result_response, Form, Resolution, RoutingTable};
use shared::{admin_from_request, AdminUser, Config, EventDate, EventInstance, Family, FamilyId, RsvpService, SystemClock};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    IssueCsrf,
    SubmitRsvp,
    PutFamily,
    PutEvent,
    EventResponses,
}

impl Route {
    fn is_write(self) -> bool {
        !matches!(self, Route::IssueCsrf | Route::EventResponses)
    }
}

/// Application state
struct AppState {
    service: RsvpService,
    csrf: CsrfKeys,
    admin_group: String,
    routes: RoutingTable<Route>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws = shared::bootstrap::load_aws_config(&config).await;
        let store = shared::bootstrap::connect_store(&config, &aws).await?;
        let csrf = shared::bootstrap::load_csrf_keys(&config, &aws).await?;

        let routes = RoutingTable::new()
            .route(Method::GET, "/admin/csrf", Route::IssueCsrf)
            .route(Method::POST, "/admin/rsvp", Route::SubmitRsvp)
            .route(Method::PUT, "/admin/families", Route::PutFamily)
            .route(Method::PUT, "/admin/events", Route::PutEvent)
            .route(Method::GET, "/admin/responses", Route::EventResponses);

        Ok(Self {
            service: RsvpService::from_config(store, Arc::new(SystemClock), &config),
            csrf,
            admin_group: config.admin_group,
            routes,
        })
    }
}

fn json_body<T: DeserializeOwned>(event: &Request) -> shared::Result<T> {
    event
        .payload::<T>()
        .map_err(|e| shared::Error::BadRequest(format!("Invalid request body: {}", e)))?
        .ok_or_else(|| shared::Error::BadRequest("Expected a JSON body".to_string()))
}

fn check_csrf(state: &AppState, event: &Request, form: &Form, admin: &AdminUser) -> shared::Result<()> {
    let token = event
        .headers()
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .or_else(|| form.text("csrf"))
        .ok_or_else(|| shared::Error::Forbidden("missing CSRF token".to_string()))?;

    state.csrf.verify(token, admin, Utc::now())
}

async fn put_family(state: &AppState, event: &Request, admin: &AdminUser) -> shared::Result<serde_json::Value> {
    let family = Family::try_from(json_body::<FamilyForm>(event)?)?;
    state.service.admin_put_family(admin, &family).await?;
    Ok(serde_json::json!({
        "message": "Family saved",
        "familyId": family.id,
        "people": family.people.len(),
    }))
}

async fn put_event(state: &AppState, event: &Request, admin: &AdminUser) -> shared::Result<EventInstance> {
    let instance = EventInstance::try_from(json_body::<EventForm>(event)?)?;
    state.service.admin_put_event(admin, &instance).await?;
    Ok(instance)
}

async fn submit_rsvp(state: &AppState, form: &Form, admin: &AdminUser) -> shared::Result<shared::RsvpAck> {
    let family: FamilyId = form.parse("family")?;
    let date = form.required("date")?;
    let attending = form.integer("attending")?;
    let note = form.text("note").unwrap_or_default();

    state
        .service
        .admin_submit_rsvp(admin, family, date, attending, note)
        .await
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let route = match state.routes.resolve(event.method(), event.uri().path()) {
        Resolution::Matched(route) => route,
        Resolution::MethodNotAllowed => {
            return error_response(&shared::Error::MethodNotAllowed(event.method().to_string()));
        }
        Resolution::NotFound => {
            return error_response(&shared::Error::NotFound("no such endpoint".to_string()));
        }
    };

    let admin = match admin_from_request(&event, &state.admin_group) {
        Ok(admin) => admin,
        Err(err) => return result_response::<()>(200, Err(err)),
    };

    // PUT routes carry JSON, parsed by their handlers.
    let form = match route {
        Route::PutFamily | Route::PutEvent => Form::default(),
        _ => match Form::from_request(&event) {
            Ok(form) => form,
            Err(err) => return error_response(&err),
        },
    };

    if route.is_write() {
        if let Err(err) = check_csrf(&state, &event, &form, &admin) {
            return result_response::<()>(200, Err(err));
        }
    }

    match route {
        Route::IssueCsrf => {
            let issued = state.csrf.issue(&admin, Utc::now());
            if issued.is_ok() {
                info!(admin = %admin.user_id(), "Issued CSRF token");
            }
            result_response(200, issued.map(|token| serde_json::json!({ "csrfToken": token })))
        }
        Route::SubmitRsvp => result_response(200, submit_rsvp(&state, &form, &admin).await),
        Route::PutFamily => result_response(200, put_family(&state, &event, &admin).await),
        Route::PutEvent => result_response(200, put_event(&state, &event, &admin).await),
        Route::EventResponses => {
            let summary = match form.parse::<EventDate>("date") {
                Ok(date) => state.service.admin_event_summary(&admin, &date).await,
                Err(err) => Err(err),
            };
            result_response(200, summary)
        }
    }
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
