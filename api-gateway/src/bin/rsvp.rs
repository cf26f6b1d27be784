//! RSVP Lambda - Family-facing RSVP endpoints.
//!
//! Endpoints:
//! - POST /rsvp - Submit or change an RSVP (form: family, token, date, attending, note)
//! - GET /rsvp - List upcoming events with the family's own RSVP (query: family, token)

use std::sync::Arc;

use lambda_http::http::Method;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{error_response, result_response, Form, Resolution, RoutingTable};
use shared::{Config, FamilyId, RsvpAck, RsvpService, SystemClock, UpcomingRsvp};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy)]
enum Route {
    SubmitRsvp,
    ListUpcoming,
}

/// Application state
struct AppState {
    service: RsvpService,
    routes: RoutingTable<Route>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws = shared::bootstrap::load_aws_config(&config).await;
        let store = shared::bootstrap::connect_store(&config, &aws).await?;

        let routes = RoutingTable::new()
            .route(Method::POST, "/rsvp", Route::SubmitRsvp)
            .route(Method::GET, "/rsvp", Route::ListUpcoming);

        Ok(Self {
            service: RsvpService::from_config(store, Arc::new(SystemClock), &config),
            routes,
        })
    }
}

async fn submit_rsvp(state: &AppState, form: &Form) -> shared::Result<RsvpAck> {
    let family: FamilyId = form.parse("family")?;
    let token = form.required("token")?;
    let date = form.required("date")?;
    let attending = form.integer("attending")?;
    let note = form.text("note").unwrap_or_default();

    state
        .service
        .submit_rsvp(family, token, date, attending, note)
        .await
}

async fn list_upcoming(state: &AppState, form: &Form) -> shared::Result<Vec<UpcomingRsvp>> {
    let family: FamilyId = form.parse("family")?;
    let token = form.required("token")?;

    state.service.list_upcoming_responses(family, token).await
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

    let form = match Form::from_request(&event) {
        Ok(form) => form,
        Err(err) => return error_response(&err),
    };

    match route {
        Route::SubmitRsvp => result_response(200, submit_rsvp(&state, &form).await),
        Route::ListUpcoming => result_response(200, list_upcoming(&state, &form).await),
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
