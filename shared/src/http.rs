//! HTTP helpers for Lambda functions.

use std::collections::HashMap;
use std::str::FromStr;

use lambda_http::http::Method;
use lambda_http::{Body, Request, RequestExt, RequestPayloadExt, Response};
use serde::Serialize;
use tracing::{error, info};

use crate::Error;

/// Structured failure carried in error responses.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(err: &Error) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ErrorBody::from(err)),
        }
    }
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("cache-control", "no-store")
        .body(Body::from(serde_json::to_string(data)?))?)
}

/// Wrap `data` as a successful response.
pub fn ok_response<T: Serialize>(status: u16, data: T) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ApiResponse::success(data))
}

/// Render an error with the status its kind maps to.
pub fn error_response(err: &Error) -> Result<Response<Body>, lambda_http::Error> {
    json_response(err.status_code(), &ApiResponse::<()>::error(err))
}

/// Render a handler outcome, logging failures at a level matching their kind.
pub fn result_response<T: Serialize>(
    status: u16,
    result: crate::Result<T>,
) -> Result<Response<Body>, lambda_http::Error> {
    match result {
        Ok(data) => ok_response(status, data),
        Err(err) => {
            match &err {
                Error::StoreFailure(_) | Error::Config(_) | Error::Internal(_) => {
                    error!(kind = err.kind(), error = %err, "Request failed");
                }
                _ => info!(kind = err.kind(), error = %err, "Request rejected"),
            }
            error_response(&err)
        }
    }
}

/// Fields of a request, merged from the query string and a form body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Form(HashMap<String, String>);

impl Form {
    /// Collect query-string parameters, then overlay an
    /// `application/x-www-form-urlencoded` (or JSON string map) body.
    pub fn from_request(event: &Request) -> crate::Result<Self> {
        let mut fields: HashMap<String, String> = event
            .query_string_parameters_ref()
            .map(|params| {
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        if event.method() != Method::GET {
            match event.payload::<HashMap<String, String>>() {
                Ok(Some(body)) => fields.extend(body),
                Ok(None) => {}
                Err(e) => {
                    return Err(Error::BadRequest(format!("unreadable form body: {}", e)));
                }
            }
        }

        Ok(Self(fields))
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn required(&self, name: &str) -> crate::Result<&str> {
        self.text(name)
            .ok_or_else(|| Error::BadRequest(format!("{}: missing", name)))
    }

    /// Parse a required field with a type that reports its own errors.
    pub fn parse<T>(&self, name: &str) -> crate::Result<T>
    where
        T: FromStr<Err = Error>,
    {
        self.required(name)?.parse()
    }

    pub fn integer(&self, name: &str) -> crate::Result<i64> {
        self.required(name)?
            .trim()
            .parse()
            .map_err(|_| Error::BadRequest(format!("{}: must be an integer", name)))
    }
}

/// Outcome of looking a request up in a [`RoutingTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<R> {
    Matched(R),
    MethodNotAllowed,
    NotFound,
}

/// Method and path to route mapping, built once at startup.
#[derive(Debug, Clone)]
pub struct RoutingTable<R> {
    routes: Vec<(Method, &'static str, R)>,
}

impl<R> Default for RoutingTable<R> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<R: Copy> RoutingTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: Method, path: &'static str, route: R) -> Self {
        self.routes.push((method, path, route));
        self
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<R> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        let mut path_known = false;
        for (route_method, route_path, route) in &self.routes {
            if *route_path == path {
                if route_method == method {
                    return Resolution::Matched(*route);
                }
                path_known = true;
            }
        }

        if path_known {
            Resolution::MethodNotAllowed
        } else {
            Resolution::NotFound
        }
    }
}
