//! Administrator privilege check.
//!
//! API Gateway's Cognito authorizer validates the caller's JWT before the
//! Lambda runs; this module only reads the resulting claims and decides
//! whether they carry the administrator group.

use lambda_http::{Request, RequestExt};
use serde_json::Value;

use crate::{Error, Result};

/// Proof that the caller passed the administrator check.
///
/// Only [`admin_from_claims`] and [`admin_from_request`] construct it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser {
    user_id: String,
    email: Option<String>,
}

impl AdminUser {
    /// Cognito subject of the administrator
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Parse the `cognito:groups` claim.
///
/// Depending on the authorizer it arrives as a JSON array, a bracketed
/// space-separated string (`"[a b]"`) or a comma-separated string.
fn parse_groups(claim: Option<&Value>) -> Vec<String> {
    match claim {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(raw)) => raw
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Check authorizer claims for membership in `admin_group`.
pub fn admin_from_claims(claims: &Value, admin_group: &str) -> Result<AdminUser> {
    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Unauthorized("authentication required".to_string()))?;

    let groups = parse_groups(claims.get("cognito:groups"));
    if !groups.iter().any(|group| group == admin_group) {
        return Err(Error::Forbidden("administrator privilege required".to_string()));
    }

    Ok(AdminUser {
        user_id: sub.to_string(),
        email: claims.get("email").and_then(|v| v.as_str()).map(String::from),
    })
}

/// Extract and check the administrator from the API Gateway request context.
pub fn admin_from_request(event: &Request, admin_group: &str) -> Result<AdminUser> {
    let claims = event
        .request_context_ref()
        .and_then(|context| context.authorizer())
        .and_then(|authorizer| authorizer.fields.get("claims"))
        .ok_or_else(|| Error::Unauthorized("authentication required".to_string()))?;

    admin_from_claims(claims, admin_group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_claim_formats() {
        assert_eq!(
            parse_groups(Some(&json!(["staff", "rsvp-admins"]))),
            vec!["staff", "rsvp-admins"]
        );
        assert_eq!(
            parse_groups(Some(&json!("[staff rsvp-admins]"))),
            vec!["staff", "rsvp-admins"]
        );
        assert_eq!(
            parse_groups(Some(&json!("staff, rsvp-admins"))),
            vec!["staff", "rsvp-admins"]
        );
        assert!(parse_groups(None).is_empty());
    }

    #[test]
    fn test_admin_requires_group() {
        let claims = json!({
            "sub": "admin-1",
            "email": "host@example.com",
            "cognito:groups": "[rsvp-admins]",
        });
        let admin = admin_from_claims(&claims, "rsvp-admins").unwrap();
        assert_eq!(admin.user_id(), "admin-1");
        assert_eq!(admin.email(), Some("host@example.com"));

        let err = admin_from_claims(&claims, "owners").unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_missing_subject_is_unauthorized() {
        let err = admin_from_claims(&json!({"cognito:groups": "rsvp-admins"}), "rsvp-admins")
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
