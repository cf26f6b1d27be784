//! Family resolver.

use tracing::debug;

use crate::models::{Family, FamilyId};
use crate::store::Store;
use crate::{Error, Result};

/// Shared by unknown families and wrong tokens so callers cannot tell which
/// family ids exist.
pub const UNAUTHORIZED_MESSAGE: &str = "unknown family or access token";

/// Load a family and check the caller's access token against it.
pub async fn resolve_family(store: &dyn Store, id: FamilyId, token: &str) -> Result<Family> {
    let family = store.fetch_family(id).await?;
    authorize(id, family, token)
}

/// Decide whether a fetched family admits `token`.
pub fn authorize(id: FamilyId, family: Option<Family>, token: &str) -> Result<Family> {
    match family {
        Some(family) if !token.is_empty() && family.token == token => Ok(family),
        Some(_) => {
            debug!(family_id = %id, "Access token mismatch");
            Err(Error::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()))
        }
        None => {
            debug!(family_id = %id, "Family not found");
            Err(Error::Unauthorized(UNAUTHORIZED_MESSAGE.to_string()))
        }
    }
}
