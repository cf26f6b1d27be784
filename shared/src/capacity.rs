//! Capacity aggregation.

use crate::models::{FamilyId, RsvpResponse};
use crate::store::EventPartition;
use crate::Result;

/// Seats held by every family except `family` within an open event partition.
///
/// The submitting family's own response is left out because its new response
/// replaces it rather than adding to it.
pub async fn other_families_attending(
    partition: &mut dyn EventPartition,
    family: FamilyId,
) -> Result<u32> {
    let responses = partition.fetch_responses().await?;
    Ok(sum_excluding(&responses, Some(family)))
}

/// Sum attendance over `responses`, skipping the family in `exclude`.
pub fn sum_excluding(responses: &[RsvpResponse], exclude: Option<FamilyId>) -> u32 {
    responses
        .iter()
        .filter(|response| Some(response.family_id) != exclude)
        .fold(0u32, |total, response| total.saturating_add(response.attending))
}

/// Whether adding `requested` seats on top of `others` stays within `cap`.
pub fn fits(cap: u32, others: u32, requested: u32) -> bool {
    u64::from(others) + u64::from(requested) <= u64::from(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn response(family: i64, attending: u32) -> RsvpResponse {
        RsvpResponse {
            event_date: "2024-06-01".parse().unwrap(),
            family_id: FamilyId::new(family).unwrap(),
            attending,
            note: String::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_own_response_excluded() {
        let responses = vec![response(1, 4), response(2, 3), response(3, 0)];
        assert_eq!(sum_excluding(&responses, Some(FamilyId::new(1).unwrap())), 3);
        assert_eq!(sum_excluding(&responses, Some(FamilyId::new(9).unwrap())), 7);
        assert_eq!(sum_excluding(&responses, None), 7);
        assert_eq!(sum_excluding(&[], None), 0);
    }

    #[test]
    fn test_fits_at_boundary() {
        assert!(fits(5, 5, 0));
        assert!(fits(5, 4, 1));
        assert!(!fits(5, 5, 1));
        assert!(!fits(0, 0, 1));
        assert!(!fits(u32::MAX, u32::MAX, 1));
    }
}
