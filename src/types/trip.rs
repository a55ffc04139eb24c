//! Trip and traveller state persisted by the quotation wizard.

use serde::{Deserialize, Serialize};

use crate::serde_utils::{lenient_string, lenient_string_list, lenient_u32};

/// The wizard's trip document, filled in progressively across steps.
///
/// Every field is optional: the quote pipeline only reads it and falls back
/// to literal defaults for anything missing or malformed.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripContext {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        alias = "departureDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        alias = "endDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub return_date: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_u32",
        alias = "travellerCount",
        skip_serializing_if = "Option::is_none"
    )]
    pub travellers_count: Option<u32>,
    /// Traveller dates of birth as entered (`DD/MM/YYYY` or ISO).
    #[serde(
        default,
        deserialize_with = "lenient_string_list",
        alias = "travellersDOB",
        alias = "travellerDobs"
    )]
    pub travellers_dob: Vec<String>,
}

impl TripContext {
    pub fn new(destination_id: impl Into<String>) -> Self {
        Self {
            destination_id: Some(destination_id.into()),
            ..Default::default()
        }
    }

    pub fn with_dates(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_date = Some(start.into());
        self.return_date = Some(end.into());
        self
    }

    pub fn with_travellers(mut self, dobs: Vec<String>) -> Self {
        self.travellers_count = Some(dobs.len() as u32);
        self.travellers_dob = dobs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_partial_document() {
        let trip: TripContext = serde_json::from_value(json!({
            "destinationId": 42,
            "startDate": "2025-08-01",
            "travellersDOB": ["15/06/1999"],
            "selectedPlan": {"id": "ignored"}
        }))
        .unwrap();
        assert_eq!(trip.destination_id.as_deref(), Some("42"));
        assert_eq!(trip.start_date.as_deref(), Some("2025-08-01"));
        assert_eq!(trip.return_date, None);
        assert_eq!(trip.travellers_count, None);
        assert_eq!(trip.travellers_dob, vec!["15/06/1999".to_string()]);
    }

    #[test]
    fn test_wrong_typed_fields_read_as_missing() {
        let trip: TripContext = serde_json::from_value(json!({
            "destinationId": {"nested": true},
            "travellersCount": "many",
            "travellersDob": null
        }))
        .unwrap();
        assert_eq!(trip, TripContext::default());
    }
}
