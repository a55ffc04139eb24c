//! Builds the outbound `getLiveQuotes` payload from the wizard's trip state.

use chrono::{DateTime, NaiveDate};

use crate::types::{AddonFlags, QuoteRequest, TripContext};

pub const FALLBACK_DESTINATION_ID: &str = "1";
pub const FALLBACK_START_DATE: &str = "01/01/2025";
pub const FALLBACK_RETURN_DATE: &str = "07/01/2025";
pub const FALLBACK_TRAVELLER_DOB: &str = "01/01/1990";
pub const FALLBACK_TRAVELLERS_COUNT: u32 = 1;
pub const FALLBACK_SUM_INSURED_BAND: &str = "50000";

const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Builds a request in which every field is populated, falling back to
/// literal defaults for missing or malformed trip data.
pub fn compose(trip: &TripContext) -> QuoteRequest {
    let destination_id = trip
        .destination_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(FALLBACK_DESTINATION_ID)
        .to_string();

    let start_date = trip
        .start_date
        .as_deref()
        .and_then(format_date)
        .unwrap_or_else(|| FALLBACK_START_DATE.to_string());
    let return_date = trip
        .return_date
        .as_deref()
        .and_then(format_date)
        .unwrap_or_else(|| FALLBACK_RETURN_DATE.to_string());

    let mut travellers_dob: Vec<String> = trip
        .travellers_dob
        .iter()
        .filter_map(|dob| format_date(dob))
        .collect();
    if travellers_dob.is_empty() {
        travellers_dob.push(FALLBACK_TRAVELLER_DOB.to_string());
    }

    let travellers_count = trip
        .travellers_count
        .filter(|count| *count >= 1)
        .unwrap_or(FALLBACK_TRAVELLERS_COUNT);

    QuoteRequest {
        destination_id,
        travellers_dob,
        start_date,
        return_date,
        travellers_count,
        addons: AddonFlags::default(),
        is_citizen: true,
        is_resident: true,
        sum_insured: FALLBACK_SUM_INSURED_BAND.to_string(),
    }
}

/// Formats a date as `DD/MM/YYYY`.
///
/// Accepts `DD/MM/YYYY` (validated and passed through), `YYYY-MM-DD` and RFC 3339
/// timestamps. Anything else yields `None`.
pub fn format_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, DISPLAY_FORMAT) {
        return Some(date.format(DISPLAY_FORMAT).to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format(DISPLAY_FORMAT).to_string());
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive().format(DISPLAY_FORMAT).to_string());
    }
    None
}
