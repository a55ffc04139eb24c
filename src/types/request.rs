use serde::{Deserialize, Serialize};

/// Optional coverage add-ons. None are offered for this product so all stay `false`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonFlags {
    pub pre_existing_disease: bool,
    pub adventure_sports: bool,
    pub trip_cancellation: bool,
    pub baggage_cover: bool,
    pub home_burglary: bool,
}

/// Payload of the `getLiveQuotes` event.
///
/// Built fresh from a [`crate::TripContext`] on each pipeline activation; every
/// field is always populated.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub destination_id: String,
    /// `DD/MM/YYYY`
    pub travellers_dob: Vec<String>,
    /// `DD/MM/YYYY`
    pub start_date: String,
    /// `DD/MM/YYYY`
    pub return_date: String,
    pub travellers_count: u32,
    #[serde(flatten)]
    pub addons: AddonFlags,
    pub is_citizen: bool,
    pub is_resident: bool,
    /// Sum-insured band selector understood by the quoting service.
    pub sum_insured: String,
}
