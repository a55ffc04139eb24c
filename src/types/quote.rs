use serde::{Deserialize, Serialize};

/// Benefit labels shown on every plan card, independent of the insurer.
pub const STANDARD_BENEFITS: [&str; 3] = [
    "Cashless hospitalisation worldwide",
    "24x7 emergency assistance",
    "Instant policy issuance",
];

/// One display line of a plan's cover list.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CoveragePoint {
    pub amount: String,
    pub name: String,
}

/// The canonical plan record every provider payload is normalized into.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQuote {
    /// Provider map key, e.g. `reliance_Student_Basic`. Unique within a pipeline.
    pub id: String,
    pub plan_name: String,
    pub provider: String,
    pub logo_ref: String,
    /// `0.0` when the provider sent no usable premium.
    pub net_premium: f64,
    pub sum_insured: f64,
    pub coverage_points: Vec<CoveragePoint>,
    pub benefits: Vec<String>,
    pub travellers_count: u32,
    /// Product code needed at checkout, only for insurers that use one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_code: Option<String>,
}

impl NormalizedQuote {
    /// A plan without a positive premium cannot be bought and is shown as unavailable.
    pub fn is_purchasable(&self) -> bool {
        self.net_premium > 0.0
    }
}
