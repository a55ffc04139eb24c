//! Raw provider payloads -> [`NormalizedQuote`] records.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    consts::DEFAULT_SUM_INSURED,
    errors::ShapeError,
    helpers::parse_digits,
    serde_utils::{value_as_f64, value_as_string},
    types::{
        is_no_data_sentinel, profile_by_name, profile_for_key, CoveragePoint, NormalizedQuote,
        ProviderProfile, RawQuoteEvent, SumInsuredRule, OTHER_PROVIDER, STANDARD_BENEFITS,
    },
};

const PROVIDER_FIELDS: &[&str] = &["provider", "insurer", "insurerName", "companyName"];
const PLAN_NAME_FIELDS: &[&str] = &["planName", "productName", "plan_name", "name"];
const PREMIUM_FIELDS: &[&str] = &["netPremium", "net_premium", "premium", "totalPremium"];
const SUM_INSURED_FIELDS: &[&str] = &["SI", "sumInsured", "sum_insured", "si"];
const COVER_LIST_FIELDS: &[&str] = &["covers", "coverList", "coverages", "coverDetails"];
const PLAN_CODE_FIELDS: &[&str] = &["planCode", "productCode", "plan_code"];

const COVER_NAME_FIELDS: &[&str] = &["name", "coverName", "title", "benefit"];
const COVER_AMOUNT_FIELDS: &[&str] = &["amount", "coverAmount", "sumInsured", "value", "limit"];

/// Normalizes one stream event into zero or more quotes.
///
/// Never fails: an unrecognized payload is logged and yields no quotes.
pub fn normalize(raw: &Value, travellers_count: u32) -> Vec<NormalizedQuote> {
    match try_normalize(raw, travellers_count) {
        Ok(quotes) => quotes,
        Err(err) => {
            warn!(error = %err, "Discarding unrecognized quote event");
            Vec::new()
        }
    }
}

/// Like [`normalize`], but reports an unrecognized envelope to the caller.
///
/// Entries inside a recognized envelope that are empty, `false`, or a no-data
/// sentinel are skipped silently; they are never an error.
pub fn try_normalize(
    raw: &Value,
    travellers_count: u32,
) -> Result<Vec<NormalizedQuote>, ShapeError> {
    let event = RawQuoteEvent::parse(raw)?;
    let Some(entries) = event.quotes() else {
        debug!("Quote event reported no data");
        return Ok(Vec::new());
    };

    let quotes: Vec<NormalizedQuote> = entries
        .iter()
        .filter_map(|(key, attributes)| normalize_entry(key, attributes, travellers_count))
        .collect();

    debug!(
        entries = entries.len(),
        quotes = quotes.len(),
        "Normalized quote event"
    );
    Ok(quotes)
}

fn normalize_entry(key: &str, attributes: &Value, travellers_count: u32) -> Option<NormalizedQuote> {
    let attrs = match attributes {
        Value::Object(map) if !map.is_empty() && !is_no_data_sentinel(map) => map,
        _ => {
            debug!(key, "Skipping quote entry without data");
            return None;
        }
    };
    if key.trim().is_empty() {
        return None;
    }

    let (provider, profile) = resolve_provider(key, attrs);
    let coverage_points = coverage_points(attrs);
    let sum_insured = resolve_sum_insured(profile, attrs, &coverage_points);

    let plan_code = if profile.uses_plan_code {
        first_of(attrs, PLAN_CODE_FIELDS).and_then(value_as_string)
    } else {
        None
    };

    let plan_name = first_of(attrs, PLAN_NAME_FIELDS)
        .and_then(value_as_string)
        .unwrap_or_else(|| key.replace(['_', '-'], " "));

    let net_premium = first_of(attrs, PREMIUM_FIELDS)
        .and_then(value_as_f64)
        .unwrap_or(0.0);

    Some(NormalizedQuote {
        id: key.to_string(),
        plan_name,
        logo_ref: profile.logo.to_string(),
        provider,
        net_premium,
        sum_insured,
        coverage_points,
        benefits: STANDARD_BENEFITS.iter().map(|b| b.to_string()).collect(),
        travellers_count,
        plan_code,
    })
}

/// Explicit provider field first, then the key; the reported name is kept
/// even when it is not a known insurer.
fn resolve_provider(
    key: &str,
    attrs: &Map<String, Value>,
) -> (String, &'static ProviderProfile) {
    if let Some(reported) = first_of(attrs, PROVIDER_FIELDS).and_then(value_as_string) {
        return match profile_by_name(&reported) {
            Some(profile) => (profile.name.to_string(), profile),
            None => (reported, &OTHER_PROVIDER),
        };
    }
    match profile_for_key(key) {
        Some(profile) => (profile.name.to_string(), profile),
        None => (OTHER_PROVIDER.name.to_string(), &OTHER_PROVIDER),
    }
}

fn resolve_sum_insured(
    profile: &ProviderProfile,
    attrs: &Map<String, Value>,
    coverage_points: &[CoveragePoint],
) -> f64 {
    let resolved = match profile.sum_insured {
        SumInsuredRule::Field => first_of(attrs, SUM_INSURED_FIELDS).and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_digits(s),
            _ => None,
        }),
        SumInsuredRule::CoverLine(needle) => coverage_points
            .iter()
            .find(|point| point.name.to_lowercase().contains(needle))
            .and_then(|point| parse_digits(&point.amount)),
    };
    resolved
        .filter(|si| si.is_finite() && *si > 0.0)
        .unwrap_or(DEFAULT_SUM_INSURED)
}

fn coverage_points(attrs: &Map<String, Value>) -> Vec<CoveragePoint> {
    let Some(Value::Array(items)) = first_of(attrs, COVER_LIST_FIELDS) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(cover) => {
                let name = first_of(cover, COVER_NAME_FIELDS).and_then(value_as_string)?;
                let amount = first_of(cover, COVER_AMOUNT_FIELDS)
                    .and_then(value_as_string)
                    .unwrap_or_default();
                Some(CoveragePoint { amount, name })
            }
            Value::String(name) if !name.trim().is_empty() => Some(CoveragePoint {
                amount: String::new(),
                name: name.trim().to_string(),
            }),
            _ => None,
        })
        .collect()
}

fn first_of<'a>(map: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|field| map.get(*field))
        .find(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_flat_event_normalizes_each_entry() {
        let raw = json!({
            "reliance_Gold": {"netPremium": 1200, "SI": "100000", "planCode": "RG-01"},
            "godigit_Silver": {"netPremium": "900", "SI": "50000"}
        });
        let quotes = normalize(&raw, 2);
        assert_eq!(quotes.len(), 2);

        let gold = quotes.iter().find(|q| q.id == "reliance_Gold").unwrap();
        assert_eq!(gold.provider, "Reliance General");
        assert_eq!(gold.plan_name, "reliance Gold");
        assert_eq!(gold.net_premium, 1200.0);
        assert_eq!(gold.sum_insured, 100_000.0);
        assert_eq!(gold.plan_code.as_deref(), Some("RG-01"));
        assert_eq!(gold.travellers_count, 2);
        assert_eq!(gold.benefits.len(), 3);
        assert_eq!(gold.logo_ref, "/assets/insurers/reliance.png");

        let silver = quotes.iter().find(|q| q.id == "godigit_Silver").unwrap();
        assert_eq!(silver.provider, "Go Digit");
        assert_eq!(silver.net_premium, 900.0);
        assert_eq!(silver.plan_code, None);
    }

    #[test]
    fn test_entry_order_follows_payload() {
        let raw = json!({"data": {"z_plan": {"netPremium": 1}, "a_plan": {"netPremium": 2}}});
        let ids: Vec<String> = normalize(&raw, 1).into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec!["z_plan".to_string(), "a_plan".to_string()]);
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let raw = json!({
            "planA": false,
            "planB": {},
            "planC": {"status": true, "responseCode": 204, "data": []},
            "planD": "unavailable",
            "planE": {"netPremium": 10}
        });
        let quotes = normalize(&raw, 1);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].id, "planE");
        assert_eq!(quotes[0].provider, "Other");
    }

    #[test]
    fn test_all_invalid_entries_yield_nothing() {
        assert!(normalize(&json!({"planA": false, "planB": {}}), 1).is_empty());
    }

    #[test]
    fn test_garbage_never_panics() {
        let inputs = [
            json!(null),
            json!(42),
            json!("QuickQuote"),
            json!([]),
            json!([null]),
            json!([{"nodata": 1}]),
            json!({"result": [1, 2, 3]}),
            json!({"data": "oops"}),
            json!({"a": {"netPremium": {"deep": true}, "SI": [], "covers": "none"}}),
        ];
        for input in &inputs {
            let quotes = normalize(input, 1);
            assert!(quotes.len() <= 1, "unexpected quotes for {input}");
        }
        assert!(try_normalize(&json!(42), 1).is_err());
        assert!(try_normalize(&json!({"data": "oops"}), 1).is_err());
    }

    #[test]
    fn test_premium_coercion() {
        let raw = json!({
            "a": {"netPremium": "1,450.75"},
            "b": {"premium": 300},
            "c": {"netPremium": "call us"},
            "d": {"netPremium": null, "totalPremium": 50}
        });
        let quotes = normalize(&raw, 1);
        let premium = |id: &str| quotes.iter().find(|q| q.id == id).unwrap().net_premium;
        assert_eq!(premium("a"), 1450.75);
        assert_eq!(premium("b"), 300.0);
        assert_eq!(premium("c"), 0.0);
        assert_eq!(premium("d"), 50.0);
    }

    #[test]
    fn test_sum_insured_from_medical_expenses_cover_line() {
        let raw = json!({
            "care_Explore_Gold": {
                "netPremium": 2100,
                "SI": "999",
                "covers": [
                    {"name": "Baggage Loss", "amount": "USD 1,000"},
                    {"name": "Medical Expenses including Evacuation", "amount": "USD 1,00,000"}
                ]
            }
        });
        let quote = &normalize(&raw, 1)[0];
        assert_eq!(quote.provider, "Care Health");
        assert_eq!(quote.sum_insured, 100_000.0);
        assert_eq!(quote.coverage_points.len(), 2);
        assert_eq!(
            quote.coverage_points[0],
            CoveragePoint {
                amount: "USD 1,000".to_string(),
                name: "Baggage Loss".to_string()
            }
        );
    }

    #[test]
    fn test_sum_insured_defaults_when_unresolvable() {
        let raw = json!({
            "care_Basic": {"netPremium": 100, "covers": []},
            "godigit_Basic": {"netPremium": 100, "SI": "not disclosed"},
            "bajaj_Basic": {"netPremium": 100}
        });
        for quote in normalize(&raw, 1) {
            assert_eq!(quote.sum_insured, DEFAULT_SUM_INSURED, "{}", quote.id);
        }
    }

    #[test]
    fn test_explicit_provider_field_wins_over_key() {
        let raw = json!({
            "plan_x": {"insurer": "icici lombard", "netPremium": 10},
            "reliance_y": {"provider": "Acme Mutual", "netPremium": 10, "planCode": "A1"}
        });
        let quotes = normalize(&raw, 1);
        let x = quotes.iter().find(|q| q.id == "plan_x").unwrap();
        assert_eq!(x.provider, "ICICI Lombard");
        let y = quotes.iter().find(|q| q.id == "reliance_y").unwrap();
        assert_eq!(y.provider, "Acme Mutual");
        assert_eq!(y.plan_code, None);
        assert_eq!(y.logo_ref, crate::types::DEFAULT_LOGO);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-1.0e9f64..1.0e9).prop_map(|f| json!(f)),
            "[a-zA-Z0-9 ,._-]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(
                    (
                        "[a-z_]{1,8}|data|result|netPremium|SI|covers|status|responseCode",
                        inner
                    ),
                    0..6
                )
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            ".{0,16}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn test_arbitrary_payloads_never_panic(raw in arb_json(), travellers in 1u32..9) {
            let quotes = normalize(&raw, travellers);
            let mut ids: Vec<&str> = quotes.iter().map(|q| q.id.as_str()).collect();
            let count = ids.len();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), count);
            for quote in &quotes {
                prop_assert!(!quote.id.trim().is_empty());
                prop_assert!(quote.sum_insured.is_finite());
                prop_assert_eq!(quote.benefits.len(), STANDARD_BENEFITS.len());
                prop_assert_eq!(quote.travellers_count, travellers);
            }
        }

        #[test]
        fn test_scalar_payloads_yield_nothing(raw in arb_scalar()) {
            prop_assert!(normalize(&raw, 1).is_empty());
            prop_assert!(try_normalize(&raw, 1).is_err());
        }

        #[test]
        fn test_every_priced_entry_becomes_one_quote(
            entries in prop::collection::vec(("[a-z]{1,6}_[A-Za-z]{1,6}", 1u32..100_000), 0..10),
            envelope in 0u8..4,
        ) {
            let mut map = Map::new();
            let mut expected: Vec<(String, f64)> = Vec::new();
            for (key, premium) in entries {
                if map.contains_key(&key) {
                    continue;
                }
                map.insert(key.clone(), json!({"netPremium": premium, "SI": "100000"}));
                expected.push((key, f64::from(premium)));
            }
            let raw = match envelope {
                0 => Value::Object(map),
                1 => json!({ "data": map }),
                2 => json!({ "result": map }),
                _ => json!([{ "data": map }]),
            };
            let quotes: Vec<(String, f64)> = normalize(&raw, 1)
                .into_iter()
                .map(|q| (q.id, q.net_premium))
                .collect();
            prop_assert_eq!(quotes, expected);
        }
    }
}
