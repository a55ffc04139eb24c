//! Shapes of the `QuickQuote` payload.
//!
//! The quoting service relays whatever each upstream insurer integration
//! produced, so one event may be any of several envelopes around the same
//! `insurerProductKey -> attributes` map.

use serde_json::{Map, Value};

use crate::{
    errors::ShapeError,
    serde_utils::{json_type_name, value_as_f64},
};

pub type QuoteMap = Map<String, Value>;

/// A raw stream event, classified by envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum RawQuoteEvent<'a> {
    /// `[{ "data": { ... } }, ...]`
    Enveloped(&'a QuoteMap),
    /// `{ "result": { ... } }`
    Result(&'a QuoteMap),
    /// `{ "data": { ... } }`
    Data(&'a QuoteMap),
    /// `{ "reliance_Gold": { ... }, ... }`
    Flat(&'a QuoteMap),
    /// An explicit "no quote available" answer for the whole event.
    NoData,
}

impl<'a> RawQuoteEvent<'a> {
    /// Classifies `value`, trying each known envelope in order.
    pub fn parse(value: &'a Value) -> Result<Self, ShapeError> {
        match value {
            Value::Array(items) => {
                let first = items
                    .first()
                    .and_then(Value::as_object)
                    .filter(|obj| obj.contains_key("data"))
                    .ok_or(ShapeError::EmptyEnvelope)?;
                if is_no_data_sentinel(first) {
                    return Ok(RawQuoteEvent::NoData);
                }
                first
                    .get("data")
                    .and_then(Value::as_object)
                    .map(RawQuoteEvent::Enveloped)
                    .ok_or(ShapeError::NotAMap("data"))
            }
            Value::Object(obj) => {
                if is_no_data_sentinel(obj) {
                    return Ok(RawQuoteEvent::NoData);
                }
                if let Some(result) = obj.get("result").filter(|r| !r.is_null()) {
                    return result
                        .as_object()
                        .map(RawQuoteEvent::Result)
                        .ok_or(ShapeError::NotAMap("result"));
                }
                if let Some(data) = obj.get("data") {
                    return data
                        .as_object()
                        .map(RawQuoteEvent::Data)
                        .ok_or(ShapeError::NotAMap("data"));
                }
                Ok(RawQuoteEvent::Flat(obj))
            }
            other => Err(ShapeError::UnexpectedType(json_type_name(other))),
        }
    }

    /// The unwrapped `insurerProductKey -> attributes` map (empty for [`RawQuoteEvent::NoData`]).
    pub fn quotes(&self) -> Option<&'a QuoteMap> {
        match self {
            RawQuoteEvent::Enveloped(map)
            | RawQuoteEvent::Result(map)
            | RawQuoteEvent::Data(map)
            | RawQuoteEvent::Flat(map) => Some(map),
            RawQuoteEvent::NoData => None,
        }
    }
}

/// `{ "status": true, "responseCode": 204, "data": <empty> }` — an insurer
/// reporting that it has no quote for the request.
pub fn is_no_data_sentinel(obj: &QuoteMap) -> bool {
    let status_ok = matches!(obj.get("status"), Some(Value::Bool(true)));
    let no_content = obj
        .get("responseCode")
        .and_then(value_as_f64)
        .is_some_and(|code| code == 204.0);
    let data_empty = match obj.get("data") {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    };
    status_ok && no_content && data_empty
}
