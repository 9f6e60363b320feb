//! Flattens raw search-result listings into [`ListingRecord`]s.
//!
//! Upstream fields arrive in three shapes: a bare value, `{"raw": value}`,
//! or `{"raw": [value]}`. Numbers are sometimes sent as strings. Everything
//! not mapped here is dropped.

use std::str::FromStr;

use rust_decimal::Decimal;
use rvrank_core::{ListingRecord, SearchContext};
use serde_json::{Map, Value};

use crate::error::ScraperError;
use crate::range::SubRange;

/// Normalizes one raw listing fetched through `range` for `context`.
///
/// The returned record is unranked; ranks are assigned at merge.
///
/// # Errors
///
/// Returns [`ScraperError::Normalization`] if the listing is not a JSON
/// object or has no usable `ad_id`.
pub fn normalize_listing(
    raw: &Value,
    context: &SearchContext,
    range: &SubRange,
) -> Result<ListingRecord, ScraperError> {
    let Some(fields) = raw.as_object() else {
        return Err(ScraperError::Normalization {
            listing_id: "<unknown>".to_owned(),
            reason: format!("expected a JSON object, got {}", type_name(raw)),
        });
    };

    let id = text(fields, "ad_id").ok_or_else(|| ScraperError::Normalization {
        listing_id: "<unknown>".to_owned(),
        reason: "listing has no ad_id".to_owned(),
    })?;

    let mut record = ListingRecord::new(&id, context.clone());
    record.price_band_min = Some(range.lower);
    record.price_band_max = range.upper;

    record.dealer_id = text(fields, "dealer_id");
    record.dealer_name = text(fields, "company_name");
    record.dealer_phone = primary_phone(fields);

    record.year = integer(fields, "year").and_then(|y| i32::try_from(y).ok());
    record.make = text(fields, "make_name");
    record.model = text(fields, "model_name");
    record.trim = text(fields, "trim_name");
    record.class = text(fields, "class_name");
    record.condition = text(fields, "condition");
    record.length = text(fields, "length");
    record.mileage = field(fields, "mileage").and_then(value_u64);

    record.price = decimal(fields, "price");
    record.msrp = decimal(fields, "msrp");

    record.city = text(fields, "city");
    record.state = text(fields, "state_code");
    record.zip_code = text(fields, "zip_code");

    record.photo_count = field(fields, "photo_count")
        .and_then(value_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
    record.floorplan_id = text(fields, "floorplan_mediaid");
    record.created_at = text(fields, "create_date");

    record.relevance_score = float(fields, "_score");
    record.merch_score = float(fields, "lcs_merch_score");
    record.is_premium = flag(fields, "is_premium");
    record.is_top_premium = flag(fields, "is_toppremium");
    record.badge_status = text(fields, "badge_status");

    record.listing_url = text(fields, "ad_detail_url");

    Ok(record)
}

/// Peels a `{"raw": x}` or `{"raw": [x]}` wrapper. Other values pass through.
pub(crate) fn unwrap_raw(value: &Value) -> &Value {
    match value {
        Value::Object(map) => match map.get("raw") {
            Some(Value::Array(items)) if items.len() == 1 => &items[0],
            Some(inner) => inner,
            None => value,
        },
        _ => value,
    }
}

/// Reads a non-negative integer from a number, numeric string, or wrapper.
pub(crate) fn value_u64(value: &Value) -> Option<u64> {
    match unwrap_raw(value) {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(truncate_non_negative)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate_non_negative))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn truncate_non_negative(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0).then(|| f.trunc() as u64)
}

fn field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).map(unwrap_raw).filter(|v| !v.is_null())
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match field(fields, key)? {
        Value::String(s) => Some(s.trim().to_owned()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn integer(fields: &Map<String, Value>, key: &str) -> Option<i64> {
    match field(fields, key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    match field(fields, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Prices are kept exact. `0` and negative prices mean "call for price".
fn decimal(fields: &Map<String, Value>, key: &str) -> Option<Decimal> {
    let parsed = match field(fields, key)? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => {
            let cleaned = s.trim().trim_start_matches('$').replace(',', "");
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }?;
    (parsed > Decimal::ZERO).then_some(parsed)
}

fn flag(fields: &Map<String, Value>, key: &str) -> bool {
    match field(fields, key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        ),
        _ => false,
    }
}

/// First entry of `dealer_phone` (`"number|label"` items), else `phone`.
fn primary_phone(fields: &Map<String, Value>) -> Option<String> {
    let from_list = match field(fields, "dealer_phone") {
        Some(Value::Array(items)) => items.first().and_then(Value::as_str),
        Some(Value::String(s)) => Some(s.as_str()),
        _ => None,
    };
    from_list
        .and_then(|entry| entry.split('|').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .or_else(|| text(fields, "phone"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
