use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Raw body of `GET /ssr-api/search-results`.
///
/// Only the envelope is typed. Individual listings stay as JSON values until
/// [`crate::normalize::normalize_listing`] flattens them, because their
/// fields arrive either bare or wrapped as `{"raw": ...}`.
#[derive(Debug, Deserialize)]
pub struct SearchResultsResponse {
    #[serde(default)]
    pub data: Option<SearchResultsData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResultsData {
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_results: u64,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl SearchResultsResponse {
    #[must_use]
    pub fn into_data(self) -> SearchResultsData {
        self.data.unwrap_or_default()
    }
}

/// Accepts counts sent as numbers, numeric strings, `{"raw": n}` or `null`.
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(crate::normalize::value_u64(&value).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn total_results_accepts_string_and_wrapped_forms() {
        let body = json!({"data": {"total_results": "929", "results": []}});
        let parsed: SearchResultsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.into_data().total_results, 929);

        let body = json!({"data": {"total_results": {"raw": 55}, "results": []}});
        let parsed: SearchResultsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.into_data().total_results, 55);
    }

    #[test]
    fn missing_data_is_an_empty_page() {
        let parsed: SearchResultsResponse = serde_json::from_value(json!({})).unwrap();
        let data = parsed.into_data();
        assert_eq!(data.total_results, 0);
        assert!(data.results.is_empty());
    }
}
