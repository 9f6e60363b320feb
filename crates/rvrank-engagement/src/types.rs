use serde::Deserialize;
use serde_json::Value;

/// Body of either stats endpoint:
/// `{"error": null, "listingViewsData": "138"}` or
/// `{"error": null, "listingSavesData": 1}`.
#[derive(Debug, Deserialize)]
pub struct StatPayload {
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(rename = "listingViewsData", default)]
    pub views: Option<Value>,
    #[serde(rename = "listingSavesData", default)]
    pub saves: Option<Value>,
}

impl StatPayload {
    /// The endpoint's error message, if it reported one.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    /// View count. Only a plain run of digits counts; anything else is
    /// treated as "not reported".
    #[must_use]
    pub fn view_count(&self) -> Option<u64> {
        match self.views.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => {
                let s = s.trim();
                if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                    s.parse().ok()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Save count. The endpoint occasionally reports negative values, which
    /// are passed through.
    #[must_use]
    pub fn save_count(&self) -> Option<i64> {
        match self.saves.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
