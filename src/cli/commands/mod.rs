pub mod campaigns;
pub mod clients;
pub mod config;
pub mod reports;
pub mod rewards;
pub mod surveys;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse a CLI word into one of the serde-named enums (statuses, question types)
pub fn parse_serde_enum<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| format!("'{}' is not a recognized value", raw))
}
