use serde_json::Value;

use crate::error::SerializationError;

/// A wire format mapping raw payloads to plain structures and back
pub trait WireFormat: Send + Sync {
    fn mimetype(&self) -> &str;

    /// Binary payloads are sent as bytes, text payloads as strings
    fn is_binary(&self) -> bool;

    fn from_data(&self, raw: &[u8]) -> Result<Value, SerializationError>;

    fn to_data(&self, value: &Value) -> Result<Vec<u8>, SerializationError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl WireFormat for JsonFormat {
    fn mimetype(&self) -> &str {
        "application/json"
    }

    fn is_binary(&self) -> bool {
        false
    }

    fn from_data(&self, raw: &[u8]) -> Result<Value, SerializationError> {
        serde_json::from_slice(raw)
            .map_err(|e| SerializationError::new(format!("Invalid JSON: {}", e)))
    }

    fn to_data(&self, value: &Value) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value)
            .map_err(|e| SerializationError::new(format!("Failed to encode JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_helper_round_trips_structures() {
        let format = JsonFormat;
        let value = json!({"name": "Chris", "tags": [1, 2]});
        let raw = format.to_data(&value).unwrap();
        assert_eq!(format.from_data(&raw).unwrap(), value);
        assert_eq!(format.mimetype(), "application/json");
        assert!(!format.is_binary());
    }

    #[test]
    fn malformed_json_has_no_canned_response() {
        let err = JsonFormat.from_data(b"{not json").unwrap_err();
        assert!(err.message.starts_with("Invalid JSON"));
        assert!(err.response.is_none());
    }
}
