use serde::{Deserialize, Serialize};

/// JSON body of every gateway-originated error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_single_error_field() {
        let json = serde_json::to_string(&ErrorBody::new("Invalid backend path")).unwrap();
        assert_eq!(json, r#"{"error":"Invalid backend path"}"#);
    }
}
