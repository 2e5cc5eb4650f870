//! Serializable result envelope for dispatch layers sitting above sessions.

use serde::Serialize;

use crate::error::{ErrorKind, SessionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: None,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn failed(error: &SessionError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            kind: Some(error.kind()),
            data: None,
        }
    }

    /// Wraps `result`, using `message` as the success text.
    #[must_use]
    pub fn from_result(result: Result<T, SessionError>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(error) => Self::failed(&error),
        }
    }
}

impl<T> From<Result<T, SessionError>> for Outcome<T> {
    fn from(result: Result<T, SessionError>) -> Self {
        Self::from_result(result, "ok")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::Outcome;
    use crate::error::{ErrorKind, SessionError};

    #[test]
    fn success_carries_data_without_kind() {
        let outcome = Outcome::from_result(Ok::<_, SessionError>(3usize), "undone");
        assert_eq!(
            serde_json::to_value(&outcome).expect("outcome serializes"),
            json!({ "success": true, "message": "undone", "data": 3 })
        );
    }

    #[test]
    fn failure_carries_kind_and_message() {
        let outcome = Outcome::from(Err::<(), _>(SessionError::NotFound {
            session_id: "gone".to_string(),
        }));
        assert!(!outcome.success);
        assert_eq!(outcome.kind, Some(ErrorKind::NotFound));
        assert_eq!(outcome.message, "session 'gone' not found");
        assert_eq!(
            serde_json::to_value(&outcome).expect("outcome serializes"),
            json!({
                "success": false,
                "message": "session 'gone' not found",
                "kind": "not_found"
            })
        );
    }
}
