//! The `[data, error, status]` response shape and the metadata that travels with it.
//!
//! Every settled request, whether it succeeded, failed, was aborted or could not run
//! because the client is offline, produces a [`Response`] together with
//! [`ResponseDetails`]. Failures are values in the error slot, never panics or
//! `Err` returns across the dispatcher boundary.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::request_id::RequestId;

/// Status used for failures that never produced an HTTP status (network, abort, offline).
pub const NO_STATUS: u16 = 0;

/// Error carried in the error slot of a [`Response`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}")]
    Http { status: u16, body: Option<Value> },

    #[error("Request aborted")]
    Abort,

    #[error("No internet connection")]
    Offline,

    #[error("Request disabled: {0}")]
    Disabled(String),
}

impl RequestError {
    /// Returns `true` for errors produced by a user or queue abort.
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }

    /// Returns `true` for errors produced while the client was offline.
    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }
}

/// A settled response: the positional `[data, error, status]` contract with named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub data: Option<Value>,
    pub error: Option<RequestError>,
    pub status: u16,
}

impl Response {
    /// A successful response carrying `data`.
    pub const fn success(status: u16, data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
            status,
        }
    }

    /// A failed response with an explicit error.
    pub const fn failure(status: u16, error: RequestError) -> Self {
        Self {
            data: None,
            error: Some(error),
            status,
        }
    }

    /// A server-reported failure (status 400..=599).
    pub fn http_error(status: u16, body: Option<Value>) -> Self {
        Self::failure(status, RequestError::Http { status, body })
    }

    /// A transport failure that never reached the server.
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::failure(NO_STATUS, RequestError::Network(message.into()))
    }

    /// The synthesized response delivered to everyone attached to an aborted request.
    pub const fn aborted() -> Self {
        Self::failure(NO_STATUS, RequestError::Abort)
    }

    /// The response delivered when a request cannot be held for connectivity.
    pub const fn offline() -> Self {
        Self::failure(NO_STATUS, RequestError::Offline)
    }

    /// Returns `true` when there is no error and the status is in 200..=299.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..=299).contains(&self.status)
    }

    /// Returns `true` when the response is not a success.
    pub fn is_failed(&self) -> bool {
        !self.is_success()
    }

    /// Deserializes the data slot into `T`.
    ///
    /// Returns `Ok(None)` when the response carries no data.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the payload does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data
            .as_ref()
            .map(|data| serde_json::from_value(data.clone()))
            .transpose()
    }

    /// Converts into the positional `(data, error, status)` triple.
    pub fn into_tuple(self) -> (Option<Value>, Option<RequestError>, u16) {
        (self.data, self.error, self.status)
    }
}

/// Metadata delivered alongside every [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDetails {
    pub retries: u32,
    pub timestamp: DateTime<Utc>,
    pub is_failed: bool,
    pub is_canceled: bool,
    pub is_offline: bool,
}

impl ResponseDetails {
    pub fn new(response: &Response, retries: u32, is_offline: bool) -> Self {
        Self {
            retries,
            timestamp: Utc::now(),
            is_failed: response.is_failed(),
            is_canceled: response.error.as_ref().is_some_and(RequestError::is_abort),
            is_offline,
        }
    }

    /// Details for an aborted request. Aborts never count as retries.
    pub fn canceled() -> Self {
        Self {
            retries: 0,
            timestamp: Utc::now(),
            is_failed: true,
            is_canceled: true,
            is_offline: false,
        }
    }
}

/// A settled request as seen by response listeners and awaiting callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEvent {
    pub request_id: RequestId,
    pub response: Response,
    pub details: ResponseDetails,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_predicates() {
        let response = Response::success(200, json!({"id": 1}));
        assert!(response.is_success());
        assert!(!response.is_failed());

        let response = Response::success(304, json!(null));
        assert!(response.is_failed());
    }

    #[test]
    fn test_http_error_keeps_body() {
        let response = Response::http_error(400, Some(json!({"message": "Error"})));
        assert_eq!(response.status, 400);
        assert!(response.data.is_none());
        assert_eq!(
            response.error,
            Some(RequestError::Http {
                status: 400,
                body: Some(json!({"message": "Error"})),
            })
        );
    }

    #[test]
    fn test_aborted_shape() {
        let (data, error, status) = Response::aborted().into_tuple();
        assert!(data.is_none());
        assert_eq!(error, Some(RequestError::Abort));
        assert_eq!(status, NO_STATUS);
    }

    #[test]
    fn test_details_flags() {
        let details = ResponseDetails::new(&Response::aborted(), 2, false);
        assert!(details.is_canceled);
        assert!(details.is_failed);
        assert_eq!(details.retries, 2);

        let details = ResponseDetails::new(&Response::success(200, json!(1)), 0, false);
        assert!(!details.is_failed);
        assert!(!details.is_canceled);
    }

    #[test]
    fn test_data_as() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct User {
            id: u32,
        }

        let response = Response::success(200, json!({"id": 7}));
        let user: Option<User> = response.data_as().expect("payload should match");
        assert_eq!(user, Some(User { id: 7 }));

        let empty = Response::offline();
        let user: Option<User> = empty.data_as().expect("missing data is not an error");
        assert!(user.is_none());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RequestError::Abort.to_string(), "Request aborted");
        assert_eq!(
            RequestError::Network("refused".to_string()).to_string(),
            "Network error: refused"
        );
        assert_eq!(
            RequestError::Http {
                status: 500,
                body: None
            }
            .to_string(),
            "Request failed with status 500"
        );
    }
}
