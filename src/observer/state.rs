use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::CacheEntry;
use crate::response::{RequestError, Response, ResponseDetails};

/// Reactive snapshot exposed by an observer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState {
    pub data: Option<Value>,
    pub error: Option<RequestError>,
    pub status: u16,
    pub is_loading: bool,
    pub retries: u32,
    /// When the current response was received. `None` before the first response.
    pub timestamp: Option<DateTime<Utc>>,
}

impl RequestState {
    pub(crate) fn from_entry(entry: &CacheEntry, is_loading: bool) -> Self {
        let mut state = Self {
            is_loading,
            ..Self::default()
        };
        state.apply_entry(entry);
        state
    }

    pub(crate) fn from_response(response: &Response, is_loading: bool) -> Self {
        Self {
            data: response.data.clone(),
            error: response.error.clone(),
            status: response.status,
            is_loading,
            retries: 0,
            timestamp: None,
        }
    }

    pub(crate) fn apply_entry(&mut self, entry: &CacheEntry) {
        self.data.clone_from(&entry.response.data);
        self.error.clone_from(&entry.response.error);
        self.status = entry.response.status;
        self.retries = entry.retries;
        self.timestamp = Some(entry.timestamp);
    }

    pub(crate) fn apply_response(&mut self, response: &Response, details: &ResponseDetails) {
        self.data.clone_from(&response.data);
        self.error.clone_from(&response.error);
        self.status = response.status;
        self.retries = details.retries;
        self.timestamp = Some(details.timestamp);
    }

    /// Deserializes the current data into `T`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the data does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data
            .as_ref()
            .map(|data| serde_json::from_value(data.clone()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_entry() {
        let entry = CacheEntry::new("k", Response::http_error(404, None)).with_retries(2);
        let state = RequestState::from_entry(&entry, true);

        assert_eq!(state.status, 404);
        assert_eq!(state.retries, 2);
        assert!(state.is_loading);
        assert!(state.data.is_none());
        assert_eq!(state.timestamp, Some(entry.timestamp));
    }

    #[test]
    fn test_apply_entry_keeps_loading() {
        let mut state = RequestState {
            is_loading: true,
            ..RequestState::default()
        };
        state.apply_entry(&CacheEntry::new("k", Response::success(200, json!([1, 2]))));

        assert!(state.is_loading);
        assert_eq!(state.data_as::<Vec<u8>>().expect("valid data"), Some(vec![1, 2]));
        assert!(state.error.is_none());
    }
}
