//! Prelude module for convenient imports.
//!
//! ```
//! use hyperflow::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Client`] and [`SendOptions`] - The request core and per-send options
//! - [`Command`] and [`Method`] - Request descriptors
//! - [`Response`], [`ResponseDetails`], [`RequestError`] - Settled outcomes
//! - [`FetchObserver`], [`SubmitObserver`] and their options - Headless bindings
//! - [`Adapter`], [`MockAdapter`], [`Interceptor`] - Transport
//! - [`Socket`], [`SocketClient`], [`SocketConfig`] - Socket client

pub use crate::adapter::{Adapter, AdapterRequest, Interceptor, MockAdapter};
pub use crate::cache::{Cache, CacheEntry};
pub use crate::client::{Client, SendOptions};
pub use crate::command::{Command, Method};
pub use crate::config::{ClientConfig, DispatcherConfig};
pub use crate::dispatcher::DispatcherKind;
pub use crate::observer::{FetchObserver, FetchOptions, RequestState, SubmitObserver, SubmitOptions};
pub use crate::request_id::RequestId;
pub use crate::response::{RequestError, Response, ResponseDetails};
pub use crate::socket::{Socket, SocketClient, SocketConfig};
