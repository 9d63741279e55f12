//! A search-client connection that performs its HTTP requests through a
//! sandboxed, synchronous fetch primitive.
//!
//! [`UrlFetchConnection`] turns `perform_request` calls into [`Fetch`]
//! calls and maps the outcome back to a [`Response`] or an [`Error`].

pub mod config;
pub mod connection;
pub mod error;
pub mod fetch;
pub mod transport;

pub use config::ConnectionConfig;
pub use connection::UrlFetchConnection;
pub use error::{Error, Result};
pub use fetch::auth::HttpAuth;
pub use fetch::{BasicFetch, Fetch, FetchFailure, FetchRequest, FetchResponse};
pub use transport::{Connection, Response};
