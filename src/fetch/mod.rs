//! The fetch primitive seam.
//!
//! [`Fetch`] is the capability a connection is built on. [`BasicFetch`]
//! implements it with reqwest for use outside the sandbox; tests supply
//! their own.

mod basic;
mod client;
mod types;
pub mod auth;

pub use basic::{BasicFetch, MAX_RESPONSE_SIZE};
pub use client::Fetch;
pub use types::{FetchFailure, FetchRequest, FetchResponse};
