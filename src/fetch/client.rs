use std::sync::Arc;

use super::types::{FetchFailure, FetchRequest, FetchResponse};

/// A synchronous fetch primitive.
///
/// `fetch` blocks the calling thread until the response is complete or the
/// primitive gives up. Implementations decide whether concurrent calls are
/// safe; the connection places no lock around them.
pub trait Fetch: Send + Sync {
    /// Whether the primitive can be used in the current environment.
    fn is_available(&self) -> bool {
        true
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchFailure>;
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchFailure> {
        (**self).fetch(request)
    }
}

impl<F: Fetch + ?Sized> Fetch for Box<F> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchFailure> {
        (**self).fetch(request)
    }
}
