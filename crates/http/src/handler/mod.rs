//! The seams between the protocol layer and a framework.
//!
//! The parser calls a [`RouteResolver`] as soon as a header section is complete. The
//! connection driver calls a [`Handler`] at each parse milestone: access checks once the
//! route is known, part checks for every multipart part and finally the request itself.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Response;

use crate::multipart::PartInfo;
use crate::protocol::{HttpError, ParsedRequest, PendingRequest, Verb};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Resolves a request to its route target.
pub trait RouteResolver {
    type Target: Send + Sync + 'static;

    /// `path` is the raw, still percent-encoded path of the request target.
    fn resolve(&self, verb: Verb, path: &str) -> Option<Self::Target>;
}

impl<T: RouteResolver + ?Sized> RouteResolver for Arc<T> {
    type Target = T::Target;

    fn resolve(&self, verb: Verb, path: &str) -> Option<Self::Target> {
        (**self).resolve(verb, path)
    }
}

#[async_trait]
pub trait Handler: RouteResolver + Send + Sync {
    /// Runs the access policies of the resolved route.
    async fn check_access(&self, request: &PendingRequest<Self::Target>) -> Result<(), HttpError>;

    /// Runs the part policies for one multipart part. The returned value caps the part size.
    async fn check_part(&self, request: &PendingRequest<Self::Target>, part: &PartInfo) -> Result<Option<u64>, HttpError>;

    async fn call(&self, request: ParsedRequest<Self::Target>) -> Result<Response<Bytes>, BoxError>;
}
