use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use micro_mvc_http::handler::BoxError;

use crate::request::Request;
use crate::responder::Responder;

/// What a handler decided about a request.
#[derive(Debug)]
pub enum Flow {
    /// Let the next handler registered on the route answer.
    Next,
    Done(Response<Bytes>),
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, request: Arc<Request>) -> Result<Flow, BoxError>;
}

/// An async function used as a [`RequestHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> std::fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Arc<Request>) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: Responder,
{
    FnHandler { f, _phantom: PhantomData }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F, Fut>
where
    F: Fn(Arc<Request>) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: Responder,
{
    async fn invoke(&self, request: Arc<Request>) -> Result<Flow, BoxError> {
        (self.f)(request).await.respond()
    }
}
