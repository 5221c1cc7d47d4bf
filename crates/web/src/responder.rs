//! Conversion of handler results into a [`Flow`].
//!
//! Handlers built with [`handler_fn`](crate::handler_fn) may return anything implementing
//! [`Responder`]: text, a complete response, a status with text, an explicit [`Flow`] or a
//! `Result` of those whose error fails the request with 500.

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode};
use micro_mvc_http::handler::BoxError;

use crate::handler::Flow;

pub trait Responder {
    fn respond(self) -> Result<Flow, BoxError>;
}

fn text_response(status: StatusCode, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(http::header::CONTENT_TYPE, HeaderValue::from_static(mime::TEXT_PLAIN_UTF_8.as_ref()));
    response
}

impl Responder for Flow {
    fn respond(self) -> Result<Flow, BoxError> {
        Ok(self)
    }
}

impl Responder for Response<Bytes> {
    fn respond(self) -> Result<Flow, BoxError> {
        Ok(Flow::Done(self))
    }
}

impl Responder for String {
    fn respond(self) -> Result<Flow, BoxError> {
        Ok(Flow::Done(text_response(StatusCode::OK, Bytes::from(self))))
    }
}

impl Responder for &'static str {
    fn respond(self) -> Result<Flow, BoxError> {
        Ok(Flow::Done(text_response(StatusCode::OK, Bytes::from_static(self.as_bytes()))))
    }
}

/// Sets the status of the inner response.
impl<T: Responder> Responder for (StatusCode, T) {
    fn respond(self) -> Result<Flow, BoxError> {
        let (status, responder) = self;
        match responder.respond()? {
            Flow::Done(mut response) => {
                *response.status_mut() = status;
                Ok(Flow::Done(response))
            }
            Flow::Next => Ok(Flow::Next),
        }
    }
}

impl<T, E> Responder for Result<T, E>
where
    T: Responder,
    E: Into<BoxError>,
{
    fn respond(self) -> Result<Flow, BoxError> {
        match self {
            Ok(responder) => responder.respond(),
            Err(e) => Err(e.into()),
        }
    }
}
