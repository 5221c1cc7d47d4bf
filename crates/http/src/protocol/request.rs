//! Request types produced by the parser.
//!
//! A request goes through two shapes: [`PendingRequest`] while its body is still being read
//! (route resolved, policies may still be running) and [`ParsedRequest`] once the whole
//! message has been consumed.

use bytes::Bytes;
use http::{HeaderMap, Uri, Version};

use crate::multipart::MultipartForm;
use crate::protocol::Verb;

/// The request line and header section of a request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub(crate) verb: Verb,
    pub(crate) method: String,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) query: Vec<(String, String)>,
}

impl RequestHead {
    pub fn new(verb: Verb, method: impl Into<String>, uri: Uri, version: Version, query: Vec<(String, String)>) -> Self {
        Self { verb, method: method.into(), uri, version, headers: HeaderMap::new(), query }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The method token exactly as it appeared on the request line.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Decoded query string pairs in the order they appeared.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// First query value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }
}

/// A request whose headers are complete but whose body is still being read.
#[derive(Debug)]
pub struct PendingRequest<T> {
    pub(crate) head: RequestHead,
    pub(crate) target: Option<T>,
    pub(crate) content_length: u64,
    pub(crate) body_received: u64,
}

impl<T> PendingRequest<T> {
    pub fn new(head: RequestHead) -> Self {
        Self { head, target: None, content_length: 0, body_received: 0 }
    }

    pub fn with_target(mut self, target: T) -> Self {
        self.target = Some(target);
        self
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// The resolved route target, available once the header section is complete.
    pub fn target(&self) -> Option<&T> {
        self.target.as_ref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn body_received(&self) -> u64 {
        self.body_received
    }

    pub(crate) fn body_remaining(&self) -> u64 {
        self.content_length - self.body_received
    }
}

/// The decoded body of a request.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` pairs in wire order.
    Form(Vec<(String, String)>),
    /// A `text/*` body.
    Text(String),
    Bytes(Bytes),
    Multipart(MultipartForm),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_multipart(&self) -> Option<&MultipartForm> {
        match self {
            RequestBody::Multipart(form) => Some(form),
            _ => None,
        }
    }
}

/// A fully assembled request, ready to be handed to a handler.
#[derive(Debug)]
pub struct ParsedRequest<T> {
    head: RequestHead,
    body: RequestBody,
    target: T,
}

impl<T> ParsedRequest<T> {
    pub fn new(head: RequestHead, body: RequestBody, target: T) -> Self {
        Self { head, body, target }
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn into_parts(self) -> (RequestHead, RequestBody, T) {
        (self.head, self.body, self.target)
    }
}
