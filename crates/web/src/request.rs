//! The request handed to handlers, and the path parameters extracted by the router.

use http::{HeaderMap, Uri, Version};
use micro_mvc_http::multipart::FileField;
use micro_mvc_http::protocol::{RequestBody, RequestHead, Verb};

/// Path parameters captured by a route, percent-decoded, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    pub fn new(params: Vec<(String, String)>) -> Self {
        Self { params }
    }

    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a path parameter by its name.
    /// Returns None if the parameter doesn't exist or an optional segment was absent.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = name.as_ref();
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// A fully read request together with the parameters of the route it matched.
#[derive(Debug)]
pub struct Request {
    head: RequestHead,
    body: RequestBody,
    params: PathParams,
}

impl Request {
    pub fn new(head: RequestHead, body: RequestBody, params: PathParams) -> Self {
        Self { head, body, params }
    }

    pub fn verb(&self) -> Verb {
        self.head.verb()
    }

    /// The method exactly as sent, including methods unknown to the router.
    pub fn method(&self) -> &str {
        self.head.method()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.head.query(name)
    }

    /// A form value, from an urlencoded body or a multipart form field.
    pub fn form(&self, name: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(pairs) => pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str()),
            RequestBody::Multipart(form) => form.field(name),
            _ => None,
        }
    }

    /// An uploaded file part.
    pub fn file(&self, name: &str) -> Option<&FileField> {
        self.body.as_multipart().and_then(|form| form.file(name))
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }
}
