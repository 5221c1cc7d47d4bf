use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::gate::GateState;

/// Top-level error of the ingestion pipeline.
///
/// Every variant maps to a response status through [`HttpError::status_code`], so a failure
/// anywhere in the pipeline still produces a complete response.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("no route found for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("policy denied: {source}")]
    PolicyDenied {
        #[from]
        source: PolicyDenied,
    },

    #[error("multipart error: {source}")]
    Multipart {
        #[from]
        source: MultipartError,
    },

    #[error("gate misuse: {source}")]
    GateMisuse {
        #[from]
        source: GateMisuse,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl HttpError {
    pub fn route_not_found<M: ToString, P: ToString>(method: M, path: P) -> Self {
        Self::RouteNotFound { method: method.to_string(), path: path.to_string() }
    }

    /// The response status the pipeline answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::Parse { source } => source.status_code(),
            HttpError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            HttpError::PolicyDenied { source } => source.status(),
            HttpError::Multipart { source } => source.status_code(),
            HttpError::GateMisuse { .. } | HttpError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid request line: {reason}")]
    InvalidRequestLine { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0}")]
    InvalidVersion(String),

    #[error("invalid http method: {0}")]
    InvalidMethod(String),

    #[error("invalid http uri: {0}")]
    InvalidUri(String),

    #[error("missing host header")]
    MissingHost,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),

    #[error("body size {size} exceed the limit {max_size}")]
    TooLargeBody { size: u64, max_size: u64 },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("connection closed before the request was complete")]
    Incomplete,

    #[error("parser must be reset before reuse")]
    NeedsReset,

    #[error("inconsistent parser state: {0}")]
    InvalidState(&'static str),
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ParseError::TooLargeHeader { .. } | ParseError::TooManyHeaders { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            ParseError::TooLargeBody { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ParseError::InvalidVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            ParseError::UnsupportedTransferEncoding(_) => StatusCode::NOT_IMPLEMENTED,
            ParseError::NeedsReset | ParseError::InvalidState(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("multipart boundary not found in content-type")]
    MissingBoundary,

    #[error("expected boundary '{expected}', found '{found}'")]
    InvalidBoundary { expected: String, found: String },

    #[error("invalid part header: {reason}")]
    InvalidPartHeader { reason: String },

    #[error("form field '{name}' is not valid utf-8")]
    InvalidFormValue { name: String },

    #[error("part has neither a name nor a filename")]
    MissingDisposition,

    #[error("part header size exceed the limit {max_size}")]
    TooLargeHeader { max_size: usize },

    #[error("multipart body ended before its closing boundary")]
    Truncated,

    #[error("temp storage failure: {source}")]
    Storage {
        #[from]
        source: io::Error,
    },
}

impl MultipartError {
    pub fn invalid_part_header<S: ToString>(str: S) -> Self {
        Self::InvalidPartHeader { reason: str.to_string() }
    }

    pub fn invalid_boundary<E: ToString, F: AsRef<[u8]>>(expected: E, found: F) -> Self {
        Self::InvalidBoundary { expected: expected.to_string(), found: String::from_utf8_lossy(found.as_ref()).into_owned() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MultipartError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// A failed policy rule: the status to answer with and a human readable reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {reason}")]
pub struct PolicyDenied {
    status: StatusCode,
    reason: String,
}

impl PolicyDenied {
    pub fn new<S: ToString>(status: StatusCode, reason: S) -> Self {
        Self { status, reason: reason.to_string() }
    }

    pub fn unauthorized<S: ToString>(reason: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, reason)
    }

    pub fn forbidden<S: ToString>(reason: S) -> Self {
        Self::new(StatusCode::FORBIDDEN, reason)
    }

    pub fn payload_too_large<S: ToString>(reason: S) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, reason)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMisuse {
    #[error("pause requested while the gate is {0:?}")]
    Pause(GateState),

    #[error("resume requested while the gate is {0:?}")]
    Resume(GateState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(HttpError::from(ParseError::invalid_header("x")).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::route_not_found("GET", "/x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(HttpError::from(PolicyDenied::forbidden("no")).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(HttpError::from(MultipartError::MissingBoundary).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            HttpError::from(MultipartError::from(io::Error::other("disk full"))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HttpError::from(GateMisuse::Resume(GateState::Idle)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
