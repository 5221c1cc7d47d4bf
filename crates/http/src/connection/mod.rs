//! HTTP connection handling module
//!
//! [`HttpConnection`] reads requests from a byte stream, consults a
//! [`Handler`](crate::handler::Handler) at every parse milestone and writes the responses.
//!
//! - Pipelined requests are served in order on one connection
//! - `Expect: 100-continue` is answered before the body is read
//! - Policy checks pause the parser through a [`ResponseGate`](crate::gate::ResponseGate)
//! - Every failure ends with a complete error response and `Connection: close`

mod http_connection;

pub use http_connection::HttpConnection;
