//! The protocol layer of micro-mvc: an incremental HTTP/1.x request parser.
//!
//! Bytes may arrive in chunks of any size. The [`RequestParser`](codec::RequestParser) reports
//! how many bytes it consumed on every call, resolves the route as soon as the header section
//! is complete and stops at every milestone until the driver lets it continue. That is where
//! policies run: access checks once the route is known, part checks for every multipart part.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use http::Response;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use micro_mvc_http::config::ParserConfig;
//! use micro_mvc_http::connection::HttpConnection;
//! use micro_mvc_http::handler::{BoxError, Handler, RouteResolver};
//! use micro_mvc_http::multipart::{PartInfo, TempDirStorage};
//! use micro_mvc_http::protocol::{HttpError, ParsedRequest, PendingRequest, Verb};
//!
//! struct HelloWorld;
//!
//! impl RouteResolver for HelloWorld {
//!     type Target = ();
//!
//!     fn resolve(&self, verb: Verb, path: &str) -> Option<()> {
//!         (verb == Verb::Get && path == "/").then_some(())
//!     }
//! }
//!
//! #[async_trait]
//! impl Handler for HelloWorld {
//!     async fn check_access(&self, _request: &PendingRequest<()>) -> Result<(), HttpError> {
//!         Ok(())
//!     }
//!
//!     async fn check_part(&self, _request: &PendingRequest<()>, _part: &PartInfo) -> Result<Option<u64>, HttpError> {
//!         Ok(None)
//!     }
//!
//!     async fn call(&self, _request: ParsedRequest<()>) -> Result<Response<Bytes>, BoxError> {
//!         Ok(Response::new(Bytes::from_static(b"Hello World!\r\n")))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(HelloWorld);
//!     let storage = Arc::new(TempDirStorage::default());
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         let storage = storage.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer, ParserConfig::default(), storage);
//!             if let Err(e) = connection.process(handler).await {
//!                 error!(cause = %e, "service has error, connection shutdown");
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: the byte parser and the `tokio_util` codecs around it
//! - [`multipart`]: the streaming `multipart/form-data` sub-parser and temp storage
//! - [`connection`]: drives a connection through the parser and a [`handler::Handler`]
//! - [`gate`]: the pause/resume point used while policies run
//! - [`protocol`]: requests, parse events and the error taxonomy
//! - [`config`]: parser limits
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - Request bodies must carry a `Content-Length`; `Transfer-Encoding` is refused
//! - No TLS support (use a reverse proxy for HTTPS)

pub mod codec;
pub mod config;
pub mod connection;
pub mod gate;
pub mod handler;
pub mod multipart;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
pub use utils::percent_decode;
