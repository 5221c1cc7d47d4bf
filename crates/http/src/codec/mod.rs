//! HTTP codec module for parsing requests and encoding responses
//!
//! - [`RequestParser`]: the resumable byte parser. It reports how many bytes it consumed on
//!   every call and stops at parse milestones until the driver releases it.
//! - [`RequestDecoder`]: a `tokio_util` [`Decoder`](tokio_util::codec::Decoder) over the parser,
//!   yielding [`ParseEvent`](crate::protocol::ParseEvent)s.
//! - [`ResponseEncoder`]: an [`Encoder`](tokio_util::codec::Encoder) for complete responses.
//!
//! # Example
//!
//! ```no_run
//! use micro_mvc_http::codec::RequestParser;
//! use micro_mvc_http::handler::RouteResolver;
//! use micro_mvc_http::protocol::{Milestone, ParseStatus, Verb};
//!
//! struct Everything;
//!
//! impl RouteResolver for Everything {
//!     type Target = ();
//!     fn resolve(&self, _verb: Verb, _path: &str) -> Option<()> {
//!         Some(())
//!     }
//! }
//!
//! let mut parser = RequestParser::with_resolver(Everything);
//! let progress = parser.feed(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
//! assert_eq!(progress.status, ParseStatus::Advanced(Milestone::HeadersReady));
//! parser.release();
//! ```

mod request_decoder;
mod request_parser;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use request_parser::RequestParser;
pub use response_encoder::ResponseEncoder;
