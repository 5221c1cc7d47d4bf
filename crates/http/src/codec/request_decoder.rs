//! HTTP request decoder module
//!
//! [`RequestDecoder`] adapts [`RequestParser`] to `tokio_util`'s [`Decoder`], so a connection
//! can drive it with a `FramedRead`. Every parse milestone becomes one [`ParseEvent`].
//!
//! # Example
//!
//! ```no_run
//! use micro_mvc_http::codec::RequestDecoder;
//! use micro_mvc_http::handler::RouteResolver;
//! use micro_mvc_http::protocol::Verb;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
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
//! let mut decoder = RequestDecoder::with_resolver(Everything);
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let event = decoder.decode(&mut buffer);
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::RequestParser;
use crate::handler::RouteResolver;
use crate::protocol::{HttpError, Milestone, ParseError, ParseEvent, ParseStatus};

/// A decoder for HTTP requests that yields one event per parse milestone.
///
/// After [`ParseEvent::HeadersReady`] and [`ParseEvent::PartReady`] the decoder yields nothing
/// until the parser is released through [`RequestDecoder::parser_mut`].
pub struct RequestDecoder<R: RouteResolver> {
    parser: RequestParser<R>,
}

impl<R: RouteResolver> RequestDecoder<R> {
    pub fn new(parser: RequestParser<R>) -> Self {
        Self { parser }
    }

    pub fn with_resolver(resolver: R) -> Self {
        Self::new(RequestParser::with_resolver(resolver))
    }

    pub fn parser(&self) -> &RequestParser<R> {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut RequestParser<R> {
        &mut self.parser
    }
}

impl<R: RouteResolver> Decoder for RequestDecoder<R> {
    type Item = ParseEvent<R::Target>;
    type Error = HttpError;

    /// Feeds the buffered bytes to the parser and advances `src` past what it consumed.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(_))`: a milestone was reached or a request is complete
    /// - `Ok(None)`: more data is needed, or the parser is holding at a milestone
    /// - `Err(_)`: the request is malformed; the parser must be reset before reuse
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let progress = self.parser.feed(src)?;
        src.advance(progress.consumed);

        let event = match progress.status {
            ParseStatus::NeedMore | ParseStatus::Paused => None,
            ParseStatus::Advanced(Milestone::HeadersReady) => Some(ParseEvent::HeadersReady),
            ParseStatus::Advanced(Milestone::PartReady(part)) => Some(ParseEvent::PartReady(part)),
            ParseStatus::RequestReady => self.parser.take_request().map(ParseEvent::RequestReady),
        };
        Ok(event)
    }

    /// The peer closed its side: a request that is not complete yet is aborted, which also
    /// removes its temp files.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }

        if self.parser.is_idle() && src.iter().all(|b| matches!(b, b'\r' | b'\n')) {
            return Ok(None);
        }

        debug!(buffered = src.len(), state = ?self.parser.state(), "connection closed mid request");
        self.parser.abort();
        src.clear();
        Err(ParseError::Incomplete.into())
    }
}
