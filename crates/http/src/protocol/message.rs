use crate::multipart::PartInfo;
use crate::protocol::ParsedRequest;

/// The state of the byte parser. Exactly one is active per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for the request line.
    ReqLine,
    /// The request line arrived, the header section is still incomplete.
    Header,
    /// Raw body of `Content-Length` bytes.
    Body,
    FormUrlencoded,
    FormMultipart,
    FormText,
    /// The whole message has been read.
    End,
    /// A parse error was reported; the parser must be reset.
    Error,
}

impl ParserState {
    #[inline]
    pub fn is_body(&self) -> bool {
        matches!(self, ParserState::Body | ParserState::FormUrlencoded | ParserState::FormMultipart | ParserState::FormText)
    }
}

/// A point in the request where the parser stops and waits for the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Milestone {
    /// The header section is complete and the route is resolved. Released with
    /// [`RequestParser::release`](crate::codec::RequestParser::release).
    HeadersReady,
    /// A multipart part was classified. Released with
    /// [`RequestParser::accept_part`](crate::codec::RequestParser::accept_part).
    PartReady(PartInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseStatus {
    /// Every complete line was consumed, more bytes are needed.
    NeedMore,
    Advanced(Milestone),
    /// The request is complete, take it with
    /// [`RequestParser::take_request`](crate::codec::RequestParser::take_request).
    RequestReady,
    /// The parser is holding at a milestone; nothing was consumed.
    Paused,
}

/// The outcome of one `feed` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub consumed: usize,
    pub status: ParseStatus,
}

impl Progress {
    #[inline]
    pub(crate) fn new(consumed: usize, status: ParseStatus) -> Self {
        Self { consumed, status }
    }
}

/// Items produced by [`RequestDecoder`](crate::codec::RequestDecoder).
#[derive(Debug)]
pub enum ParseEvent<T> {
    HeadersReady,
    PartReady(PartInfo),
    RequestReady(ParsedRequest<T>),
}

impl<T> ParseEvent<T> {
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(self, ParseEvent::RequestReady(_))
    }
}
