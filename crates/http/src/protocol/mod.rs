//! Core protocol types of the request-ingestion pipeline.
//!
//! - **Message Handling** ([`message`]): parser states and the events it reports
//!   - [`ParserState`]: the active state of the byte parser
//!   - [`ParseStatus`] / [`Milestone`] / [`Progress`]: the result of feeding bytes
//!   - [`ParseEvent`]: the items yielded by the codec
//!
//! - **Request Processing** ([`request`]): the request as it is assembled
//!   - [`RequestHead`]: request line, headers and decoded query
//!   - [`PendingRequest`]: a request whose body is still streaming
//!   - [`ParsedRequest`] / [`RequestBody`]: the complete request
//!
//! - **Dispatch** ([`verb`]): [`Verb`], including the synthetic `ALL` verb
//!
//! - **Error Handling** ([`error`]): [`HttpError`] and the error kinds it wraps. Every error
//!   maps to a response status.

mod message;
pub use message::Milestone;
pub use message::ParseEvent;
pub use message::ParseStatus;
pub use message::ParserState;
pub use message::Progress;

mod request;
pub use request::ParsedRequest;
pub use request::PendingRequest;
pub use request::RequestBody;
pub use request::RequestHead;

mod verb;
pub use verb::Verb;

mod error;
pub use error::GateMisuse;
pub use error::HttpError;
pub use error::MultipartError;
pub use error::ParseError;
pub use error::PolicyDenied;
