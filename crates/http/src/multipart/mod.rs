//! Streaming `multipart/form-data` support.
//!
//! Form fields are buffered in memory, file parts are streamed to a [`TempStorage`] while
//! only a bounded content buffer is held in memory. Nested `multipart/mixed`,
//! `multipart/alternative` and `multipart/digest` sections are tracked in an arena
//! ([`MultipartTree`]).
//!
//! Every classified form or file part is reported as a [`PartInfo`] before its content is
//! read, so part policies can refuse it or cap its size while it streams.

mod boundary;
mod form;
mod node;
mod parser;
mod sink;

pub use boundary::{Boundary, BoundaryLine};
pub use form::{FileField, FormField, MultipartForm, PartInfo, PartKind};
pub use node::{MultipartNode, MultipartTree, NodeId, NodeKind, SubcontentType};
pub use parser::{MultipartParser, MultipartState, MultipartStatus};
pub use sink::{PartSink, StoredFile, TempDirStorage, TempStorage};
