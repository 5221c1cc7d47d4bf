//! Parser limits.

use serde::Deserialize;

/// Limits applied by [`RequestParser`](crate::codec::RequestParser) and the multipart
/// sub-parser.
///
/// Every field has a default, so a partial JSON document only overrides what it names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum size of the request line plus the header section.
    pub max_header_bytes: usize,
    pub max_headers: usize,
    /// Bodies announcing a larger `Content-Length` are answered with 413.
    pub max_body_size: u64,
    /// File bytes are buffered up to this size before being written to storage. Lines
    /// longer than this are flushed without waiting for their line terminator.
    pub content_buffer_size: usize,
    pub max_part_header_bytes: usize,
    pub max_form_value_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 8 * 1024,
            max_headers: 64,
            max_body_size: 64 * 1024 * 1024,
            content_buffer_size: 10 * 1024,
            max_part_header_bytes: 8 * 1024,
            max_form_value_bytes: 1024 * 1024,
        }
    }
}

impl ParserConfig {
    pub fn max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.max_header_bytes = max_header_bytes;
        self
    }

    pub fn max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    pub fn max_body_size(mut self, max_body_size: u64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn content_buffer_size(mut self, content_buffer_size: usize) -> Self {
        self.content_buffer_size = content_buffer_size;
        self
    }

    pub fn max_part_header_bytes(mut self, max_part_header_bytes: usize) -> Self {
        self.max_part_header_bytes = max_part_header_bytes;
        self
    }

    pub fn max_form_value_bytes(mut self, max_form_value_bytes: usize) -> Self {
        self.max_form_value_bytes = max_form_value_bytes;
        self
    }
}
