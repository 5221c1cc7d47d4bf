use crate::protocol::MultipartError;

/// RFC 2046 limits boundary tokens to 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// What a boundary line marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryLine {
    /// `--boundary`: the next part starts.
    Start,
    /// `--boundary--`: the enclosing multipart section ends.
    End,
}

/// The start and end delimiter lines derived from a boundary token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    token: String,
    start: Vec<u8>,
    end: Vec<u8>,
}

impl Boundary {
    pub fn new(token: &str) -> Result<Self, MultipartError> {
        if token.is_empty() {
            return Err(MultipartError::MissingBoundary);
        }
        if token.len() > MAX_BOUNDARY_LEN || token.ends_with(' ') {
            return Err(MultipartError::invalid_boundary("a token of 1 to 70 characters", token));
        }

        let start = [b"--", token.as_bytes()].concat();
        let end = [start.as_slice(), b"--"].concat();
        Ok(Self { token: token.to_string(), start, end })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn start_line(&self) -> &[u8] {
        &self.start
    }

    /// Matches a complete line (without its CRLF) against this boundary. Trailing linear
    /// whitespace is transport padding and is ignored.
    pub fn classify(&self, line: &[u8]) -> Option<BoundaryLine> {
        let trimmed_len = line.iter().rposition(|b| !matches!(b, b' ' | b'\t')).map_or(0, |i| i + 1);
        let line = &line[..trimmed_len];

        if line == self.start.as_slice() {
            Some(BoundaryLine::Start)
        } else if line == self.end.as_slice() {
            Some(BoundaryLine::End)
        } else {
            None
        }
    }

    /// Tells whether `partial`, the beginning of a line whose CRLF has not arrived yet, may
    /// still turn out to be a boundary line.
    pub fn could_match(&self, partial: &[u8]) -> bool {
        let partial = partial.strip_suffix(b"\r").unwrap_or(partial);
        let is_padding = |rest: &[u8]| rest.iter().all(|b| matches!(b, b' ' | b'\t'));

        self.end.starts_with(partial)
            || partial.strip_prefix(self.end.as_slice()).is_some_and(is_padding)
            || partial.strip_prefix(self.start.as_slice()).is_some_and(is_padding)
    }
}
