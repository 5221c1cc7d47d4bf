//! The multipart/form-data sub-parser.
//!
//! The parser is fed slices of the request body and works line by line. Part headers are
//! consumed as one block once the blank line ending them arrived. A partial content line is
//! consumed only when it is known to be content: either it has reached the content buffer
//! size and can no longer grow into a boundary line, or an earlier piece of the same line
//! was already written. A trailing `\r` is always left unconsumed so a CRLF split across two
//! reads is still recognized.
//!
//! Content lines are written without their CRLF. The CRLF is written in front of the next
//! content line instead (`append_crlf`), because the CRLF that precedes a boundary line
//! belongs to the boundary, not to the part.

use std::mem;
use std::sync::Arc;

use bytes::BytesMut;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use mime::Mime;
use tracing::{debug, trace};

use crate::config::ParserConfig;
use crate::multipart::{
    Boundary, BoundaryLine, FileField, FormField, MultipartForm, MultipartTree, NodeId, NodeKind, PartInfo, PartKind,
    PartSink, SubcontentType, TempStorage,
};
use crate::protocol::{HttpError, MultipartError, ParseError, PolicyDenied};
use crate::utils::find_crlf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartState {
    /// Expecting the start boundary of the current section.
    Init,
    Headers,
    /// A part was classified and waits for its policy verdict.
    Held,
    Content,
    /// A nested section ended; lines are ignored up to the enclosing section's next boundary.
    Epilogue,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultipartStatus {
    NeedMore,
    PartReady(PartInfo),
    Done,
}

#[derive(Debug)]
pub struct MultipartParser {
    tree: MultipartTree,
    state: MultipartState,
    scope: NodeId,
    current: Option<NodeId>,
    storage: Arc<dyn TempStorage>,

    part_headers: HeaderMap,

    pending: BytesMut,
    append_crlf: bool,
    mid_line: bool,
    part_limit: Option<u64>,

    form: MultipartForm,

    content_buffer_size: usize,
    max_part_header_bytes: usize,
    max_part_headers: usize,
    max_form_value_bytes: usize,
}

impl MultipartParser {
    /// Creates a parser for a body whose `Content-Type` is `content_type`.
    pub fn new(content_type: &Mime, storage: Arc<dyn TempStorage>, config: &ParserConfig) -> Result<Self, MultipartError> {
        let token = content_type.get_param(mime::BOUNDARY).ok_or(MultipartError::MissingBoundary)?;
        let tree = MultipartTree::new(Boundary::new(token.as_str())?);
        let scope = tree.root();

        Ok(Self {
            tree,
            state: MultipartState::Init,
            scope,
            current: None,
            storage,
            part_headers: HeaderMap::new(),
            pending: BytesMut::new(),
            append_crlf: false,
            mid_line: false,
            part_limit: None,
            form: MultipartForm::default(),
            content_buffer_size: config.content_buffer_size.max(1),
            max_part_header_bytes: config.max_part_header_bytes,
            max_part_headers: config.max_headers,
            max_form_value_bytes: config.max_form_value_bytes,
        })
    }

    pub fn state(&self) -> MultipartState {
        self.state
    }

    pub fn tree(&self) -> &MultipartTree {
        &self.tree
    }

    pub fn is_done(&self) -> bool {
        self.state == MultipartState::Done
    }

    /// Consumes complete lines of `data`. `is_last` tells that `data` ends exactly at the end
    /// of the body, so an unterminated remainder is the final line.
    ///
    /// Returns the number of bytes consumed. Any error closes and deletes every open temp
    /// file before it is returned.
    pub fn feed(&mut self, data: &[u8], is_last: bool) -> Result<(usize, MultipartStatus), HttpError> {
        let result = self.do_feed(data, is_last);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn do_feed(&mut self, data: &[u8], is_last: bool) -> Result<(usize, MultipartStatus), HttpError> {
        let mut pos = 0;

        loop {
            match self.state {
                MultipartState::Done => return Ok((data.len(), MultipartStatus::Done)),
                MultipartState::Held => return Ok((pos, MultipartStatus::NeedMore)),
                MultipartState::Failed => return Err(ParseError::NeedsReset.into()),
                _ => {}
            }

            let rest = &data[pos..];
            if rest.is_empty() {
                return Ok((pos, MultipartStatus::NeedMore));
            }

            if self.state == MultipartState::Headers {
                match self.parse_part_headers(rest)? {
                    Some(len) => {
                        pos += len;
                        if let Some(status) = self.classify_part()? {
                            return Ok((pos, status));
                        }
                        continue;
                    }
                    None if is_last => return Err(MultipartError::Truncated.into()),
                    None => return Ok((pos, MultipartStatus::NeedMore)),
                }
            }

            match find_crlf(rest) {
                Some(index) => {
                    pos += index + 2;
                    if let Some(status) = self.on_line(&rest[..index])? {
                        return Ok((pos, status));
                    }
                }
                None if is_last => {
                    pos = data.len();
                    if let Some(status) = self.on_line(rest)? {
                        return Ok((pos, status));
                    }
                }
                None => {
                    pos += self.on_partial_line(rest)?;
                    return Ok((pos, MultipartStatus::NeedMore));
                }
            }
        }
    }

    /// Applies the policy verdict of a held part: `limit` caps the part size.
    pub fn accept(&mut self, limit: Option<u64>) {
        if self.state == MultipartState::Held {
            self.part_limit = limit;
            self.state = MultipartState::Content;
        }
    }

    /// Closes and deletes every temp file, including completed ones, and fails the parser.
    pub fn abort(&mut self) {
        if self.state != MultipartState::Failed {
            debug!(open_files = self.tree.open_sinks(), "aborting multipart body");
        }
        self.tree.discard_open_sinks();
        self.pending.clear();
        self.form = MultipartForm::default();
        self.current = None;
        self.state = MultipartState::Failed;
    }

    /// Takes the received parts once the body is complete.
    pub fn take_form(&mut self) -> MultipartForm {
        mem::take(&mut self.form)
    }

    fn scope_boundary(&self) -> Result<&Boundary, MultipartError> {
        self.tree.boundary(self.scope).ok_or(MultipartError::MissingBoundary)
    }

    fn on_line(&mut self, line: &[u8]) -> Result<Option<MultipartStatus>, HttpError> {
        match self.state {
            MultipartState::Init => {
                let boundary = self.scope_boundary()?;
                match boundary.classify(line) {
                    Some(BoundaryLine::Start) => {
                        self.open_part();
                        Ok(None)
                    }
                    _ => Err(MultipartError::invalid_boundary(String::from_utf8_lossy(boundary.start_line()), line).into()),
                }
            }

            MultipartState::Content | MultipartState::Epilogue => {
                if !self.mid_line
                    && let Some(kind) = self.scope_boundary()?.classify(line)
                {
                    self.on_boundary(kind)?;
                    return Ok((self.state == MultipartState::Done).then_some(MultipartStatus::Done));
                }

                if self.state == MultipartState::Content {
                    self.write_content(line)?;
                    self.append_crlf = true;
                }
                self.mid_line = false;
                Ok(None)
            }

            MultipartState::Headers | MultipartState::Held | MultipartState::Done | MultipartState::Failed => Ok(None),
        }
    }

    fn on_partial_line(&mut self, rest: &[u8]) -> Result<usize, HttpError> {
        match self.state {
            MultipartState::Init => {
                let boundary = self.scope_boundary()?;
                crate::ensure!(
                    boundary.could_match(rest),
                    MultipartError::invalid_boundary(String::from_utf8_lossy(boundary.start_line()), rest)
                );
                Ok(0)
            }

            MultipartState::Content | MultipartState::Epilogue => {
                if !self.mid_line && (rest.len() < self.content_buffer_size || self.scope_boundary()?.could_match(rest)) {
                    return Ok(0);
                }

                let len = if rest.ends_with(b"\r") { rest.len() - 1 } else { rest.len() };
                if len == 0 {
                    return Ok(0);
                }

                if self.state == MultipartState::Content {
                    self.write_content(&rest[..len])?;
                }
                self.append_crlf = false;
                self.mid_line = true;
                Ok(len)
            }

            MultipartState::Headers | MultipartState::Held | MultipartState::Done | MultipartState::Failed => Ok(0),
        }
    }

    /// Reads the header block of the current part, up to and including the blank line.
    ///
    /// Returns the size of the block, or `None` while the blank line has not arrived.
    fn parse_part_headers(&mut self, data: &[u8]) -> Result<Option<usize>, HttpError> {
        let max_size = self.max_part_header_bytes;
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_part_headers];

        let status = httparse::parse_headers(data, &mut headers).map_err(|e| match e {
            httparse::Error::TooManyHeaders => {
                MultipartError::invalid_part_header(format!("more than {} part headers", self.max_part_headers))
            }
            e => MultipartError::invalid_part_header(e),
        })?;

        let (len, parsed) = match status {
            httparse::Status::Complete(complete) => complete,
            httparse::Status::Partial => {
                crate::ensure!(data.len() <= max_size, MultipartError::TooLargeHeader { max_size });
                return Ok(None);
            }
        };
        crate::ensure!(len <= max_size, MultipartError::TooLargeHeader { max_size });

        for header in parsed {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(MultipartError::invalid_part_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(MultipartError::invalid_part_header)?;
            self.part_headers.append(name, value);
        }
        Ok(Some(len))
    }

    fn open_part(&mut self) {
        let id = self.tree.append_child(self.scope);
        trace!(node = ?id, "multipart part started");
        self.current = Some(id);
        self.part_headers = HeaderMap::new();
        self.state = MultipartState::Headers;
    }

    fn classify_part(&mut self) -> Result<Option<MultipartStatus>, HttpError> {
        let id = self.current.ok_or(MultipartError::MissingDisposition)?;
        let headers = mem::take(&mut self.part_headers);

        let disposition = headers.get(CONTENT_DISPOSITION).map(|value| Disposition::parse(value.as_bytes())).transpose()?;
        let content_type = headers
            .get(CONTENT_TYPE)
            .map(|value| {
                value
                    .to_str()
                    .ok()
                    .and_then(|s| s.parse::<Mime>().ok())
                    .ok_or_else(|| MultipartError::invalid_part_header("unparseable content-type"))
            })
            .transpose()?;

        if let Some(multipart) = content_type.as_ref().filter(|ct| ct.type_() == mime::MULTIPART) {
            let boundary = match multipart.get_param(mime::BOUNDARY) {
                Some(token) => Boundary::new(token.as_str())?,
                None => self.scope_boundary()?.clone(),
            };
            let subtype = SubcontentType::from_mime(multipart);
            debug!(?subtype, boundary = boundary.token(), "nested multipart section");

            let name = disposition.and_then(|d| d.name);
            self.tree.get_mut(id).set_kind(NodeKind::Subcontent { subtype, boundary, name });
            self.scope = id;
            self.current = None;
            self.state = MultipartState::Init;
            return Ok(None);
        }

        let disposition = disposition.ok_or(MultipartError::MissingDisposition)?;
        let (kind, name) = match disposition.filename {
            Some(_) => {
                let name = disposition.name.or_else(|| self.tree.inherited_name(id).map(str::to_string));
                (PartKind::File, name.ok_or(MultipartError::MissingDisposition)?)
            }
            None => (PartKind::Form, disposition.name.ok_or(MultipartError::MissingDisposition)?),
        };

        let info = PartInfo { kind, name, filename: disposition.filename, content_type, headers };
        let node_kind = match kind {
            PartKind::Form => NodeKind::Form { info: info.clone(), value: Vec::new() },
            PartKind::File => {
                let sink = self.storage.create(&info).map_err(MultipartError::from)?;
                NodeKind::File { info: info.clone(), sink: Some(sink), written: 0 }
            }
        };
        self.tree.get_mut(id).set_kind(node_kind);

        debug!(name = info.name(), filename = ?info.filename(), "multipart part classified");
        self.append_crlf = false;
        self.mid_line = false;
        self.state = MultipartState::Held;
        Ok(Some(MultipartStatus::PartReady(info)))
    }

    fn write_content(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        let Some(id) = self.current else {
            return Ok(());
        };

        let crlf: &[u8] = if self.append_crlf { b"\r\n" } else { b"" };
        let limit = self.part_limit;

        match self.tree.get_mut(id).kind_mut() {
            NodeKind::Form { value, .. } => {
                let size = value.len() + crlf.len() + bytes.len();
                let max_size = limit.map_or(self.max_form_value_bytes as u64, |limit| limit.min(self.max_form_value_bytes as u64));
                crate::ensure!(
                    size as u64 <= max_size,
                    PolicyDenied::payload_too_large(format!("form value exceed the limit {max_size}"))
                );
                value.extend_from_slice(crlf);
                value.extend_from_slice(bytes);
            }
            NodeKind::File { sink, written, .. } => {
                *written += (crlf.len() + bytes.len()) as u64;
                if let Some(limit) = limit {
                    crate::ensure!(*written <= limit, PolicyDenied::payload_too_large(format!("file exceed the limit {limit}")));
                }

                self.pending.extend_from_slice(crlf);
                self.pending.extend_from_slice(bytes);
                if self.pending.len() >= self.content_buffer_size
                    && let Some(sink) = sink
                {
                    flush_pending(sink.as_mut(), &mut self.pending)?;
                }
            }
            NodeKind::Unclassified | NodeKind::Subcontent { .. } => {}
        }
        Ok(())
    }

    fn on_boundary(&mut self, line: BoundaryLine) -> Result<(), HttpError> {
        self.finish_part()?;

        match line {
            BoundaryLine::Start => self.open_part(),
            BoundaryLine::End => match self.tree.get(self.scope).parent() {
                Some(parent) => {
                    trace!(node = ?self.scope, "nested multipart section finished");
                    self.scope = parent;
                    self.state = MultipartState::Epilogue;
                }
                None => {
                    debug!(parts = self.tree.len() - 1, "multipart body finished");
                    self.state = MultipartState::Done;
                }
            },
        }
        Ok(())
    }

    fn finish_part(&mut self) -> Result<(), HttpError> {
        self.append_crlf = false;
        self.mid_line = false;
        self.part_limit = None;

        let Some(id) = self.current.take() else {
            return Ok(());
        };

        match self.tree.get_mut(id).kind_mut() {
            NodeKind::Form { info, value } => {
                let value = String::from_utf8(mem::take(value))
                    .map_err(|_e| MultipartError::InvalidFormValue { name: info.name.clone() })?;
                self.form.push_field(FormField { name: info.name.clone(), value });
            }
            NodeKind::File { info, sink, written } => {
                if let Some(mut sink) = sink.take() {
                    if let Err(e) = flush_pending(sink.as_mut(), &mut self.pending) {
                        sink.discard().map_err(MultipartError::from)?;
                        return Err(e);
                    }
                    let file = sink.finish().map_err(MultipartError::from)?;
                    self.form.push_file(FileField {
                        name: info.name.clone(),
                        filename: info.filename.clone().unwrap_or_default(),
                        content_type: info.content_type.clone(),
                        size: *written,
                        file,
                    });
                }
            }
            NodeKind::Unclassified | NodeKind::Subcontent { .. } => {}
        }
        Ok(())
    }
}

impl Drop for MultipartParser {
    fn drop(&mut self) {
        self.tree.discard_open_sinks();
    }
}

fn flush_pending(sink: &mut dyn PartSink, pending: &mut BytesMut) -> Result<(), HttpError> {
    if !pending.is_empty() {
        sink.write_all(pending).map_err(MultipartError::from)?;
        pending.clear();
    }
    Ok(())
}

/// The parameters of a `Content-Disposition` header that matter to form parsing.
#[derive(Debug, Default, PartialEq, Eq)]
struct Disposition {
    name: Option<String>,
    filename: Option<String>,
}

impl Disposition {
    fn parse(value: &[u8]) -> Result<Self, MultipartError> {
        let value = std::str::from_utf8(value).map_err(|_e| MultipartError::invalid_part_header("content-disposition is not utf-8"))?;

        let mut params = split_params(value).into_iter();
        let disposition_type = params.next().unwrap_or_default();
        if disposition_type.is_empty() {
            return Err(MultipartError::invalid_part_header("empty content-disposition"));
        }

        let mut disposition = Disposition::default();
        for param in params {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim());
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => disposition.name = Some(value),
                "filename" => disposition.filename = Some(value),
                _ => {}
            }
        }
        Ok(disposition)
    }
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => {
            let mut unquoted = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => unquoted.extend(chars.next()),
                    c => unquoted.push(c),
                }
            }
            unquoted
        }
        None => value.to_string(),
    }
}
