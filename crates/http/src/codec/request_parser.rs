//! The resumable request parser.
//!
//! [`RequestParser::feed`] may be called with any slice of the input stream, down to a
//! single byte. The request line and header section are consumed only once the blank line
//! ending them has arrived; the body is consumed as it comes. `feed` reports how many bytes it
//! consumed and the caller keeps the rest, feeding it again together with the next read.
//!
//! The parser stops at two milestones and holds until the driver releases it:
//!
//! - after the header section, once the route is resolved ([`RequestParser::release`])
//! - after each multipart part is classified ([`RequestParser::accept_part`])
//!
//! Any error moves the parser to [`ParserState::Error`], closes and deletes every temp file
//! opened for the request and requires [`RequestParser::reset`] before further use.

use std::mem;
use std::sync::Arc;

use bytes::BytesMut;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Uri, Version};
use mime::Mime;
use tracing::{debug, trace};

use crate::config::ParserConfig;
use crate::ensure;
use crate::handler::RouteResolver;
use crate::multipart::{MultipartParser, MultipartStatus, TempDirStorage, TempStorage};
use crate::protocol::{
    HttpError, Milestone, MultipartError, ParseError, ParseStatus, ParsedRequest, ParserState, PendingRequest, Progress,
    RequestBody, RequestHead, Verb,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    None,
    Headers,
    Part,
    Request,
}

pub struct RequestParser<R: RouteResolver> {
    resolver: R,
    config: ParserConfig,
    storage: Arc<dyn TempStorage>,

    state: ParserState,
    hold: Hold,
    header_bytes: usize,

    pending: Option<PendingRequest<R::Target>>,
    body: BytesMut,
    multipart: Option<MultipartParser>,
    decoded: RequestBody,
    ready: Option<ParsedRequest<R::Target>>,
}

impl<R: RouteResolver> RequestParser<R> {
    pub fn new(resolver: R, config: ParserConfig, storage: Arc<dyn TempStorage>) -> Self {
        Self {
            resolver,
            config,
            storage,
            state: ParserState::ReqLine,
            hold: Hold::None,
            header_bytes: 0,
            pending: None,
            body: BytesMut::new(),
            multipart: None,
            decoded: RequestBody::Empty,
            ready: None,
        }
    }

    /// Creates a parser with default limits that stores file parts in the system temp dir.
    pub fn with_resolver(resolver: R) -> Self {
        Self::new(resolver, ParserConfig::default(), Arc::new(TempDirStorage::default()))
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingRequest<R::Target>> {
        self.pending.as_ref()
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// True when no byte of a request has been consumed yet.
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::ReqLine && self.header_bytes == 0 && self.hold == Hold::None
    }

    /// Consumes as much of `buf` as possible.
    ///
    /// Returns [`ParseStatus::Paused`] without consuming anything while a milestone or a
    /// finished request has not been handled.
    pub fn feed(&mut self, buf: &[u8]) -> Result<Progress, HttpError> {
        if self.state == ParserState::Error {
            return Err(ParseError::NeedsReset.into());
        }
        if self.hold != Hold::None {
            return Ok(Progress::new(0, ParseStatus::Paused));
        }

        let result = self.advance(buf);
        if let Err(e) = &result {
            debug!(cause = %e, "request parsing failed");
            self.fail();
        }
        result
    }

    /// Resumes after [`Milestone::HeadersReady`].
    pub fn release(&mut self) {
        if self.hold == Hold::Headers {
            self.hold = Hold::None;
        }
    }

    /// Resumes after [`Milestone::PartReady`], capping the part at `max_size` bytes.
    pub fn accept_part(&mut self, max_size: Option<u64>) {
        if self.hold == Hold::Part {
            if let Some(multipart) = self.multipart.as_mut() {
                multipart.accept(max_size);
            }
            self.hold = Hold::None;
        }
    }

    /// Refuses the current request: temp files are removed and the parser moves to
    /// [`ParserState::Error`].
    pub fn reject(&mut self, reason: &HttpError) {
        debug!(cause = %reason, "request rejected");
        self.fail();
    }

    /// Takes the request reported by [`ParseStatus::RequestReady`].
    pub fn take_request(&mut self) -> Option<ParsedRequest<R::Target>> {
        let request = self.ready.take();
        if self.hold == Hold::Request {
            self.hold = Hold::None;
        }
        request
    }

    /// Releases every resource of the current request and moves to [`ParserState::Error`].
    pub fn abort(&mut self) {
        self.fail();
    }

    /// Forgets the current request and waits for a new request line.
    pub fn reset(&mut self) {
        self.fail();
        self.pending = None;
        self.header_bytes = 0;
        self.state = ParserState::ReqLine;
    }

    fn fail(&mut self) {
        if let Some(mut multipart) = self.multipart.take() {
            multipart.abort();
        }
        self.body.clear();
        self.decoded = RequestBody::Empty;
        self.ready = None;
        self.hold = Hold::None;
        self.state = ParserState::Error;
    }

    fn advance(&mut self, buf: &[u8]) -> Result<Progress, HttpError> {
        let mut pos = 0;

        loop {
            match self.state {
                ParserState::ReqLine | ParserState::Header => {
                    let Some(len) = self.parse_head(&buf[pos..])? else {
                        return Ok(Progress::new(pos, ParseStatus::NeedMore));
                    };
                    pos += len;

                    self.on_headers_complete()?;
                    self.hold = Hold::Headers;
                    return Ok(Progress::new(pos, ParseStatus::Advanced(Milestone::HeadersReady)));
                }

                ParserState::Body | ParserState::FormUrlencoded | ParserState::FormText => {
                    let pending = self.pending.as_mut().ok_or(ParseError::InvalidState("body without a request head"))?;
                    let len = pending.body_remaining().min((buf.len() - pos) as u64) as usize;

                    self.body.extend_from_slice(&buf[pos..pos + len]);
                    pos += len;
                    pending.body_received += len as u64;

                    if pending.body_remaining() > 0 {
                        return Ok(Progress::new(pos, ParseStatus::NeedMore));
                    }
                    self.decode_body()?;
                    self.state = ParserState::End;
                }

                ParserState::FormMultipart => {
                    let pending = self.pending.as_mut().ok_or(ParseError::InvalidState("body without a request head"))?;
                    let multipart =
                        self.multipart.as_mut().ok_or(ParseError::InvalidState("multipart body without a sub-parser"))?;

                    let remaining = pending.body_remaining();
                    let len = remaining.min((buf.len() - pos) as u64) as usize;
                    let (consumed, status) = multipart.feed(&buf[pos..pos + len], len as u64 == remaining)?;
                    pos += consumed;
                    pending.body_received += consumed as u64;

                    if let MultipartStatus::PartReady(part) = status {
                        self.hold = Hold::Part;
                        return Ok(Progress::new(pos, ParseStatus::Advanced(Milestone::PartReady(part))));
                    }

                    if pending.body_remaining() > 0 {
                        return Ok(Progress::new(pos, ParseStatus::NeedMore));
                    }
                    ensure!(multipart.is_done(), MultipartError::Truncated);

                    self.decoded = RequestBody::Multipart(multipart.take_form());
                    self.multipart = None;
                    self.state = ParserState::End;
                }

                ParserState::End => {
                    let pending = self.pending.take().ok_or(ParseError::InvalidState("request end without a head"))?;
                    let target = pending.target.ok_or(ParseError::InvalidState("request end without a route"))?;
                    let request = ParsedRequest::new(pending.head, mem::take(&mut self.decoded), target);
                    trace!(method = request.head().method(), uri = %request.head().uri(), "request complete");

                    self.ready = Some(request);
                    self.hold = Hold::Request;
                    self.header_bytes = 0;
                    self.state = ParserState::ReqLine;
                    return Ok(Progress::new(pos, ParseStatus::RequestReady));
                }

                ParserState::Error => return Err(ParseError::NeedsReset.into()),
            }
        }
    }

    /// Parses the request line and header section once the blank line ending them arrived.
    ///
    /// Returns the size of the head, or `None` while it is incomplete. Nothing is kept
    /// between calls: the caller feeds the same bytes again together with the next read.
    fn parse_head(&mut self, buf: &[u8]) -> Result<Option<usize>, HttpError> {
        let max_size = self.config.max_header_bytes;
        let max_num = self.config.max_headers;

        let mut headers = vec![httparse::EMPTY_HEADER; max_num];
        let mut req = httparse::Request::new(&mut headers);

        let status = match req.parse(buf) {
            Ok(status) => status,
            Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(max_num).into()),
            Err(httparse::Error::Version) => return Err(ParseError::InvalidVersion(first_line(buf)).into()),
            Err(httparse::Error::Token) if req.method.is_none() => {
                return Err(ParseError::InvalidMethod(first_line(buf)).into());
            }
            Err(e @ (httparse::Error::Token | httparse::Error::NewLine | httparse::Error::Status)) => {
                return Err(ParseError::invalid_request_line(format!("{e}: {}", first_line(buf))).into());
            }
            Err(e) => return Err(ParseError::invalid_header(e).into()),
        };

        let len = match status {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => {
                ensure!(buf.len() <= max_size, ParseError::too_large_header(buf.len(), max_size));
                if req.version.is_some() {
                    self.state = ParserState::Header;
                }
                return Ok(None);
            }
        };
        ensure!(len <= max_size, ParseError::too_large_header(len, max_size));

        let (Some(method), Some(target), Some(version)) = (req.method, req.path, req.version) else {
            return Err(ParseError::InvalidState("complete request head without a request line").into());
        };
        let version = match version {
            0 => Version::HTTP_10,
            1 => Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(format!("HTTP/1.{v}")).into()),
        };

        let uri = target.parse::<Uri>().map_err(|e| ParseError::InvalidUri(e.to_string()))?;
        let query = match uri.query() {
            Some(query) => serde_urlencoded::from_str::<Vec<(String, String)>>(query)
                .map_err(|e| ParseError::InvalidUri(format!("bad query string: {e}")))?,
            None => Vec::new(),
        };

        let verb = Verb::parse(method);
        let mut head = RequestHead::new(verb, method, uri, version, query);
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
            head.headers.append(name, value);
        }
        trace!(%verb, method, target, headers = head.headers.len(), "request head parsed");

        self.pending = Some(PendingRequest::new(head));
        self.header_bytes = len;
        Ok(Some(len))
    }

    fn on_headers_complete(&mut self) -> Result<(), HttpError> {
        let pending = self.pending.as_mut().ok_or(ParseError::InvalidState("header section without a request line"))?;
        let head = &pending.head;
        let headers = &head.headers;

        if head.version == Version::HTTP_11 {
            ensure!(headers.contains_key(HOST), ParseError::MissingHost);
        }
        if let Some(encoding) = headers.get(TRANSFER_ENCODING) {
            let encoding = String::from_utf8_lossy(encoding.as_bytes()).into_owned();
            return Err(ParseError::UnsupportedTransferEncoding(encoding).into());
        }

        let content_length = parse_content_length(headers)?;
        let max_size = self.config.max_body_size;
        ensure!(content_length <= max_size, ParseError::TooLargeBody { size: content_length, max_size });

        let path = head.uri.path();
        let target = self
            .resolver
            .resolve(head.verb, path)
            .or_else(|| if head.verb == Verb::Head { self.resolver.resolve(Verb::Get, path) } else { None })
            .ok_or_else(|| HttpError::route_not_found(&head.method, path))?;

        let state = if content_length == 0 {
            ParserState::End
        } else {
            match parse_content_type(headers)? {
                Some(mime) if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA => {
                    self.multipart = Some(MultipartParser::new(&mime, Arc::clone(&self.storage), &self.config)?);
                    ParserState::FormMultipart
                }
                Some(mime) if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED => {
                    ParserState::FormUrlencoded
                }
                Some(mime) if mime.type_() == mime::TEXT => ParserState::FormText,
                _ => ParserState::Body,
            }
        };

        debug!(verb = %head.verb, path, content_length, ?state, "request headers complete");
        pending.target = Some(target);
        pending.content_length = content_length;
        self.state = state;
        Ok(())
    }

    fn decode_body(&mut self) -> Result<(), HttpError> {
        let bytes = self.body.split().freeze();
        self.decoded = match self.state {
            ParserState::FormUrlencoded => RequestBody::Form(
                serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes).map_err(ParseError::invalid_body)?,
            ),
            ParserState::FormText => RequestBody::Text(
                String::from_utf8(bytes.to_vec()).map_err(|_e| ParseError::invalid_body("text body is not valid utf-8"))?,
            ),
            _ => RequestBody::Bytes(bytes),
        };
        Ok(())
    }
}

/// The first non-empty line of `buf`, for error messages.
fn first_line(buf: &[u8]) -> String {
    let line = buf.split(|&b| b == b'\n').find(|line| !line.is_empty() && *line != b"\r").unwrap_or_default();
    String::from_utf8_lossy(line.strip_suffix(b"\r").unwrap_or(line)).into_owned()
}

fn parse_content_length(headers: &HeaderMap) -> Result<u64, ParseError> {
    let mut content_length = None;

    for value in headers.get_all(CONTENT_LENGTH) {
        let length = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| ParseError::invalid_content_length(String::from_utf8_lossy(value.as_bytes())))?;

        match content_length {
            Some(previous) if previous != length => {
                return Err(ParseError::invalid_content_length("conflicting content-length values"));
            }
            _ => content_length = Some(length),
        }
    }

    Ok(content_length.unwrap_or(0))
}

fn parse_content_type(headers: &HeaderMap) -> Result<Option<Mime>, ParseError> {
    headers
        .get(CONTENT_TYPE)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|s| s.parse::<Mime>().ok())
                .ok_or_else(|| ParseError::invalid_header("unparseable content-type"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use http::StatusCode;
    use indoc::indoc;

    use super::*;

    /// Resolves registered `(verb, path)` pairs to the path itself.
    struct Routes(Vec<(Verb, &'static str)>);

    impl RouteResolver for Routes {
        type Target = &'static str;

        fn resolve(&self, verb: Verb, path: &str) -> Option<Self::Target> {
            self.0.iter().find(|(v, p)| (*v == verb || *v == Verb::All) && *p == path).map(|(_, p)| *p)
        }
    }

    fn routes() -> Routes {
        Routes(vec![(Verb::Get, "/index.html"), (Verb::Post, "/form"), (Verb::Post, "/upload"), (Verb::All, "/any")])
    }

    fn crlf(text: &str) -> Vec<u8> {
        text.replace('\n', "\r\n").into_bytes()
    }

    fn parser_in(dir: &std::path::Path, config: ParserConfig) -> RequestParser<Routes> {
        RequestParser::new(routes(), config, Arc::new(TempDirStorage::new(dir)))
    }

    /// Feeds `input` split at each of `splits`, keeping unconsumed bytes between reads the way
    /// the codec does. Milestones are released immediately.
    fn drive(
        parser: &mut RequestParser<Routes>,
        input: &[u8],
        splits: &[usize],
    ) -> Result<(Vec<ParsedRequest<&'static str>>, Vec<String>), HttpError> {
        let mut requests = Vec::new();
        let mut parts = Vec::new();
        let mut buffer = Vec::new();
        let mut offset = 0;

        for end in splits.iter().copied().chain([input.len()]) {
            buffer.extend_from_slice(&input[offset..end]);
            offset = end;

            loop {
                let progress = parser.feed(&buffer)?;
                buffer.drain(..progress.consumed);
                match progress.status {
                    ParseStatus::Advanced(Milestone::HeadersReady) => parser.release(),
                    ParseStatus::Advanced(Milestone::PartReady(part)) => {
                        parts.push(part.name().to_string());
                        parser.accept_part(None);
                    }
                    ParseStatus::RequestReady => requests.extend(parser.take_request()),
                    ParseStatus::NeedMore | ParseStatus::Paused => break,
                }
            }
        }
        Ok((requests, parts))
    }

    fn summary(request: &ParsedRequest<&'static str>) -> String {
        let head = request.head();
        let mut out = format!(
            "{} {} {} {:?} target={} query={:?}\n",
            head.verb(),
            head.method(),
            head.uri(),
            head.version(),
            request.target(),
            head.query_pairs()
        );
        for (name, value) in head.headers() {
            writeln!(out, "{name}: {value:?}").unwrap();
        }
        match request.body() {
            RequestBody::Multipart(form) => {
                for field in form.fields() {
                    writeln!(out, "field {}={:?}", field.name, field.value).unwrap();
                }
                for file in form.files() {
                    writeln!(out, "file {} {} {:?}", file.name, file.filename, file.file.read().unwrap()).unwrap();
                }
            }
            body => writeln!(out, "{body:?}").unwrap(),
        }
        out
    }

    const FORM_REQUEST: &str = indoc! {r#"
        POST /form?lang=en&q=a%20b HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Type: application/x-www-form-urlencoded
        Content-Length: 28

        name=John+Doe&city=K%C3%B6ln"#};

    const MULTIPART_REQUEST: &str = indoc! {r#"
        POST /upload HTTP/1.1
        Host: localhost
        Content-Type: multipart/form-data; boundary=AaB03x
        Content-Length: 174

        --AaB03x
        Content-Disposition: form-data; name="submit-name"

        Larry
        --AaB03x
        Content-Disposition: form-data; name="file"; filename="a.txt"

        line 1
        line 2
        --AaB03x--
    "#};

    #[test]
    fn get_request_from_curl() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());
        let input = crlf(indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##});

        let (requests, _) = drive(&mut parser, &input, &[]).unwrap();
        assert_eq!(requests.len(), 1);

        let head = requests[0].head();
        assert_eq!(head.verb(), Verb::Get);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.uri().path(), "/index.html");
        assert_eq!(head.headers().len(), 3);
        assert_eq!(head.headers().get(http::header::ACCEPT).unwrap(), "*/*");
        assert!(requests[0].body().is_empty());
        assert_eq!(*requests[0].target(), "/index.html");
        assert!(parser.is_idle());
    }

    #[test]
    fn milestones_hold_the_parser() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());
        let input = crlf(FORM_REQUEST);

        let progress = parser.feed(&input).unwrap();
        assert_eq!(progress.status, ParseStatus::Advanced(Milestone::HeadersReady));
        assert_eq!(parser.pending().unwrap().target(), Some(&"/form"));
        assert_eq!(parser.pending().unwrap().content_length(), 28);
        assert_eq!(parser.state(), ParserState::FormUrlencoded);

        let rest = &input[progress.consumed..];
        assert_eq!(parser.feed(rest).unwrap(), Progress::new(0, ParseStatus::Paused));

        parser.release();
        let progress = parser.feed(rest).unwrap();
        assert_eq!(progress, Progress::new(rest.len(), ParseStatus::RequestReady));
        assert_eq!(parser.feed(b"").unwrap().status, ParseStatus::Paused);

        let request = parser.take_request().unwrap();
        match request.body() {
            RequestBody::Form(pairs) => assert_eq!(
                pairs,
                &vec![("name".to_string(), "John Doe".to_string()), ("city".to_string(), "Köln".to_string())]
            ),
            body => panic!("unexpected body {body:?}"),
        }
        assert_eq!(request.head().query("q"), Some("a b"));
        assert_eq!(request.head().query("lang"), Some("en"));
    }

    #[test]
    fn every_split_point_gives_the_same_request() {
        for input in [crlf(FORM_REQUEST), crlf(MULTIPART_REQUEST)] {
            let dir = tempfile::tempdir().unwrap();
            let mut parser = parser_in(dir.path(), ParserConfig::default());
            let (whole, _) = drive(&mut parser, &input, &[]).unwrap();
            assert_eq!(whole.len(), 1);
            let expected = summary(&whole[0]);

            for split in 1..input.len() {
                let mut parser = parser_in(dir.path(), ParserConfig::default());
                let (requests, _) = drive(&mut parser, &input, &[split]).unwrap();
                assert_eq!(requests.len(), 1, "split at {split}");
                assert_eq!(summary(&requests[0]), expected, "split at {split}");
            }

            let mut parser = parser_in(dir.path(), ParserConfig::default());
            let one_by_one = (1..input.len()).collect::<Vec<_>>();
            let (requests, _) = drive(&mut parser, &input, &one_by_one).unwrap();
            assert_eq!(summary(&requests[0]), expected);
        }
    }

    #[test]
    fn multipart_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());

        let (requests, parts) = drive(&mut parser, &crlf(MULTIPART_REQUEST), &[]).unwrap();
        assert_eq!(parts, vec!["submit-name", "file"]);

        let form = requests[0].body().as_multipart().unwrap();
        assert_eq!(form.field("submit-name"), Some("Larry"));
        assert_eq!(form.file("file").unwrap().file.read().unwrap(), b"line 1\r\nline 2");
    }

    #[test]
    fn pipelined_requests_with_leading_empty_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());

        let mut input = b"\r\n\r\n".to_vec();
        input.extend(crlf("GET /index.html HTTP/1.0\n\n"));
        input.extend(crlf("HEAD /index.html HTTP/1.1\nHost: a\n\n"));
        input.extend(crlf("PROPFIND /any HTTP/1.1\nHost: a\n\n"));

        let (requests, _) = drive(&mut parser, &input, &[]).unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].head().version(), Version::HTTP_10);
        // HEAD falls back to the GET route
        assert_eq!(requests[1].head().verb(), Verb::Head);
        assert_eq!(*requests[1].target(), "/index.html");
        // unknown methods are kept verbatim
        assert_eq!(requests[2].head().verb(), Verb::Unknown);
        assert_eq!(requests[2].head().method(), "PROPFIND");
    }

    fn parse_error(input: &str, config: ParserConfig) -> HttpError {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), config);
        let err = drive(&mut parser, &crlf(input), &[]).unwrap_err();
        assert_eq!(parser.state(), ParserState::Error);
        err
    }

    #[test]
    fn errors_map_to_statuses() {
        let cases = [
            ("GET /index.html\n\n", StatusCode::BAD_REQUEST),
            ("GET  /index.html HTTP/1.1\nHost: a\n\n", StatusCode::BAD_REQUEST),
            ("GET /index.html HTTP/2.0\n\n", StatusCode::HTTP_VERSION_NOT_SUPPORTED),
            ("GET /index.html HTTP/1.1\n\n", StatusCode::BAD_REQUEST),
            ("GET /index.html HTTP/1.1\nHost: a\n folded\n\n", StatusCode::BAD_REQUEST),
            ("GET /index.html HTTP/1.1\nHost : a\n\n", StatusCode::BAD_REQUEST),
            ("GET /index.html HTTP/1.1\nHost: a\nno separator\n\n", StatusCode::BAD_REQUEST),
            ("G@T / HTTP/1.1\nHost: a\n\n", StatusCode::BAD_REQUEST),
            ("GET /missing HTTP/1.1\nHost: a\n\n", StatusCode::NOT_FOUND),
            ("DELETE /index.html HTTP/1.1\nHost: a\n\n", StatusCode::NOT_FOUND),
            ("POST /form HTTP/1.1\nHost: a\nTransfer-Encoding: chunked\n\n", StatusCode::NOT_IMPLEMENTED),
            ("POST /form HTTP/1.1\nHost: a\nContent-Length: abc\n\n", StatusCode::BAD_REQUEST),
            ("POST /form HTTP/1.1\nHost: a\nContent-Length: 1\nContent-Length: 2\n\n", StatusCode::BAD_REQUEST),
            ("POST /upload HTTP/1.1\nHost: a\nContent-Type: multipart/form-data\nContent-Length: 10\n\n", StatusCode::BAD_REQUEST),
        ];

        for (input, status) in cases {
            assert_eq!(parse_error(input, ParserConfig::default()).status_code(), status, "{input:?}");
        }
    }

    #[test]
    fn method_must_be_a_token() {
        for input in ["G@T /index.html HTTP/1.1\nHost: a\n\n", "GET(x) /any HTTP/1.1\nHost: a\n\n"] {
            let err = parse_error(input, ParserConfig::default());
            assert!(matches!(err, HttpError::Parse { source: ParseError::InvalidMethod(_) }), "{input:?}: {err}");
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn head_is_consumed_once_complete() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());

        assert_eq!(parser.feed(b"\r\n").unwrap(), Progress::new(0, ParseStatus::NeedMore));
        assert!(parser.is_idle());

        let head = b"GET /index.html HTTP/1.1\r\nHost: a\r\n";
        assert_eq!(parser.feed(head).unwrap(), Progress::new(0, ParseStatus::NeedMore));
        assert_eq!(parser.state(), ParserState::Header);
        assert!(parser.pending().is_none());

        let mut input = head.to_vec();
        input.extend_from_slice(b"\r\n");
        let progress = parser.feed(&input).unwrap();
        assert_eq!(progress, Progress::new(input.len(), ParseStatus::Advanced(Milestone::HeadersReady)));
        assert_eq!(parser.pending().unwrap().head().headers().get(HOST).unwrap(), "a");
    }

    #[test]
    fn inconsistent_state_is_a_server_error() {
        assert_eq!(ParseError::InvalidState("body without a request head").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ParseError::NeedsReset.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn limits() {
        let err = parse_error("POST /form HTTP/1.1\nHost: a\nContent-Length: 100\n\n", ParserConfig::default().max_body_size(10));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = parse_error("GET /index.html HTTP/1.1\nHost: a\nA: 1\nB: 2\n\n", ParserConfig::default().max_headers(2));
        assert!(matches!(err, HttpError::Parse { source: ParseError::TooManyHeaders { max_num: 2 } }));

        let long = format!("GET /index.html HTTP/1.1\nHost: a\nX-Long: {}\n\n", "a".repeat(200));
        let err = parse_error(&long, ParserConfig::default().max_header_bytes(128));
        assert_eq!(err.status_code(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);

        // an unterminated line is refused as soon as it cannot fit
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default().max_header_bytes(64));
        assert!(parser.feed(&[b'a'; 65]).is_err());
    }

    #[test]
    fn text_body_must_be_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());
        let mut input = crlf("POST /form HTTP/1.1\nHost: a\nContent-Type: text/plain\nContent-Length: 2\n\n");
        input.extend_from_slice(&[0xff, 0xfe]);

        let err = drive(&mut parser, &input, &[]).unwrap_err();
        assert!(matches!(err, HttpError::Parse { source: ParseError::InvalidBody { .. } }));
    }

    #[test]
    fn truncated_multipart_body() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());
        let body = crlf("--AaB03x\nContent-Disposition: form-data; name=\"f\"; filename=\"f.txt\"\n\nabc\n");
        let mut input =
            crlf(&format!("POST /upload HTTP/1.1\nHost: a\nContent-Type: multipart/form-data; boundary=AaB03x\nContent-Length: {}\n\n", body.len()));
        input.extend_from_slice(&body);

        let err = drive(&mut parser, &input, &[]).unwrap_err();
        assert!(matches!(err, HttpError::Multipart { source: MultipartError::Truncated }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn reject_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = parser_in(dir.path(), ParserConfig::default());
        let input = crlf(MULTIPART_REQUEST);

        let mut offset = 0;
        loop {
            let progress = parser.feed(&input[offset..]).unwrap();
            offset += progress.consumed;
            match progress.status {
                ParseStatus::Advanced(Milestone::HeadersReady) => parser.release(),
                ParseStatus::Advanced(Milestone::PartReady(part)) if part.is_file() => break,
                ParseStatus::Advanced(Milestone::PartReady(_)) => parser.accept_part(None),
                status => panic!("unexpected status {status:?}"),
            }
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        parser.reject(&crate::protocol::PolicyDenied::forbidden("no files").into());
        assert_eq!(parser.state(), ParserState::Error);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(matches!(parser.feed(b"GET"), Err(HttpError::Parse { source: ParseError::NeedsReset })));

        parser.reset();
        let (requests, _) = drive(&mut parser, &crlf("GET /index.html HTTP/1.1\nHost: a\n\n"), &[]).unwrap();
        assert_eq!(requests.len(), 1);
    }
}
