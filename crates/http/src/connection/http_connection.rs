use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, EXPECT};
use http::{HeaderValue, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info, warn};

use crate::codec::{RequestDecoder, RequestParser, ResponseEncoder};
use crate::config::ParserConfig;
use crate::gate::ResponseGate;
use crate::handler::Handler;
use crate::multipart::{PartInfo, TempStorage};
use crate::protocol::{HttpError, ParseEvent, ParsedRequest, Verb};

const READ_CAPACITY: usize = 8 * 1024;

/// An HTTP connection that drives the request parser and writes responses.
///
/// Every parse milestone is answered by the [`Handler`]: the access checks of the resolved
/// route once the headers are complete, the part checks for every multipart part and finally
/// the request itself. While a check runs the [`ResponseGate`] is paused and the parser holds;
/// the verdict is applied through [`ResponseGate::resume`].
///
/// Any failure is answered with a complete error response before the connection ends.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    reader: R,
    writer: W,
    config: ParserConfig,
    storage: Arc<dyn TempStorage>,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: ParserConfig, storage: Arc<dyn TempStorage>) -> Self {
        Self { reader, writer, config, storage }
    }

    pub async fn process<H>(self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler + 'static,
    {
        let parser = RequestParser::new(Arc::clone(&handler), self.config, self.storage);
        let exchange = Exchange {
            framed_read: FramedRead::with_capacity(self.reader, RequestDecoder::new(parser), READ_CAPACITY),
            framed_write: FramedWrite::new(self.writer, ResponseEncoder::new()),
            gate: ResponseGate::new(),
            handler,
        };
        exchange.run().await
    }
}

struct Exchange<R, W, H: Handler> {
    framed_read: FramedRead<R, RequestDecoder<Arc<H>>>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    gate: ResponseGate,
    handler: Arc<H>,
}

impl<R, W, H> Exchange<R, W, H>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: Handler + 'static,
{
    async fn run(mut self) -> Result<(), HttpError> {
        loop {
            let result = match self.framed_read.next().await {
                Some(Ok(ParseEvent::HeadersReady)) => self.on_headers().await,
                Some(Ok(ParseEvent::PartReady(part))) => self.on_part(part).await,
                Some(Ok(ParseEvent::RequestReady(request))) => self.on_request(request).await,
                Some(Err(e)) => Err(e),
                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            };

            if let Err(e) = result {
                error!(cause = %e, status = %e.status_code(), "request failed, connection shutdown");
                self.framed_read.decoder_mut().parser_mut().abort();
                self.send_error(&e).await?;
                return Err(e);
            }
        }
    }

    async fn on_headers(&mut self) -> Result<(), HttpError> {
        let expects_continue = self
            .framed_read
            .decoder()
            .parser()
            .pending()
            .and_then(|pending| pending.head().headers().get(EXPECT))
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"));

        self.gate.pause()?;
        let verdict = match self.framed_read.decoder().parser().pending() {
            Some(pending) => self.handler.check_access(pending).await,
            None => Ok(()),
        };

        let parser = self.framed_read.decoder_mut().parser_mut();
        self.gate.resume(|| match &verdict {
            Ok(()) => parser.release(),
            Err(e) => parser.reject(e),
        })?;
        verdict?;

        // sent only once the request was admitted
        if expects_continue {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
            writer.flush().await?;
            info!("receive expect request header, sent continue response");
        }
        Ok(())
    }

    async fn on_part(&mut self, part: PartInfo) -> Result<(), HttpError> {
        self.gate.pause()?;
        let verdict = match self.framed_read.decoder().parser().pending() {
            Some(pending) => self.handler.check_part(pending, &part).await,
            None => Ok(None),
        };

        let parser = self.framed_read.decoder_mut().parser_mut();
        self.gate.resume(|| match &verdict {
            Ok(max_size) => parser.accept_part(*max_size),
            Err(e) => parser.reject(e),
        })?;
        verdict.map(|_max_size| ())
    }

    async fn on_request(&mut self, request: ParsedRequest<H::Target>) -> Result<(), HttpError> {
        let is_head = request.head().verb() == Verb::Head;

        let response = match self.handler.call(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(cause = %e, "handle response error");
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let response = if is_head { strip_body(response) } else { response };
        self.framed_write.send(response).await
    }

    async fn send_error(&mut self, e: &HttpError) -> Result<(), HttpError> {
        let mut response = plain_response(e.status_code(), e.to_string());
        response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        if let Err(send_error) = self.framed_write.send(response).await {
            warn!(cause = %send_error, "can't send error response");
            return Err(send_error);
        }
        Ok(())
    }
}

fn plain_response(status: StatusCode, body: String) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// A `HEAD` response announces the length of the body it omits.
fn strip_body(response: Response<Bytes>) -> Response<Bytes> {
    let (mut parts, body) = response.into_parts();
    parts.headers.entry(CONTENT_LENGTH).or_insert_with(|| HeaderValue::from(body.len()));
    Response::from_parts(parts, Bytes::new())
}
