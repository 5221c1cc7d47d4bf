use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use micro_mvc_http::config::ParserConfig;
use micro_mvc_http::connection::HttpConnection;
use micro_mvc_http::handler::{BoxError, Handler, RouteResolver};
use micro_mvc_http::multipart::{PartInfo, TempDirStorage, TempStorage};
use micro_mvc_http::protocol::{HttpError, ParsedRequest, PendingRequest, Verb};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::handler::Flow;
use crate::policy::{FilterContext, FilterType};
use crate::request::Request;
use crate::router::{RouteMatch, Router};

/// Server settings, loadable from JSON. Missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub parser: ParserConfig,
    /// Directory for uploaded files; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { parser: ParserConfig::default(), temp_dir: None, log_level: "info".to_string() }
    }
}

impl ServerOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn parser(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }
}

#[derive(Debug)]
pub struct ServerBuilder {
    router: Option<Router>,
    address: Option<io::Result<Vec<SocketAddr>>>,
    options: ServerOptions,
    storage: Option<Arc<dyn TempStorage>>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { router: None, address: None, options: ServerOptions::default(), storage: None }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the storage uploaded files are written to.
    pub fn storage(mut self, storage: Arc<dyn TempStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let router = self.router.ok_or(ServerBuildError::MissingRouter)?;
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?.map_err(|source| ServerBuildError::InvalidAddress { source })?;
        if address.is_empty() {
            return Err(ServerBuildError::MissingAddress);
        }

        let storage: Arc<dyn TempStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(self.options.temp_dir.as_ref().map_or_else(TempDirStorage::default, TempDirStorage::new)),
        };

        Ok(Server { router, address, options: self.options, storage })
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {source}")]
    InvalidAddress {
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub struct Server {
    router: Router,
    address: Vec<SocketAddr>,
    options: ServerOptions,
    storage: Arc<dyn TempStorage>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn storage(&self) -> &Arc<dyn TempStorage> {
        &self.storage
    }

    pub async fn start(self) {
        let level = self.options.log_level.parse::<Level>().unwrap_or(Level::INFO);
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            debug!("global subscriber already set");
        }

        info!(address = ?self.address, "start listening");
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return;
            }
        };

        let server = Arc::new(self);
        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection =
                    HttpConnection::new(reader, writer, server.options.parser.clone(), Arc::clone(&server.storage));
                match connection.process(server).await {
                    Ok(()) => info!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => error!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            });
        }
    }
}

impl RouteResolver for Server {
    type Target = RouteMatch;

    fn resolve(&self, verb: Verb, path: &str) -> Option<RouteMatch> {
        self.router.resolve(verb, path)
    }
}

#[async_trait]
impl Handler for Server {
    async fn check_access(&self, request: &PendingRequest<RouteMatch>) -> Result<(), HttpError> {
        let Some(matched) = request.target() else {
            return Ok(());
        };

        let mut ctx = FilterContext::new(request.head(), matched.params());
        matched.chain().validate(FilterType::Access, &mut ctx).await?;
        Ok(())
    }

    async fn check_part(&self, request: &PendingRequest<RouteMatch>, part: &PartInfo) -> Result<Option<u64>, HttpError> {
        let Some(matched) = request.target() else {
            return Ok(None);
        };

        let filter_type = if part.is_file() { FilterType::MultipartFile } else { FilterType::MultipartForm };
        let mut ctx = FilterContext::new(request.head(), matched.params()).with_part(part);
        matched.chain().validate(filter_type, &mut ctx).await?;
        Ok(ctx.max_part_size())
    }

    async fn call(&self, request: ParsedRequest<RouteMatch>) -> Result<Response<Bytes>, BoxError> {
        let (head, body, matched) = request.into_parts();
        let route = Arc::clone(matched.route());
        let request = Arc::new(Request::new(head, body, matched.into_params()));

        for handler in route.handlers() {
            if let Flow::Done(response) = handler.invoke(Arc::clone(&request)).await? {
                return Ok(response);
            }
        }

        Err(format!("no handler answered {} {}", request.method(), route.compiled().template()).into())
    }
}
