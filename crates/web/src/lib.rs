//! A small web framework on top of `micro-mvc-http`.
//!
//! Routes are registered on a tree of [`Router`]s, guarded by [`policy`] chains that run while
//! the request is still being parsed, and answered by [`RequestHandler`]s.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use micro_mvc::router::{get, Router};
//! use micro_mvc::{handler_fn, Request, Server};
//!
//! async fn hello(request: Arc<Request>) -> String {
//!     format!("hello {}", request.param("name").unwrap_or("world"))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::builder("/").route("/hello/:[name]", get(handler_fn(hello))).build().unwrap();
//!     let server = Server::builder().router(router).address("127.0.0.1:8080").build().unwrap();
//!     server.start().await;
//! }
//! ```

mod handler;
mod request;
mod responder;
mod server;

pub mod policy;
pub mod router;

pub use handler::{Flow, FnHandler, RequestHandler, handler_fn};
pub use request::{PathParams, Request};
pub use responder::Responder;
pub use router::{RouteMatch, Router};
pub use server::{Server, ServerBuildError, ServerBuilder, ServerOptions};
