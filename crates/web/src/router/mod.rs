//! Route compilation and the tree of mounted routers.
//!
//! A [`Router`] owns the routes registered on it, keyed by verb and kept in registration
//! order, and any routers nested below it. Resolution strips the router's mount path from the
//! URL, descends into the first nested router whose mount path prefixes the remainder, and
//! otherwise tries the router's own routes for the verb, then its catch-all routes.

mod route;

use std::collections::HashMap;
use std::sync::Arc;

use micro_mvc_http::protocol::Verb;
use tracing::debug;

use crate::handler::RequestHandler;
use crate::policy::{FilterPolicy, PolicyChain};
use crate::request::PathParams;

pub use route::{CompiledRoute, OptionalSegments, Route, RouteError, RouteOptions};

/// A node of the router tree.
#[derive(Debug)]
pub struct Router {
    mount: String,
    options: RouteOptions,
    routes: HashMap<Verb, Vec<Arc<Route>>>,
    routers: Vec<Router>,
    policies: Vec<Arc<FilterPolicy>>,
}

/// The route a request resolved to.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    route: Arc<Route>,
    params: PathParams,
    chain: PolicyChain,
}

impl RouteMatch {
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Router policies from the root down to the leaf, then the route's own.
    pub fn chain(&self) -> &PolicyChain {
        &self.chain
    }

    pub fn into_params(self) -> PathParams {
        self.params
    }
}

fn normalize_mount(mount: &str) -> String {
    let trimmed = mount.trim_matches('/');
    if trimmed.is_empty() { String::new() } else { format!("/{trimmed}") }
}

impl Router {
    /// Creates a builder for a router mounted at `mount`. `""` and `"/"` mount at the root.
    pub fn builder(mount: impl AsRef<str>) -> RouterBuilder {
        RouterBuilder::new(normalize_mount(mount.as_ref()))
    }

    pub fn mount(&self) -> &str {
        if self.mount.is_empty() { "/" } else { &self.mount }
    }

    /// Routes registered for `verb`, in registration order.
    pub fn routes(&self, verb: Verb) -> &[Arc<Route>] {
        self.routes.get(&verb).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn policies(&self) -> &[Arc<FilterPolicy>] {
        &self.policies
    }

    /// Resolves a raw request path. `url` is still percent-encoded; parameter values in the
    /// result are decoded.
    pub fn resolve(&self, verb: Verb, url: &str) -> Option<RouteMatch> {
        let mut chain = PolicyChain::new();
        let matched = self.resolve_in(verb, url, &mut chain);
        if matched.is_none() {
            debug!(%verb, url, "no route matched");
        }
        matched
    }

    fn resolve_in(&self, verb: Verb, url: &str, chain: &mut PolicyChain) -> Option<RouteMatch> {
        let rest = self.strip_mount(url)?;
        chain.extend(self.policies.iter().map(Arc::clone));

        if let Some(nested) = self.routers.iter().find(|router| router.strip_mount(rest).is_some()) {
            return nested.resolve_in(verb, rest, chain);
        }

        let (route, params) = self.find_route(verb, rest).or_else(|| match verb {
            Verb::All => None,
            _ => self.find_route(Verb::All, rest),
        })?;

        chain.extend(route.policies().iter().map(Arc::clone));
        Some(RouteMatch { route, params, chain: std::mem::take(chain) })
    }

    fn find_route(&self, verb: Verb, path: &str) -> Option<(Arc<Route>, PathParams)> {
        self.routes(verb)
            .iter()
            .find_map(|route| route.compiled().matches(path).map(|params| (Arc::clone(route), params)))
    }

    /// The part of `url` below this router's mount path, if the mount path prefixes it at a
    /// segment boundary.
    fn strip_mount<'a>(&self, url: &'a str) -> Option<&'a str> {
        if self.mount.is_empty() {
            return Some(url);
        }

        let prefix = url.get(..self.mount.len())?;
        let prefixed =
            if self.options.case_sensitive { prefix == self.mount } else { prefix.eq_ignore_ascii_case(&self.mount) };
        if !prefixed {
            return None;
        }

        match &url[self.mount.len()..] {
            "" => Some("/"),
            rest if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }
}

/// Handlers and policies registered for one verb on one path.
pub struct MethodRoute {
    verb: Verb,
    handlers: Vec<Arc<dyn RequestHandler>>,
    policies: Vec<Arc<FilterPolicy>>,
}

impl MethodRoute {
    pub fn new<H: RequestHandler + 'static>(verb: Verb, handler: H) -> Self {
        Self { verb, handlers: vec![Arc::new(handler)], policies: Vec::new() }
    }

    /// Adds a handler that runs if the previous ones pass the request on.
    pub fn handler<H: RequestHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn policy(mut self, policy: impl Into<Arc<FilterPolicy>>) -> Self {
        self.policies.push(policy.into());
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }
}

impl std::fmt::Debug for MethodRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRoute")
            .field("verb", &self.verb)
            .field("handlers", &self.handlers.len())
            .field("policies", &self.policies.len())
            .finish()
    }
}

macro_rules! method_route {
    ($method:ident, $verb:ident) => {
        pub fn $method<H: RequestHandler + 'static>(handler: H) -> MethodRoute {
            MethodRoute::new(Verb::$verb, handler)
        }
    };
}

method_route!(get, Get);
method_route!(post, Post);
method_route!(put, Put);
method_route!(delete, Delete);
method_route!(head, Head);
method_route!(options, Options);
method_route!(connect, Connect);
method_route!(patch, Patch);
method_route!(trace, Trace);
method_route!(all, All);

#[derive(Debug)]
pub struct RouterBuilder {
    mount: String,
    options: RouteOptions,
    routes: Vec<(String, MethodRoute)>,
    routers: Vec<Router>,
    policies: Vec<Arc<FilterPolicy>>,
}

impl RouterBuilder {
    fn new(mount: String) -> Self {
        Self { mount, options: RouteOptions::default(), routes: Vec::new(), routers: Vec::new(), policies: Vec::new() }
    }

    pub fn route(mut self, path: impl Into<String>, method_route: MethodRoute) -> Self {
        self.routes.push((path.into(), method_route));
        self
    }

    /// Adds a policy that applies to every route of this router and of the routers below it.
    pub fn policy(mut self, policy: impl Into<Arc<FilterPolicy>>) -> Self {
        self.policies.push(policy.into());
        self
    }

    /// Nests a router. Its mount path is relative to this router's.
    pub fn router(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    pub fn options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Router, RouteError> {
        let mut routes: HashMap<Verb, Vec<Route>> = HashMap::new();

        for (path, MethodRoute { verb, handlers, policies }) in self.routes {
            let verb_routes = routes.entry(verb).or_default();
            match verb_routes.iter_mut().find(|route| route.compiled().template() == path) {
                Some(route) => route.append(handlers, policies),
                None => {
                    let mut route = Route::new(verb, CompiledRoute::compile(&path, &self.options)?);
                    route.append(handlers, policies);
                    verb_routes.push(route);
                }
            }
        }

        let routes: HashMap<_, Vec<_>> =
            routes.into_iter().map(|(verb, verb_routes)| (verb, verb_routes.into_iter().map(Arc::new).collect())).collect();
        debug!(mount = %self.mount, routes = routes.values().map(Vec::len).sum::<usize>(), routers = self.routers.len(), "router built");

        Ok(Router { mount: self.mount, options: self.options, routes, routers: self.routers, policies: self.policies })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::request::Request;

    fn reply(text: &'static str) -> impl RequestHandler {
        handler_fn(move |_request: Arc<Request>| async move { text })
    }

    fn template(matched: &RouteMatch) -> &str {
        matched.route().compiled().template()
    }

    #[test]
    fn nested_router_takes_priority() {
        let admin = Router::builder("/users/admin/").route("/:[id]", get(reply("admin"))).build().unwrap();
        let router = Router::builder("/").route("/users/:id", get(reply("user"))).router(admin).build().unwrap();

        let matched = router.resolve(Verb::Get, "/users/admin/42").unwrap();
        assert_eq!(template(&matched), "/:[id]");
        assert_eq!(matched.params().get("id"), Some("42"));

        let matched = router.resolve(Verb::Get, "/users/admin").unwrap();
        assert_eq!(template(&matched), "/:[id]");
        assert_eq!(matched.params().get("id"), None);

        let matched = router.resolve(Verb::Get, "/users/7").unwrap();
        assert_eq!(template(&matched), "/users/:id");
        assert_eq!(matched.params().get("id"), Some("7"));
    }

    #[test]
    fn nested_router_is_committed_to() {
        let admin = Router::builder("/users/admin").route("/settings", get(reply("settings"))).build().unwrap();
        let router = Router::builder("").route("/users/:id/:[tab]", get(reply("user"))).router(admin).build().unwrap();

        assert!(router.resolve(Verb::Get, "/users/admin/profile").is_none());
        assert!(router.resolve(Verb::Get, "/users/administrator").is_some());
    }

    #[test]
    fn first_registered_sibling_wins() {
        let api = || Router::builder("/api").route("/v1/items", get(reply("api"))).build().unwrap();
        let v1 = || Router::builder("/api/v1").route("/items", get(reply("v1"))).build().unwrap();

        let router = Router::builder("/").router(api()).router(v1()).build().unwrap();
        assert_eq!(template(&router.resolve(Verb::Get, "/api/v1/items").unwrap()), "/v1/items");

        let router = Router::builder("/").router(v1()).router(api()).build().unwrap();
        assert_eq!(template(&router.resolve(Verb::Get, "/api/v1/items").unwrap()), "/items");
    }

    #[test]
    fn mount_matches_whole_segments() {
        let api = Router::builder("/api").route("/", get(reply("index"))).build().unwrap();
        let router = Router::builder("/").route("/apiary", get(reply("bees"))).router(api).build().unwrap();

        assert_eq!(template(&router.resolve(Verb::Get, "/apiary").unwrap()), "/apiary");
        assert_eq!(template(&router.resolve(Verb::Get, "/api").unwrap()), "/");
        assert_eq!(template(&router.resolve(Verb::Get, "/API/").unwrap()), "/");

        let mounted = Router::builder("/shop").route("/cart", get(reply("cart"))).build().unwrap();
        assert!(mounted.resolve(Verb::Get, "/cart").is_none());
        assert!(mounted.resolve(Verb::Get, "/shop/cart").is_some());
    }

    #[test]
    fn verb_routes_before_catch_all() {
        let router = Router::builder("/")
            .route("/items/*", all(reply("any")))
            .route("/items/:id", get(reply("item")))
            .build()
            .unwrap();

        let matched = router.resolve(Verb::Get, "/items/3").unwrap();
        assert_eq!(matched.route().verb(), Verb::Get);

        let matched = router.resolve(Verb::Delete, "/items/3").unwrap();
        assert_eq!(matched.route().verb(), Verb::All);

        let matched = router.resolve(Verb::Unknown, "/items/3").unwrap();
        assert_eq!(matched.route().verb(), Verb::All);

        assert!(router.resolve(Verb::Post, "/other").is_none());
    }

    #[test]
    fn registration_order_within_verb() {
        let router = Router::builder("/")
            .route("/files/**", get(reply("tree")))
            .route("/files/:name", get(reply("file")))
            .build()
            .unwrap();

        assert_eq!(template(&router.resolve(Verb::Get, "/files/a.txt").unwrap()), "/files/**");
    }

    #[test]
    fn same_path_appends_to_one_route() {
        let audit = Arc::new(FilterPolicy::new());
        let router = Router::builder("/")
            .route("/items", get(reply("first")).policy(Arc::clone(&audit)))
            .route("/items", get(reply("second")).handler(reply("third")))
            .route("/items", post(reply("create")))
            .build()
            .unwrap();

        assert_eq!(router.routes(Verb::Get).len(), 1);
        let route = &router.routes(Verb::Get)[0];
        assert_eq!(route.handlers().len(), 3);
        assert_eq!(route.policies().len(), 1);
        assert_eq!(router.routes(Verb::Post).len(), 1);
        assert!(router.routes(Verb::Put).is_empty());
    }

    #[test]
    fn chain_runs_from_root_to_route() {
        let root = Arc::new(FilterPolicy::new());
        let nested = Arc::new(FilterPolicy::new());
        let route = Arc::new(FilterPolicy::new());

        let admin = Router::builder("/admin")
            .policy(Arc::clone(&nested))
            .route("/stats", get(reply("stats")).policy(Arc::clone(&route)).policy(Arc::clone(&root)))
            .build()
            .unwrap();
        let router = Router::builder("/").policy(Arc::clone(&root)).router(admin).build().unwrap();

        let matched = router.resolve(Verb::Get, "/admin/stats").unwrap();
        let policies = matched.chain().policies();
        assert_eq!(policies.len(), 3);
        assert!(Arc::ptr_eq(&policies[0], &root));
        assert!(Arc::ptr_eq(&policies[1], &nested));
        assert!(Arc::ptr_eq(&policies[2], &route));

        assert!(router.resolve(Verb::Get, "/admin/missing").is_none());
    }

    #[test]
    fn invalid_template_fails_build() {
        let result = Router::builder("/").route("/a/:id/:id", get(reply("dup"))).build();
        assert!(matches!(result, Err(RouteError::DuplicateParam { .. })));
    }
}
