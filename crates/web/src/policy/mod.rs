//! Ordered, asynchronous request validation.
//!
//! A [`FilterPolicy`] is a list of [`FilterRule`]s, each tagged with the stage it applies to:
//! access rules run once the route is resolved, multipart rules run for every form field or
//! file part before its bytes are read. Rules run one after another in list order and the
//! first failure stops the chain.
//!
//! Policies attach to routers and routes. For one request they are collected into a
//! [`PolicyChain`], router policies from the root down to the leaf first, then the route's own.
//!
//! # Examples
//!
//! ```
//! use micro_mvc::policy::{FileConstraints, FilterPolicy, FilterRule, RequireHeader};
//! use http::header::HeaderName;
//!
//! let uploads = FilterPolicy::new()
//!     .rule(FilterRule::access(RequireHeader::new(HeaderName::from_static("x-api-key"))))
//!     .rule(FilterRule::multipart_file(FileConstraints::new().mime_types(["image/*"]).max_size(1 << 20)));
//! ```

mod context;
mod rule;

use std::sync::Arc;

use micro_mvc_http::protocol::PolicyDenied;
use tracing::debug;

pub use context::FilterContext;
pub use rule::{BearerToken, FileConstraints, FnCheck, FormConstraints, RequireHeader, RuleCheck, TokenVerifier, fn_check};

/// The stage a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    Access,
    MultipartForm,
    MultipartFile,
}

pub enum FilterRule {
    Access(Box<dyn RuleCheck>),
    MultipartForm(Box<dyn RuleCheck>),
    MultipartFile(Box<dyn RuleCheck>),
}

impl FilterRule {
    pub fn access<C: RuleCheck + 'static>(check: C) -> Self {
        Self::Access(Box::new(check))
    }

    pub fn multipart_form<C: RuleCheck + 'static>(check: C) -> Self {
        Self::MultipartForm(Box::new(check))
    }

    pub fn multipart_file<C: RuleCheck + 'static>(check: C) -> Self {
        Self::MultipartFile(Box::new(check))
    }

    pub fn filter_type(&self) -> FilterType {
        match self {
            FilterRule::Access(_) => FilterType::Access,
            FilterRule::MultipartForm(_) => FilterType::MultipartForm,
            FilterRule::MultipartFile(_) => FilterType::MultipartFile,
        }
    }

    fn check(&self) -> &dyn RuleCheck {
        match self {
            FilterRule::Access(check) | FilterRule::MultipartForm(check) | FilterRule::MultipartFile(check) => check.as_ref(),
        }
    }
}

impl std::fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FilterRule").field(&self.filter_type()).finish()
    }
}

/// An ordered list of rules.
#[derive(Debug, Default)]
pub struct FilterPolicy {
    rules: Vec<FilterRule>,
}

impl FilterPolicy {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn rule(mut self, rule: FilterRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Runs the rules of `filter_type` in order, stopping at the first failure. A policy
    /// without such rules passes.
    pub async fn validate(&self, filter_type: FilterType, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied> {
        for rule in self.rules.iter().filter(|rule| rule.filter_type() == filter_type) {
            rule.check().check(ctx).await?;
        }
        Ok(())
    }
}

/// The policies that apply to one request, in validation order.
///
/// A policy registered on several levels (a router and one of its routes, for example) is
/// only kept once, at its first position.
#[derive(Debug, Clone, Default)]
pub struct PolicyChain {
    policies: Vec<Arc<FilterPolicy>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, policy: Arc<FilterPolicy>) {
        if !self.policies.iter().any(|existing| Arc::ptr_eq(existing, &policy)) {
            self.policies.push(policy);
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn policies(&self) -> &[Arc<FilterPolicy>] {
        &self.policies
    }

    pub async fn validate(&self, filter_type: FilterType, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied> {
        for (index, policy) in self.policies.iter().enumerate() {
            if let Err(denied) = policy.validate(filter_type, ctx).await {
                debug!(?filter_type, policy = index, reason = denied.reason(), "policy denied request");
                return Err(denied);
            }
        }
        Ok(())
    }
}

impl Extend<Arc<FilterPolicy>> for PolicyChain {
    fn extend<T: IntoIterator<Item = Arc<FilterPolicy>>>(&mut self, iter: T) {
        for policy in iter {
            self.push(policy);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::{StatusCode, Uri, Version};
    use micro_mvc_http::protocol::{RequestHead, Verb};

    use super::*;
    use crate::request::PathParams;

    fn counting(counter: &Arc<AtomicUsize>, verdict: Result<(), PolicyDenied>) -> FnCheck<impl Fn(&FilterContext<'_>) -> Result<(), PolicyDenied> + Send + Sync + use<>> {
        let counter = Arc::clone(counter);
        fn_check(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            verdict.clone()
        })
    }

    fn head() -> RequestHead {
        RequestHead::new(Verb::Get, "GET", Uri::from_static("/"), Version::HTTP_11, vec![])
    }

    #[tokio::test]
    async fn first_failure_stops_the_chain() {
        for failing in 0..4 {
            let counters: Vec<_> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
            let mut policy = FilterPolicy::new();
            for (index, counter) in counters.iter().enumerate() {
                let verdict = if index == failing { Err(PolicyDenied::forbidden(format!("rule {index}"))) } else { Ok(()) };
                policy = policy.rule(FilterRule::access(counting(counter, verdict)));
            }

            let head = head();
            let params = PathParams::empty();
            let denied = policy.validate(FilterType::Access, &mut FilterContext::new(&head, &params)).await.unwrap_err();

            assert_eq!(denied.reason(), format!("rule {failing}"));
            for (index, counter) in counters.iter().enumerate() {
                let expected = usize::from(index <= failing);
                assert_eq!(counter.load(Ordering::SeqCst), expected, "rule {index} with failing rule {failing}");
            }
        }
    }

    #[tokio::test]
    async fn mismatched_or_empty_chain_passes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let policy = FilterPolicy::new().rule(FilterRule::multipart_file(counting(&counter, Err(PolicyDenied::forbidden("no")))));

        let head = head();
        let params = PathParams::empty();
        let mut ctx = FilterContext::new(&head, &params);
        assert_eq!(policy.validate(FilterType::Access, &mut ctx).await, Ok(()));
        assert_eq!(policy.validate(FilterType::MultipartForm, &mut ctx).await, Ok(()));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(PolicyChain::new().validate(FilterType::Access, &mut ctx).await, Ok(()));
    }

    #[tokio::test]
    async fn chain_runs_each_policy_once_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let make = |name: &'static str| {
            let order = Arc::clone(&order);
            Arc::new(FilterPolicy::new().rule(FilterRule::access(fn_check(move |_ctx| {
                order.lock().unwrap().push(name);
                Ok(())
            }))))
        };
        let root = make("root");
        let leaf = make("leaf");
        let route = make("route");

        let mut chain = PolicyChain::new();
        chain.extend([Arc::clone(&root), Arc::clone(&leaf), Arc::clone(&route), Arc::clone(&root)]);
        assert_eq!(chain.len(), 3);

        let head = head();
        let params = PathParams::empty();
        chain.validate(FilterType::Access, &mut FilterContext::new(&head, &params)).await.unwrap();
        assert_eq!(*order.lock().unwrap(), ["root", "leaf", "route"]);
    }

    #[tokio::test]
    async fn denial_keeps_status() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut chain = PolicyChain::new();
        chain.push(Arc::new(FilterPolicy::new().rule(FilterRule::access(counting(&counter, Err(PolicyDenied::unauthorized("token")))))));
        chain.push(Arc::new(FilterPolicy::new().rule(FilterRule::access(counting(&counter, Ok(()))))));

        let head = head();
        let params = PathParams::empty();
        let denied = chain.validate(FilterType::Access, &mut FilterContext::new(&head, &params)).await.unwrap_err();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
