//! Checks that can be attached to a [`FilterRule`](super::FilterRule).

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue, StatusCode};
use micro_mvc_http::multipart::PartInfo;
use micro_mvc_http::protocol::PolicyDenied;

use super::FilterContext;

/// One validation step of a policy.
///
/// A check may suspend, for example while a token is verified remotely; the chain waits for
/// it before running the next one.
#[async_trait]
pub trait RuleCheck: Send + Sync {
    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied>;
}

/// Verifies bearer tokens, usually against an external service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> bool;
}

/// Requires an `Authorization: Bearer <token>` header accepted by the verifier.
#[derive(Debug)]
pub struct BearerToken<V> {
    verifier: V,
}

impl<V: TokenVerifier> BearerToken<V> {
    pub fn new(verifier: V) -> Self {
        Self { verifier }
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl<V: TokenVerifier> RuleCheck for BearerToken<V> {
    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied> {
        let token = ctx
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| PolicyDenied::unauthorized("missing bearer token"))?;

        if self.verifier.verify(token).await { Ok(()) } else { Err(PolicyDenied::unauthorized("invalid bearer token")) }
    }
}

/// Requires a header, optionally with an exact value.
#[derive(Debug, Clone)]
pub struct RequireHeader {
    name: HeaderName,
    value: Option<HeaderValue>,
}

impl RequireHeader {
    pub fn new(name: HeaderName) -> Self {
        Self { name, value: None }
    }

    pub fn with_value(mut self, value: HeaderValue) -> Self {
        self.value = Some(value);
        self
    }
}

#[async_trait]
impl RuleCheck for RequireHeader {
    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied> {
        let found = match (ctx.headers().get(&self.name), &self.value) {
            (Some(actual), Some(expected)) => actual == expected,
            (found, None) => found.is_some(),
            (None, Some(_)) => false,
        };

        if found { Ok(()) } else { Err(PolicyDenied::forbidden(format!("header '{}' is required", self.name))) }
    }
}

fn check_name(names: &[String], part: &PartInfo) -> Result<(), PolicyDenied> {
    if names.is_empty() || names.iter().any(|name| name == part.name()) {
        return Ok(());
    }
    Err(PolicyDenied::forbidden(format!("part '{}' is not allowed", part.name())))
}

/// Constraints on multipart form fields.
#[derive(Debug, Clone, Default)]
pub struct FormConstraints {
    /// Allowed field names; empty allows any.
    pub names: Vec<String>,
    pub max_size: Option<u64>,
}

impl FormConstraints {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }
}

#[async_trait]
impl RuleCheck for FormConstraints {
    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied> {
        let Some(part) = ctx.part() else {
            return Ok(());
        };
        check_name(&self.names, part)?;

        if let Some(max_size) = self.max_size {
            ctx.limit_part_size(max_size);
        }
        Ok(())
    }
}

/// Constraints on uploaded files.
#[derive(Debug, Clone, Default)]
pub struct FileConstraints {
    /// Allowed part names; empty allows any.
    pub names: Vec<String>,
    /// Allowed media types such as `image/png` or `image/*`; empty allows any.
    pub mime_types: Vec<String>,
    pub max_size: Option<u64>,
}

impl FileConstraints {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn mime_types<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    fn accepts_mime(&self, part: &PartInfo) -> bool {
        if self.mime_types.is_empty() {
            return true;
        }

        let mime = part.content_type().unwrap_or(&mime::APPLICATION_OCTET_STREAM);
        self.mime_types.iter().any(|allowed| match allowed.split_once('/') {
            Some((type_, "*")) => mime.type_().as_str().eq_ignore_ascii_case(type_),
            _ => mime.essence_str().eq_ignore_ascii_case(allowed),
        })
    }
}

#[async_trait]
impl RuleCheck for FileConstraints {
    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied> {
        let Some(part) = ctx.part() else {
            return Ok(());
        };
        check_name(&self.names, part)?;

        if !self.accepts_mime(part) {
            let mime = part.content_type().map_or("application/octet-stream", |mime| mime.essence_str());
            return Err(PolicyDenied::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, format!("media type '{mime}' is not allowed")));
        }

        if let Some(max_size) = self.max_size {
            ctx.limit_part_size(max_size);
        }
        Ok(())
    }
}

/// A check that wraps a closure.
pub struct FnCheck<F>(F);

impl<F> std::fmt::Debug for FnCheck<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnCheck")
    }
}

/// Creates a check from a closure.
///
/// # Example
/// ```
/// use micro_mvc::policy::fn_check;
/// use micro_mvc_http::protocol::PolicyDenied;
///
/// let api_only = fn_check(|ctx| {
///     if ctx.uri().path().starts_with("/api") { Ok(()) } else { Err(PolicyDenied::forbidden("api only")) }
/// });
/// ```
pub fn fn_check<F>(f: F) -> FnCheck<F>
where
    F: Fn(&FilterContext<'_>) -> Result<(), PolicyDenied> + Send + Sync,
{
    FnCheck(f)
}

#[async_trait]
impl<F> RuleCheck for FnCheck<F>
where
    F: Fn(&FilterContext<'_>) -> Result<(), PolicyDenied> + Send + Sync,
{
    async fn check(&self, ctx: &mut FilterContext<'_>) -> Result<(), PolicyDenied> {
        (self.0)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use http::{Uri, Version};
    use micro_mvc_http::multipart::PartKind;
    use micro_mvc_http::protocol::{RequestHead, Verb};

    use super::*;
    use crate::request::PathParams;

    fn request_head(headers: &[(&'static str, &'static str)]) -> RequestHead {
        let mut head = RequestHead::new(Verb::Post, "POST", Uri::from_static("/upload"), Version::HTTP_11, vec![]);
        for (name, value) in headers {
            head.headers_mut().append(*name, HeaderValue::from_static(value));
        }
        head
    }

    #[tokio::test]
    async fn bearer_token_verified() {
        let mut verifier = MockTokenVerifier::new();
        verifier.expect_verify().withf(|token| token == "secret").times(1).returning(|_| true);
        verifier.expect_verify().withf(|token| token != "secret").times(1).returning(|_| false);
        let rule = BearerToken::new(verifier);
        let params = PathParams::empty();

        let head = request_head(&[("authorization", "Bearer secret")]);
        assert_eq!(rule.check(&mut FilterContext::new(&head, &params)).await, Ok(()));

        let head = head_with_token("bearer wrong");
        let denied = rule.check(&mut FilterContext::new(&head, &params)).await.unwrap_err();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(denied.reason(), "invalid bearer token");
    }

    fn head_with_token(value: &'static str) -> RequestHead {
        request_head(&[("authorization", value)])
    }

    #[tokio::test]
    async fn bearer_token_missing() {
        let mut verifier = MockTokenVerifier::new();
        verifier.expect_verify().never();
        let rule = BearerToken::new(verifier);
        let params = PathParams::empty();

        for head in [request_head(&[]), head_with_token("Basic dXNlcg=="), head_with_token("Bearer ")] {
            let denied = rule.check(&mut FilterContext::new(&head, &params)).await.unwrap_err();
            assert_eq!(denied.reason(), "missing bearer token");
        }
    }

    #[tokio::test]
    async fn require_header() {
        let params = PathParams::empty();
        let rule = RequireHeader::new(HeaderName::from_static("x-api-key")).with_value(HeaderValue::from_static("k1"));

        let head = request_head(&[("x-api-key", "k1")]);
        assert!(rule.check(&mut FilterContext::new(&head, &params)).await.is_ok());

        let head = request_head(&[("x-api-key", "k2")]);
        let denied = rule.check(&mut FilterContext::new(&head, &params)).await.unwrap_err();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn file_constraints() {
        let rule = FileConstraints::new().names(["avatar"]).mime_types(["image/*", "application/pdf"]).max_size(1024);
        let head = request_head(&[]);
        let params = PathParams::empty();

        let png = PartInfo::new(PartKind::File, "avatar").with_filename("me.png").with_content_type(mime::IMAGE_PNG);
        let mut ctx = FilterContext::new(&head, &params).with_part(&png);
        assert!(rule.check(&mut ctx).await.is_ok());
        assert_eq!(ctx.max_part_size(), Some(1024));

        let text = PartInfo::new(PartKind::File, "avatar").with_filename("me.txt").with_content_type(mime::TEXT_PLAIN);
        let denied = rule.check(&mut FilterContext::new(&head, &params).with_part(&text)).await.unwrap_err();
        assert_eq!(denied.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let other = PartInfo::new(PartKind::File, "resume").with_filename("cv.pdf").with_content_type(mime::APPLICATION_PDF);
        let denied = rule.check(&mut FilterContext::new(&head, &params).with_part(&other)).await.unwrap_err();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn tightest_limit_wins() {
        let head = request_head(&[]);
        let params = PathParams::empty();
        let part = PartInfo::new(PartKind::Form, "comment");
        let mut ctx = FilterContext::new(&head, &params).with_part(&part);

        FormConstraints::new().max_size(100).check(&mut ctx).await.unwrap();
        FormConstraints::new().names(["comment"]).max_size(10).check(&mut ctx).await.unwrap();
        FormConstraints::new().max_size(50).check(&mut ctx).await.unwrap();
        assert_eq!(ctx.max_part_size(), Some(10));
    }
}
