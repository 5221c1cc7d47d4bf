//! Route templates compiled to anchored regular expressions.
//!
//! Template syntax, one `/`-separated segment at a time:
//!
//! | segment          | matches                                    |
//! |------------------|--------------------------------------------|
//! | `abc`            | the literal segment                        |
//! | `:id`            | one segment, captured as `id`              |
//! | `:id(\d+)`       | one segment matching `\d+`, captured       |
//! | `[abc]`, `[:id]` | the inner segment, zero or one time        |
//! | `:[id]`          | same as `[:id]`                            |
//! | `*`              | one segment                                |
//! | `**`             | the rest of the path, slashes included     |
//!
//! A trailing `/` on the matched path is always accepted.

use std::sync::Arc;

use micro_mvc_http::percent_decode;
use micro_mvc_http::protocol::Verb;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::handler::RequestHandler;
use crate::policy::FilterPolicy;
use crate::request::PathParams;

/// How optional segments combine when several appear in one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionalSegments {
    /// Everything after an optional segment belongs to the optional run: `/a/[:b]/:c`
    /// matches `/a` or `/a/x/y`, never `/a/y`.
    #[default]
    Nested,
    /// Every optional segment may be present or absent on its own.
    Independent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    pub case_sensitive: bool,
    pub optional_segments: OptionalSegments,
}

impl RouteOptions {
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn optional_segments(mut self, optional_segments: OptionalSegments) -> Self {
        self.optional_segments = optional_segments;
        self
    }
}

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("invalid segment '{segment}' in route '{template}': {reason}")]
    InvalidSegment { template: String, segment: String, reason: &'static str },

    #[error("parameter '{name}' appears twice in route '{template}'")]
    DuplicateParam { template: String, name: String },

    #[error("route '{template}' does not compile: {source}")]
    Regex {
        template: String,
        #[source]
        source: regex::Error,
    },
}

impl RouteError {
    fn invalid_segment(template: &str, segment: &str, reason: &'static str) -> Self {
        Self::InvalidSegment { template: template.to_string(), segment: segment.to_string(), reason }
    }
}

/// One `/`-separated piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, pattern: Option<String> },
    Single,
    Multi,
    Optional(Box<Segment>),
}

impl Segment {
    fn parse(template: &str, raw: &str) -> Result<Segment, RouteError> {
        if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let inner = Segment::parse(template, inner)?;
            if matches!(inner, Segment::Optional(_)) {
                return Err(RouteError::invalid_segment(template, raw, "nested optional segment"));
            }
            return Ok(Segment::Optional(Box::new(inner)));
        }

        if let Some(param) = raw.strip_prefix(':') {
            if let Some(inner) = param.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                return Ok(Segment::Optional(Box::new(Segment::parse_param(template, raw, inner)?)));
            }
            return Segment::parse_param(template, raw, param);
        }

        match raw {
            "*" => Ok(Segment::Single),
            "**" => Ok(Segment::Multi),
            _ if raw.contains(['[', ']']) => Err(RouteError::invalid_segment(template, raw, "unbalanced brackets")),
            _ => Ok(Segment::Literal(raw.to_string())),
        }
    }

    fn parse_param(template: &str, raw: &str, param: &str) -> Result<Segment, RouteError> {
        let (name, pattern) = match param.find('(') {
            Some(open) => {
                let Some(pattern) = param[open + 1..].strip_suffix(')') else {
                    return Err(RouteError::invalid_segment(template, raw, "unclosed parameter pattern"));
                };
                (&param[..open], Some(pattern.to_string()))
            }
            None => (param, None),
        };

        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(RouteError::invalid_segment(template, raw, "invalid parameter name"));
        }

        Ok(Segment::Param { name: name.to_string(), pattern })
    }

    fn is_optional(&self) -> bool {
        matches!(self, Segment::Optional(_))
    }

    /// The pattern for `/segment`.
    fn to_pattern(&self) -> String {
        match self {
            Segment::Literal(literal) => format!("/{}", regex::escape(literal)),
            Segment::Param { name, pattern: Some(pattern) } => format!("/(?P<{name}>{pattern})"),
            Segment::Param { name, pattern: None } => format!("/(?P<{name}>[^/]+)"),
            Segment::Single => "/[^/]+".to_string(),
            Segment::Multi => "/.+".to_string(),
            Segment::Optional(inner) => inner.to_pattern(),
        }
    }

    fn param_name(&self) -> Option<&str> {
        match self {
            Segment::Param { name, .. } => Some(name),
            Segment::Optional(inner) => inner.param_name(),
            _ => None,
        }
    }
}

/// A route template compiled to one anchored regular expression.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    template: String,
    regex: Regex,
    names: Vec<String>,
}

impl CompiledRoute {
    pub fn compile(template: &str, options: &RouteOptions) -> Result<Self, RouteError> {
        let segments = template
            .split('/')
            .filter(|raw| !raw.is_empty())
            .map(|raw| Segment::parse(template, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut names: Vec<String> = Vec::new();
        for name in segments.iter().filter_map(Segment::param_name) {
            if names.iter().any(|existing| existing == name) {
                return Err(RouteError::DuplicateParam { template: template.to_string(), name: name.to_string() });
            }
            names.push(name.to_string());
        }

        let body = match options.optional_segments {
            OptionalSegments::Nested => segments.iter().rev().fold(String::new(), |tail, segment| {
                if segment.is_optional() {
                    format!("(?:{}{tail})?", segment.to_pattern())
                } else {
                    format!("{}{tail}", segment.to_pattern())
                }
            }),
            OptionalSegments::Independent => segments
                .iter()
                .map(|segment| {
                    if segment.is_optional() { format!("(?:{})?", segment.to_pattern()) } else { segment.to_pattern() }
                })
                .collect(),
        };

        let flags = if options.case_sensitive { "" } else { "(?i)" };
        let pattern = format!("{flags}^{body}/?$");
        let regex = Regex::new(&pattern).map_err(|source| RouteError::Regex { template: template.to_string(), source })?;

        Ok(Self { template: template.to_string(), regex, names })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The generated regular expression.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    /// Matches a raw, still percent-encoded path. Captured values are percent-decoded; optional
    /// parameters that did not participate are absent.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let captures = self.regex.captures(path)?;
        let params = self
            .names
            .iter()
            .filter_map(|name| {
                captures.name(name).map(|value| (name.clone(), percent_decode(value.as_str()).into_owned()))
            })
            .collect::<Vec<_>>();
        Some(PathParams::new(params))
    }
}

/// A registered route: its compiled template, handlers and policies.
pub struct Route {
    verb: Verb,
    compiled: CompiledRoute,
    handlers: Vec<Arc<dyn RequestHandler>>,
    policies: Vec<Arc<FilterPolicy>>,
}

impl Route {
    pub(crate) fn new(verb: Verb, compiled: CompiledRoute) -> Self {
        Self { verb, compiled, handlers: Vec::new(), policies: Vec::new() }
    }

    pub(crate) fn append(&mut self, handlers: Vec<Arc<dyn RequestHandler>>, policies: Vec<Arc<FilterPolicy>>) {
        self.handlers.extend(handlers);
        self.policies.extend(policies);
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn compiled(&self) -> &CompiledRoute {
        &self.compiled
    }

    /// Handlers in registration order.
    pub fn handlers(&self) -> &[Arc<dyn RequestHandler>] {
        &self.handlers
    }

    pub fn policies(&self) -> &[Arc<FilterPolicy>] {
        &self.policies
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("verb", &self.verb)
            .field("template", &self.compiled.template())
            .field("handlers", &self.handlers.len())
            .field("policies", &self.policies.len())
            .finish()
    }
}
