use std::fmt;

/// The dispatch verb of a request.
///
/// Unknown method strings are not an error: they parse to [`Verb::Unknown`] and the raw
/// method string is kept on the request. [`Verb::All`] is never produced by parsing, it is
/// the catch-all registration verb used by routers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Connect,
    Patch,
    All,
    Unknown,
}

impl Verb {
    /// Maps a request-line method token to its verb.
    pub fn parse(method: &str) -> Self {
        match method {
            "GET" => Verb::Get,
            "HEAD" => Verb::Head,
            "POST" => Verb::Post,
            "PUT" => Verb::Put,
            "DELETE" => Verb::Delete,
            "OPTIONS" => Verb::Options,
            "TRACE" => Verb::Trace,
            "CONNECT" => Verb::Connect,
            "PATCH" => Verb::Patch,
            _ => Verb::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Options => "OPTIONS",
            Verb::Trace => "TRACE",
            Verb::Connect => "CONNECT",
            Verb::Patch => "PATCH",
            Verb::All => "ALL",
            Verb::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
