use http::{HeaderMap, Uri};
use micro_mvc_http::multipart::PartInfo;
use micro_mvc_http::protocol::{RequestHead, Verb};

use crate::request::PathParams;

/// What a rule can see of the request it validates.
///
/// Access rules run once the header section is complete, so no body is available. Part rules
/// additionally see the part being validated and may cap its size.
#[derive(Debug)]
pub struct FilterContext<'a> {
    head: &'a RequestHead,
    params: &'a PathParams,
    part: Option<&'a PartInfo>,
    max_part_size: Option<u64>,
}

impl<'a> FilterContext<'a> {
    pub fn new(head: &'a RequestHead, params: &'a PathParams) -> Self {
        Self { head, params, part: None, max_part_size: None }
    }

    pub fn with_part(mut self, part: &'a PartInfo) -> Self {
        self.part = Some(part);
        self
    }

    pub fn verb(&self) -> Verb {
        self.head.verb()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn params(&self) -> &PathParams {
        self.params
    }

    /// The multipart part under validation.
    pub fn part(&self) -> Option<&'a PartInfo> {
        self.part
    }

    /// Caps the current part at `max_size` bytes. The tightest cap wins.
    pub fn limit_part_size(&mut self, max_size: u64) {
        self.max_part_size = Some(self.max_part_size.map_or(max_size, |current| current.min(max_size)));
    }

    pub fn max_part_size(&self) -> Option<u64> {
        self.max_part_size
    }
}
