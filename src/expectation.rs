//! Expectations: a request description bound to a sequence of responses.

use crate::error::Result;
use crate::matcher::{BodyMatcher, Matcher};
use crate::request::{Method, Request};
use crate::response::{ResponseBuilder, ResponseConfig};
use crate::verifier::CallCount;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Request attribute a named matcher applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Header,
    Query,
    Cookie,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttributeKind::Header => "header",
            AttributeKind::Query => "query",
            AttributeKind::Cookie => "cookie",
        })
    }
}

#[derive(Debug, Default)]
struct CallState {
    calls: u64,
    cursor: usize,
}

/// A registered request description and the responses it cycles through.
///
/// Matchers are fixed at construction. The only mutable state is the call
/// counter and response cursor, advanced together by
/// [`next_response`](Self::next_response).
pub struct Expectation {
    label: Option<String>,
    method: Method,
    path: Matcher,
    attributes: HashMap<AttributeKind, Vec<(String, Matcher)>>,
    content_type: Option<Matcher>,
    body: Option<BodyMatcher>,
    responses: Vec<Arc<ResponseConfig>>,
    expected_calls: Option<CallCount>,
    state: Mutex<CallState>,
}

impl Expectation {
    pub fn builder(method: Method, path: impl Into<Matcher>) -> ExpectationBuilder {
        ExpectationBuilder::new(method, path)
    }

    /// True iff every matcher on this expectation accepts the request.
    pub fn matches(&self, request: &Request) -> bool {
        if request.method() != self.method {
            return false;
        }

        if !self.path.test(Some(request.path())) {
            return false;
        }

        for (kind, matchers) in &self.attributes {
            for (name, matcher) in matchers {
                let passed = match kind {
                    AttributeKind::Header => matcher.test_values(request.header_values(name)),
                    AttributeKind::Query => matcher.test_values(request.query_values(name)),
                    AttributeKind::Cookie => matcher.test(request.cookie(name)),
                };
                if !passed {
                    return false;
                }
            }
        }

        if let Some(matcher) = &self.content_type {
            if !matcher.test(request.content_type()) {
                return false;
            }
        }

        if let Some(matcher) = &self.body {
            if !matcher.test(request.body()) {
                return false;
            }
        }

        true
    }

    /// Return the response for this call and record the call.
    ///
    /// Responses are returned in registration order; once the sequence is
    /// exhausted the last one repeats.
    pub fn next_response(&self) -> Arc<ResponseConfig> {
        let last = self.responses.len() - 1;
        let mut state = self.state.lock();
        let index = state.cursor.min(last);
        state.cursor = (index + 1).min(self.responses.len());
        state.calls += 1;
        Arc::clone(&self.responses[index])
    }

    pub fn call_count(&self) -> u64 {
        self.state.lock().calls
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn responses(&self) -> &[Arc<ResponseConfig>] {
        &self.responses
    }

    /// Call count declared at registration, checked by `Verifier::verify_all`.
    pub fn expected_calls(&self) -> Option<CallCount> {
        self.expected_calls
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("label", &self.label)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("attributes", &self.attributes)
            .field("content_type", &self.content_type)
            .field("body", &self.body)
            .field("responses", &self.responses.len())
            .field("calls", &self.call_count())
            .finish()
    }
}

/// Fluent builder for [`Expectation`].
///
/// Several matchers on the same attribute name are combined with AND.
#[derive(Debug, Clone)]
pub struct ExpectationBuilder {
    label: Option<String>,
    method: Method,
    path: Matcher,
    attributes: HashMap<AttributeKind, Vec<(String, Matcher)>>,
    content_type: Option<Matcher>,
    body: Option<BodyMatcher>,
    responses: Vec<ResponseBuilder>,
    expected_calls: Option<CallCount>,
}

impl ExpectationBuilder {
    pub fn new(method: Method, path: impl Into<Matcher>) -> Self {
        Self {
            label: None,
            method,
            path: path.into(),
            attributes: HashMap::new(),
            content_type: None,
            body: None,
            responses: Vec::new(),
            expected_calls: None,
        }
    }

    pub fn get(path: impl Into<Matcher>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn head(path: impl Into<Matcher>) -> Self {
        Self::new(Method::Head, path)
    }

    pub fn post(path: impl Into<Matcher>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<Matcher>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<Matcher>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn patch(path: impl Into<Matcher>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn options(path: impl Into<Matcher>) -> Self {
        Self::new(Method::Options, path)
    }

    /// Name used in logs and verification reports.
    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    pub fn attribute(
        &mut self,
        kind: AttributeKind,
        name: impl Into<String>,
        matcher: impl Into<Matcher>,
    ) -> &mut Self {
        self.attributes
            .entry(kind)
            .or_default()
            .push((name.into(), matcher.into()));
        self
    }

    pub fn header(&mut self, name: impl Into<String>, matcher: impl Into<Matcher>) -> &mut Self {
        self.attribute(AttributeKind::Header, name, matcher)
    }

    pub fn query(&mut self, name: impl Into<String>, matcher: impl Into<Matcher>) -> &mut Self {
        self.attribute(AttributeKind::Query, name, matcher)
    }

    pub fn cookie(&mut self, name: impl Into<String>, matcher: impl Into<Matcher>) -> &mut Self {
        self.attribute(AttributeKind::Cookie, name, matcher)
    }

    pub fn content_type(&mut self, matcher: impl Into<Matcher>) -> &mut Self {
        self.content_type = Some(matcher.into());
        self
    }

    pub fn body(&mut self, matcher: BodyMatcher) -> &mut Self {
        self.body = Some(matcher);
        self
    }

    /// Append a built response to the sequence.
    pub fn respond(&mut self, response: ResponseConfig) -> &mut Self {
        self.responses.push(ResponseBuilder::from(response));
        self
    }

    /// Append a response configured in place; validated by `build`.
    pub fn responds(&mut self, configure: impl FnOnce(&mut ResponseBuilder)) -> &mut Self {
        let mut response = ResponseBuilder::new();
        configure(&mut response);
        self.responses.push(response);
        self
    }

    /// Declare how many calls this expectation should receive.
    pub fn called(&mut self, count: CallCount) -> &mut Self {
        self.expected_calls = Some(count);
        self
    }

    /// Validate every response and produce the expectation. With no
    /// responses configured, an empty 200 response is used.
    pub fn build(&self) -> Result<Expectation> {
        let mut responses = self
            .responses
            .iter()
            .map(|r| r.build().map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        if responses.is_empty() {
            responses.push(Arc::new(ResponseConfig::default()));
        }

        Ok(Expectation {
            label: self.label.clone(),
            method: self.method,
            path: self.path.clone(),
            attributes: self.attributes.clone(),
            content_type: self.content_type.clone(),
            body: self.body.clone(),
            responses,
            expected_calls: self.expected_calls,
            state: Mutex::new(CallState::default()),
        })
    }
}
