//! Request dispatch.
//!
//! The [`Dispatcher`] is invoked once per inbound request. It finds the
//! first matching expectation, advances that expectation's call state,
//! materializes the selected response, and applies any configured delay.

use crate::config::GlobalSettings;
use crate::converter::Converters;
use crate::error::Result;
use crate::registry::{ExpectationHandle, ExpectationRegistry};
use crate::request::Request;
use crate::response::{MockResponse, RenderContext, ResponseConfig};
use crate::template::TemplateEngine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of dispatching one request.
#[derive(Debug, Clone)]
pub enum DispatchResult {
    Matched(MatchedResponse),
    /// No expectation matched. The transport picks the fallback status.
    Unmatched,
}

impl DispatchResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, DispatchResult::Matched(_))
    }

    pub fn matched(&self) -> Option<&MatchedResponse> {
        match self {
            DispatchResult::Matched(matched) => Some(matched),
            DispatchResult::Unmatched => None,
        }
    }

    pub fn response(&self) -> Option<&MockResponse> {
        self.matched().map(|m| &m.response)
    }
}

/// A matched request and the response chosen for it.
#[derive(Debug, Clone)]
pub struct MatchedResponse {
    pub expectation: ExpectationHandle,
    pub config: Arc<ResponseConfig>,
    pub response: MockResponse,
    /// Delay that was applied before returning.
    pub delay: Duration,
}

/// Entry point for inbound requests.
///
/// Safe to share across tasks: matching is read-only and the only mutation
/// is the matched expectation's own call state.
pub struct Dispatcher {
    registry: Arc<ExpectationRegistry>,
    converters: Converters,
    templates: TemplateEngine,
    settings: GlobalSettings,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Total requests matched to expectations.
    requests_matched: AtomicU64,
    /// Total requests unmatched.
    requests_unmatched: AtomicU64,
}

impl Dispatcher {
    pub fn new(registry: Arc<ExpectationRegistry>) -> Self {
        Self {
            registry,
            converters: Converters::default(),
            templates: TemplateEngine::new(),
            settings: GlobalSettings::default(),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    pub fn with_settings(mut self, settings: GlobalSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_converters(mut self, converters: Converters) -> Self {
        self.converters = converters;
        self
    }

    pub fn registry(&self) -> &Arc<ExpectationRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    /// Get total requests processed.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests matched.
    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    /// Get total requests unmatched.
    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    /// Resolve one request to a response.
    ///
    /// The call is counted against the matched expectation before the
    /// response is materialized, so a conversion failure still counts as a
    /// call. The delay only suspends this call.
    pub async fn handle(&self, request: &Request) -> Result<DispatchResult> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        debug!(method = %request.method(), path = %request.path(), "Matching request");

        let Some((handle, expectation)) = self.registry.find_best_match(request) else {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            if self.settings.log_unmatched {
                warn!(
                    method = %request.method(),
                    path = %request.path(),
                    "No matching expectation found"
                );
            }
            return Ok(DispatchResult::Unmatched);
        };

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        let config = expectation.next_response();

        if self.settings.log_matches {
            info!(
                expectation = %handle,
                label = expectation.label().unwrap_or(""),
                method = %request.method(),
                path = %request.path(),
                status = config.status(),
                "Request matched expectation"
            );
        }

        let response = config.materialize(&RenderContext {
            request,
            converters: &self.converters,
            templates: &self.templates,
            default_content_type: &self.settings.default_content_type,
        })?;

        let delay = config.delay().map(|d| d.calculate()).unwrap_or_default();
        if !delay.is_zero() {
            debug!(expectation = %handle, delay_ms = delay.as_millis() as u64, "Applying delay");
            tokio::time::sleep(delay).await;
        }

        Ok(DispatchResult::Matched(MatchedResponse {
            expectation: handle,
            config,
            response,
            delay,
        }))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("expectations", &self.registry.len())
            .field("converters", &self.converters)
            .field("settings", &self.settings)
            .field("requests_total", &self.total_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MockError;
    use crate::expectation::ExpectationBuilder;
    use crate::request::Method;
    use crate::verifier::{CallCount, Verifier};
    use serde_json::json;
    use std::time::Instant;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(ExpectationRegistry::new()))
    }

    fn register(dispatcher: &Dispatcher, builder: &mut ExpectationBuilder) -> ExpectationHandle {
        dispatcher.registry().register(builder.build().unwrap())
    }

    #[tokio::test]
    async fn test_get_user_scenario() {
        let dispatcher = dispatcher();
        register(
            &dispatcher,
            ExpectationBuilder::get("/users/1").responds(|r| {
                r.status(200).json(json!({"id": 1}));
            }),
        );

        let result = dispatcher
            .handle(&Request::new(Method::Get, "/users/1"))
            .await
            .unwrap();
        let response = result.response().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_str(), Some(r#"{"id":1}"#));

        let result = dispatcher
            .handle(&Request::new(Method::Get, "/users/2"))
            .await
            .unwrap();
        assert!(matches!(result, DispatchResult::Unmatched));

        assert_eq!(dispatcher.total_requests(), 2);
        assert_eq!(dispatcher.total_matched(), 1);
        assert_eq!(dispatcher.total_unmatched(), 1);
    }

    #[tokio::test]
    async fn test_login_sequence_scenario() {
        let dispatcher = dispatcher();
        let handle = register(
            &dispatcher,
            ExpectationBuilder::post("/login")
                .responds(|r| {
                    r.status(401);
                })
                .responds(|r| {
                    r.status(200);
                }),
        );

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let result = dispatcher
                .handle(&Request::new(Method::Post, "/login"))
                .await
                .unwrap();
            statuses.push(result.response().unwrap().status);
        }

        assert_eq!(statuses, vec![401, 200, 200]);
        let verifier = Verifier::new(Arc::clone(dispatcher.registry()));
        assert!(verifier.verify(handle, CallCount::Exactly(3)));
    }

    #[tokio::test]
    async fn test_matched_reports_expectation_and_config() {
        let dispatcher = dispatcher();
        register(&dispatcher, &mut ExpectationBuilder::get("/a"));
        let b = register(
            &dispatcher,
            ExpectationBuilder::get("/b").responds(|r| {
                r.status(204);
            }),
        );

        let result = dispatcher
            .handle(&Request::new(Method::Get, "/b"))
            .await
            .unwrap();
        let matched = result.matched().unwrap();
        assert_eq!(matched.expectation, b);
        assert_eq!(matched.config.status(), 204);
        assert_eq!(matched.delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_unresolved_converter_surfaces_as_error() {
        let dispatcher = dispatcher();
        let handle = register(
            &dispatcher,
            ExpectationBuilder::get("/feed").responds(|r| {
                r.body(json!({"items": []}), "application/atom+xml");
            }),
        );

        let err = dispatcher
            .handle(&Request::new(Method::Get, "/feed"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MockError::UnresolvedConverter { content_type } if content_type == "application/atom+xml"
        ));
        assert_eq!(dispatcher.registry().get(handle).unwrap().call_count(), 1);
    }

    #[tokio::test]
    async fn test_settings_default_content_type() {
        let dispatcher = Dispatcher::new(Arc::new(ExpectationRegistry::new())).with_settings(
            GlobalSettings {
                default_content_type: "text/plain".to_string(),
                ..GlobalSettings::default()
            },
        );
        register(
            &dispatcher,
            ExpectationBuilder::get("/motd").responds(|r| {
                r.content(json!("be kind"));
            }),
        );

        let result = dispatcher
            .handle(&Request::new(Method::Get, "/motd"))
            .await
            .unwrap();
        let response = result.response().unwrap();
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.body_str(), Some("be kind"));
    }

    #[tokio::test]
    async fn test_custom_converter_set() {
        let dispatcher = dispatcher().with_converters(Converters::empty());
        register(
            &dispatcher,
            ExpectationBuilder::get("/").responds(|r| {
                r.json(json!({}));
            }),
        );
        let err = dispatcher
            .handle(&Request::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, MockError::UnresolvedConverter { .. }));
    }

    #[tokio::test]
    async fn test_template_sees_request() {
        let dispatcher = dispatcher();
        register(
            &dispatcher,
            ExpectationBuilder::post("/echo").responds(|r| {
                r.content_type("text/plain").template("{{method}} {{json.msg}}");
            }),
        );

        let request = Request::new(Method::Post, "/echo")
            .with_content_type("application/json")
            .with_body(br#"{"msg":"hi"}"#.to_vec());
        let result = dispatcher.handle(&request).await.unwrap();
        assert_eq!(result.response().unwrap().body_str(), Some("POST hi"));
    }

    #[tokio::test]
    async fn test_json_template_values_stay_valid_json() {
        let dispatcher = dispatcher();
        register(
            &dispatcher,
            ExpectationBuilder::get("/whoami").responds(|r| {
                r.json_template(json!({"agent": "{{headers.user-agent}}"}));
            }),
        );

        let request = Request::new(Method::Get, "/whoami")
            .with_header("User-Agent", r#"curl "quoted" \ 8.0"#);
        let result = dispatcher.handle(&request).await.unwrap();
        let response = result.response().unwrap();
        assert_eq!(response.header("Content-Type"), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["agent"], r#"curl "quoted" \ 8.0"#);
    }

    #[tokio::test]
    async fn test_delay_applied() {
        let dispatcher = dispatcher();
        register(
            &dispatcher,
            ExpectationBuilder::get("/slow").responds(|r| {
                r.delay(Duration::from_millis(50));
            }),
        );

        let start = Instant::now();
        let result = dispatcher
            .handle(&Request::new(Method::Get, "/slow"))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(result.matched().unwrap().delay, Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delay_does_not_block_other_requests() {
        let dispatcher = Arc::new(dispatcher());
        register(
            &dispatcher,
            ExpectationBuilder::get("/slow").responds(|r| {
                r.delay(Duration::from_millis(500));
            }),
        );
        register(&dispatcher, &mut ExpectationBuilder::get("/fast"));

        let slow = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .handle(&Request::new(Method::Get, "/slow"))
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let start = Instant::now();
        let fast = dispatcher
            .handle(&Request::new(Method::Get, "/fast"))
            .await
            .unwrap();
        assert!(fast.is_matched());
        assert!(start.elapsed() < Duration::from_millis(400));

        assert!(slow.await.unwrap().is_matched());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_dispatch_counts_exactly() {
        const REQUESTS: usize = 200;

        let dispatcher = Arc::new(dispatcher());
        let handle = register(
            &dispatcher,
            ExpectationBuilder::get("/burst")
                .responds(|r| {
                    r.status(201);
                })
                .responds(|r| {
                    r.status(202);
                })
                .responds(|r| {
                    r.status(203);
                }),
        );

        let tasks: Vec<_> = (0..REQUESTS)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher
                        .handle(&Request::new(Method::Get, "/burst"))
                        .await
                        .unwrap()
                        .response()
                        .unwrap()
                        .status
                })
            })
            .collect();

        let mut statuses = Vec::with_capacity(REQUESTS);
        for task in tasks {
            statuses.push(task.await.unwrap());
        }
        statuses.sort_unstable();

        assert_eq!(&statuses[..3], &[201, 202, 203]);
        assert!(statuses[3..].iter().all(|s| *s == 203));

        let verifier = Verifier::new(Arc::clone(dispatcher.registry()));
        assert!(verifier.verify(handle, CallCount::Exactly(REQUESTS as u64)));
    }
}
