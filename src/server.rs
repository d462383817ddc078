//! The mock server facade used by test code.

use crate::config::{GlobalSettings, MockServerConfig};
use crate::converter::Converters;
use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::error::Result;
use crate::expectation::{Expectation, ExpectationBuilder};
use crate::registry::{ExpectationHandle, ExpectationRegistry};
use crate::request::Request;
use crate::verifier::{CallCount, VerificationFailure, Verifier};
use std::sync::Arc;
use tracing::info;

/// One mock server instance: its expectations, dispatcher and verifier.
///
/// All state lives in memory and is dropped with the instance.
#[derive(Debug)]
pub struct MockServer {
    registry: Arc<ExpectationRegistry>,
    dispatcher: Dispatcher,
    verifier: Verifier,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        Self::with_settings(GlobalSettings::default())
    }

    pub fn with_settings(settings: GlobalSettings) -> Self {
        let registry = Arc::new(ExpectationRegistry::new());
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)).with_settings(settings),
            verifier: Verifier::new(Arc::clone(&registry)),
            registry,
        }
    }

    /// Replace the converter set used to encode logical bodies.
    pub fn with_converters(mut self, converters: Converters) -> Self {
        self.dispatcher = self.dispatcher.with_converters(converters);
        self
    }

    /// Create a server with every expectation from a configuration.
    pub fn from_config(config: &MockServerConfig) -> anyhow::Result<Self> {
        let server = Self::with_settings(config.settings.clone());
        for builder in config.builders()? {
            server.expect(&builder)?;
        }

        info!(
            expectations = server.registry.len(),
            default_content_type = %config.settings.default_content_type,
            "Mock server initialized"
        );
        Ok(server)
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Self::from_config(&MockServerConfig::from_yaml(yaml)?)
    }

    /// Build and register an expectation.
    pub fn expect(&self, builder: &ExpectationBuilder) -> Result<ExpectationHandle> {
        Ok(self.registry.register(builder.build()?))
    }

    pub fn register(&self, expectation: Expectation) -> ExpectationHandle {
        self.registry.register(expectation)
    }

    pub async fn dispatch(&self, request: &Request) -> Result<DispatchResult> {
        self.dispatcher.handle(request).await
    }

    pub fn verify(&self, handle: ExpectationHandle, expected: CallCount) -> bool {
        self.verifier.verify(handle, expected)
    }

    /// Check every expectation that declared a call count.
    pub fn verify_all(&self) -> std::result::Result<(), Vec<VerificationFailure>> {
        self.verifier.verify_all()
    }

    /// Drop all expectations. Existing handles stop resolving.
    pub fn reset(&self) {
        self.registry.clear();
    }

    pub fn registry(&self) -> &Arc<ExpectationRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }
}
