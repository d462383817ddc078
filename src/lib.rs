//! Standin Mock Server Core
//!
//! The matching and dispatch engine of an embeddable HTTP mock server.
//! Tests register expectations describing the requests a system under test
//! will send, bind each to one or more responses, hand inbound requests to
//! the dispatcher, and afterwards verify how often each expectation was hit.
//!
//! # Features
//!
//! - **Request Matching**: Match by method, path, headers, query params, cookies, content type, body
//! - **Response Sequences**: Return responses in order, repeating the last one
//! - **Pluggable Converters**: Encode logical bodies per content type
//! - **Dynamic Templates**: Use Handlebars templates for request-aware bodies
//! - **Latency Simulation**: Add fixed or random delays per response
//! - **Verification**: Assert exact, minimum, maximum or ranged call counts
//!
//! # Example
//!
//! ```no_run
//! use standin::{CallCount, ExpectationBuilder, Method, MockServer, Request};
//!
//! # async fn run() -> Result<(), standin::MockError> {
//! let server = MockServer::new();
//! let login = server.expect(
//!     ExpectationBuilder::post("/login")
//!         .responds(|r| { r.status(401); })
//!         .responds(|r| { r.status(200); }),
//! )?;
//!
//! let result = server.dispatch(&Request::new(Method::Post, "/login")).await?;
//! assert_eq!(result.response().map(|r| r.status), Some(401));
//! assert!(server.verify(login, CallCount::Exactly(1)));
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```yaml
//! expectations:
//!   - id: hello-world
//!     method: GET
//!     path:
//!       type: exact
//!       value: /hello
//!     responses:
//!       - status: 200
//!         body:
//!           type: json
//!           content:
//!             message: "Hello, World!"
//! ```

pub mod config;
pub mod converter;
pub mod dispatcher;
pub mod error;
pub mod expectation;
pub mod matcher;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod template;
pub mod verifier;

pub use config::MockServerConfig;
pub use converter::{Converter, Converters};
pub use dispatcher::{DispatchResult, Dispatcher, MatchedResponse};
pub use error::MockError;
pub use expectation::{AttributeKind, Expectation, ExpectationBuilder};
pub use matcher::{BodyMatcher, Matcher};
pub use registry::{ExpectationHandle, ExpectationRegistry};
pub use request::{Method, Request};
pub use response::{Body, Delay, MockResponse, ResponseBuilder, ResponseConfig};
pub use server::MockServer;
pub use verifier::{CallCount, VerificationFailure, VerificationRecord, Verifier};
