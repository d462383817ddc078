//! Post-run call-count verification.

use crate::registry::{ExpectationHandle, ExpectationRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Expected number of calls for an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCount {
    Exactly(u64),
    AtLeast(u64),
    AtMost(u64),
    /// Inclusive on both ends.
    Between(u64, u64),
}

impl CallCount {
    pub fn test(&self, calls: u64) -> bool {
        match *self {
            CallCount::Exactly(n) => calls == n,
            CallCount::AtLeast(n) => calls >= n,
            CallCount::AtMost(n) => calls <= n,
            CallCount::Between(lo, hi) => lo <= calls && calls <= hi,
        }
    }
}

impl fmt::Display for CallCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallCount::Exactly(n) => write!(f, "exactly {}", n),
            CallCount::AtLeast(n) => write!(f, "at least {}", n),
            CallCount::AtMost(n) => write!(f, "at most {}", n),
            CallCount::Between(lo, hi) => write!(f, "between {} and {}", lo, hi),
        }
    }
}

/// Observed call count of one expectation, read at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub expectation: ExpectationHandle,
    pub label: Option<String>,
    pub calls: u64,
}

/// A declared call count that was not met.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub record: VerificationRecord,
    pub expected: CallCount,
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .record
            .label
            .clone()
            .unwrap_or_else(|| format!("expectation {}", self.record.expectation));
        write!(
            f,
            "{} expected {} calls but received {}",
            name, self.expected, self.record.calls
        )
    }
}

/// Read-only view over the registry's call counters.
#[derive(Debug, Clone)]
pub struct Verifier {
    registry: Arc<ExpectationRegistry>,
}

impl Verifier {
    pub fn new(registry: Arc<ExpectationRegistry>) -> Self {
        Self { registry }
    }

    /// Whether the expectation's call count satisfies `expected`.
    /// Unknown handles never verify.
    pub fn verify(&self, handle: ExpectationHandle, expected: CallCount) -> bool {
        self.call_count(handle)
            .map(|calls| expected.test(calls))
            .unwrap_or(false)
    }

    pub fn call_count(&self, handle: ExpectationHandle) -> Option<u64> {
        self.registry.get(handle).map(|e| e.call_count())
    }

    pub fn record(&self, handle: ExpectationHandle) -> Option<VerificationRecord> {
        self.registry.get(handle).map(|e| VerificationRecord {
            expectation: handle,
            label: e.label().map(String::from),
            calls: e.call_count(),
        })
    }

    /// Check every expectation that declared a call count.
    pub fn verify_all(&self) -> Result<(), Vec<VerificationFailure>> {
        let failures: Vec<_> = self
            .registry
            .entries()
            .into_iter()
            .filter_map(|(handle, expectation)| {
                let expected = expectation.expected_calls()?;
                let calls = expectation.call_count();
                (!expected.test(calls)).then(|| VerificationFailure {
                    record: VerificationRecord {
                        expectation: handle,
                        label: expectation.label().map(String::from),
                        calls,
                    },
                    expected,
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
